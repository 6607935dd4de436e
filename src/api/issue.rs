// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{AuthError, Identity},
    error::ApiError,
    keys::jwk,
    state::AppState,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IssueResponse {
    /// Signed JWT.
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/issue",
    tag = "Tokens",
    responses(
        (status = 200, body = IssueResponse),
        (status = 401, description = "Caller identity could not be resolved"),
        (status = 503, description = "No signing key available")
    )
)]
pub async fn issue(
    identity: Identity,
    State(state): State<AppState>,
) -> Result<Json<IssueResponse>, AuthError> {
    let issuer = state.issuer.clone();
    let token = tokio::task::spawn_blocking(move || {
        issuer.issue_token(&identity.login, &identity.display_name)
    })
    .await
    .map_err(|e| AuthError::InternalError(format!("token task failed: {e}")))??;

    Ok(Json(IssueResponse { token }))
}

/// Public halves of the local keys as a JWKS document.
#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    tag = "Tokens",
    responses((status = 200, description = "JSON Web Key Set", content_type = "application/json"))
)]
pub async fn jwks(State(state): State<AppState>) -> Result<Response, ApiError> {
    let set = state.issuer.public_key_set().map_err(|e| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    let body = jwk::serialize_key_set(&set)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}
