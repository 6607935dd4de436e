// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::TokenClaims,
    keys::{HousekeepingReport, KeyInfo},
    state::AppState,
};

pub mod health;
pub mod issue;
pub mod keys;

/// Token listener: reachable by every network-authenticated client.
pub fn issuer_router(state: AppState) -> Router {
    Router::new()
        .route("/issue", post(issue::issue))
        .route("/.well-known/jwks.json", get(issue::jwks))
        .route("/_healthz", get(health::healthz))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Administrative listener: key lifecycle operations and API docs.
pub fn admin_router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/keys", get(keys::list_keys).post(keys::generate_key))
        .route("/keys/{kid}", delete(keys::remove_key))
        .route("/keys/{kid}/publish", post(keys::publish_key))
        .route("/housekeeping", post(keys::housekeeping))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .route("/_healthz", get(health::healthz))
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthz,
        issue::issue,
        issue::jwks,
        keys::generate_key,
        keys::list_keys,
        keys::remove_key,
        keys::publish_key,
        keys::housekeeping
    ),
    components(
        schemas(
            health::HealthResponse,
            issue::IssueResponse,
            keys::GenerateKeyRequest,
            keys::KeyListResponse,
            KeyInfo,
            HousekeepingReport,
            TokenClaims
        )
    ),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Tokens", description = "Token issuance and the public key set"),
        (name = "Keys", description = "Signing key lifecycle")
    )
)]
pub struct ApiDoc;
