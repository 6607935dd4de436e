// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Administrative key operations.
//!
//! Mutating operations run in their own task so a client that disconnects
//! mid-request cannot abort a half-finished publish.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::ApiError,
    keys::{HousekeepingReport, KeyInfo},
    state::AppState,
};

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct GenerateKeyRequest {
    /// RSA modulus size (2048, 3072 or 4096). Defaults to the configured size.
    #[serde(default)]
    pub bits: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct KeyListResponse {
    pub keys: Vec<KeyInfo>,
}

fn task_failed(e: tokio::task::JoinError) -> ApiError {
    ApiError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("key operation task failed: {e}"),
    )
}

#[utoipa::path(
    post,
    path = "/v1/keys",
    request_body = GenerateKeyRequest,
    tag = "Keys",
    responses(
        (status = 201, body = KeyInfo),
        (status = 400, description = "Unsupported key size"),
        (status = 502, description = "Remote key set unavailable or malformed")
    )
)]
pub async fn generate_key(
    State(state): State<AppState>,
    Json(request): Json<GenerateKeyRequest>,
) -> Result<(StatusCode, Json<KeyInfo>), ApiError> {
    let manager = state.manager.clone();
    let cancel = state.shutdown.child_token();
    let info = tokio::spawn(async move { manager.generate_and_publish(request.bits, &cancel).await })
        .await
        .map_err(task_failed)??;
    Ok((StatusCode::CREATED, Json(info)))
}

#[utoipa::path(
    get,
    path = "/v1/keys",
    tag = "Keys",
    responses((status = 200, body = KeyListResponse))
)]
pub async fn list_keys(State(state): State<AppState>) -> Result<Json<KeyListResponse>, ApiError> {
    let cancel = state.shutdown.child_token();
    let keys = state.manager.list_remote_keys(&cancel).await?;
    Ok(Json(KeyListResponse { keys }))
}

#[utoipa::path(
    delete,
    path = "/v1/keys/{kid}",
    params(
        ("kid" = String, Path, description = "Identifier of the key to remove")
    ),
    tag = "Keys",
    responses(
        (status = 200, description = "Keys left in the published set", body = KeyListResponse),
        (status = 400, description = "Invalid key identifier")
    )
)]
pub async fn remove_key(
    Path(kid): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<KeyListResponse>, ApiError> {
    let manager = state.manager.clone();
    let cancel = state.shutdown.child_token();
    let keys = tokio::spawn(async move { manager.remove_and_republish(&kid, &cancel).await })
        .await
        .map_err(task_failed)??;
    Ok(Json(KeyListResponse { keys }))
}

#[utoipa::path(
    post,
    path = "/v1/keys/{kid}/publish",
    params(
        ("kid" = String, Path, description = "Identifier of a key in the local key directory")
    ),
    tag = "Keys",
    responses(
        (status = 200, description = "Key now in the published set", body = KeyInfo),
        (status = 404, description = "No public key file for this identifier"),
        (status = 502, description = "Remote key set unavailable or malformed")
    )
)]
pub async fn publish_key(
    Path(kid): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<KeyInfo>, ApiError> {
    let manager = state.manager.clone();
    let cancel = state.shutdown.child_token();
    let info = tokio::spawn(async move { manager.publish_local_key(&kid, &cancel).await })
        .await
        .map_err(task_failed)??;
    Ok(Json(info))
}

#[utoipa::path(
    post,
    path = "/v1/housekeeping",
    tag = "Keys",
    responses((status = 200, body = HousekeepingReport))
)]
pub async fn housekeeping(State(state): State<AppState>) -> Result<Json<HousekeepingReport>, ApiError> {
    let housekeeper = state.housekeeper.clone();
    let cancel = state.shutdown.child_token();
    let report = tokio::spawn(async move { housekeeper.run(&cancel).await })
        .await
        .map_err(task_failed)??;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{jwk, KeySet};
    use crate::storage::RemoteKeySetStore;
    use crate::testutil;

    #[tokio::test]
    async fn generate_list_remove_cycle() {
        let (_dir, state, _remote) = testutil::app_state();

        let (status, Json(created)) = generate_key(State(state.clone()), Json(GenerateKeyRequest::default()))
            .await
            .expect("key generation succeeds");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.algorithm, "RS256");

        let Json(listed) = list_keys(State(state.clone())).await.unwrap();
        assert_eq!(listed.keys, vec![created.clone()]);

        let Json(remaining) = remove_key(Path(created.key_id.clone()), State(state.clone()))
            .await
            .unwrap();
        assert!(remaining.keys.is_empty());
        assert!(state.manager.local().private_key_ids().unwrap().is_empty());
    }

    #[tokio::test]
    async fn generate_rejects_small_keys() {
        let (_dir, state, _remote) = testutil::app_state();
        let err = generate_key(State(state), Json(GenerateKeyRequest { bits: Some(1024) }))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_of_missing_document_is_empty() {
        let (_dir, state, _remote) = testutil::app_state();
        let Json(listed) = list_keys(State(state)).await.unwrap();
        assert!(listed.keys.is_empty());
    }

    #[tokio::test]
    async fn malformed_remote_document_is_bad_gateway() {
        let (_dir, state, remote) = testutil::app_state();
        let coordinate = remote.resolve_coordinate().unwrap();
        remote.put_object(&coordinate, b"[]".to_vec()).await;

        let err = list_keys(State(state)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn publish_uploads_existing_local_key() {
        let (_dir, state, remote) = testutil::app_state();
        let pair = testutil::key_pair("tb", 42);
        state.manager.persist_locally(&pair).unwrap();

        let Json(info) = publish_key(Path("tb-42".to_string()), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(info, pair.info());

        let coordinate = remote.resolve_coordinate().unwrap();
        let published = jwk::parse_key_set(&remote.get_object(&coordinate).await.unwrap()).unwrap();
        assert_eq!(published.key_ids(), vec!["tb-42"]);

        let err = publish_key(Path("tb-404".to_string()), State(state)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn housekeeping_reports_counts() {
        let (_dir, state, remote) = testutil::app_state();
        let kept = testutil::key_pair("tb", 1);
        state.manager.persist_locally(&kept).unwrap();
        state
            .manager
            .persist_locally(&testutil::key_pair("tb", 2))
            .unwrap();
        let coordinate = remote.resolve_coordinate().unwrap();
        remote
            .put_object(
                &coordinate,
                jwk::serialize_key_set(&KeySet::from_records([kept.public])).unwrap(),
            )
            .await;

        let Json(report) = housekeeping(State(state)).await.unwrap();
        assert_eq!(
            report,
            HousekeepingReport {
                local_keys: 2,
                remote_keys: 1,
                deleted_keys: 1,
            }
        );
    }
}
