// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP client for the administrative listener.
//!
//! Every `keys` command that touches the remote set talks to a running
//! server so it serializes with it on the same coordinate lock.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use url::Url;

use crate::api::keys::{GenerateKeyRequest, KeyListResponse};
use crate::keys::{HousekeepingReport, KeyInfo};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid admin URL: {0}")]
    InvalidUrl(String),

    #[error("admin request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("admin server returned {status}: {message}")]
    Api { status: u16, message: String },
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for `/v1` on the admin listener.
#[derive(Debug, Clone)]
pub struct AdminClient {
    client: Client,
    base: Url,
}

impl AdminClient {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, ClientError> {
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ClientError> {
        Ok(self.client.request(method, self.endpoint(segments)?))
    }

    async fn send<R: DeserializeOwned>(request: RequestBuilder) -> Result<R, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<R>().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn generate_key(&self, bits: Option<usize>) -> Result<KeyInfo, ClientError> {
        let request = self
            .request(Method::POST, &["v1", "keys"])?
            .json(&GenerateKeyRequest { bits });
        Self::send(request).await
    }

    pub async fn list_keys(&self) -> Result<Vec<KeyInfo>, ClientError> {
        let response: KeyListResponse = Self::send(self.request(Method::GET, &["v1", "keys"])?).await?;
        Ok(response.keys)
    }

    /// Remove `kid` and return the keys left in the published set.
    pub async fn remove_key(&self, kid: &str) -> Result<Vec<KeyInfo>, ClientError> {
        let response: KeyListResponse =
            Self::send(self.request(Method::DELETE, &["v1", "keys", kid])?).await?;
        Ok(response.keys)
    }

    /// Publish a key that already exists in the server's key directory.
    pub async fn publish_key(&self, kid: &str) -> Result<KeyInfo, ClientError> {
        Self::send(self.request(Method::POST, &["v1", "keys", kid, "publish"])?).await
    }

    pub async fn housekeeping(&self) -> Result<HousekeepingReport, ClientError> {
        Self::send(self.request(Method::POST, &["v1", "housekeeping"])?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::admin_router;
    use crate::keys::KeySet;
    use crate::state::AppState;
    use crate::testutil;
    use crate::storage::remote::RemoteKeySetStore;

    async fn serve(state: AppState) -> AdminClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, admin_router(state)).await.unwrap();
        });
        let base = Url::parse(&format!("http://{addr}")).unwrap();
        AdminClient::new(base, Duration::from_secs(30)).unwrap()
    }

    async fn serve_admin() -> (tempfile::TempDir, AdminClient) {
        let (dir, state, _remote) = testutil::app_state();
        (dir, serve(state).await)
    }

    #[test]
    fn rejects_non_http_urls() {
        let url = Url::parse("file:///tmp/admin").unwrap();
        assert!(matches!(
            AdminClient::new(url, Duration::from_secs(1)),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn endpoint_escapes_key_identifiers() {
        let client = AdminClient::new(
            Url::parse("http://127.0.0.1:50051/").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();
        let url = client.endpoint(&["v1", "keys", "tb/../1"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:50051/v1/keys/tb%2F..%2F1");
    }

    #[tokio::test]
    async fn generate_list_remove_over_http() {
        let (_dir, client) = serve_admin().await;

        let created = client.generate_key(None).await.unwrap();
        assert!(created.key_id.starts_with("tb-"));
        assert_eq!(client.list_keys().await.unwrap(), vec![created.clone()]);

        let remaining = client.remove_key(&created.key_id).await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn api_errors_carry_server_message() {
        let (_dir, client) = serve_admin().await;
        match client.generate_key(Some(1024)).await {
            Err(ClientError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert!(message.contains("1024"), "{message}");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_merges_with_concurrent_generation() {
        let (_dir, state, remote) = testutil::app_state();
        let pair = testutil::key_pair("tb", 7);
        state.manager.persist_locally(&pair).unwrap();
        let client = serve(state.clone()).await;

        let (published, generated) = tokio::join!(client.publish_key("tb-7"), client.generate_key(None));
        assert_eq!(published.unwrap(), pair.info());
        let generated = generated.unwrap();

        let coordinate = remote.resolve_coordinate().unwrap();
        let set: KeySet =
            crate::keys::jwk::parse_key_set(&remote.get_object(&coordinate).await.unwrap()).unwrap();
        let mut ids = set.key_ids();
        ids.sort();
        let mut expected = vec!["tb-7", generated.key_id.as_str()];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn publish_of_unknown_key_is_not_found() {
        let (_dir, client) = serve_admin().await;
        match client.publish_key("tb-404").await {
            Err(ClientError::Api { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn housekeeping_over_http() {
        let (_dir, client) = serve_admin().await;
        let report = client.housekeeping().await.unwrap();
        assert_eq!(report.local_keys, 0);
        assert_eq!(report.deleted_keys, 0);
    }
}
