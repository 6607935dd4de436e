// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Remote key set store backed by the `object_store` crate.
//!
//! One adapter serves every backend. The container is the S3 bucket for
//! `s3`; the other backends have no notion of buckets, so the container
//! becomes the first path segment instead.
//!
//! | Backend | Store | Object key |
//! |---------|-------|------------|
//! | `memory` | `InMemory` | `{container}/{path}` |
//! | `fs` | `LocalFileSystem` under `TB_REMOTE_ROOT` | `{container}/{path}` |
//! | `http` | `HttpStore` at `TB_REMOTE_URL` | `{container}/{path}` |
//! | `s3` | `AmazonS3` bucket `{container}` | `{path}` |
//!
//! S3 credentials, region and endpoint come from the standard `AWS_*`
//! environment variables.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use object_store::{ClientOptions, ObjectStore, PutPayload, path::Path as ObjectPath};
use tracing::debug;
use url::Url;

use super::remote::{Coordinate, ObjectLocation, RemoteError, RemoteKeySetStore};

/// [`RemoteKeySetStore`] over any [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct ObjectKeySetStore {
    store: Arc<dyn ObjectStore>,
    location: ObjectLocation,
    /// `false` when the store itself is scoped to the container (S3 bucket).
    container_in_path: bool,
    backend: &'static str,
}

impl ObjectKeySetStore {
    /// Process-local store; objects are lost on exit.
    pub fn in_memory(location: ObjectLocation) -> Self {
        Self {
            store: Arc::new(object_store::memory::InMemory::new()),
            location,
            container_in_path: true,
            backend: "memory",
        }
    }

    /// Directory tree under `root`, created if missing.
    pub fn local(root: &Path, location: ObjectLocation) -> Result<Self, RemoteError> {
        std::fs::create_dir_all(root).map_err(|e| {
            RemoteError::Configuration(format!(
                "cannot create remote root {}: {e}",
                root.display()
            ))
        })?;
        let store = object_store::local::LocalFileSystem::new_with_prefix(root).map_err(|e| {
            RemoteError::Configuration(format!(
                "cannot open remote root {}: {e}",
                root.display()
            ))
        })?;
        Ok(Self {
            store: Arc::new(store),
            location,
            container_in_path: true,
            backend: "fs",
        })
    }

    /// Plain `GET` / `PUT` against a base URL.
    pub fn http(base: Url, location: ObjectLocation, timeout: Duration) -> Result<Self, RemoteError> {
        if !matches!(base.scheme(), "http" | "https") {
            return Err(RemoteError::Configuration(format!(
                "remote URL must be http or https, got {base}"
            )));
        }
        let store = object_store::http::HttpBuilder::new()
            .with_url(base.as_str())
            .with_client_options(ClientOptions::new().with_timeout(timeout).with_allow_http(true))
            .build()
            .map_err(|e| RemoteError::Configuration(format!("failed to create HTTP store: {e}")))?;
        Ok(Self {
            store: Arc::new(store),
            location,
            container_in_path: true,
            backend: "http",
        })
    }

    /// S3 bucket named by the container, credentials from the environment.
    pub fn s3(location: ObjectLocation, timeout: Duration) -> Result<Self, RemoteError> {
        let bucket = location.resolve()?.container;
        let store = object_store::aws::AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_client_options(ClientOptions::new().with_timeout(timeout))
            .build()
            .map_err(|e| RemoteError::Configuration(format!("failed to create S3 store: {e}")))?;
        Ok(Self {
            store: Arc::new(store),
            location,
            container_in_path: false,
            backend: "s3",
        })
    }

    /// Object key for a coordinate.
    ///
    /// Every segment must be a plain name: empty, `.` and `..` segments are
    /// rejected so a coordinate can never leave its container.
    pub fn object_path(&self, coordinate: &Coordinate) -> Result<ObjectPath, RemoteError> {
        let mut segments = Vec::new();
        if self.container_in_path {
            segments.push(coordinate.container.as_str());
        }
        segments.extend(coordinate.path.split('/'));

        if segments.iter().any(|s| s.is_empty() || *s == "." || *s == "..") {
            return Err(RemoteError::Configuration(format!(
                "coordinate {coordinate} is not a plain object path"
            )));
        }
        ObjectPath::parse(segments.join("/")).map_err(|e| {
            RemoteError::Configuration(format!("coordinate {coordinate} is not a valid object path: {e}"))
        })
    }
}

fn map_error(coordinate: &Coordinate, error: object_store::Error) -> RemoteError {
    match error {
        object_store::Error::NotFound { .. } => RemoteError::NotFound(coordinate.clone()),
        other => RemoteError::transport(coordinate, other.to_string()),
    }
}

#[async_trait]
impl RemoteKeySetStore for ObjectKeySetStore {
    async fn upload(&self, coordinate: &Coordinate, data: Vec<u8>) -> Result<(), RemoteError> {
        let path = self.object_path(coordinate)?;
        debug!(coordinate = %coordinate, bytes = data.len(), backend = self.backend, "Uploading key set");
        self.store
            .put(&path, PutPayload::from(data))
            .await
            .map_err(|e| map_error(coordinate, e))?;
        Ok(())
    }

    async fn download(&self, coordinate: &Coordinate) -> Result<Vec<u8>, RemoteError> {
        let path = self.object_path(coordinate)?;
        let result = self
            .store
            .get(&path)
            .await
            .map_err(|e| map_error(coordinate, e))?;
        let bytes = result.bytes().await.map_err(|e| map_error(coordinate, e))?;
        debug!(coordinate = %coordinate, bytes = bytes.len(), backend = self.backend, "Downloaded key set");
        Ok(bytes.to_vec())
    }

    fn resolve_coordinate(&self) -> Result<Coordinate, RemoteError> {
        self.location.resolve()
    }

    fn backend_name(&self) -> &'static str {
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DEFAULT_KEY_SET_PATH;

    use axum::body::Bytes;
    use axum::extract::{Path as UrlPath, State};
    use axum::http::{header, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::Router;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    fn location() -> ObjectLocation {
        ObjectLocation::new(Some("bucket".to_string()), DEFAULT_KEY_SET_PATH)
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = ObjectKeySetStore::in_memory(location());
        let coordinate = store.resolve_coordinate().unwrap();
        assert!(matches!(
            store.download(&coordinate).await,
            Err(RemoteError::NotFound(c)) if c == coordinate
        ));
    }

    #[tokio::test]
    async fn upload_replaces_whole_object() {
        let store = ObjectKeySetStore::in_memory(location());
        let coordinate = store.resolve_coordinate().unwrap();

        store.upload(&coordinate, b"first".to_vec()).await.unwrap();
        store.upload(&coordinate, b"second".to_vec()).await.unwrap();
        assert_eq!(store.download(&coordinate).await.unwrap(), b"second");
    }

    #[test]
    fn missing_container_fails_resolution() {
        let store = ObjectKeySetStore::in_memory(ObjectLocation::new(None, DEFAULT_KEY_SET_PATH));
        assert!(matches!(
            store.resolve_coordinate(),
            Err(RemoteError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn local_objects_land_under_container_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ObjectKeySetStore::local(dir.path(), location()).unwrap();
        let coordinate = store.resolve_coordinate().unwrap();

        store.upload(&coordinate, b"{\"keys\":[]}".to_vec()).await.unwrap();

        let on_disk = std::fs::read(dir.path().join("bucket/.well-known/jwks.json")).unwrap();
        assert_eq!(on_disk, b"{\"keys\":[]}");
        assert_eq!(store.download(&coordinate).await.unwrap(), on_disk);
    }

    #[tokio::test]
    async fn local_root_is_created_on_demand() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().join("nested/remote");
        let store = ObjectKeySetStore::local(&root, location()).unwrap();
        assert!(root.is_dir());

        let coordinate = store.resolve_coordinate().unwrap();
        assert!(matches!(
            store.download(&coordinate).await,
            Err(RemoteError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn abandoned_upload_leaves_no_staging_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ObjectKeySetStore::local(dir.path(), location()).unwrap();
        let coordinate = store.resolve_coordinate().unwrap();

        // Large enough that the deadline fires while the write is in flight.
        let payload = vec![b' '; 32 * 1024 * 1024];
        let _ = tokio::time::timeout(
            Duration::from_millis(1),
            store.upload(&coordinate, payload),
        )
        .await;

        let container = dir.path().join("bucket/.well-known");
        let mut entries = Vec::new();
        for _ in 0..200 {
            entries = std::fs::read_dir(&container)
                .map(|rd| {
                    rd.filter_map(Result::ok)
                        .map(|e| e.file_name().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            if entries == ["jwks.json"] {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(entries, ["jwks.json"]);
    }

    #[test]
    fn escaping_coordinates_are_rejected() {
        let store = ObjectKeySetStore::in_memory(location());
        for (container, path) in [
            ("bucket", "../outside.json"),
            ("bucket", "a//b.json"),
            ("..", "jwks.json"),
            ("", "jwks.json"),
            ("bucket", "./jwks.json"),
        ] {
            let coordinate = Coordinate {
                container: container.to_string(),
                path: path.to_string(),
            };
            assert!(
                matches!(store.object_path(&coordinate), Err(RemoteError::Configuration(_))),
                "{coordinate} should be rejected"
            );
        }
    }

    #[test]
    fn s3_store_keys_by_path_only() {
        let store = ObjectKeySetStore::s3(location(), Duration::from_secs(5)).unwrap();
        assert_eq!(store.backend_name(), "s3");

        let coordinate = store.resolve_coordinate().unwrap();
        assert_eq!(
            store.object_path(&coordinate).unwrap().as_ref(),
            ".well-known/jwks.json"
        );
    }

    #[test]
    fn s3_store_requires_bucket() {
        let location = ObjectLocation::new(None, DEFAULT_KEY_SET_PATH);
        assert!(matches!(
            ObjectKeySetStore::s3(location, Duration::from_secs(5)),
            Err(RemoteError::Configuration(_))
        ));
    }

    #[test]
    fn http_store_rejects_other_schemes() {
        let url = Url::parse("ftp://example.com/").unwrap();
        assert!(matches!(
            ObjectKeySetStore::http(url, location(), Duration::from_secs(1)),
            Err(RemoteError::Configuration(_))
        ));
    }

    type Objects = Arc<RwLock<HashMap<String, Vec<u8>>>>;

    async fn get_object(State(objects): State<Objects>, UrlPath(key): UrlPath<String>) -> Response {
        match objects.read().await.get(&key) {
            Some(data) => (
                [
                    (header::LAST_MODIFIED, "Wed, 14 Oct 2026 00:00:00 GMT".to_string()),
                    (header::ETAG, format!("\"{}\"", data.len())),
                ],
                data.clone(),
            )
                .into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn put_object(
        State(objects): State<Objects>,
        UrlPath(key): UrlPath<String>,
        body: Bytes,
    ) -> Response {
        let etag = format!("\"{}\"", body.len());
        objects.write().await.insert(key, body.to_vec());
        (StatusCode::CREATED, [(header::ETAG, etag)]).into_response()
    }

    async fn serve_objects() -> (Url, Objects) {
        let objects = Objects::default();
        let app = Router::new()
            .route("/objects/{*key}", get(get_object).put(put_object))
            .with_state(objects.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (Url::parse(&format!("http://{addr}/objects/")).unwrap(), objects)
    }

    #[tokio::test]
    async fn http_store_puts_and_gets_under_base_url() {
        let (base, objects) = serve_objects().await;
        let store = ObjectKeySetStore::http(base, location(), Duration::from_secs(5)).unwrap();
        let coordinate = store.resolve_coordinate().unwrap();

        assert!(matches!(
            store.download(&coordinate).await,
            Err(RemoteError::NotFound(_))
        ));

        store.upload(&coordinate, b"{\"keys\":[]}".to_vec()).await.unwrap();
        assert_eq!(
            objects.read().await.get("bucket/.well-known/jwks.json").unwrap(),
            b"{\"keys\":[]}"
        );
        assert_eq!(store.download(&coordinate).await.unwrap(), b"{\"keys\":[]}");
    }
}
