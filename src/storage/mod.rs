// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Storage
//!
//! Two stores with very different roles:
//!
//! - [`LocalKeyStore`]: a directory of individual JWK files. Holds the private
//!   halves, which never leave this machine.
//! - [`RemoteKeySetStore`]: one aggregate JWKS document in an object store,
//!   published for relying parties. Public halves only.
//!
//! ## Storage Layout
//!
//! ```text
//! {TB_KEYS_DIR}/                      # 0700
//!   {kid}.public.jwk                  # 0644
//!   {kid}.private.jwk                 # 0600
//!
//! {container}/{TB_KEY_PATH}           # remote, e.g. bucket/.well-known/jwks.json
//! ```

pub mod local;
pub mod object;
pub mod paths;
pub mod remote;

use std::sync::Arc;

use tracing::info;

pub use local::LocalKeyStore;
pub use object::ObjectKeySetStore;
pub use paths::{KeyPaths, DEFAULT_KEYS_DIR};
pub use remote::{Coordinate, ObjectLocation, RemoteError, RemoteKeySetStore, DEFAULT_KEY_SET_PATH};

use crate::config::{RemoteBackend, RemoteConfig};

/// Build the configured remote store.
pub fn connect(config: &RemoteConfig) -> Result<Arc<dyn RemoteKeySetStore>, RemoteError> {
    let location = config.location();
    let store = match config.backend {
        RemoteBackend::Memory => ObjectKeySetStore::in_memory(location),
        RemoteBackend::Fs => ObjectKeySetStore::local(&config.root, location)?,
        RemoteBackend::Http => {
            let url = config.url.clone().ok_or_else(|| {
                RemoteError::Configuration("the http backend needs a remote URL".to_string())
            })?;
            ObjectKeySetStore::http(url, location, config.timeout)?
        }
        RemoteBackend::S3 => ObjectKeySetStore::s3(location, config.timeout)?,
    };

    info!(backend = store.backend_name(), "Remote key set store configured");
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_backend_requires_url() {
        let config = RemoteConfig {
            backend: RemoteBackend::Http,
            ..Default::default()
        };
        assert!(matches!(connect(&config), Err(RemoteError::Configuration(_))));
    }

    #[test]
    fn s3_backend_requires_bucket() {
        let config = RemoteConfig {
            backend: RemoteBackend::S3,
            ..Default::default()
        };
        assert!(matches!(connect(&config), Err(RemoteError::Configuration(_))));
    }

    #[test]
    fn connect_builds_each_backend() {
        let dir = tempfile::TempDir::new().unwrap();
        for (backend, name) in [
            (RemoteBackend::Memory, "memory"),
            (RemoteBackend::Fs, "fs"),
            (RemoteBackend::S3, "s3"),
        ] {
            let config = RemoteConfig {
                backend,
                bucket: Some("bucket".to_string()),
                root: dir.path().join("remote"),
                ..Default::default()
            };
            assert_eq!(connect(&config).unwrap().backend_name(), name);
        }

        let config = RemoteConfig {
            backend: RemoteBackend::Http,
            url: Some(url::Url::parse("http://localhost:9000").unwrap()),
            ..Default::default()
        };
        assert_eq!(connect(&config).unwrap().backend_name(), "http");
    }
}
