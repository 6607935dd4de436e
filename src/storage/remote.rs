// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Remote key set store abstraction.
//!
//! The remote side holds exactly one document: the aggregate JWKS that relying
//! parties fetch. Backends move opaque bytes; parsing and merging happen in
//! the key manager.
//!
//! | Method               | Description                                 |
//! |----------------------|---------------------------------------------|
//! | `upload`             | Replace the document at a coordinate        |
//! | `download`           | Fetch the document, `NotFound` when absent  |
//! | `resolve_coordinate` | Where the published document lives          |

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Default path of the published key set inside its container.
pub const DEFAULT_KEY_SET_PATH: &str = ".well-known/jwks.json";

/// Location of a remote object: a container (bucket) and a path inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub container: String,
    pub path: String,
}

impl Coordinate {
    pub fn new(container: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.path)
    }
}

/// Configured, possibly incomplete object location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectLocation {
    pub container: Option<String>,
    pub path: String,
}

impl ObjectLocation {
    pub fn new(container: Option<String>, path: impl Into<String>) -> Self {
        Self {
            container,
            path: path.into(),
        }
    }

    /// Resolve into a full coordinate. The container is mandatory; an empty
    /// path falls back to [`DEFAULT_KEY_SET_PATH`].
    pub fn resolve(&self) -> Result<Coordinate, RemoteError> {
        let container = self
            .container
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                RemoteError::Configuration("remote container (bucket) is not configured".to_string())
            })?;

        let path = self.path.trim().trim_start_matches('/');
        let path = if path.is_empty() {
            DEFAULT_KEY_SET_PATH
        } else {
            path
        };
        Ok(Coordinate::new(container, path))
    }
}

/// Errors returned by remote backends.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("no object at {0}")]
    NotFound(Coordinate),

    #[error("remote store failure at {coordinate}: {message}")]
    Transport {
        coordinate: Coordinate,
        message: String,
    },

    #[error("remote store misconfigured: {0}")]
    Configuration(String),
}

impl RemoteError {
    pub fn transport(coordinate: &Coordinate, message: impl fmt::Display) -> Self {
        RemoteError::Transport {
            coordinate: coordinate.clone(),
            message: message.to_string(),
        }
    }
}

/// Byte-level client for the remote key set document.
///
/// Implementations must be safe to share between tasks. Writes replace the
/// whole object or nothing.
#[async_trait]
pub trait RemoteKeySetStore: Send + Sync {
    /// Replace the object at `coordinate` with `data`.
    async fn upload(&self, coordinate: &Coordinate, data: Vec<u8>) -> Result<(), RemoteError>;

    /// Fetch the object at `coordinate`.
    async fn download(&self, coordinate: &Coordinate) -> Result<Vec<u8>, RemoteError>;

    /// Coordinate of the published key set.
    fn resolve_coordinate(&self) -> Result<Coordinate, RemoteError>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_display_joins_container_and_path() {
        let coordinate = Coordinate::new("bucket", ".well-known/jwks.json");
        assert_eq!(coordinate.to_string(), "bucket/.well-known/jwks.json");
    }

    #[test]
    fn location_requires_container() {
        let location = ObjectLocation::new(None, "keys.json");
        assert!(matches!(location.resolve(), Err(RemoteError::Configuration(_))));

        let location = ObjectLocation::new(Some("  ".to_string()), "keys.json");
        assert!(matches!(location.resolve(), Err(RemoteError::Configuration(_))));
    }

    #[test]
    fn location_defaults_path() {
        let location = ObjectLocation::new(Some("bucket".to_string()), "");
        assert_eq!(
            location.resolve().unwrap(),
            Coordinate::new("bucket", DEFAULT_KEY_SET_PATH)
        );

        let location = ObjectLocation::new(Some("bucket".to_string()), "/custom/jwks.json");
        assert_eq!(
            location.resolve().unwrap(),
            Coordinate::new("bucket", "custom/jwks.json")
        );
    }
}
