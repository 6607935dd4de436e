// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults and the typed configuration handed
//! to each component. Only the CLI layer reads the environment (through
//! clap's `env = ...` bindings); everything below it receives these structs.
//! The one exception is the `s3` backend, which takes its credentials from
//! the standard `AWS_*` variables.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `TB_KEYS_DIR` | Local key directory | `keys` |
//! | `TB_KEY_PREFIX` | Key identifier prefix | `tb` |
//! | `TB_KEY_SIZE` | RSA modulus size for generated keys | `2048` |
//! | `TB_ISSUER` | `iss` claim of issued tokens | `tailbone` |
//! | `TB_EXPIRY_SECS` | Token lifetime in seconds | `1200` |
//! | `TB_BUCKET` | Remote container holding the key set | Required |
//! | `TB_KEY_PATH` | Path of the key set inside the container | `.well-known/jwks.json` |
//! | `TB_REMOTE_BACKEND` | `memory`, `fs`, `http` or `s3` | `fs` |
//! | `TB_REMOTE_ROOT` | Root directory of the `fs` backend | `remote` |
//! | `TB_REMOTE_URL` | Base URL of the `http` backend | Required for `http` |
//! | `TB_REMOTE_TIMEOUT_SECS` | Timeout of every remote call | `10` |
//! | `AWS_*` | Credentials, region and endpoint of the `s3` backend | SDK defaults |
//! | `HOST` | Issuer listener bind address | `0.0.0.0` |
//! | `PORT` | Issuer listener port | `8080` |
//! | `ADMIN_HOST` | Admin listener bind address | `127.0.0.1` |
//! | `ADMIN_PORT` | Admin listener port | `50051` |
//! | `TB_ADMIN_URL` | Admin endpoint used by `keys` commands | `http://127.0.0.1:50051` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use url::Url;

use crate::keys::DEFAULT_KEY_PREFIX;
use crate::storage::{ObjectLocation, DEFAULT_KEYS_DIR, DEFAULT_KEY_SET_PATH};

// =============================================================================
// Environment Variable Names
// =============================================================================

pub const KEYS_DIR_ENV: &str = "TB_KEYS_DIR";
pub const KEY_PREFIX_ENV: &str = "TB_KEY_PREFIX";
pub const KEY_SIZE_ENV: &str = "TB_KEY_SIZE";
pub const ISSUER_ENV: &str = "TB_ISSUER";
pub const EXPIRY_SECS_ENV: &str = "TB_EXPIRY_SECS";
pub const BUCKET_ENV: &str = "TB_BUCKET";
pub const KEY_PATH_ENV: &str = "TB_KEY_PATH";
pub const REMOTE_BACKEND_ENV: &str = "TB_REMOTE_BACKEND";
pub const REMOTE_ROOT_ENV: &str = "TB_REMOTE_ROOT";
pub const REMOTE_URL_ENV: &str = "TB_REMOTE_URL";
pub const REMOTE_TIMEOUT_SECS_ENV: &str = "TB_REMOTE_TIMEOUT_SECS";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const ADMIN_HOST_ENV: &str = "ADMIN_HOST";
pub const ADMIN_PORT_ENV: &str = "ADMIN_PORT";
pub const ADMIN_URL_ENV: &str = "TB_ADMIN_URL";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

// =============================================================================
// Defaults
// =============================================================================

pub const DEFAULT_KEY_SIZE: usize = 2048;
pub const DEFAULT_ISSUER: &str = "tailbone";
/// 20 minutes.
pub const DEFAULT_EXPIRY_SECS: u64 = 20 * 60;
pub const DEFAULT_REMOTE_ROOT: &str = "remote";
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
pub const DEFAULT_ADMIN_PORT: u16 = 50051;
pub const DEFAULT_ADMIN_URL: &str = "http://127.0.0.1:50051";

/// Clock skew tolerance (seconds) when verifying `exp` / `nbf`.
pub const DEFAULT_LEEWAY_SECS: u64 = 60;

// =============================================================================
// Typed Configuration
// =============================================================================

/// Key lifecycle settings.
#[derive(Debug, Clone)]
pub struct KeysConfig {
    pub dir: PathBuf,
    pub prefix: String,
    /// Default RSA size when a caller does not ask for one.
    pub key_size: usize,
    /// Upper bound for every remote call.
    pub operation_timeout: Duration,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_KEYS_DIR),
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            key_size: DEFAULT_KEY_SIZE,
            operation_timeout: Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
        }
    }
}

/// Token issuance settings.
#[derive(Debug, Clone)]
pub struct IssuerConfig {
    pub issuer: String,
    pub expiry: Duration,
    /// Seconds of clock skew accepted on verification.
    pub leeway: u64,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            issuer: DEFAULT_ISSUER.to_string(),
            expiry: Duration::from_secs(DEFAULT_EXPIRY_SECS),
            leeway: DEFAULT_LEEWAY_SECS,
        }
    }
}

/// Remote object store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RemoteBackend {
    /// Process-local map; lost on exit.
    Memory,
    /// Directory tree under `TB_REMOTE_ROOT`.
    Fs,
    /// `GET` / `PUT` against `TB_REMOTE_URL`.
    Http,
    /// S3 bucket `TB_BUCKET`, credentials from the `AWS_*` environment.
    S3,
}

/// Remote key set settings.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub backend: RemoteBackend,
    pub bucket: Option<String>,
    pub key_path: String,
    pub root: PathBuf,
    pub url: Option<Url>,
    pub timeout: Duration,
}

impl RemoteConfig {
    pub fn location(&self) -> ObjectLocation {
        ObjectLocation::new(self.bucket.clone(), self.key_path.clone())
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            backend: RemoteBackend::Fs,
            bucket: None,
            key_path: DEFAULT_KEY_SET_PATH.to_string(),
            root: PathBuf::from(DEFAULT_REMOTE_ROOT),
            url: None,
            timeout: Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
        }
    }
}

/// Listener a `server start` invocation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Component {
    Issuer,
    Admin,
}

/// Listener addresses.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub issuer_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub components: Vec<Component>,
}

impl ServerConfig {
    pub fn runs(&self, component: Component) -> bool {
        self.components.contains(&component)
    }
}

/// Logging output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// CLI result rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let keys = KeysConfig::default();
        assert_eq!(keys.dir, PathBuf::from("keys"));
        assert_eq!(keys.prefix, "tb");
        assert_eq!(keys.key_size, 2048);

        let issuer = IssuerConfig::default();
        assert_eq!(issuer.issuer, "tailbone");
        assert_eq!(issuer.expiry, Duration::from_secs(1200));
    }

    #[test]
    fn remote_location_requires_bucket() {
        let mut remote = RemoteConfig::default();
        assert!(remote.location().resolve().is_err());

        remote.bucket = Some("keys-bucket".to_string());
        let coordinate = remote.location().resolve().unwrap();
        assert_eq!(coordinate.to_string(), "keys-bucket/.well-known/jwks.json");
    }

    #[test]
    fn server_config_reports_components() {
        let config = ServerConfig {
            issuer_addr: "127.0.0.1:8080".parse().unwrap(),
            admin_addr: "127.0.0.1:50051".parse().unwrap(),
            components: vec![Component::Issuer],
        };
        assert!(config.runs(Component::Issuer));
        assert!(!config.runs(Component::Admin));
    }
}
