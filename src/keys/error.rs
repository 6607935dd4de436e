// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Errors raised by the key lifecycle engine.
//!
//! | Variant      | Raised when                                   | Recovery           |
//! |--------------|-----------------------------------------------|--------------------|
//! | `Validation` | bad key size, malformed identifier            | never retried      |
//! | `NotFound`   | remote document or local file absent          | absorbed on reads  |
//! | `Storage`    | local or remote I/O failure                   | surfaced, aborted  |
//! | `Parse`      | malformed key file or key set document        | skipped on scans   |
//! | `Crypto`     | key material cannot be generated or converted | surfaced           |
//! | `TimedOut`   | remote call exceeded the operation timeout    | surfaced           |
//! | `Cancelled`  | caller cancelled the operation                | surfaced           |

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::storage::RemoteError;

/// Error type for key lifecycle operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("key material error: {0}")]
    Crypto(String),

    #[error("operation on {target} timed out after {after:?}")]
    TimedOut { target: String, after: Duration },

    #[error("operation on {0} was cancelled")]
    Cancelled(String),
}

impl KeyError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, err: std::io::Error) -> Self {
        let path = path.as_ref().display();
        if err.kind() == std::io::ErrorKind::NotFound {
            KeyError::NotFound(format!("{path}: {err}"))
        } else {
            KeyError::Storage(format!("{path}: {err}"))
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, KeyError::NotFound(_))
    }
}

impl From<RemoteError> for KeyError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(coordinate) => {
                KeyError::NotFound(format!("key set document at {coordinate}"))
            }
            RemoteError::Configuration(msg) => KeyError::Validation(msg),
            other @ RemoteError::Transport { .. } => KeyError::Storage(other.to_string()),
        }
    }
}

/// Result type for key lifecycle operations.
pub type KeyResult<T> = Result<T, KeyError>;
