// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token issuance and verification errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::keys::KeyError;

/// Error type for issuing and verifying tokens.
#[derive(Debug)]
pub enum AuthError {
    /// No usable private key in the key directory
    NoKeyAvailable,
    /// Token names a key that is not in the key set
    UnknownKey(String),
    /// Token header has no `kid`
    MissingKeyId,
    /// Token is malformed
    MalformedToken,
    /// Token signature is invalid
    InvalidSignature,
    /// Token has expired
    TokenExpired,
    /// Token is not yet valid
    TokenNotYetValid,
    /// Token issuer is invalid
    InvalidIssuer,
    /// Caller identity could not be established
    UnresolvedIdentity,
    /// Key directory could not be read
    KeyStore(String),
    /// Internal error
    InternalError(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::NoKeyAvailable => "no_key_available",
            AuthError::UnknownKey(_) => "unknown_key",
            AuthError::MissingKeyId => "missing_key_id",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::UnresolvedIdentity => "unresolved_identity",
            AuthError::KeyStore(_) => "key_store_error",
            AuthError::InternalError(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::UnknownKey(_)
            | AuthError::MissingKeyId
            | AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::TokenNotYetValid
            | AuthError::InvalidIssuer
            | AuthError::UnresolvedIdentity => StatusCode::UNAUTHORIZED,
            AuthError::NoKeyAvailable => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::KeyStore(_) | AuthError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub(crate) fn from_jwt(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            _ => AuthError::MalformedToken,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::NoKeyAvailable => write!(f, "No signing key is available"),
            AuthError::UnknownKey(kid) => write!(f, "Token was signed with unknown key {kid:?}"),
            AuthError::MissingKeyId => write!(f, "Token header has no key id"),
            AuthError::MalformedToken => write!(f, "Token is malformed"),
            AuthError::InvalidSignature => write!(f, "Token signature is invalid"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::TokenNotYetValid => write!(f, "Token is not yet valid"),
            AuthError::InvalidIssuer => write!(f, "Token issuer is invalid"),
            AuthError::UnresolvedIdentity => write!(f, "Caller identity could not be resolved"),
            AuthError::KeyStore(msg) => write!(f, "Failed to read signing keys: {msg}"),
            AuthError::InternalError(msg) => write!(f, "Internal token error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<KeyError> for AuthError {
    fn from(err: KeyError) -> Self {
        AuthError::KeyStore(err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
