// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Caller identity for token issuance.
//!
//! The issuer listener sits behind an authenticating proxy (for example
//! `tailscale serve`) that injects the caller's login and display name as
//! request headers. Those headers are trusted as-is; the listener must not
//! be reachable except through the proxy.
//!
//! ```rust,ignore
//! async fn issue(identity: Identity, State(state): State<AppState>) -> ... {
//!     // identity.login, identity.display_name
//! }
//! ```

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, HeaderName},
};
use tracing::debug;

use super::AuthError;
use crate::state::AppState;

/// Header carrying the caller's login name.
pub const LOGIN_HEADER: &str = "tailscale-user-login";

/// Header carrying the caller's display name.
pub const DISPLAY_NAME_HEADER: &str = "tailscale-user-name";

/// Resolved caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub login: String,
    pub display_name: String,
}

/// Maps an inbound request to a caller identity.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Identity, AuthError>;
}

/// Reads the identity headers set by the authenticating proxy.
#[derive(Debug, Clone)]
pub struct HeaderIdentityResolver {
    login: HeaderName,
    display_name: HeaderName,
}

impl Default for HeaderIdentityResolver {
    fn default() -> Self {
        Self {
            login: HeaderName::from_static(LOGIN_HEADER),
            display_name: HeaderName::from_static(DISPLAY_NAME_HEADER),
        }
    }
}

impl HeaderIdentityResolver {
    pub fn new(login: HeaderName, display_name: HeaderName) -> Self {
        Self { login, display_name }
    }
}

fn header_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

#[async_trait]
impl IdentityResolver for HeaderIdentityResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let login = header_value(headers, &self.login).ok_or(AuthError::UnresolvedIdentity)?;
        let display_name = header_value(headers, &self.display_name).unwrap_or_else(|| login.clone());
        debug!(login = %login, "Resolved caller identity");
        Ok(Identity { login, display_name })
    }
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>().cloned() {
            return Ok(identity);
        }
        state.identity.resolve(&parts.headers).await
    }
}
