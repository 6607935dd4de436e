// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Token Module
//!
//! Issues short-lived JWTs to callers authenticated by the network layer.
//!
//! ## Issue Flow
//!
//! 1. The authenticating proxy injects the caller's login and display name
//! 2. [`Identity`] resolves them through the configured [`IdentityResolver`]
//! 3. [`Issuer`] picks the newest local private key and signs the token
//! 4. Relying parties verify against the published JWKS using the `kid`
//!
//! ## Security
//!
//! - Private keys are read from the key directory and never served
//! - The active key is re-selected for every token
//! - Verification enforces `exp`, `nbf` and `iss`

pub mod error;
pub mod identity;
pub mod issuer;

pub use error::AuthError;
pub use identity::{HeaderIdentityResolver, Identity, IdentityResolver};
pub use issuer::{select_active_key, Issuer, TokenClaims};
