// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tailbone - JWT issuer with a signing key lifecycle
//!
//! Issues short-lived RS256 tokens to clients whose identity is asserted by
//! a trusted network proxy, and keeps a local directory of signing keys
//! consistent with a JWKS document published in an object store.
//!
//! ## Modules
//!
//! - `keys` - Key model, JWK codec, key manager and housekeeper
//! - `storage` - Local key directory and remote key set backends
//! - `auth` - Token issuer and caller identity
//! - `api` - HTTP handlers for the issuer and admin listeners (Axum)
//! - `cli` / `client` - Command line interface and admin HTTP client

pub mod api;
pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod keys;
pub mod logging;
pub mod state;
pub mod storage;

#[cfg(test)]
mod testutil;
