// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Signing Key Lifecycle
//!
//! - [`model`]: identifiers, key records and key sets
//! - [`jwk`]: JWK / JWKS wire format
//! - [`manager`]: generation and local ⇄ remote publication
//! - [`housekeeper`]: removal of local keys that are no longer published

pub mod error;
pub mod housekeeper;
pub mod jwk;
pub mod manager;
pub mod model;

pub use error::{KeyError, KeyResult};
pub use housekeeper::{Housekeeper, HousekeepingReport};
pub use manager::{merge_into_key_set, remove_from_key_set, KeyManager, SUPPORTED_KEY_SIZES};
pub use model::{
    KeyId, KeyInfo, KeyKind, KeyPair, KeyRecord, KeySet, RsaPrivateParts, DEFAULT_KEY_PREFIX,
    SIGNING_ALGORITHM,
};
