// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Data Model
//!
//! Value types for signing keys. A [`KeyRecord`] wraps the public
//! [`Jwk`]; serialization and the private RSA members live in
//! [`super::jwk`].
//!
//! ## Identifiers
//!
//! A [`KeyId`] has the shape `{prefix}-{unixSeconds}`. The embedded
//! timestamp is the creation time of the key and the only ordering used to
//! pick the active signing key. Ties on the timestamp are broken by the
//! identifier string.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, KeyAlgorithm};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::{KeyError, KeyResult};

/// Default identifier prefix.
///
/// Changing the prefix of a running deployment leaves the old keys behind
/// until housekeeping removes them.
pub const DEFAULT_KEY_PREFIX: &str = "tb";

/// Algorithm assigned to every generated key.
pub const SIGNING_ALGORITHM: &str = "RS256";

// =============================================================================
// Key Identifier
// =============================================================================

/// Key identifier (`kid`) embedding the creation timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyId {
    raw: String,
    created_at: i64,
}

impl KeyId {
    /// Build an identifier from a prefix and a creation time in unix seconds.
    pub fn new(prefix: &str, created_at: i64) -> KeyResult<Self> {
        validate_prefix(prefix)?;
        if created_at < 0 {
            return Err(KeyError::Validation(format!(
                "key creation time must not be negative, got {created_at}"
            )));
        }
        Ok(Self {
            raw: format!("{prefix}-{created_at}"),
            created_at,
        })
    }

    /// Parse an identifier, rejecting anything without a numeric timestamp.
    pub fn parse(raw: &str) -> KeyResult<Self> {
        let (prefix, timestamp) = raw.rsplit_once('-').ok_or_else(|| {
            KeyError::Validation(format!("key id {raw:?} has no timestamp segment"))
        })?;

        if prefix.is_empty() {
            return Err(KeyError::Validation(format!("key id {raw:?} has no prefix")));
        }
        if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
            return Err(KeyError::Validation(format!(
                "key id {raw:?} has a non-numeric timestamp"
            )));
        }

        let created_at = timestamp.parse::<i64>().map_err(|e| {
            KeyError::Validation(format!("key id {raw:?} has an invalid timestamp: {e}"))
        })?;

        Ok(Self {
            raw: raw.to_string(),
            created_at,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Creation time in unix seconds.
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.created_at, 0)
    }

    pub fn prefix(&self) -> &str {
        // parse() and new() both guarantee a '-' separator
        self.raw
            .rsplit_once('-')
            .map(|(prefix, _)| prefix)
            .unwrap_or(&self.raw)
    }
}

impl Ord for KeyId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for KeyId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for KeyId {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyId::parse(s)
    }
}

/// Prefixes end up in file names, so keep them to a portable alphabet.
pub fn validate_prefix(prefix: &str) -> KeyResult<()> {
    if prefix.is_empty() {
        return Err(KeyError::Validation("key prefix must not be empty".to_string()));
    }
    if !prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(KeyError::Validation(format!(
            "key prefix {prefix:?} may only contain ASCII letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}

// =============================================================================
// Key Records
// =============================================================================

/// Which half of a key pair a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Public,
    Private,
}

/// Private RSA parameters, big-endian unsigned integers.
#[derive(Clone, PartialEq, Eq)]
pub struct RsaPrivateParts {
    pub d: Vec<u8>,
    pub p: Vec<u8>,
    pub q: Vec<u8>,
    pub dp: Vec<u8>,
    pub dq: Vec<u8>,
    pub qi: Vec<u8>,
}

impl fmt::Debug for RsaPrivateParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RsaPrivateParts { .. }")
    }
}

/// A single key: its public JWK and, for private halves, the RSA private
/// parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRecord {
    pub jwk: Jwk,
    pub private: Option<RsaPrivateParts>,
}

impl KeyRecord {
    pub fn public(jwk: Jwk) -> Self {
        Self { jwk, private: None }
    }

    pub fn kid(&self) -> Option<&str> {
        self.jwk.common.key_id.as_deref()
    }

    pub fn set_kid(&mut self, kid: Option<String>) {
        self.jwk.common.key_id = kid;
    }

    pub fn algorithm(&self) -> Option<KeyAlgorithm> {
        self.jwk.common.key_algorithm
    }

    /// Symmetric (`oct`) keys count as private: their only parameter is the
    /// secret.
    pub fn kind(&self) -> KeyKind {
        if self.private.is_some() || matches!(self.jwk.algorithm, AlgorithmParameters::OctetKey(_)) {
            KeyKind::Private
        } else {
            KeyKind::Public
        }
    }

    /// Copy of this record without the private parameters.
    pub fn to_public(&self) -> KeyRecord {
        KeyRecord::public(self.jwk.clone())
    }

    /// Parse the identifier for ordering purposes.
    pub fn key_id(&self) -> KeyResult<KeyId> {
        let kid = self
            .kid()
            .ok_or_else(|| KeyError::Validation("key has no identifier".to_string()))?;
        KeyId::parse(kid)
    }

    pub fn info(&self) -> KeyInfo {
        let key_id = self.kid().unwrap_or_default().to_string();
        let created_at = KeyId::parse(&key_id)
            .map(|id| id.created_at())
            .unwrap_or(0);
        KeyInfo {
            key_id,
            algorithm: self.algorithm().map(|a| a.to_string()).unwrap_or_default(),
            created_at,
        }
    }
}

// =============================================================================
// Key Pair
// =============================================================================

/// A freshly generated key pair.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub id: KeyId,
    pub algorithm: String,
    pub private: KeyRecord,
    pub public: KeyRecord,
}

impl KeyPair {
    pub fn info(&self) -> KeyInfo {
        KeyInfo {
            key_id: self.id.to_string(),
            algorithm: self.algorithm.clone(),
            created_at: self.id.created_at(),
        }
    }
}

// =============================================================================
// Key Set
// =============================================================================

/// Ordered collection of keys with unique identifiers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeySet {
    keys: Vec<KeyRecord>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from records; later duplicates replace earlier ones.
    pub fn from_records(records: impl IntoIterator<Item = KeyRecord>) -> Self {
        let mut set = Self::new();
        for record in records {
            set.upsert(record);
        }
        set
    }

    pub fn keys(&self) -> &[KeyRecord] {
        &self.keys
    }

    pub fn into_keys(self) -> Vec<KeyRecord> {
        self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyRecord> {
        self.keys.iter()
    }

    pub fn find(&self, kid: &str) -> Option<&KeyRecord> {
        self.keys.iter().find(|k| k.kid() == Some(kid))
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.find(kid).is_some()
    }

    /// Insert or replace by identifier. Returns `true` when an existing
    /// entry was replaced. Records without an identifier are appended.
    pub fn upsert(&mut self, record: KeyRecord) -> bool {
        if let Some(kid) = record.kid() {
            if let Some(slot) = self.keys.iter_mut().find(|k| k.kid() == Some(kid)) {
                *slot = record;
                return true;
            }
        }
        self.keys.push(record);
        false
    }

    /// Drop the entry with the given identifier. Returns whether one existed.
    pub fn remove(&mut self, kid: &str) -> bool {
        let before = self.keys.len();
        self.keys.retain(|k| k.kid() != Some(kid));
        self.keys.len() != before
    }

    pub fn key_ids(&self) -> Vec<&str> {
        self.keys.iter().filter_map(KeyRecord::kid).collect()
    }

    pub fn infos(&self) -> Vec<KeyInfo> {
        self.keys.iter().map(KeyRecord::info).collect()
    }
}

impl IntoIterator for KeySet {
    type Item = KeyRecord;
    type IntoIter = std::vec::IntoIter<KeyRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.into_iter()
    }
}

// =============================================================================
// Transport Shape
// =============================================================================

/// Key summary returned by the administrative operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct KeyInfo {
    /// Key identifier (`kid`).
    pub key_id: String,
    /// JWS algorithm, e.g. `RS256`.
    pub algorithm: String,
    /// Creation time parsed from the identifier (unix seconds, 0 if unknown).
    ///
    /// Keys generated in a burst get consecutive seconds, so this may lie a
    /// few seconds past the wall clock at generation.
    pub created_at: i64,
}

impl KeyInfo {
    pub fn created_at_rfc3339(&self) -> String {
        DateTime::<Utc>::from_timestamp(self.created_at, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default()
    }
}
