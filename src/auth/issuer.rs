// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token issuance and verification.
//!
//! ## Active key
//!
//! The signing key is the private key file whose identifier carries the
//! greatest creation timestamp (ties broken by the identifier string). The
//! directory is re-scanned for every token, so a key generated by the admin
//! listener is used from the next request on. Files whose identifier does
//! not parse are skipped with a warning; when the newest key cannot be
//! loaded the next older one is tried.
//!
//! ## Tokens
//!
//! RS256 (or whatever `alg` the key carries), `kid` in the header, claims
//! `iss`, `sub`, `iat`, `nbf`, `exp` plus `user` and `display_name`.

use chrono::Utc;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::error::AuthError;
use crate::config::IssuerConfig;
use crate::keys::{jwk, KeyId, KeySet};
use crate::storage::LocalKeyStore;

/// Claims carried by issued tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TokenClaims {
    pub iss: String,
    /// Login of the caller.
    pub sub: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub user: String,
    pub display_name: String,
}

/// Identifiers ordered newest first. Unparseable identifiers are dropped.
pub fn candidate_keys<'a>(ids: impl IntoIterator<Item = &'a str>) -> Vec<KeyId> {
    let mut candidates: Vec<KeyId> = ids
        .into_iter()
        .filter_map(|kid| match KeyId::parse(kid) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(kid = %kid, error = %e, "Ignoring key with unparseable identifier");
                None
            }
        })
        .collect();
    candidates.sort_by(|a, b| b.cmp(a));
    candidates
}

/// The identifier that should sign, independent of listing order.
pub fn select_active_key<'a>(ids: impl IntoIterator<Item = &'a str>) -> Option<KeyId> {
    candidate_keys(ids).into_iter().next()
}

/// Loaded signing key.
struct SigningKey {
    id: KeyId,
    algorithm: Algorithm,
    key: EncodingKey,
}

pub struct Issuer {
    config: IssuerConfig,
    store: LocalKeyStore,
}

impl Issuer {
    pub fn new(config: IssuerConfig, store: LocalKeyStore) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    fn signing_key(&self) -> Result<SigningKey, AuthError> {
        let ids = self.store.private_key_ids()?;
        for id in candidate_keys(ids.iter().map(String::as_str)) {
            let loaded = self.store.load_private(id.as_str()).and_then(|record| {
                Ok((jwk::signing_algorithm(&record)?, jwk::encoding_key(&record)?))
            });
            match loaded {
                Ok((algorithm, key)) => return Ok(SigningKey { id, algorithm, key }),
                Err(e) => warn!(kid = %id, error = %e, "Skipping unusable signing key"),
            }
        }
        Err(AuthError::NoKeyAvailable)
    }

    /// Identifier of the key the next token will be signed with.
    pub fn active_key(&self) -> Result<KeyId, AuthError> {
        self.signing_key().map(|k| k.id)
    }

    /// Sign a token for `subject` with the active key.
    pub fn issue_token(&self, subject: &str, display_name: &str) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let expiry = i64::try_from(self.config.expiry.as_secs())
            .map_err(|_| AuthError::InternalError("token expiry out of range".to_string()))?;
        let claims = TokenClaims {
            iss: self.config.issuer.clone(),
            sub: subject.to_string(),
            iat: now,
            nbf: now,
            exp: now.saturating_add(expiry),
            user: subject.to_string(),
            display_name: display_name.to_string(),
        };

        let (token, kid) = self.sign(&claims)?;
        info!(user = %subject, kid = %kid, "Issued token");
        Ok(token)
    }

    fn sign(&self, claims: &TokenClaims) -> Result<(String, KeyId), AuthError> {
        let signing = self.signing_key()?;
        let mut header = Header::new(signing.algorithm);
        header.kid = Some(signing.id.to_string());

        let token = encode(&header, claims, &signing.key)
            .map_err(|e| AuthError::InternalError(format!("failed to sign token: {e}")))?;
        Ok((token, signing.id))
    }

    /// Public halves of every local key.
    pub fn public_key_set(&self) -> Result<KeySet, AuthError> {
        Ok(self.store.enumerate()?)
    }

    /// Verify `token` against the current local key set.
    pub fn verify_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let set = self.public_key_set()?;
        self.verify_token_with(token, &set)
    }

    /// Verify `token` against `set`.
    pub fn verify_token_with(&self, token: &str, set: &KeySet) -> Result<TokenClaims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;
        let kid = header.kid.ok_or(AuthError::MissingKeyId)?;
        let record = set
            .find(&kid)
            .ok_or_else(|| AuthError::UnknownKey(kid.clone()))?;

        let algorithm = jwk::signing_algorithm(record).map_err(|e| AuthError::InternalError(e.to_string()))?;
        let key = jwk::decoding_key(record).map_err(|e| AuthError::InternalError(e.to_string()))?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = self.config.leeway;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);

        let data = decode::<TokenClaims>(token, &key, &validation).map_err(AuthError::from_jwt)?;
        debug!(kid = %kid, user = %data.claims.user, "Verified token");
        Ok(data.claims)
    }
}
