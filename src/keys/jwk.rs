// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWK / JWKS adapter.
//!
//! Public key parameters and the published document use the JWK types from
//! `jsonwebtoken`. Only the RSA private members (`d`, `p`, `q`, `dp`, `dq`,
//! `qi`) are handled here, for the local private key files.
//!
//! The remote document is a [`JwkSet`], which has no private members: a
//! private parameter that slips into a record can never be published.

use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::jwk::{
    AlgorithmParameters, CommonParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse, RSAKeyParameters,
    RSAKeyType,
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey};
use serde::{Deserialize, Serialize};

use super::error::{KeyError, KeyResult};
use super::model::{KeyId, KeyRecord, KeySet, RsaPrivateParts};

/// One local key file: the public JWK plus optional RSA private members.
#[derive(Debug, Serialize, Deserialize)]
struct KeyFileDocument {
    #[serde(flatten)]
    jwk: Jwk,
    #[serde(flatten)]
    private: PrivateMembers,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PrivateMembers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    p: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    qi: Option<String>,
}

impl PrivateMembers {
    fn encode(parts: &RsaPrivateParts) -> Self {
        let b64 = |bytes: &[u8]| Some(URL_SAFE_NO_PAD.encode(bytes));
        Self {
            d: b64(&parts.d),
            p: b64(&parts.p),
            q: b64(&parts.q),
            dp: b64(&parts.dp),
            dq: b64(&parts.dq),
            qi: b64(&parts.qi),
        }
    }

    fn is_empty(&self) -> bool {
        [&self.d, &self.p, &self.q, &self.dp, &self.dq, &self.qi]
            .iter()
            .all(|m| m.is_none())
    }

    /// All six members or none; a partial set is a parse error.
    fn decode(self) -> KeyResult<Option<RsaPrivateParts>> {
        if self.is_empty() {
            return Ok(None);
        }
        let require = |member: &str, value: Option<String>| -> KeyResult<Vec<u8>> {
            let value =
                value.ok_or_else(|| KeyError::Parse(format!("RSA private JWK is missing {member:?}")))?;
            decode_integer(member, &value)
        };
        Ok(Some(RsaPrivateParts {
            d: require("d", self.d)?,
            p: require("p", self.p)?,
            q: require("q", self.q)?,
            dp: require("dp", self.dp)?,
            dq: require("dq", self.dq)?,
            qi: require("qi", self.qi)?,
        }))
    }
}

fn decode_integer(member: &str, value: &str) -> KeyResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| KeyError::Parse(format!("JWK member {member:?} is not base64url: {e}")))
}

/// RSA keys must carry decodable `n` and `e`; other key types pass as-is.
fn check_public_parameters(jwk: &Jwk) -> KeyResult<()> {
    if let AlgorithmParameters::RSA(rsa) = &jwk.algorithm {
        decode_integer("n", &rsa.n)?;
        decode_integer("e", &rsa.e)?;
    }
    Ok(())
}

// ========== Parsing ==========

/// Parse a single JWK document (a local key file).
pub fn parse_key(data: &[u8]) -> KeyResult<KeyRecord> {
    let document: KeyFileDocument = serde_json::from_slice(data)
        .map_err(|e| KeyError::Parse(format!("invalid JWK document: {e}")))?;
    check_public_parameters(&document.jwk)?;

    let private = document.private.decode()?;
    if private.is_some() && !matches!(document.jwk.algorithm, AlgorithmParameters::RSA(_)) {
        return Err(KeyError::Parse(
            "private parameters are only supported on RSA keys".to_string(),
        ));
    }
    Ok(KeyRecord {
        jwk: document.jwk,
        private,
    })
}

/// Parse a JWKS document (`{"keys": [...]}`).
///
/// Fails on the first entry that cannot be parsed: a set that is only
/// partially understood must never be republished.
pub fn parse_key_set(data: &[u8]) -> KeyResult<KeySet> {
    let document: JwkSet = serde_json::from_slice(data)
        .map_err(|e| KeyError::Parse(format!("invalid JWKS document: {e}")))?;

    for (index, jwk) in document.keys.iter().enumerate() {
        check_public_parameters(jwk).map_err(|e| KeyError::Parse(format!("JWKS entry {index}: {e}")))?;
    }
    Ok(KeySet::from_records(document.keys.into_iter().map(KeyRecord::public)))
}

// ========== Serialization ==========

/// Serialize a single key as a pretty-printed JWK (local key files).
pub fn serialize_key(record: &KeyRecord) -> KeyResult<Vec<u8>> {
    let document = KeyFileDocument {
        jwk: record.jwk.clone(),
        private: record
            .private
            .as_ref()
            .map(PrivateMembers::encode)
            .unwrap_or_default(),
    };
    serde_json::to_vec_pretty(&document)
        .map_err(|e| KeyError::Parse(format!("failed to serialize JWK: {e}")))
}

/// Serialize the public halves of a set as a compact JWKS document.
pub fn serialize_key_set(set: &KeySet) -> KeyResult<Vec<u8>> {
    let document = JwkSet {
        keys: set.iter().map(|record| record.jwk.clone()).collect(),
    };
    serde_json::to_vec(&document)
        .map_err(|e| KeyError::Parse(format!("failed to serialize JWKS: {e}")))
}

// ========== RSA Conversion ==========

/// Build a private [`KeyRecord`] from a generated RSA key.
pub fn rsa_private_record(key: &RsaPrivateKey, id: &KeyId, algorithm: &str) -> KeyResult<KeyRecord> {
    let [p, q] = key.primes() else {
        return Err(KeyError::Crypto(format!(
            "expected a two-prime RSA key, got {} primes",
            key.primes().len()
        )));
    };
    let missing = || KeyError::Crypto("RSA key has no precomputed CRT values".to_string());
    let dp = key.dp().ok_or_else(missing)?;
    let dq = key.dq().ok_or_else(missing)?;
    let qi = key.crt_coefficient().ok_or_else(missing)?;
    let key_algorithm = KeyAlgorithm::from_str(algorithm)
        .map_err(|e| KeyError::Crypto(format!("unknown key algorithm {algorithm:?}: {e}")))?;

    let jwk = Jwk {
        common: CommonParameters {
            public_key_use: Some(PublicKeyUse::Signature),
            key_algorithm: Some(key_algorithm),
            key_id: Some(id.to_string()),
            ..Default::default()
        },
        algorithm: AlgorithmParameters::RSA(RSAKeyParameters {
            key_type: RSAKeyType::RSA,
            n: URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
        }),
    };

    Ok(KeyRecord {
        jwk,
        private: Some(RsaPrivateParts {
            d: key.d().to_bytes_be(),
            p: p.to_bytes_be(),
            q: q.to_bytes_be(),
            dp: dp.to_bytes_be(),
            dq: dq.to_bytes_be(),
            qi: qi.to_bytes_be(),
        }),
    })
}

fn rsa_parameters(record: &KeyRecord) -> KeyResult<&RSAKeyParameters> {
    match &record.jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => Ok(rsa),
        _ => Err(KeyError::Crypto(format!(
            "key {:?} is not an RSA key",
            record.kid().unwrap_or_default()
        ))),
    }
}

/// JWS algorithm of a record, defaulting to RS256 for RSA keys.
pub fn signing_algorithm(record: &KeyRecord) -> KeyResult<Algorithm> {
    match record.algorithm() {
        None => Ok(Algorithm::RS256),
        Some(KeyAlgorithm::RS256) => Ok(Algorithm::RS256),
        Some(KeyAlgorithm::RS384) => Ok(Algorithm::RS384),
        Some(KeyAlgorithm::RS512) => Ok(Algorithm::RS512),
        Some(other) => Err(KeyError::Crypto(format!("unsupported signing algorithm {other}"))),
    }
}

/// Signing key for a private RSA record.
pub fn encoding_key(record: &KeyRecord) -> KeyResult<EncodingKey> {
    let rsa = rsa_parameters(record)?;
    let private = record.private.as_ref().ok_or_else(|| {
        KeyError::Crypto(format!(
            "key {:?} has no private half",
            record.kid().unwrap_or_default()
        ))
    })?;

    let key = RsaPrivateKey::from_components(
        BigUint::from_bytes_be(&decode_integer("n", &rsa.n)?),
        BigUint::from_bytes_be(&decode_integer("e", &rsa.e)?),
        BigUint::from_bytes_be(&private.d),
        vec![
            BigUint::from_bytes_be(&private.p),
            BigUint::from_bytes_be(&private.q),
        ],
    )
    .map_err(|e| KeyError::Crypto(format!("invalid RSA private key: {e}")))?;

    let der = key
        .to_pkcs1_der()
        .map_err(|e| KeyError::Crypto(format!("failed to encode RSA private key: {e}")))?;
    Ok(EncodingKey::from_rsa_der(der.as_bytes()))
}

/// Verification key for an RSA record (public or private).
pub fn decoding_key(record: &KeyRecord) -> KeyResult<DecodingKey> {
    rsa_parameters(record)?;
    DecodingKey::from_jwk(&record.jwk)
        .map_err(|e| KeyError::Crypto(format!("invalid RSA public key: {e}")))
}
