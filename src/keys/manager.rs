// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Manager
//!
//! Generates key pairs and bridges the local key directory with the remote
//! key set document.
//!
//! ## Remote read-modify-write
//!
//! The remote store has no compare-and-swap, so every download → mutate →
//! upload sequence holds a process-wide async lock keyed by the document's
//! coordinate. Two administrative requests against the same document are
//! therefore applied one after the other and neither update is lost.
//! Housekeeping takes the same lock, and key generation persists its files
//! only once the lock is held, so housekeeping never sees a fresh local key
//! before it reaches the remote set.
//!
//! ## Bounded remote calls
//!
//! Each remote call races the caller's [`CancellationToken`] and the
//! configured operation timeout.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use chrono::Utc;
use rsa::RsaPrivateKey;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::{KeyError, KeyResult};
use super::jwk;
use super::model::{KeyId, KeyInfo, KeyKind, KeyPair, KeyRecord, KeySet, SIGNING_ALGORITHM};
use crate::config::KeysConfig;
use crate::storage::paths::checked_file_component;
use crate::storage::{Coordinate, LocalKeyStore, RemoteError, RemoteKeySetStore};

/// RSA modulus sizes accepted for new keys.
pub const SUPPORTED_KEY_SIZES: [usize; 3] = [2048, 3072, 4096];

// =============================================================================
// Coordinate Locks
// =============================================================================

/// One async mutex per remote coordinate, shared by every manager in the
/// process.
#[derive(Default)]
struct CoordinateLocks {
    locks: Mutex<HashMap<Coordinate, Arc<tokio::sync::Mutex<()>>>>,
}

impl CoordinateLocks {
    fn get(&self, coordinate: &Coordinate) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(coordinate.clone()).or_default().clone()
    }
}

static COORDINATE_LOCKS: LazyLock<CoordinateLocks> = LazyLock::new(CoordinateLocks::default);

// =============================================================================
// Pure Set Operations
// =============================================================================

/// Upsert a public key into a set, replacing any entry with the same
/// identifier.
pub fn merge_into_key_set(mut set: KeySet, public: KeyRecord) -> KeyResult<KeySet> {
    let kid = public
        .kid()
        .ok_or_else(|| KeyError::Validation("cannot publish a key without identifier".to_string()))?
        .to_string();
    if public.kind() != KeyKind::Public {
        return Err(KeyError::Validation(format!(
            "refusing to publish the private half of {kid}"
        )));
    }

    if set.upsert(public) {
        debug!(kid = %kid, "Replaced existing key in key set");
    } else {
        debug!(kid = %kid, "Appended key to key set");
    }
    Ok(set)
}

/// Drop `kid` from a set. An absent identifier is not an error.
pub fn remove_from_key_set(mut set: KeySet, kid: &str) -> (KeySet, bool) {
    let removed = set.remove(kid);
    (set, removed)
}

// =============================================================================
// Key Manager
// =============================================================================

pub struct KeyManager {
    config: KeysConfig,
    local: LocalKeyStore,
    remote: Arc<dyn RemoteKeySetStore>,
    /// Last timestamp handed out in an identifier.
    last_issued: AtomicI64,
}

impl KeyManager {
    pub fn new(config: KeysConfig, local: LocalKeyStore, remote: Arc<dyn RemoteKeySetStore>) -> Self {
        let last_issued = match local.private_key_ids() {
            Ok(ids) => ids
                .iter()
                .filter_map(|kid| KeyId::parse(kid).ok())
                .map(|id| id.created_at())
                .max()
                .unwrap_or(0),
            Err(e) => {
                warn!(error = %e, "Could not scan local keys; identifiers start from the clock");
                0
            }
        };

        Self {
            config,
            local,
            remote,
            last_issued: AtomicI64::new(last_issued),
        }
    }

    pub fn config(&self) -> &KeysConfig {
        &self.config
    }

    pub fn local(&self) -> &LocalKeyStore {
        &self.local
    }

    pub fn remote(&self) -> &Arc<dyn RemoteKeySetStore> {
        &self.remote
    }

    /// Next identifier: the current second, or one past the last identifier
    /// issued by this process when the clock has not moved on.
    ///
    /// A burst of N generations within one second therefore stamps keys up to
    /// N - 1 seconds ahead of the clock. The identifier is the only record of
    /// creation time, so [`KeyInfo::created_at`] reports the same value.
    fn next_key_id(&self) -> KeyResult<KeyId> {
        let now = Utc::now().timestamp();
        let (Ok(previous) | Err(previous)) =
            self.last_issued
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)));
        KeyId::new(&self.config.prefix, now.max(previous + 1))
    }

    // ========== Local ==========

    /// Generate an RSA key pair of `bits` with a fresh identifier.
    pub async fn generate_key_pair(&self, bits: usize) -> KeyResult<KeyPair> {
        if !SUPPORTED_KEY_SIZES.contains(&bits) {
            return Err(KeyError::Validation(format!(
                "unsupported key size {bits}, expected one of {SUPPORTED_KEY_SIZES:?}"
            )));
        }
        let id = self.next_key_id()?;

        let key = tokio::task::spawn_blocking(move || {
            let mut key = RsaPrivateKey::new(&mut rand::thread_rng(), bits)?;
            key.precompute()?;
            Ok::<_, rsa::Error>(key)
        })
        .await
        .map_err(|e| KeyError::Crypto(format!("key generation task failed: {e}")))?
        .map_err(|e| KeyError::Crypto(format!("failed to generate RSA key: {e}")))?;

        let private = jwk::rsa_private_record(&key, &id, SIGNING_ALGORITHM)?;
        let public = private.to_public();

        info!(kid = %id, bits, "Generated key pair");
        Ok(KeyPair {
            id,
            algorithm: SIGNING_ALGORITHM.to_string(),
            private,
            public,
        })
    }

    /// Write both halves of `pair` to the key directory.
    pub fn persist_locally(&self, pair: &KeyPair) -> KeyResult<()> {
        self.local.save_private(&pair.private)?;
        self.local
            .save_public(&KeySet::from_records([pair.public.clone()]))?;
        info!(kid = %pair.id, dir = %self.local.paths().root().display(), "Persisted key pair");
        Ok(())
    }

    pub fn list_local_keys(&self) -> KeyResult<Vec<KeyInfo>> {
        Ok(self.local.enumerate()?.infos())
    }

    // ========== Remote ==========

    pub fn resolve_coordinate(&self) -> KeyResult<Coordinate> {
        Ok(self.remote.resolve_coordinate()?)
    }

    /// Serialize read-modify-write cycles on `coordinate`.
    pub(crate) async fn lock(
        &self,
        coordinate: &Coordinate,
        cancel: &CancellationToken,
    ) -> KeyResult<OwnedMutexGuard<()>> {
        let lock = COORDINATE_LOCKS.get(coordinate);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(KeyError::Cancelled(coordinate.to_string())),
            guard = lock.lock_owned() => Ok(guard),
        }
    }

    async fn bounded<T, F>(&self, coordinate: &Coordinate, cancel: &CancellationToken, call: F) -> KeyResult<T>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        let after = self.config.operation_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(KeyError::Cancelled(coordinate.to_string())),
            result = tokio::time::timeout(after, call) => match result {
                Ok(result) => result.map_err(KeyError::from),
                Err(_) => Err(KeyError::TimedOut {
                    target: coordinate.to_string(),
                    after,
                }),
            },
        }
    }

    /// Fetch and parse the remote document. `NotFound` when there is none.
    pub async fn download_key_set(&self, coordinate: &Coordinate, cancel: &CancellationToken) -> KeyResult<KeySet> {
        let data = self
            .bounded(coordinate, cancel, self.remote.download(coordinate))
            .await?;
        let set = jwk::parse_key_set(&data)?;
        debug!(coordinate = %coordinate, total_keys = set.len(), "Downloaded key set");
        Ok(set)
    }

    /// Like [`Self::download_key_set`], treating a missing document as empty.
    pub async fn download_or_empty(&self, coordinate: &Coordinate, cancel: &CancellationToken) -> KeyResult<KeySet> {
        match self.download_key_set(coordinate, cancel).await {
            Err(e) if e.is_not_found() => {
                info!(coordinate = %coordinate, "No remote key set yet, starting empty");
                Ok(KeySet::new())
            }
            other => other,
        }
    }

    /// Replace the remote document with `set`.
    pub async fn upload_key_set(
        &self,
        set: &KeySet,
        coordinate: &Coordinate,
        cancel: &CancellationToken,
    ) -> KeyResult<()> {
        let data = jwk::serialize_key_set(set)?;
        self.bounded(coordinate, cancel, self.remote.upload(coordinate, data))
            .await?;
        info!(coordinate = %coordinate, total_keys = set.len(), "Uploaded key set");
        Ok(())
    }

    pub async fn list_remote_keys(&self, cancel: &CancellationToken) -> KeyResult<Vec<KeyInfo>> {
        let coordinate = self.resolve_coordinate()?;
        Ok(self.download_or_empty(&coordinate, cancel).await?.infos())
    }

    // ========== Composites ==========

    /// Generate a key pair, store it locally and add its public half to the
    /// remote set. `bits` defaults to the configured key size.
    ///
    /// On failure after the files were written they are removed again, so
    /// the issuer never picks up a key that relying parties cannot see.
    pub async fn generate_and_publish(&self, bits: Option<usize>, cancel: &CancellationToken) -> KeyResult<KeyInfo> {
        let bits = bits.unwrap_or(self.config.key_size);
        let coordinate = self.resolve_coordinate()?;
        let pair = self.generate_key_pair(bits).await?;

        let _guard = self.lock(&coordinate, cancel).await?;
        self.persist_locally(&pair)?;

        if let Err(e) = self.publish(&coordinate, pair.public.clone(), cancel).await {
            warn!(kid = %pair.id, error = %e, "Publishing failed, discarding local key pair");
            if let Err(cleanup) = self.local.delete(pair.id.as_str()) {
                warn!(kid = %pair.id, error = %cleanup, "Failed to discard local key pair");
            }
            return Err(e);
        }

        info!(kid = %pair.id, coordinate = %coordinate, "Generated and published key");
        Ok(pair.info())
    }

    /// Upsert an existing local public key into the remote set.
    pub async fn publish_local_key(&self, kid: &str, cancel: &CancellationToken) -> KeyResult<KeyInfo> {
        let coordinate = self.resolve_coordinate()?;
        let public = self.local.load_public(kid)?;
        let info = public.info();

        let _guard = self.lock(&coordinate, cancel).await?;
        self.publish(&coordinate, public, cancel).await?;

        info!(kid = %kid, coordinate = %coordinate, "Published local key");
        Ok(info)
    }

    /// Download, merge and upload. Caller holds the coordinate lock.
    async fn publish(&self, coordinate: &Coordinate, public: KeyRecord, cancel: &CancellationToken) -> KeyResult<()> {
        let set = self.download_or_empty(coordinate, cancel).await?;
        let set = merge_into_key_set(set, public)?;
        self.upload_key_set(&set, coordinate, cancel).await
    }

    /// Remove `kid` from the remote set and delete its local files.
    /// Returns the keys left in the remote set.
    pub async fn remove_and_republish(&self, kid: &str, cancel: &CancellationToken) -> KeyResult<Vec<KeyInfo>> {
        checked_file_component(kid)?;
        let coordinate = self.resolve_coordinate()?;

        let remaining = {
            let _guard = self.lock(&coordinate, cancel).await?;
            let set = self.download_or_empty(&coordinate, cancel).await?;
            let (set, removed) = remove_from_key_set(set, kid);
            if removed {
                self.upload_key_set(&set, &coordinate, cancel).await?;
            } else {
                info!(kid = %kid, coordinate = %coordinate, "Key not in remote set, nothing to upload");
            }
            set
        };

        if let Err(e) = self.local.delete(kid) {
            error!(
                kid = %kid,
                coordinate = %coordinate,
                error = %e,
                "Key is no longer published but its local files remain; retrying the removal is safe"
            );
            return Err(e);
        }
        info!(kid = %kid, remaining_keys = remaining.len(), "Removed key");
        Ok(remaining.infos())
    }
}
