// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests.
//!
//! RSA generation is slow in debug builds, so fixtures share one 2048-bit
//! key and only vary the identifier.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use rsa::RsaPrivateKey;
use tempfile::TempDir;

use crate::auth::Issuer;
use crate::config::{IssuerConfig, KeysConfig};
use crate::keys::{jwk, KeyId, KeyManager, KeyPair, SIGNING_ALGORITHM};
use crate::state::AppState;
use crate::storage::{
    Coordinate, KeyPaths, LocalKeyStore, ObjectKeySetStore, ObjectLocation, RemoteError,
    RemoteKeySetStore, DEFAULT_KEY_SET_PATH,
};

fn shared_rsa_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        let mut key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("generate RSA key");
        key.precompute().expect("precompute CRT values");
        key
    })
}

/// Key pair with the given identifier built from the shared RSA key.
pub fn key_pair(prefix: &str, created_at: i64) -> KeyPair {
    let id = KeyId::new(prefix, created_at).expect("valid key id");
    let private = jwk::rsa_private_record(shared_rsa_key(), &id, SIGNING_ALGORITHM)
        .expect("build private record");
    KeyPair {
        public: private.to_public(),
        private,
        algorithm: SIGNING_ALGORITHM.to_string(),
        id,
    }
}

/// Local store rooted in a fresh temporary directory.
pub fn local_store() -> (TempDir, LocalKeyStore) {
    let dir = TempDir::new().expect("create temp dir");
    let store = LocalKeyStore::new(KeyPaths::new(dir.path().join("keys")));
    (dir, store)
}

pub fn keys_config(dir: &std::path::Path) -> KeysConfig {
    KeysConfig {
        dir: dir.to_path_buf(),
        prefix: "tb".to_string(),
        key_size: 2048,
        operation_timeout: Duration::from_secs(10),
    }
}

pub fn issuer_config() -> IssuerConfig {
    IssuerConfig {
        issuer: "tailbone-test".to_string(),
        expiry: Duration::from_secs(1200),
        leeway: 0,
    }
}

/// Key manager over a temp key directory and the given remote store.
pub fn manager_with_remote(remote: Arc<TestObjectStore>) -> (TempDir, Arc<KeyManager>) {
    let (dir, local) = local_store();
    let config = keys_config(local.paths().root());
    (dir, Arc::new(KeyManager::new(config, local, remote)))
}

/// Key manager over a temp key directory and an empty in-memory remote.
pub fn manager() -> (TempDir, Arc<KeyManager>, Arc<TestObjectStore>) {
    let remote = Arc::new(TestObjectStore::new(Some("test-bucket".to_string())));
    let (dir, manager) = manager_with_remote(remote.clone());
    (dir, manager, remote)
}

/// Application state whose issuer reads the manager's key directory.
pub fn app_state() -> (TempDir, AppState, Arc<TestObjectStore>) {
    let (dir, manager, remote) = manager();
    let issuer = Issuer::new(issuer_config(), manager.local().clone());
    (dir, AppState::new(manager, issuer), remote)
}

/// In-memory remote with injectable latency and upload failures.
///
/// Latency is applied after reading on download and before writing on
/// upload, which widens the read-modify-write window callers must guard.
pub struct TestObjectStore {
    inner: ObjectKeySetStore,
    latency: Option<Duration>,
    fail_uploads: AtomicBool,
}

impl TestObjectStore {
    pub fn new(container: Option<String>) -> Self {
        Self {
            inner: ObjectKeySetStore::in_memory(ObjectLocation::new(container, DEFAULT_KEY_SET_PATH)),
            latency: None,
            fail_uploads: AtomicBool::new(false),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Current bytes at `coordinate`, bypassing latency.
    pub async fn get_object(&self, coordinate: &Coordinate) -> Option<Vec<u8>> {
        self.inner.download(coordinate).await.ok()
    }

    /// Replace bytes at `coordinate`, bypassing latency and failure injection.
    pub async fn put_object(&self, coordinate: &Coordinate, data: Vec<u8>) {
        self.inner.upload(coordinate, data).await.expect("seed remote object");
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RemoteKeySetStore for TestObjectStore {
    async fn upload(&self, coordinate: &Coordinate, data: Vec<u8>) -> Result<(), RemoteError> {
        self.pause().await;
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(RemoteError::transport(coordinate, "upload rejected"));
        }
        self.inner.upload(coordinate, data).await
    }

    async fn download(&self, coordinate: &Coordinate) -> Result<Vec<u8>, RemoteError> {
        let result = self.inner.download(coordinate).await;
        self.pause().await;
        result
    }

    fn resolve_coordinate(&self) -> Result<Coordinate, RemoteError> {
        self.inner.resolve_coordinate()
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}
