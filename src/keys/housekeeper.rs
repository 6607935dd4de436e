// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! One-shot reconciliation of the local key directory against the remote
//! key set.
//!
//! The remote set is the source of truth: a local key whose identifier is
//! not published is deleted, both halves. Nothing is ever uploaded. When
//! the remote document does not exist, every local key is orphaned.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::error::KeyResult;
use super::manager::KeyManager;

/// Counts from one housekeeping pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HousekeepingReport {
    /// Keys found locally before the pass.
    pub local_keys: usize,
    /// Keys in the remote set.
    pub remote_keys: usize,
    /// Local keys deleted because they were not published.
    pub deleted_keys: usize,
}

pub struct Housekeeper {
    manager: Arc<KeyManager>,
}

impl Housekeeper {
    pub fn new(manager: Arc<KeyManager>) -> Self {
        Self { manager }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> KeyResult<HousekeepingReport> {
        let coordinate = self.manager.resolve_coordinate()?;
        info!(coordinate = %coordinate, "Starting housekeeping");

        // Key generation persists under this lock, so a key that exists
        // locally but not remotely really is orphaned.
        let _guard = self.manager.lock(&coordinate, cancel).await?;

        let local = self.manager.local().enumerate()?;
        let remote = self.manager.download_or_empty(&coordinate, cancel).await?;

        let mut deleted_keys = 0;
        for kid in local.key_ids() {
            if remote.contains(kid) {
                continue;
            }
            info!(kid = %kid, "Key missing from remote set, deleting local copy");
            match self.manager.local().delete(kid) {
                Ok(()) => deleted_keys += 1,
                Err(e) => {
                    warn!(kid = %kid, error = %e, "Failed to delete orphaned key");
                    return Err(e);
                }
            }
        }

        let report = HousekeepingReport {
            local_keys: local.len(),
            remote_keys: remote.len(),
            deleted_keys,
        };
        info!(
            local_keys = report.local_keys,
            remote_keys = report.remote_keys,
            deleted_keys = report.deleted_keys,
            "Housekeeping finished"
        );
        Ok(report)
    }

    /// Run a pass every `interval` until `shutdown` is cancelled. A failed
    /// pass is logged and retried on the next tick.
    pub async fn run_every(&self, interval: Duration, shutdown: CancellationToken) {
        info!(interval_secs = interval.as_secs(), "Periodic housekeeping starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if let Err(e) = self.run(&shutdown).await {
                warn!(error = %e, "Housekeeping pass failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {},
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Periodic housekeeping shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{jwk, KeySet};
    use crate::storage::RemoteKeySetStore;
    use crate::testutil;

    #[tokio::test]
    async fn deletes_local_keys_missing_remotely() {
        let (_dir, manager, remote) = testutil::manager();
        let a = testutil::key_pair("tb", 100);
        let b = testutil::key_pair("tb", 200);
        manager.persist_locally(&a).unwrap();
        manager.persist_locally(&b).unwrap();

        let coordinate = remote.resolve_coordinate().unwrap();
        let published = KeySet::from_records([a.public.clone()]);
        remote
            .put_object(&coordinate, jwk::serialize_key_set(&published).unwrap())
            .await;

        let report = Housekeeper::new(manager.clone())
            .run(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            report,
            HousekeepingReport {
                local_keys: 2,
                remote_keys: 1,
                deleted_keys: 1,
            }
        );
        assert_eq!(manager.local().enumerate().unwrap().key_ids(), vec!["tb-100"]);
        assert!(!manager.local().paths().private_key("tb-200").unwrap().exists());
        // Housekeeping never writes to the remote side.
        assert_eq!(
            jwk::parse_key_set(&remote.get_object(&coordinate).await.unwrap()).unwrap(),
            published
        );
    }

    #[tokio::test]
    async fn missing_remote_document_orphans_everything() {
        let (_dir, manager, remote) = testutil::manager();
        manager.persist_locally(&testutil::key_pair("tb", 1)).unwrap();
        manager.persist_locally(&testutil::key_pair("tb", 2)).unwrap();

        let report = Housekeeper::new(manager.clone())
            .run(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.local_keys, 2);
        assert_eq!(report.remote_keys, 0);
        assert_eq!(report.deleted_keys, 2);
        assert!(manager.local().enumerate().unwrap().is_empty());
        let coordinate = remote.resolve_coordinate().unwrap();
        assert!(remote.get_object(&coordinate).await.is_none());
    }

    #[tokio::test]
    async fn consistent_stores_delete_nothing() {
        let (_dir, manager, _remote) = testutil::manager();
        let cancel = CancellationToken::new();
        let info = manager.generate_and_publish(None, &cancel).await.unwrap();

        let report = Housekeeper::new(manager.clone()).run(&cancel).await.unwrap();
        assert_eq!(report.deleted_keys, 0);
        assert_eq!(manager.local().private_key_ids().unwrap(), vec![info.key_id]);
    }

    #[tokio::test]
    async fn malformed_remote_document_deletes_nothing() {
        let (_dir, manager, remote) = testutil::manager();
        manager.persist_locally(&testutil::key_pair("tb", 1)).unwrap();
        let coordinate = remote.resolve_coordinate().unwrap();
        remote.put_object(&coordinate, b"{\"keys\":".to_vec()).await;

        assert!(Housekeeper::new(manager.clone())
            .run(&CancellationToken::new())
            .await
            .is_err());
        assert_eq!(manager.local().private_key_ids().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn periodic_run_stops_on_shutdown() {
        let (_dir, manager, _remote) = testutil::manager();
        manager.persist_locally(&testutil::key_pair("tb", 100)).unwrap();
        let housekeeper = Arc::new(Housekeeper::new(manager.clone()));
        let shutdown = CancellationToken::new();

        let task = tokio::spawn({
            let housekeeper = housekeeper.clone();
            let shutdown = shutdown.clone();
            async move { housekeeper.run_every(Duration::from_secs(3600), shutdown).await }
        });

        // The first pass runs immediately and removes the unpublished key.
        for _ in 0..100 {
            if manager.local().private_key_ids().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(manager.local().private_key_ids().unwrap().is_empty());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("loop exits after cancel")
            .unwrap();
    }
}
