// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::{HeaderIdentityResolver, IdentityResolver, Issuer};
use crate::keys::{Housekeeper, KeyManager};

/// Shared handles for both listeners.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<KeyManager>,
    pub issuer: Arc<Issuer>,
    pub housekeeper: Arc<Housekeeper>,
    pub identity: Arc<dyn IdentityResolver>,
    /// Cancelled on shutdown; handlers derive per-request tokens from it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(manager: Arc<KeyManager>, issuer: Issuer) -> Self {
        Self {
            housekeeper: Arc::new(Housekeeper::new(manager.clone())),
            manager,
            issuer: Arc::new(issuer),
            identity: Arc::new(HeaderIdentityResolver::default()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_identity_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.identity = resolver;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}
