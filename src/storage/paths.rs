// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the local key directory.

use std::path::{Path, PathBuf};

use crate::keys::{KeyError, KeyKind, KeyResult};

/// Default key directory, relative to the working directory.
pub const DEFAULT_KEYS_DIR: &str = "keys";

/// File suffix for public key files.
pub const PUBLIC_KEY_SUFFIX: &str = ".public.jwk";

/// File suffix for private key files.
pub const PRIVATE_KEY_SUFFIX: &str = ".private.jwk";

/// Path utilities for the key directory.
///
/// ```text
/// {root}/
///   {kid}.public.jwk    # 0644, public JWK
///   {kid}.private.jwk   # 0600, private JWK (never leaves this directory)
/// ```
#[derive(Debug, Clone)]
pub struct KeyPaths {
    root: PathBuf,
}

impl Default for KeyPaths {
    fn default() -> Self {
        Self::new(DEFAULT_KEYS_DIR)
    }
}

impl KeyPaths {
    /// Create a new KeyPaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Directory holding all key files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the public key file of `kid`.
    pub fn public_key(&self, kid: &str) -> KeyResult<PathBuf> {
        let kid = checked_file_component(kid)?;
        Ok(self.root.join(format!("{kid}{PUBLIC_KEY_SUFFIX}")))
    }

    /// Path to the private key file of `kid`.
    pub fn private_key(&self, kid: &str) -> KeyResult<PathBuf> {
        let kid = checked_file_component(kid)?;
        Ok(self.root.join(format!("{kid}{PRIVATE_KEY_SUFFIX}")))
    }

    pub fn key_file(&self, kid: &str, kind: KeyKind) -> KeyResult<PathBuf> {
        match kind {
            KeyKind::Public => self.public_key(kid),
            KeyKind::Private => self.private_key(kid),
        }
    }
}

/// Split a key file name into its identifier and kind.
///
/// Returns `None` for anything that is not a recognized key file.
pub fn classify_file_name(name: &str) -> Option<(&str, KeyKind)> {
    let (kid, kind) = if let Some(kid) = name.strip_suffix(PUBLIC_KEY_SUFFIX) {
        (kid, KeyKind::Public)
    } else if let Some(kid) = name.strip_suffix(PRIVATE_KEY_SUFFIX) {
        (kid, KeyKind::Private)
    } else {
        return None;
    };
    checked_file_component(kid).ok().map(|kid| (kid, kind))
}

/// Identifiers become file names: one path component, no hidden files.
pub fn checked_file_component(kid: &str) -> KeyResult<&str> {
    let valid = !kid.is_empty()
        && !kid.starts_with('.')
        && !kid.contains(['/', '\\', '\0'])
        && kid.len() <= 200;
    if valid {
        Ok(kid)
    } else {
        Err(KeyError::Validation(format!(
            "key id {kid:?} cannot be used as a file name"
        )))
    }
}
