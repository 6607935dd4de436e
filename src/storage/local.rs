// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Filesystem-backed key store.
//!
//! One pair of files per identifier inside a single directory; there is no
//! index file, enumeration is a directory scan. Writes go to a uniquely
//! named temp file first and are renamed into place, so readers never see
//! a half-written key.
//!
//! The store knows nothing about the remote key set.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::paths::{classify_file_name, KeyPaths};
use crate::keys::{jwk, KeyError, KeyKind, KeyRecord, KeyResult, KeySet};

/// Permissions of the key directory.
const DIR_MODE: u32 = 0o700;
/// Permissions of public key files.
const PUBLIC_FILE_MODE: u32 = 0o644;
/// Permissions of private key files.
const PRIVATE_FILE_MODE: u32 = 0o600;

/// A key file found during a directory scan.
#[derive(Debug, Clone)]
struct KeyFile {
    kid: String,
    kind: KeyKind,
    path: PathBuf,
}

/// Local key store over one directory.
#[derive(Debug, Clone)]
pub struct LocalKeyStore {
    paths: KeyPaths,
}

impl LocalKeyStore {
    pub fn new(paths: KeyPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &KeyPaths {
        &self.paths
    }

    /// Create the key directory if it does not exist yet.
    pub fn ensure_dir(&self) -> KeyResult<()> {
        let root = self.paths.root();
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(DIR_MODE);
        }
        builder.create(root).map_err(|e| KeyError::io(root, e))
    }

    /// Every key in the directory, as public halves.
    ///
    /// Public files are read first; a private file without a public sibling
    /// contributes its public projection. Files that fail to read or parse
    /// are logged and skipped.
    pub fn enumerate(&self) -> KeyResult<KeySet> {
        self.ensure_dir()?;

        let files = self.scan()?;
        let mut set = KeySet::new();

        let ordered = files
            .iter()
            .filter(|f| f.kind == KeyKind::Public)
            .chain(files.iter().filter(|f| f.kind == KeyKind::Private));

        for file in ordered {
            if file.kind == KeyKind::Private && set.contains(&file.kid) {
                continue;
            }
            match read_key_file(file) {
                Ok(record) => {
                    set.upsert(record.to_public());
                }
                Err(e) => {
                    warn!(file = %file.path.display(), error = %e, "Skipping unreadable key file");
                }
            }
        }

        info!(total_keys = set.len(), dir = %self.paths.root().display(), "Retrieved local key set");
        Ok(set)
    }

    /// Write one public key file per entry. Entries without an identifier
    /// are skipped. Returns the number of files written.
    pub fn save_public(&self, set: &KeySet) -> KeyResult<usize> {
        self.ensure_dir()?;

        let mut written = 0;
        for record in set.iter() {
            let Some(kid) = record.kid() else {
                warn!("Skipping key without identifier");
                continue;
            };
            let path = self.paths.public_key(kid)?;
            let data = jwk::serialize_key(&record.to_public())?;
            write_atomic(&path, &data, PUBLIC_FILE_MODE)?;
            debug!(kid = %kid, path = %path.display(), "Saved public key");
            written += 1;
        }

        info!(total_keys = written, "Saved public keys locally");
        Ok(written)
    }

    /// Write the private key file of a record (mode 0600).
    pub fn save_private(&self, record: &KeyRecord) -> KeyResult<PathBuf> {
        if record.kind() != KeyKind::Private {
            return Err(KeyError::Validation(
                "refusing to store a public key as a private key file".to_string(),
            ));
        }
        let kid = record
            .kid()
            .ok_or_else(|| KeyError::Validation("private key has no identifier".to_string()))?;

        self.ensure_dir()?;
        let path = self.paths.private_key(kid)?;
        let data = jwk::serialize_key(record)?;
        write_atomic(&path, &data, PRIVATE_FILE_MODE)?;
        debug!(kid = %kid, path = %path.display(), "Saved private key");
        Ok(path)
    }

    /// Remove both files of `kid`. Missing files are not an error.
    pub fn delete(&self, kid: &str) -> KeyResult<()> {
        let public = self.paths.public_key(kid)?;
        let private = self.paths.private_key(kid)?;

        info!(
            public_key = %public.display(),
            private_key = %private.display(),
            "Deleting local key pair"
        );
        remove_if_present(&public)?;
        remove_if_present(&private)?;

        info!(kid = %kid, "Deleted local key pair");
        Ok(())
    }

    /// Identifiers of every private key file, in file name order.
    pub fn private_key_ids(&self) -> KeyResult<Vec<String>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|f| f.kind == KeyKind::Private)
            .map(|f| f.kid)
            .collect())
    }

    /// Load the private key of `kid`.
    pub fn load_private(&self, kid: &str) -> KeyResult<KeyRecord> {
        self.load(kid, KeyKind::Private)
    }

    /// Load the public key of `kid`.
    pub fn load_public(&self, kid: &str) -> KeyResult<KeyRecord> {
        self.load(kid, KeyKind::Public)
    }

    fn load(&self, kid: &str, kind: KeyKind) -> KeyResult<KeyRecord> {
        let file = KeyFile {
            kid: kid.to_string(),
            kind,
            path: self.paths.key_file(kid, kind)?,
        };
        let record = read_key_file(&file)?;
        if record.kind() != kind {
            return Err(KeyError::Parse(format!(
                "{} does not hold a {kind:?} key",
                file.path.display()
            )));
        }
        Ok(record)
    }

    /// List recognized key files. A missing directory is an empty listing.
    fn scan(&self) -> KeyResult<Vec<KeyFile>> {
        let root = self.paths.root();
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(KeyError::io(root, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| KeyError::io(root, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if let Some((kid, kind)) = classify_file_name(&name) {
                files.push(KeyFile {
                    kid: kid.to_string(),
                    kind,
                    path,
                });
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

/// Read and parse a key file; a record without `kid` takes the file's.
///
/// A `kid` that disagrees with the file name is a parse error: the name is
/// what selection and deletion go by, so such a file is never used.
fn read_key_file(file: &KeyFile) -> KeyResult<KeyRecord> {
    let data = fs::read(&file.path).map_err(|e| KeyError::io(&file.path, e))?;
    let mut record = jwk::parse_key(&data)
        .map_err(|e| KeyError::Parse(format!("{}: {e}", file.path.display())))?;

    match record.kid() {
        None => record.set_kid(Some(file.kid.clone())),
        Some(kid) if kid != file.kid => {
            return Err(KeyError::Parse(format!(
                "{} holds key {kid:?}, expected {:?}",
                file.path.display(),
                file.kid
            )));
        }
        Some(_) => {}
    }
    Ok(record)
}

/// Write `data` to a temp file in the same directory and rename it over
/// `path`.
fn write_atomic(path: &Path, data: &[u8], mode: u32) -> KeyResult<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| KeyError::Validation(format!("{} has no file name", path.display())))?;
    let temp_path = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    let result = (|| -> std::io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        let mut file = options.open(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(KeyError::io(path, e));
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> KeyResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to delete key file");
            Err(KeyError::io(path, e))
        }
    }
}
