//! CSV snapshot store
//!
//! The snapshot is a CSV primary file plus one backup (`<file>.bak`) holding
//! the content the primary had before its last replacement.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::Listing;

pub mod atomic;
pub mod csv;

/// Persistence errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistError {
    /// Filesystem failure
    #[error("I/O error on {}: {message}", .path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// OS error text
        message: String,
    },

    /// Snapshot content could not be encoded or decoded
    #[error("CSV error in {}: {message}", .path.display())]
    Csv {
        /// Snapshot file
        path: PathBuf,
        /// Row or field problem
        message: String,
    },

    /// Advisory lock could not be taken
    #[error("lock error on {}: {message}", .path.display())]
    Lock {
        /// Lock file
        path: PathBuf,
        /// OS error text
        message: String,
    },

    /// A non-CSV document (sync state) could not be decoded
    #[error("corrupt file {}: {message}", .path.display())]
    Corrupt {
        /// File involved
        path: PathBuf,
        /// Decoder message
        message: String,
    },

    /// Restore requested without a backup on disk
    #[error("no backup snapshot at {}", .0.display())]
    NoBackup(PathBuf),
}

impl PersistError {
    pub(crate) fn io(path: &Path, err: io::Error) -> Self {
        PersistError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Result type for store operations
pub type PersistResult<T> = Result<T, PersistError>;

/// Merge `new` into `existing` keyed by listing id.
///
/// A record from `new` replaces the existing one with the same id (last
/// write wins). Output order is first-seen order across both inputs.
pub fn merge(existing: Vec<Listing>, new: Vec<Listing>) -> Vec<Listing> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(existing.len() + new.len());
    let mut merged: Vec<Listing> = Vec::with_capacity(existing.len() + new.len());

    for listing in existing.into_iter().chain(new) {
        match positions.get(&listing.id) {
            Some(&index) => merged[index] = listing,
            None => {
                positions.insert(listing.id.clone(), merged.len());
                merged.push(listing);
            }
        }
    }

    merged
}

/// Facts about the snapshot on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotMetadata {
    /// Primary file
    pub path: PathBuf,
    /// Whether the primary file exists
    pub exists: bool,
    /// Data rows (header excluded)
    pub rows: usize,
    /// Primary file size
    pub size_bytes: u64,
    /// Last modification of the primary file
    pub modified: Option<DateTime<Utc>>,
    /// Whether a backup is available for restore
    pub backup_present: bool,
}

/// CSV snapshot with a rotating backup
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
    backup_path: PathBuf,
}

impl RecordStore {
    /// Store rooted at `path` (the primary CSV file)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let backup_path = atomic::sibling(&path, "bak");
        Self { path, backup_path }
    }

    /// Primary file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Backup file
    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Read the current snapshot. A missing file is an empty snapshot.
    pub fn load(&self) -> PersistResult<Vec<Listing>> {
        let listings = atomic::read_locked(&self.path, |file| self.decode(file))?.unwrap_or_default();
        debug!(path = %self.path.display(), rows = listings.len(), "Loaded snapshot");
        Ok(listings)
    }

    /// Replace the snapshot with `records`, rotating the backup.
    ///
    /// On error the primary file is unchanged.
    pub fn persist(&self, records: &[Listing]) -> PersistResult<()> {
        let mut encode_error = None;
        let result = self.persist_with(|writer| {
            csv::write_listings(writer, records).map_err(|e| {
                if !e.is_io_error() {
                    encode_error = Some(e.to_string());
                }
                io::Error::from(e)
            })
        });
        if let (Err(_), Some(message)) = (&result, encode_error) {
            return Err(PersistError::Csv {
                path: self.path.clone(),
                message,
            });
        }
        result?;

        info!(
            path = %self.path.display(),
            rows = records.len(),
            "Snapshot persisted"
        );
        Ok(())
    }

    pub(crate) fn persist_with<F>(&self, write: F) -> PersistResult<()>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        atomic::write_atomically(&self.path, Some(&self.backup_path), write).map_err(|err| {
            warn!(path = %self.path.display(), error = %err, "Snapshot write failed, primary unchanged");
            err
        })
    }

    /// Describe the snapshot on disk
    pub fn metadata(&self) -> PersistResult<SnapshotMetadata> {
        let backup_present = self.backup_path.exists();
        let fs_meta = match std::fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(SnapshotMetadata {
                    path: self.path.clone(),
                    exists: false,
                    rows: 0,
                    size_bytes: 0,
                    modified: None,
                    backup_present,
                })
            }
            Err(e) => return Err(PersistError::io(&self.path, e)),
        };

        Ok(SnapshotMetadata {
            path: self.path.clone(),
            exists: true,
            rows: self.load()?.len(),
            size_bytes: fs_meta.len(),
            modified: fs_meta.modified().ok().map(DateTime::<Utc>::from),
            backup_present,
        })
    }

    /// Replace the primary with the backup content.
    ///
    /// The backup is validated first; the backup slot itself is left as is.
    pub fn restore_backup(&self) -> PersistResult<usize> {
        if !self.backup_path.exists() {
            return Err(PersistError::NoBackup(self.backup_path.clone()));
        }

        let bytes = std::fs::read(&self.backup_path).map_err(|e| PersistError::io(&self.backup_path, e))?;
        let rows = self.decode(bytes.as_slice())?.len();

        atomic::write_atomically(&self.path, None, |writer| writer.write_all(&bytes))?;
        info!(
            path = %self.path.display(),
            backup = %self.backup_path.display(),
            rows,
            "Snapshot restored from backup"
        );
        Ok(rows)
    }

    fn decode<R: Read>(&self, reader: R) -> PersistResult<Vec<Listing>> {
        csv::read_listings(reader).map_err(|e| PersistError::Csv {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }
}
