//! Persisted per-listing sync state
//!
//! A versioned JSON document mapping listing id to the content hash last
//! confirmed by the remote. Written through the same atomic path as the
//! snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use super::SyncError;
use crate::store::{atomic, PersistError};
use crate::Listing;

/// Current schema version of the state document
pub const SYNC_STATE_VERSION: u32 = 1;

/// Last confirmed sync of one listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEntry {
    /// Content hash the remote confirmed
    pub content_hash: String,
    /// When the remote confirmed it
    pub synced_at: DateTime<Utc>,
}

/// Sync state for every listing ever confirmed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    schema_version: u32,
    entries: BTreeMap<String, SyncEntry>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            schema_version: SYNC_STATE_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl SyncState {
    /// Empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked listings
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was ever confirmed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for `id`
    pub fn get(&self, id: &str) -> Option<&SyncEntry> {
        self.entries.get(id)
    }

    /// Whether `listing` is new or changed since its last confirmed sync
    pub fn needs_sync(&self, listing: &Listing) -> bool {
        self.entries
            .get(&listing.id)
            .map_or(true, |entry| entry.content_hash != listing.content_hash())
    }

    /// Record that the remote confirmed `listing`
    pub fn mark_synced(&mut self, listing: &Listing, at: DateTime<Utc>) {
        self.entries.insert(
            listing.id.clone(),
            SyncEntry {
                content_hash: listing.content_hash(),
                synced_at: at,
            },
        );
    }

    /// Forget every entry (after a remote reset)
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Load from `path`; a missing file is an empty state
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let state = atomic::read_locked(path, |file| {
            serde_json::from_reader::<_, SyncState>(std::io::BufReader::new(file)).map_err(|e| {
                PersistError::Corrupt {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }
            })
        })
        .map_err(|e| SyncError::State(e.to_string()))?
        .unwrap_or_default();

        if state.schema_version != SYNC_STATE_VERSION {
            return Err(SyncError::State(format!(
                "unsupported sync state version {} in {} (expected {})",
                state.schema_version,
                path.display(),
                SYNC_STATE_VERSION
            )));
        }

        debug!(path = %path.display(), entries = state.len(), "Loaded sync state");
        Ok(state)
    }

    /// Save atomically to `path`
    pub fn save(&self, path: &Path) -> Result<(), SyncError> {
        let json =
            serde_json::to_vec_pretty(self).map_err(|e| SyncError::State(e.to_string()))?;
        atomic::write_atomically(path, None, |writer| writer.write_all(&json))
            .map_err(|e| SyncError::State(e.to_string()))?;

        info!(path = %path.display(), entries = self.len(), "Sync state saved");
        Ok(())
    }
}
