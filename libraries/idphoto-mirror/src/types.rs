use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::SystemTime;

/// Error string reported when the source repository cannot be read
pub const SOURCE_UNREACHABLE: &str = "source unreachable";

/// Error string reported when a pass stops on an abort request
pub const ABORTED: &str = "Aborted";

/// Error string reported to a caller whose sync request was rejected
pub const ALREADY_SYNCING: &str = "Sync already in progress";

/// A single mirrored file as recorded in the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    /// Filename as it appears on disk (the index key is its lower-cased form)
    pub filename: String,
    pub size: u64,
    pub mtime: SystemTime,
    /// Whether the mirror copy is known to match the source
    pub synced: bool,
}

/// Phase of work inside a sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Discovery,
    Diffing,
    Syncing,
    Cleanup,
}

/// Engine state as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Discovering,
    Diffing,
    Syncing,
    CleaningUp,
    Aborted,
}

impl From<SyncPhase> for SyncState {
    fn from(phase: SyncPhase) -> Self {
        match phase {
            SyncPhase::Discovery => SyncState::Discovering,
            SyncPhase::Diffing => SyncState::Diffing,
            SyncPhase::Syncing => SyncState::Syncing,
            SyncPhase::Cleanup => SyncState::CleaningUp,
        }
    }
}

/// Progress payload for `sync-progress`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub phase: SyncPhase,
    pub current: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<usize>,
}

impl SyncProgress {
    pub fn new(phase: SyncPhase, current: usize, total: usize) -> Self {
        Self {
            phase,
            current,
            total,
            synced: None,
            errors: None,
        }
    }

    pub fn with_counts(mut self, synced: usize, errors: usize) -> Self {
        self.synced = Some(synced);
        self.errors = Some(errors);
        self
    }
}

/// Outcome of a sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub synced: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Stale mirror entries removed during cleanup
    pub removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.error.as_deref() == Some(ABORTED)
    }

    pub fn is_rejected(&self) -> bool {
        self.error.as_deref() == Some(ALREADY_SYNCING)
    }

    /// Whether the pass copied or removed anything
    pub fn changed(&self) -> bool {
        self.synced > 0 || self.removed > 0
    }
}

/// Kind of source-side change reported by the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Change,
    Unlink,
}

/// Snapshot for the status surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorStats {
    pub total_files: usize,
    pub is_syncing: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub is_watching: bool,
}
