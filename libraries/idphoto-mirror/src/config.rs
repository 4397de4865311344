/// Mirror subsystem configuration
use crate::error::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MirrorConfig {
    /// Source repository of reference photos; `None` until configured
    #[serde(default)]
    pub source_path: Option<PathBuf>,

    #[serde(default = "default_mirror_path")]
    pub mirror_path: PathBuf,

    /// Entries handled per discovery/diff batch before yielding
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Copies performed between yields in the sync phase
    #[serde(default = "default_sync_yield_every")]
    pub sync_yield_every: usize,

    /// Quiet period before a watch event triggers a sync
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Window for settling raw OS events per path
    #[serde(default = "default_event_settle_ms")]
    pub event_settle_ms: u64,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default = "default_watch")]
    pub watch: bool,

    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl MirrorConfig {
    pub fn new(source_path: impl Into<PathBuf>, mirror_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: Some(source_path.into()),
            mirror_path: mirror_path.into(),
            ..Self::default()
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn event_settle(&self) -> Duration {
        Duration::from_millis(self.event_settle_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.mirror_path.as_os_str().is_empty() {
            return Err(MirrorError::Config("mirror_path must not be empty".to_string()));
        }

        if self.batch_size == 0 {
            return Err(MirrorError::Config("batch_size must be at least 1".to_string()));
        }

        if self.sync_yield_every == 0 {
            return Err(MirrorError::Config(
                "sync_yield_every must be at least 1".to_string(),
            ));
        }

        if self.cache_capacity == 0 {
            return Err(MirrorError::Config(
                "cache_capacity must be at least 1".to_string(),
            ));
        }

        if let Some(source) = &self.source_path {
            if source == &self.mirror_path {
                return Err(MirrorError::Config(format!(
                    "source and mirror must differ (both {:?})",
                    source
                )));
            }
        }

        Ok(())
    }
}

// Default values
fn default_mirror_path() -> PathBuf {
    PathBuf::from("./data/mirror")
}

fn default_batch_size() -> usize {
    50
}

fn default_sync_yield_every() -> usize {
    10
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_event_settle_ms() -> u64 {
    100
}

fn default_cache_ttl_secs() -> u64 {
    crate::cache::DEFAULT_TTL.as_secs()
}

fn default_cache_capacity() -> usize {
    1024
}

fn default_watch() -> bool {
    true
}

fn default_event_buffer() -> usize {
    crate::events::DEFAULT_EVENT_BUFFER
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            source_path: None,
            mirror_path: default_mirror_path(),
            batch_size: default_batch_size(),
            sync_yield_every: default_sync_yield_every(),
            debounce_ms: default_debounce_ms(),
            event_settle_ms: default_event_settle_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
            watch: default_watch(),
            event_buffer: default_event_buffer(),
        }
    }
}
