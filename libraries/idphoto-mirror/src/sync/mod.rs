//! Sync engine: discovery, diff, copy and cleanup passes
//!
//! A pass walks `Idle -> Discovering -> Diffing -> Syncing -> CleaningUp -> Idle`.
//! Only one pass runs at a time; a request made while a pass is running is
//! rejected rather than queued. Abort requests are honoured at batch and file
//! boundaries, never in the middle of a copy or delete.

mod cleaner;
mod copier;
mod diff;
mod discovery;
mod state;

use crate::{
    cache::CacheManager,
    config::MirrorConfig,
    error::Result,
    events::EventBus,
    store::MirrorStore,
    types::{ABORTED, ALREADY_SYNCING, SOURCE_UNREACHABLE},
    MirrorError, MirrorEvent, SyncResult, SyncState,
};
use chrono::{DateTime, Utc};
use state::{SessionGuard, SyncSession};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Shared borrow of everything a phase needs
pub(crate) struct PassContext<'a> {
    pub store: &'a MirrorStore,
    pub source: &'a Path,
    pub events: &'a EventBus,
    pub guard: &'a SessionGuard,
    pub batch_size: usize,
    pub yield_every: usize,
}

/// Counters accumulated over a pass
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PassCounters {
    pub synced: usize,
    pub skipped: usize,
    pub errors: usize,
    pub removed: usize,
}

impl PassCounters {
    fn into_result(self, error: Option<String>) -> SyncResult {
        SyncResult {
            success: error.is_none(),
            synced: self.synced,
            skipped: self.skipped,
            errors: self.errors,
            removed: self.removed,
            error,
        }
    }
}

/// Keeps the mirror converged with the source repository
pub struct SyncEngine {
    store: Arc<MirrorStore>,
    source_path: RwLock<Option<PathBuf>>,
    session: Arc<SyncSession>,
    events: EventBus,
    cache: Arc<CacheManager>,
    batch_size: usize,
    yield_every: usize,
}

impl SyncEngine {
    pub fn new(
        store: Arc<MirrorStore>,
        events: EventBus,
        cache: Arc<CacheManager>,
        config: &MirrorConfig,
    ) -> Self {
        Self {
            store,
            source_path: RwLock::new(config.source_path.clone()),
            session: Arc::new(SyncSession::new()),
            events,
            cache,
            batch_size: config.batch_size.max(1),
            yield_every: config.sync_yield_every.max(1),
        }
    }

    pub async fn source_path(&self) -> Option<PathBuf> {
        self.source_path.read().await.clone()
    }

    /// Point the engine at a different source repository
    pub async fn set_source_path(&self, source: Option<PathBuf>) {
        info!("Source repository set to {:?}", source);
        *self.source_path.write().await = source;
    }

    pub fn store(&self) -> &Arc<MirrorStore> {
        &self.store
    }

    pub fn is_syncing(&self) -> bool {
        self.session.is_syncing()
    }

    pub fn state(&self) -> SyncState {
        self.session.state()
    }

    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.session.last_sync_time()
    }

    /// Request that the running pass stop at its next boundary
    ///
    /// Returns `false` when no pass is running.
    pub fn abort_sync(&self) -> bool {
        let requested = self.session.request_abort();
        if requested {
            info!("Abort requested for running sync");
        }
        requested
    }

    /// Resolves once no pass is running
    pub async fn wait_idle(&self) {
        self.session.wait_idle().await;
    }

    /// Run one full pass
    ///
    /// Never fails: every outcome, including rejection of a concurrent
    /// request, is reported through the returned [`SyncResult`].
    pub async fn start_sync(&self) -> SyncResult {
        let Some(guard) = self.session.try_begin() else {
            warn!("Sync already in progress, ignoring request");
            return SyncResult::failed(ALREADY_SYNCING);
        };
        self.run_session(guard).await
    }

    /// Claim the session now and run the pass on a new task
    ///
    /// Returns `None` without spawning when a pass is already running. Once
    /// this returns, `is_syncing()` is true and `abort_sync()` reaches the
    /// spawned pass even if it has not been polled yet.
    pub fn spawn_sync(self: &Arc<Self>) -> Option<JoinHandle<SyncResult>> {
        let guard = self.session.try_begin()?;
        let engine = Arc::clone(self);
        Some(tokio::spawn(async move { engine.run_session(guard).await }))
    }

    async fn run_session(&self, guard: SessionGuard) -> SyncResult {
        info!("Starting sync");
        self.events.emit(MirrorEvent::SyncStarted);
        let started = Instant::now();

        let mut counters = PassCounters::default();
        let outcome = self.run_pass(&guard, &mut counters).await;

        let result = match outcome {
            Ok(()) => {
                guard.record_completion();
                counters.into_result(None)
            }
            Err(MirrorError::Aborted) => {
                guard.mark_aborted();
                info!(
                    "Sync aborted after {} synced, {} removed",
                    counters.synced, counters.removed
                );
                counters.into_result(Some(ABORTED.to_string()))
            }
            Err(MirrorError::SourceUnreachable(path)) => {
                warn!("Source repository unreachable: {}", path.display());
                counters.into_result(Some(SOURCE_UNREACHABLE.to_string()))
            }
            Err(MirrorError::Config(message)) => {
                warn!("Cannot sync: {}", message);
                counters.into_result(Some(SOURCE_UNREACHABLE.to_string()))
            }
            Err(e) => {
                error!("Sync failed: {}", e);
                counters.into_result(Some(e.to_string()))
            }
        };

        if result.changed() {
            debug!("Mirror changed, invalidating cached lookups");
            self.cache.invalidate_all();
        }

        info!(
            "Sync finished in {:?}: success={}, {} synced, {} skipped, {} errors, {} removed",
            started.elapsed(),
            result.success,
            result.synced,
            result.skipped,
            result.errors,
            result.removed
        );

        drop(guard);
        self.events.emit(MirrorEvent::SyncCompleted(result.clone()));
        result
    }

    async fn run_pass(&self, guard: &SessionGuard, counters: &mut PassCounters) -> Result<()> {
        let source = self
            .source_path()
            .await
            .ok_or_else(|| MirrorError::Config("no source repository configured".to_string()))?;

        ensure_accessible(&source).await?;

        let ctx = PassContext {
            store: &self.store,
            source: &source,
            events: &self.events,
            guard,
            batch_size: self.batch_size,
            yield_every: self.yield_every,
        };

        let listing = discovery::discover(&ctx).await?;

        let plan = diff::plan(&ctx, &listing.files).await?;
        counters.skipped = plan.skipped;

        copier::sync_files(&ctx, &plan.to_sync, counters).await?;

        if listing.complete {
            cleaner::remove_stale(&ctx, &listing.keys(), counters).await?;
        } else {
            warn!("Source listing was incomplete, skipping cleanup this pass");
        }

        Ok(())
    }
}

async fn ensure_accessible(source: &Path) -> Result<()> {
    match fs::metadata(source).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(MirrorError::SourceUnreachable(source.to_path_buf())),
        Err(e) => {
            debug!("Source stat failed: {}", e);
            Err(MirrorError::SourceUnreachable(source.to_path_buf()))
        }
    }
}
