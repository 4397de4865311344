//! Wiring for the whole mirror subsystem
//!
//! Construct one [`MirrorService`] at process start and share it. It owns the
//! store, engine, watcher, event bus and the application-wide lookup cache.

use crate::{
    cache::CacheManager,
    config::MirrorConfig,
    error::Result,
    events::EventBus,
    existence::ExistenceCache,
    store::MirrorStore,
    sync::SyncEngine,
    watcher::ChangeWatcher,
    MirrorEvent, MirrorStats, SyncResult,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub struct MirrorService {
    store: Arc<MirrorStore>,
    engine: Arc<SyncEngine>,
    watcher: ChangeWatcher,
    existence: ExistenceCache,
    cache: Arc<CacheManager>,
    events: EventBus,
    watch_enabled: bool,
}

impl MirrorService {
    pub fn new(config: MirrorConfig) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.event_buffer);
        let cache = Arc::new(CacheManager::new(config.cache_ttl(), config.cache_capacity));
        let store = Arc::new(MirrorStore::new(config.mirror_path.clone()));
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&store),
            events.clone(),
            Arc::clone(&cache),
            &config,
        ));
        let watcher = ChangeWatcher::new(Arc::clone(&engine), events.clone(), &config);
        let existence = ExistenceCache::new(Arc::clone(&store), Arc::clone(&cache));

        Ok(Self {
            store,
            engine,
            watcher,
            existence,
            cache,
            events,
            watch_enabled: config.watch,
        })
    }

    /// Build the index from the mirror directory
    pub async fn initialize(&self) -> Result<usize> {
        self.store.initialize().await
    }

    /// Initialize, kick off a background sync and start watching the source
    ///
    /// A missing or unreachable source is not fatal: the existing mirror keeps
    /// answering lookups.
    pub async fn start(&self) -> Result<()> {
        let indexed = self.initialize().await?;
        info!("Mirror service starting with {} indexed files", indexed);

        if self.engine.source_path().await.is_none() {
            info!("No source repository configured, serving the existing mirror only");
            return Ok(());
        }

        if self.engine.spawn_sync().is_none() {
            warn!("Sync already in progress, not starting initial sync");
        }

        if self.watch_enabled {
            if let Err(e) = self.watcher.start_watch().await {
                warn!("Not watching source repository: {}", e);
            }
        }

        Ok(())
    }

    /// Manual sync trigger
    pub async fn sync_now(&self) -> SyncResult {
        self.engine.start_sync().await
    }

    pub fn abort_sync(&self) -> bool {
        self.engine.abort_sync()
    }

    /// Switch to a different source repository and rebuild from scratch
    pub async fn reconfigure(&self, source_path: Option<PathBuf>) -> Result<()> {
        info!("Reconfiguring source repository: {:?}", source_path);

        self.watcher.stop_watch();
        self.engine.set_source_path(source_path).await;

        // Any pass claimed so far may still be reading the old source
        if self.engine.abort_sync() {
            info!("Waiting for the running sync to stop");
        }
        self.engine.wait_idle().await;

        self.store.invalidate().await;
        self.cache.invalidate_all();

        self.start().await
    }

    /// Stop watching and wait for any running pass to wind down
    pub async fn shutdown(&self) {
        self.watcher.stop_watch();
        if self.engine.abort_sync() {
            self.engine.wait_idle().await;
        }
        info!("Mirror service stopped");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MirrorEvent> {
        self.events.subscribe()
    }

    pub async fn get_stats(&self) -> MirrorStats {
        MirrorStats {
            total_files: self.store.len().await,
            is_syncing: self.engine.is_syncing(),
            last_sync_time: self.engine.last_sync_time(),
            is_watching: self.watcher.is_watching(),
        }
    }

    pub fn existence(&self) -> &ExistenceCache {
        &self.existence
    }

    pub fn cache(&self) -> Arc<CacheManager> {
        Arc::clone(&self.cache)
    }

    pub fn store(&self) -> &Arc<MirrorStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn watcher(&self) -> &ChangeWatcher {
        &self.watcher
    }
}
