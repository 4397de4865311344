//! Filesystem watcher for the source repository
//!
//! Raw OS events are settled per path by `notify-debouncer-full`, forwarded to
//! subscribers as `repository-changed`, and folded into a single debounce timer
//! that starts a sync once the source has been quiet for the configured delay.
//!
//! # Platform Support
//!
//! - Windows: `ReadDirectoryChangesW`
//! - macOS: `FSEvents`
//! - Linux: `inotify`

use crate::{
    config::MirrorConfig,
    debounce::DebounceTimer,
    error::Result,
    files::is_accepted_image,
    sync::SyncEngine,
    ChangeKind, EventBus, MirrorError, MirrorEvent,
};
use notify::event::{MetadataKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::fs;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the channel between the notify thread and the event pump
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// A source-side change to an accepted photo file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: ChangeKind,
    pub filename: String,
}

/// Handle to the running OS watch
struct ActiveWatch {
    path: PathBuf,
    // The debouncer owns the OS watcher; dropping it releases the watch
    #[allow(dead_code)]
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    pump: JoinHandle<()>,
}

/// Watches the source repository and schedules debounced syncs
pub struct ChangeWatcher {
    engine: Arc<SyncEngine>,
    events: EventBus,
    timer: Arc<DebounceTimer>,
    settle: Duration,
    active: Mutex<Option<ActiveWatch>>,
    /// Bumped on stop so timers scheduled earlier never fire
    generation: Arc<AtomicU64>,
}

impl ChangeWatcher {
    pub fn new(engine: Arc<SyncEngine>, events: EventBus, config: &MirrorConfig) -> Self {
        Self {
            engine,
            events,
            timer: Arc::new(DebounceTimer::new(config.debounce())),
            settle: config.event_settle(),
            active: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveWatch>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start watching the engine's source repository
    ///
    /// Returns once the OS watch is registered. An existing watch is replaced.
    pub async fn start_watch(&self) -> Result<()> {
        let source = self
            .engine
            .source_path()
            .await
            .ok_or_else(|| MirrorError::Config("no source repository configured".to_string()))?;

        let is_dir = fs::metadata(&source)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false);
        if !is_dir {
            warn!("Cannot watch missing source repository: {}", source.display());
            return Err(MirrorError::SourceUnreachable(source));
        }

        self.stop_watch();

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let mut debouncer = new_debouncer(
            self.settle,
            None, // No tick rate
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    for event in events {
                        for change in convert_event(&event.event) {
                            if event_tx.blocking_send(change).is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(errors) => {
                    for error in errors {
                        error!("Watcher error: {:?}", error);
                    }
                }
            },
        )?;

        debouncer.watch(&source, RecursiveMode::NonRecursive)?;

        let pump = tokio::spawn(pump_events(
            event_rx,
            self.events.clone(),
            Arc::clone(&self.engine),
            Arc::clone(&self.timer),
            Arc::clone(&self.generation),
        ));

        *self.lock() = Some(ActiveWatch {
            path: source.clone(),
            debouncer,
            pump,
        });

        info!("Started watching: {}", source.display());
        Ok(())
    }

    /// Release the OS watch and cancel any pending debounced sync
    pub fn stop_watch(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if self.timer.cancel() {
            debug!("Cancelled pending debounced sync");
        }

        if let Some(active) = self.lock().take() {
            active.pump.abort();
            info!("Stopped watching: {}", active.path.display());
        }
    }

    pub fn is_watching(&self) -> bool {
        self.lock().is_some()
    }

    /// Restart the quiet-period timer; when it fires a sync starts unless one
    /// is already running, in which case the trigger is dropped
    pub fn schedule_debounced_sync(&self) {
        schedule_debounced_sync(&self.timer, &self.engine, &self.generation);
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop_watch();
    }
}

fn schedule_debounced_sync(
    timer: &DebounceTimer,
    engine: &Arc<SyncEngine>,
    generation: &Arc<AtomicU64>,
) {
    let engine = Arc::clone(engine);
    let generation = Arc::clone(generation);
    let scheduled_in = generation.load(Ordering::SeqCst);

    timer.schedule(move || async move {
        if generation.load(Ordering::SeqCst) != scheduled_in {
            debug!("Watcher stopped, dropping debounced sync");
            return;
        }

        // Detached so cancelling the timer never interrupts a pass
        if engine.spawn_sync().is_none() {
            warn!("Sync already running, skipping debounced sync");
        }
    });
}

/// Forward changes to subscribers and restart the debounce timer
async fn pump_events(
    mut event_rx: mpsc::Receiver<WatchEvent>,
    events: EventBus,
    engine: Arc<SyncEngine>,
    timer: Arc<DebounceTimer>,
    generation: Arc<AtomicU64>,
) {
    while let Some(change) = event_rx.recv().await {
        debug!("Repository change: {:?} {}", change.kind, change.filename);
        events.emit(MirrorEvent::RepositoryChanged {
            kind: change.kind,
            filename: change.filename,
        });
        schedule_debounced_sync(&timer, &engine, &generation);
    }
}

/// Convert a notify event into changes to accepted photo files
fn convert_event(event: &Event) -> Vec<WatchEvent> {
    let paths = &event.paths;

    let changes: Vec<(ChangeKind, &PathBuf)> = match &event.kind {
        EventKind::Create(_) => paths.iter().map(|p| (ChangeKind::Add, p)).collect(),
        EventKind::Remove(_) => paths.iter().map(|p| (ChangeKind::Unlink, p)).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.iter().map(|p| (ChangeKind::Unlink, p)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.iter().map(|p| (ChangeKind::Add, p)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            vec![(ChangeKind::Unlink, &paths[0]), (ChangeKind::Add, &paths[1])]
        }
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::AccessTime)) => Vec::new(),
        EventKind::Modify(_) => paths.iter().map(|p| (ChangeKind::Change, p)).collect(),
        _ => Vec::new(),
    };

    changes
        .into_iter()
        .filter_map(|(kind, path)| to_watch_event(kind, path))
        .collect()
}

fn to_watch_event(kind: ChangeKind, path: &Path) -> Option<WatchEvent> {
    if !is_accepted_image(path) {
        return None;
    }
    let filename = path.file_name()?.to_string_lossy().into_owned();
    Some(WatchEvent { kind, filename })
}
