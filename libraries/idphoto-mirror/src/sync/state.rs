use crate::{error::Result, MirrorError, SyncPhase, SyncState};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{watch, Notify};

/// Ephemeral session flags; at most one session is live at a time
#[derive(Debug)]
pub(crate) struct SyncSession {
    syncing: AtomicBool,
    abort_requested: AtomicBool,
    last_sync_time: Mutex<Option<DateTime<Utc>>>,
    state: watch::Sender<SyncState>,
    idle: Notify,
}

impl SyncSession {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            syncing: AtomicBool::new(false),
            abort_requested: AtomicBool::new(false),
            last_sync_time: Mutex::new(None),
            state,
            idle: Notify::new(),
        }
    }

    /// Claim the session, or `None` if one is already running
    ///
    /// The claim is taken synchronously, so a pass handed to another task is
    /// visible as syncing (and abortable) before that task is first polled.
    pub fn try_begin(self: &Arc<Self>) -> Option<SessionGuard> {
        self.syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.abort_requested.store(false, Ordering::Release);
        Some(SessionGuard {
            session: Arc::clone(self),
        })
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Ask a running session to stop at its next boundary
    pub fn request_abort(&self) -> bool {
        if !self.is_syncing() {
            return false;
        }
        self.abort_requested.store(true, Ordering::Release);
        true
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self
            .last_sync_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if !self.is_syncing() {
                return;
            }
            notified.await;
        }
    }
}

/// Held for the lifetime of one pass; releases the session on drop
#[derive(Debug)]
pub(crate) struct SessionGuard {
    session: Arc<SyncSession>,
}

impl SessionGuard {
    pub fn enter(&self, phase: SyncPhase) {
        self.session.state.send_replace(phase.into());
    }

    pub fn mark_aborted(&self) {
        self.session.state.send_replace(SyncState::Aborted);
    }

    /// Sampled between batches and files only
    pub fn check_abort(&self) -> Result<()> {
        if self.session.abort_requested.load(Ordering::Acquire) {
            return Err(MirrorError::Aborted);
        }
        Ok(())
    }

    pub fn record_completion(&self) {
        *self
            .session
            .last_sync_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.state.send_replace(SyncState::Idle);
        self.session.syncing.store(false, Ordering::Release);
        self.session.idle.notify_waiters();
    }
}
