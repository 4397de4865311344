//! Lifecycle notifications for the display layer
//!
//! Events are fanned out over a broadcast channel. Sending never blocks and
//! never fails the sender: with no subscribers the event is dropped, and a
//! subscriber that falls behind sees `RecvError::Lagged`.

use crate::types::{ChangeKind, SyncProgress, SyncResult};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Default capacity of the broadcast channel
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Notification emitted by the mirror subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum MirrorEvent {
    SyncStarted,
    SyncProgress(SyncProgress),
    SyncCompleted(SyncResult),
    FileSynced(String),
    RepositoryChanged {
        #[serde(rename = "type")]
        kind: ChangeKind,
        filename: String,
    },
}

/// Cloneable handle for publishing and subscribing to [`MirrorEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MirrorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MirrorEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: MirrorEvent) {
        if self.tx.send(event).is_err() {
            trace!("No event subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SyncPhase;

    #[test]
    fn events_serialize_with_kebab_tags() {
        let json = serde_json::to_value(MirrorEvent::FileSynced("A.jpg".to_string())).unwrap();
        assert_eq!(json["event"], "file-synced");
        assert_eq!(json["payload"], "A.jpg");

        let json = serde_json::to_value(MirrorEvent::RepositoryChanged {
            kind: ChangeKind::Unlink,
            filename: "B.jpeg".to_string(),
        })
        .unwrap();
        assert_eq!(json["event"], "repository-changed");
        assert_eq!(json["payload"]["type"], "unlink");
        assert_eq!(json["payload"]["filename"], "B.jpeg");
    }

    #[test]
    fn progress_omits_missing_counts() {
        let progress = SyncProgress::new(SyncPhase::Discovery, 50, 120);
        let json = serde_json::to_value(MirrorEvent::SyncProgress(progress)).unwrap();
        assert_eq!(json["payload"]["phase"], "discovery");
        assert_eq!(json["payload"]["current"], 50);
        assert!(json["payload"].get("synced").is_none());
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.emit(MirrorEvent::SyncStarted);

        let mut rx = bus.subscribe();
        bus.emit(MirrorEvent::SyncStarted);
        assert_eq!(rx.recv().await.unwrap(), MirrorEvent::SyncStarted);
    }
}
