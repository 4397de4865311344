//! ID Photo Repository Mirror
//!
//! Keeps a fast local mirror of a slow, possibly network-backed repository of
//! reference photos, and answers "does this person have a photo?" from an
//! in-memory index instead of the source.
//!
//! # Features
//!
//! - Batched, cooperative sync passes that yield between batches
//! - At most one pass at a time; extra requests are rejected, not queued
//! - Debounced filesystem watching of the source repository
//! - Atomic copies into the mirror; stale files removed only after a pass saw
//!   them gone
//! - Lifecycle events over a broadcast channel
//!
//! # Architecture
//!
//! - `store`: mirror directory and index
//! - `sync`: discovery, diff, copy and cleanup phases
//! - `watcher`: source repository watching and debounced sync scheduling
//! - `existence`: identifier lookups over the index
//! - `cache`: short-lived shared lookup cache
//! - `service`: wiring and the status surface

mod error;
mod types;

pub mod cache;
pub mod config;
pub mod debounce;
pub mod events;
pub mod existence;
pub mod files;
pub mod service;
pub mod store;
pub mod sync;
pub mod watcher;

pub use cache::{CacheManager, TtlCache};
pub use config::MirrorConfig;
pub use error::{MirrorError, Result};
pub use events::{EventBus, MirrorEvent};
pub use existence::ExistenceCache;
pub use service::MirrorService;
pub use store::{MirrorIndex, MirrorStore};
pub use sync::SyncEngine;
pub use types::*;
pub use watcher::{ChangeWatcher, WatchEvent};
