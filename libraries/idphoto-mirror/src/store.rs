//! Local mirror directory and its in-memory index
//!
//! The mirror directory is the durable state; the index is rebuilt from a
//! directory scan on [`MirrorStore::initialize`] and afterwards mutated only by
//! the sync engine.

use crate::error::Result;
use crate::files::{index_key, is_accepted_image, is_partial};
use crate::types::MirrorEntry;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Lower-cased filename -> entry
pub type MirrorIndex = HashMap<String, MirrorEntry>;

/// Owns the mirror directory and the authoritative index of mirrored files
#[derive(Debug)]
pub struct MirrorStore {
    mirror_dir: PathBuf,
    index: RwLock<MirrorIndex>,
}

impl MirrorStore {
    pub fn new(mirror_dir: impl Into<PathBuf>) -> Self {
        Self {
            mirror_dir: mirror_dir.into(),
            index: RwLock::new(MirrorIndex::new()),
        }
    }

    pub fn mirror_dir(&self) -> &Path {
        &self.mirror_dir
    }

    /// Create the mirror directory if needed and rebuild the index from disk
    ///
    /// Returns the number of indexed files. Files that cannot be stat'ed are
    /// left out; the next sync pass copies them again.
    pub async fn initialize(&self) -> Result<usize> {
        fs::create_dir_all(&self.mirror_dir).await?;

        let mut scanned = MirrorIndex::new();
        let mut entries = fs::read_dir(&self.mirror_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let Ok(filename) = entry.file_name().into_string() else {
                warn!("Skipping non UTF-8 mirror entry: {:?}", entry.path());
                continue;
            };

            if is_partial(&filename) {
                // Left behind by an interrupted copy
                if let Err(e) = fs::remove_file(entry.path()).await {
                    warn!("Failed to remove partial copy {}: {}", filename, e);
                }
                continue;
            }

            if !is_accepted_image(Path::new(&filename)) {
                continue;
            }

            let metadata = match fs::metadata(entry.path()).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Failed to stat mirror file {}: {}", filename, e);
                    continue;
                }
            };

            if !metadata.is_file() {
                debug!("Skipping non-file mirror entry: {}", filename);
                continue;
            }

            let mtime = match metadata.modified() {
                Ok(mtime) => mtime,
                Err(e) => {
                    warn!("No modification time for mirror file {}: {}", filename, e);
                    continue;
                }
            };

            let key = index_key(&filename);
            if let Some(existing) = scanned.get(&key) {
                warn!(
                    "Mirror holds {} and {} which differ only in case; keeping {}",
                    existing.filename, filename, existing.filename
                );
                continue;
            }

            scanned.insert(
                key,
                MirrorEntry {
                    filename,
                    size: metadata.len(),
                    mtime,
                    synced: true,
                },
            );
        }

        let count = scanned.len();
        *self.index.write().await = scanned;

        info!(
            "Mirror initialized: {} files in {}",
            count,
            self.mirror_dir.display()
        );
        Ok(count)
    }

    /// Absolute mirror path for a filename, if it is indexed
    pub async fn get_mirror_path(&self, filename: &str) -> Option<PathBuf> {
        let index = self.index.read().await;
        index
            .get(&index_key(filename))
            .map(|entry| self.mirror_dir.join(&entry.filename))
    }

    pub async fn has_file(&self, filename: &str) -> bool {
        self.index.read().await.contains_key(&index_key(filename))
    }

    /// Lower-cased filenames of every indexed file
    pub async fn get_all_files(&self) -> HashSet<String> {
        self.index.read().await.keys().cloned().collect()
    }

    pub async fn entry(&self, filename: &str) -> Option<MirrorEntry> {
        self.index.read().await.get(&index_key(filename)).cloned()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    /// Drop every index entry; files on disk are left alone
    pub async fn invalidate(&self) {
        let mut index = self.index.write().await;
        let dropped = index.len();
        index.clear();
        info!("Mirror index invalidated ({} entries dropped)", dropped);
    }

    /// Record a freshly copied file
    pub(crate) async fn record_synced(&self, entry: MirrorEntry) -> Option<MirrorEntry> {
        let key = index_key(&entry.filename);
        self.index.write().await.insert(key, entry)
    }

    pub(crate) async fn remove_entry(&self, key: &str) -> Option<MirrorEntry> {
        self.index.write().await.remove(key)
    }

    /// Run a read-only closure against the index without cloning it
    pub(crate) async fn with_index<R>(&self, f: impl FnOnce(&MirrorIndex) -> R) -> R {
        let index = self.index.read().await;
        f(&index)
    }
}
