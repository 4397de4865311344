//! "Does identifier X have a photo?" answered from the mirror index
//!
//! Lookups never touch the source repository. While the mirror is still
//! empty (cold start) every lookup misses; callers must read a miss as "not
//! known yet" rather than "no photo".

use crate::cache::CacheManager;
use crate::files::{index_key, ACCEPTED_EXTENSIONS};
use crate::store::MirrorStore;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

const LOOKUP_KEY_PREFIX: &str = "photo-path:";

/// Query layer over [`MirrorStore`]'s index
pub struct ExistenceCache {
    store: Arc<MirrorStore>,
    cache: Arc<CacheManager>,
}

impl ExistenceCache {
    pub fn new(store: Arc<MirrorStore>, cache: Arc<CacheManager>) -> Self {
        Self { store, cache }
    }

    /// Lower-cased filenames currently mirrored; empty during cold start
    pub async fn load_file_set(&self) -> HashSet<String> {
        let files = self.store.get_all_files().await;
        if files.is_empty() {
            debug!("Mirror not populated yet, existence checks are fail-open");
        }
        files
    }

    /// Probe `{identifier}.jpg` then `{identifier}.jpeg`
    ///
    /// `file_set` holds lower-cased names as returned by
    /// [`load_file_set`](Self::load_file_set). The returned filename keeps the
    /// identifier's spelling.
    pub fn find_file(identifier: &str, file_set: &HashSet<String>) -> Option<String> {
        ACCEPTED_EXTENSIONS
            .iter()
            .map(|ext| format!("{}.{}", identifier, ext))
            .find(|candidate| file_set.contains(&index_key(candidate)))
    }

    /// Resolve an identifier to its mirror path, memoized in the shared cache
    pub async fn lookup(&self, identifier: &str) -> Option<PathBuf> {
        let cache_key = format!("{}{}", LOOKUP_KEY_PREFIX, index_key(identifier));

        if let Some(cached) = self.cache.get(&cache_key) {
            return cached.as_str().map(PathBuf::from);
        }

        let files = self.load_file_set().await;
        let path = match Self::find_file(identifier, &files) {
            Some(filename) => self.store.get_mirror_path(&filename).await,
            None => None,
        };

        // Cold-start misses are not cached so they resolve once the mirror fills
        if path.is_some() || !files.is_empty() {
            let value = path
                .as_ref()
                .map(|p| Value::String(p.to_string_lossy().into_owned()))
                .unwrap_or(Value::Null);
            self.cache.insert(cache_key, value);
        }

        path
    }

    /// Whether an identifier has a mirrored photo
    pub async fn has_photo(&self, identifier: &str) -> bool {
        self.lookup(identifier).await.is_some()
    }
}
