use super::PassContext;
use crate::{
    error::Result,
    files::{index_key, is_accepted_image},
    MirrorError, MirrorEvent, SyncPhase, SyncProgress,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

/// Photo files found in the source repository
#[derive(Debug, Default)]
pub(crate) struct Discovery {
    /// Source filenames, unique case-insensitively
    pub files: Vec<String>,
    /// False when some directory entries could not be read
    pub complete: bool,
}

impl Discovery {
    pub fn keys(&self) -> HashSet<String> {
        self.files.iter().map(|name| index_key(name)).collect()
    }
}

/// List the source directory and keep accepted image files
pub(crate) async fn discover(ctx: &PassContext<'_>) -> Result<Discovery> {
    ctx.guard.enter(SyncPhase::Discovery);
    debug!("Listing source repository {}", ctx.source.display());

    let mut dir = fs::read_dir(ctx.source).await.map_err(|e| {
        warn!("Cannot list source repository {}: {}", ctx.source.display(), e);
        MirrorError::SourceUnreachable(ctx.source.to_path_buf())
    })?;

    let mut entries = Vec::new();
    let mut complete = true;
    loop {
        // Slow listings can be interrupted between batches too
        if entries.len() % ctx.batch_size == 0 {
            ctx.guard.check_abort()?;
        }

        match dir.next_entry().await {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => break,
            Err(e) => {
                warn!("Source listing interrupted after {} entries: {}", entries.len(), e);
                complete = false;
                break;
            }
        }
    }

    let total = entries.len();
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut files = Vec::new();
    let mut current = 0;

    for batch in entries.chunks(ctx.batch_size) {
        for entry in batch {
            let Ok(filename) = entry.file_name().into_string() else {
                warn!("Skipping non UTF-8 source entry: {:?}", entry.path());
                continue;
            };

            if !is_accepted_image(Path::new(&filename)) {
                continue;
            }

            match is_regular_file(entry).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!("Failed to inspect source entry {}: {}", filename, e);
                    complete = false;
                    continue;
                }
            }

            let key = index_key(&filename);
            if let Some(first) = seen.get(&key) {
                warn!(
                    "Source holds {} and {} which differ only in case; mirroring {}",
                    first, filename, first
                );
                continue;
            }
            seen.insert(key, filename.clone());
            files.push(filename);
        }

        current += batch.len();
        ctx.events
            .emit(MirrorEvent::SyncProgress(SyncProgress::new(
                SyncPhase::Discovery,
                current,
                total,
            )));

        tokio::task::yield_now().await;
        ctx.guard.check_abort()?;
    }

    info!(
        "Discovery complete: {} photos among {} source entries",
        files.len(),
        total
    );

    Ok(Discovery { files, complete })
}

async fn is_regular_file(entry: &fs::DirEntry) -> std::io::Result<bool> {
    let file_type = entry.file_type().await?;
    if file_type.is_symlink() {
        return Ok(fs::metadata(entry.path()).await?.is_file());
    }
    Ok(file_type.is_file())
}
