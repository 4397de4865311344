use super::PassContext;
use crate::{
    error::Result, files::index_key, files::same_mtime, MirrorEntry, MirrorEvent, SyncPhase,
    SyncProgress,
};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, warn};

/// Source file that needs copying into the mirror
#[derive(Debug, Clone)]
pub(crate) struct SourceFile {
    pub filename: String,
    pub size: u64,
    pub mtime: SystemTime,
}

#[derive(Debug, Default)]
pub(crate) struct SyncPlan {
    pub to_sync: Vec<SourceFile>,
    /// Up to date, or not stat-able this pass
    pub skipped: usize,
}

/// Decide which discovered files need copying
pub(crate) async fn plan(ctx: &PassContext<'_>, files: &[String]) -> Result<SyncPlan> {
    ctx.guard.enter(SyncPhase::Diffing);

    let total = files.len();
    let mut plan = SyncPlan::default();
    let mut current = 0;

    for batch in files.chunks(ctx.batch_size) {
        // Stat outside the index lock
        let mut stats = Vec::with_capacity(batch.len());
        for filename in batch {
            match stat_source(ctx, filename).await {
                Ok((size, mtime)) => stats.push(SourceFile {
                    filename: filename.clone(),
                    size,
                    mtime,
                }),
                Err(e) => {
                    warn!("Failed to stat source file {}: {}", filename, e);
                    plan.skipped += 1;
                }
            }
        }

        ctx.store
            .with_index(|index| {
                for file in stats {
                    if needs_sync(index.get(&index_key(&file.filename)), &file) {
                        plan.to_sync.push(file);
                    } else {
                        plan.skipped += 1;
                    }
                }
            })
            .await;

        current += batch.len();
        ctx.events
            .emit(MirrorEvent::SyncProgress(SyncProgress::new(
                SyncPhase::Diffing,
                current,
                total,
            )));

        tokio::task::yield_now().await;
        ctx.guard.check_abort()?;
    }

    debug!(
        "Diff complete: {} to sync, {} skipped",
        plan.to_sync.len(),
        plan.skipped
    );
    Ok(plan)
}

async fn stat_source(ctx: &PassContext<'_>, filename: &str) -> std::io::Result<(u64, SystemTime)> {
    let metadata = fs::metadata(ctx.source.join(filename)).await?;
    Ok((metadata.len(), metadata.modified()?))
}

/// Absent, unsynced, or size/mtime mismatch
pub(crate) fn needs_sync(indexed: Option<&MirrorEntry>, source: &SourceFile) -> bool {
    match indexed {
        None => true,
        Some(entry) if !entry.synced => true,
        Some(entry) => entry.size != source.size || !same_mtime(entry.mtime, source.mtime),
    }
}
