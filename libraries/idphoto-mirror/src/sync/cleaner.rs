use super::{PassContext, PassCounters};
use crate::{error::Result, MirrorEvent, SyncPhase, SyncProgress};
use std::collections::HashSet;
use std::io;
use tokio::fs;
use tracing::{debug, info, warn};

/// Remove mirror files whose source counterpart is gone
///
/// A failed delete keeps the index entry so the mirror and index never
/// disagree; the entry is retried on the next pass.
pub(crate) async fn remove_stale(
    ctx: &PassContext<'_>,
    source_keys: &HashSet<String>,
    counters: &mut PassCounters,
) -> Result<()> {
    ctx.guard.enter(SyncPhase::Cleanup);

    let stale: Vec<(String, String)> = ctx
        .store
        .with_index(|index| {
            index
                .iter()
                .filter(|(key, _)| !source_keys.contains(*key))
                .map(|(key, entry)| (key.clone(), entry.filename.clone()))
                .collect()
        })
        .await;

    let total = stale.len();
    if total == 0 {
        debug!("Cleanup: nothing stale");
        return Ok(());
    }

    for (i, (key, filename)) in stale.iter().enumerate() {
        ctx.guard.check_abort()?;

        let path = ctx.store.mirror_dir().join(filename);
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Stale mirror file {} already gone", filename);
            }
            Err(e) => {
                warn!("Failed to remove stale mirror file {}: {}", filename, e);
                counters.errors += 1;
                tokio::task::yield_now().await;
                continue;
            }
        }

        ctx.store.remove_entry(key).await;
        counters.removed += 1;

        ctx.events.emit(MirrorEvent::SyncProgress(SyncProgress::new(
            SyncPhase::Cleanup,
            i + 1,
            total,
        )));
        tokio::task::yield_now().await;
    }

    info!(
        "Cleanup complete: removed {} of {} stale files",
        counters.removed, total
    );
    Ok(())
}
