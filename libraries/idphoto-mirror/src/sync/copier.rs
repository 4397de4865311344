use super::{diff::SourceFile, PassContext, PassCounters};
use crate::{error::Result, files::partial_name, MirrorEntry, MirrorEvent, SyncPhase, SyncProgress};
use std::io;
use std::path::Path;
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, warn};

/// Copy every planned file into the mirror and record it in the index
///
/// A failed copy is counted and leaves the previous index entry untouched so
/// the file is retried on the next pass.
pub(crate) async fn sync_files(
    ctx: &PassContext<'_>,
    files: &[SourceFile],
    counters: &mut PassCounters,
) -> Result<()> {
    ctx.guard.enter(SyncPhase::Syncing);
    let total = files.len();

    for (i, file) in files.iter().enumerate() {
        ctx.guard.check_abort()?;

        // Keep the mirror's existing spelling when only the case changed
        let target = ctx
            .store
            .entry(&file.filename)
            .await
            .map(|entry| entry.filename)
            .unwrap_or_else(|| file.filename.clone());

        match copy_into_mirror(ctx.source, ctx.store.mirror_dir(), file, &target).await {
            Ok(entry) => {
                debug!("Synced {} ({} bytes)", file.filename, entry.size);
                ctx.store.record_synced(entry).await;
                counters.synced += 1;
                ctx.events.emit(MirrorEvent::FileSynced(file.filename.clone()));
            }
            Err(e) => {
                warn!("Failed to sync {}: {}", file.filename, e);
                counters.errors += 1;
            }
        }

        ctx.events.emit(MirrorEvent::SyncProgress(
            SyncProgress::new(SyncPhase::Syncing, i + 1, total)
                .with_counts(counters.synced, counters.errors),
        ));

        if (i + 1) % ctx.yield_every == 0 {
            tokio::task::yield_now().await;
        }
    }

    Ok(())
}

/// Copy through a temporary file so the mirror never holds a torn copy
async fn copy_into_mirror(
    source_dir: &Path,
    mirror_dir: &Path,
    file: &SourceFile,
    target: &str,
) -> io::Result<MirrorEntry> {
    let source = source_dir.join(&file.filename);
    let partial = mirror_dir.join(partial_name(target));
    let destination = mirror_dir.join(target);

    let result = async {
        fs::copy(&source, &partial).await?;
        stamp_mtime(&partial, file.mtime).await?;
        fs::rename(&partial, &destination).await?;

        let metadata = fs::metadata(&destination).await?;
        Ok(MirrorEntry {
            filename: target.to_string(),
            size: metadata.len(),
            mtime: metadata.modified()?,
            synced: true,
        })
    }
    .await;

    if result.is_err() {
        if let Err(e) = fs::remove_file(&partial).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove partial copy {}: {}", partial.display(), e);
            }
        }
    }

    result
}

/// Give the copy the source's modification time
async fn stamp_mtime(path: &Path, mtime: SystemTime) -> io::Result<()> {
    let file = fs::OpenOptions::new().write(true).open(path).await?;
    let file = file.into_std().await;
    tokio::task::spawn_blocking(move || file.set_modified(mtime))
        .await
        .map_err(io::Error::other)?
}
