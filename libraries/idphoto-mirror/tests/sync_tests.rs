//! Integration tests for sync passes


use idphoto_mirror::{MirrorConfig, MirrorEvent, SyncPhase, SyncState};
use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use test_helpers::{config, dirs, drain, harness, photo_listing, write_photo};

fn keys(files: std::collections::HashSet<String>) -> BTreeSet<String> {
    files.into_iter().collect()
}

#[tokio::test]
async fn test_first_sync_then_delete_and_add() {
    let dirs = dirs();
    write_photo(&dirs.source, "A.jpg", b"photo a");
    write_photo(&dirs.source, "B.jpg", b"photo b");

    let h = harness(&config(&dirs)).await;

    let first = h.engine.start_sync().await;
    assert!(first.success);
    assert_eq!(first.synced, 2);
    assert_eq!(first.skipped, 0);
    assert_eq!(first.errors, 0);
    assert_eq!(
        keys(h.store.get_all_files().await),
        BTreeSet::from(["a.jpg".to_string(), "b.jpg".to_string()])
    );

    fs::remove_file(dirs.source.join("A.jpg")).unwrap();
    write_photo(&dirs.source, "C.jpeg", b"photo c");

    let second = h.engine.start_sync().await;
    assert!(second.success);
    assert_eq!(second.synced, 1);
    assert_eq!(second.skipped, 1);
    assert_eq!(second.removed, 1);
    assert_eq!(
        keys(h.store.get_all_files().await),
        BTreeSet::from(["b.jpg".to_string(), "c.jpeg".to_string()])
    );
    assert!(!dirs.mirror.join("A.jpg").exists());
    assert_eq!(fs::read(dirs.mirror.join("C.jpeg")).unwrap(), b"photo c");
}

#[tokio::test]
async fn test_second_sync_is_idempotent() {
    let dirs = dirs();
    write_photo(&dirs.source, "A.jpg", b"photo a");
    write_photo(&dirs.source, "B.jpeg", b"photo b");

    let h = harness(&config(&dirs)).await;
    assert_eq!(h.engine.start_sync().await.synced, 2);

    let again = h.engine.start_sync().await;
    assert!(again.success);
    assert_eq!(again.synced, 0);
    assert_eq!(again.skipped, 2);
    assert_eq!(again.removed, 0);
}

#[tokio::test]
async fn test_idempotent_across_restart() {
    let dirs = dirs();
    write_photo(&dirs.source, "A.jpg", b"photo a");

    let cfg = config(&dirs);
    let h = harness(&cfg).await;
    assert_eq!(h.engine.start_sync().await.synced, 1);

    // A fresh process rebuilds the index from the mirror directory
    let restarted = harness(&cfg).await;
    assert!(restarted.store.has_file("a.jpg").await);
    assert_eq!(restarted.engine.start_sync().await.synced, 0);
}

#[tokio::test]
async fn test_modified_file_is_resynced() {
    let dirs = dirs();
    write_photo(&dirs.source, "A.jpg", b"old");

    let h = harness(&config(&dirs)).await;
    h.engine.start_sync().await;

    write_photo(&dirs.source, "A.jpg", b"new and longer");
    let result = h.engine.start_sync().await;

    assert_eq!(result.synced, 1);
    assert_eq!(fs::read(dirs.mirror.join("A.jpg")).unwrap(), b"new and longer");
    assert_eq!(h.store.entry("a.jpg").await.unwrap().size, 14);
}

#[tokio::test]
async fn test_only_regular_image_files_are_mirrored() {
    let dirs = dirs();
    write_photo(&dirs.source, "A.jpg", b"a");
    write_photo(&dirs.source, "readme.txt", b"not a photo");
    write_photo(&dirs.source, "B.png", b"wrong type");
    fs::create_dir(dirs.source.join("nested.jpg")).unwrap();
    write_photo(&dirs.source.join("nested.jpg"), "C.jpg", b"too deep");

    let h = harness(&config(&dirs)).await;
    let result = h.engine.start_sync().await;

    assert_eq!(result.synced, 1);
    assert_eq!(
        keys(h.store.get_all_files().await),
        BTreeSet::from(["a.jpg".to_string()])
    );
}

#[tokio::test]
async fn test_unreachable_source_leaves_index_untouched() {
    let dirs = dirs();
    fs::create_dir_all(&dirs.mirror).unwrap();
    write_photo(&dirs.mirror, "X.jpg", b"already mirrored");

    let cfg = MirrorConfig::new(dirs.source.join("missing"), &dirs.mirror);
    let h = harness(&cfg).await;
    let mut rx = h.events.subscribe();

    let result = h.engine.start_sync().await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("source unreachable"));
    assert!(h.store.has_file("X.jpg").await);
    assert!(dirs.mirror.join("X.jpg").exists());
    assert!(h.engine.last_sync_time().is_none());
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, MirrorEvent::SyncCompleted(r) if !r.success)));
}

#[tokio::test]
async fn test_unconfigured_source_is_unreachable() {
    let dirs = dirs();
    let cfg = MirrorConfig {
        source_path: None,
        ..config(&dirs)
    };
    let h = harness(&cfg).await;

    let result = h.engine.start_sync().await;
    assert_eq!(result.error.as_deref(), Some("source unreachable"));
}

#[tokio::test]
async fn test_concurrent_request_is_rejected() {
    let dirs = dirs();
    for i in 0..20 {
        write_photo(&dirs.source, &format!("S{:03}.jpg", i), b"photo");
    }

    let h = harness(&config(&dirs)).await;
    let mut rx = h.events.subscribe();

    let (first, second) = tokio::join!(h.engine.start_sync(), h.engine.start_sync());

    assert!(first.success);
    assert_eq!(first.synced, 20);
    assert!(second.is_rejected());
    assert_eq!(second.synced, 0);

    let started = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, MirrorEvent::SyncStarted))
        .count();
    assert_eq!(started, 1);
    assert!(!h.engine.is_syncing());
}

#[tokio::test]
async fn test_copy_failure_is_counted_and_retried() {
    let dirs = dirs();
    write_photo(&dirs.source, "good.jpg", b"fine");
    write_photo(&dirs.source, "bad.jpg", b"blocked");
    // A directory squatting on the mirror path makes the final rename fail
    fs::create_dir_all(dirs.mirror.join("bad.jpg")).unwrap();

    let h = harness(&config(&dirs)).await;

    let first = h.engine.start_sync().await;
    assert!(first.success);
    assert_eq!(first.synced, 1);
    assert_eq!(first.errors, 1);
    assert!(h.store.has_file("good.jpg").await);
    assert!(!h.store.has_file("bad.jpg").await);

    let retry = h.engine.start_sync().await;
    assert_eq!(retry.synced, 0);
    assert_eq!(retry.errors, 1);

    fs::remove_dir(dirs.mirror.join("bad.jpg")).unwrap();
    let healed = h.engine.start_sync().await;
    assert_eq!(healed.synced, 1);
    assert_eq!(healed.errors, 0);
    assert!(h.store.has_file("bad.jpg").await);
}

#[tokio::test]
async fn test_removal_waits_for_a_pass() {
    let dirs = dirs();
    write_photo(&dirs.source, "A.jpg", b"a");

    let h = harness(&config(&dirs)).await;
    h.engine.start_sync().await;

    fs::remove_file(dirs.source.join("A.jpg")).unwrap();
    assert!(h.store.has_file("A.jpg").await);
    assert!(dirs.mirror.join("A.jpg").exists());

    let result = h.engine.start_sync().await;
    assert_eq!(result.removed, 1);
    assert!(!h.store.has_file("A.jpg").await);
    assert!(!dirs.mirror.join("A.jpg").exists());
}

#[tokio::test]
async fn test_case_only_rename_keeps_mirror_spelling() {
    let dirs = dirs();
    write_photo(&dirs.source, "Photo.jpg", b"v1");

    let h = harness(&config(&dirs)).await;
    h.engine.start_sync().await;

    fs::remove_file(dirs.source.join("Photo.jpg")).unwrap();
    write_photo(&dirs.source, "PHOTO.jpg", b"version two");
    let result = h.engine.start_sync().await;

    assert_eq!(result.synced, 1);
    assert_eq!(result.removed, 0);
    assert_eq!(
        fs::read(dirs.mirror.join("Photo.jpg")).unwrap(),
        b"version two"
    );
    assert_eq!(photo_listing(&dirs.mirror).len(), 1);
}

#[tokio::test]
async fn test_mirror_converges_to_source() {
    let dirs = dirs();
    let h = harness(&config(&dirs)).await;

    for i in 0..30 {
        write_photo(&dirs.source, &format!("P{:02}.jpg", i), &vec![b'x'; i + 1]);
    }
    h.engine.start_sync().await;

    for i in (0..30).step_by(3) {
        fs::remove_file(dirs.source.join(format!("P{:02}.jpg", i))).unwrap();
    }
    for i in (1..30).step_by(4) {
        write_photo(&dirs.source, &format!("P{:02}.jpg", i), &vec![b'y'; 100 + i]);
    }
    for i in 30..35 {
        write_photo(&dirs.source, &format!("N{:02}.JPEG", i), b"new");
    }
    write_photo(&dirs.source, "ignored.txt", b"x");

    let result = h.engine.start_sync().await;
    assert!(result.success);
    assert_eq!(result.errors, 0);

    assert_eq!(photo_listing(&dirs.mirror), photo_listing(&dirs.source));
    assert_eq!(h.store.len().await, photo_listing(&dirs.source).len());
}

#[tokio::test]
async fn test_events_for_a_pass() {
    let dirs = dirs();
    write_photo(&dirs.source, "A.jpg", b"a");
    write_photo(&dirs.source, "B.jpg", b"b");

    let h = harness(&config(&dirs)).await;
    let mut rx = h.events.subscribe();
    h.engine.start_sync().await;

    let events = drain(&mut rx);
    assert_eq!(events.first(), Some(&MirrorEvent::SyncStarted));

    let synced: BTreeSet<String> = events
        .iter()
        .filter_map(|e| match e {
            MirrorEvent::FileSynced(name) => Some(name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        synced,
        BTreeSet::from(["A.jpg".to_string(), "B.jpg".to_string()])
    );

    let last_sync_progress = events
        .iter()
        .filter_map(|e| match e {
            MirrorEvent::SyncProgress(p) if p.phase == SyncPhase::Syncing => Some(p.clone()),
            _ => None,
        })
        .last()
        .unwrap();
    assert_eq!(last_sync_progress.current, 2);
    assert_eq!(last_sync_progress.total, 2);
    assert_eq!(last_sync_progress.synced, Some(2));
    assert_eq!(last_sync_progress.errors, Some(0));

    assert!(events.iter().any(|e| matches!(
        e,
        MirrorEvent::SyncProgress(p) if p.phase == SyncPhase::Discovery
    )));
    match events.last() {
        Some(MirrorEvent::SyncCompleted(result)) => assert_eq!(result.synced, 2),
        other => panic!("expected sync-completed last, got {:?}", other),
    }
    assert!(h.engine.last_sync_time().is_some());
    assert_eq!(h.engine.state(), SyncState::Idle);
}

#[tokio::test]
async fn test_discovery_progress_is_batched() {
    let dirs = dirs();
    for i in 0..120 {
        write_photo(&dirs.source, &format!("S{:03}.jpg", i), b"p");
    }

    let cfg = MirrorConfig {
        batch_size: 50,
        ..config(&dirs)
    };
    let h = harness(&cfg).await;
    let mut rx = h.events.subscribe();
    h.engine.start_sync().await;

    let discovery: Vec<(usize, usize)> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            MirrorEvent::SyncProgress(p) if p.phase == SyncPhase::Discovery => {
                Some((p.current, p.total))
            }
            _ => None,
        })
        .collect();
    assert_eq!(discovery, vec![(50, 120), (100, 120), (120, 120)]);
}

#[tokio::test]
async fn test_cache_invalidated_only_when_mirror_changes() {
    let dirs = dirs();
    write_photo(&dirs.source, "A.jpg", b"a");

    let h = harness(&config(&dirs)).await;
    h.cache.insert("lookup".to_string(), serde_json::json!("stale"));
    h.engine.start_sync().await;
    assert!(h.cache.get(&"lookup".to_string()).is_none());

    h.cache.insert("lookup".to_string(), serde_json::json!("fresh"));
    let quiet = h.engine.start_sync().await;
    assert_eq!(quiet.synced, 0);
    assert!(h.cache.get(&"lookup".to_string()).is_some());

    fs::remove_file(dirs.source.join("A.jpg")).unwrap();
    h.engine.start_sync().await;
    assert!(h.cache.get(&"lookup".to_string()).is_none());
}

#[tokio::test]
async fn test_abort_during_discovery() {
    let dirs = dirs();
    for i in 0..150 {
        write_photo(&dirs.source, &format!("S{:03}.jpg", i), b"p");
    }

    let h = harness(&config(&dirs)).await;
    let mut rx = h.events.subscribe();

    let engine = Arc::clone(&h.engine);
    let pass = tokio::spawn(async move { engine.start_sync().await });

    loop {
        if let MirrorEvent::SyncProgress(p) = rx.recv().await.unwrap() {
            if p.phase == SyncPhase::Discovery {
                assert!(h.engine.abort_sync());
                break;
            }
        }
    }

    let result = pass.await.unwrap();
    assert!(result.is_aborted());
    assert!(!result.success);
    assert!(result.synced < 150);
    assert!(!h.engine.is_syncing());
}

#[tokio::test]
async fn test_abort_during_copy_keeps_index_consistent() {
    let dirs = dirs();
    for i in 0..60 {
        write_photo(&dirs.source, &format!("S{:03}.jpg", i), b"photo bytes");
    }

    let h = harness(&config(&dirs)).await;
    let mut rx = h.events.subscribe();

    let engine = Arc::clone(&h.engine);
    let pass = tokio::spawn(async move { engine.start_sync().await });

    loop {
        if let MirrorEvent::FileSynced(_) = rx.recv().await.unwrap() {
            h.engine.abort_sync();
            break;
        }
    }

    let result = pass.await.unwrap();
    assert!(result.is_aborted());
    assert!(result.synced >= 1);
    assert!(result.synced < 60);
    assert_eq!(h.store.len().await, result.synced);

    for key in h.store.get_all_files().await {
        let path = h.store.get_mirror_path(&key).await.unwrap();
        assert!(path.is_file(), "{} indexed without a mirror file", key);
    }

    // The next pass picks up where the aborted one stopped
    let resumed = h.engine.start_sync().await;
    assert!(resumed.success);
    assert_eq!(resumed.synced, 60 - result.synced);
    assert_eq!(h.store.len().await, 60);
}

#[tokio::test]
async fn test_photo_named_like_temp_copy_survives() {
    let dirs = dirs();
    write_photo(&dirs.source, ".idphoto-partial-X.jpg", b"lookalike");

    let cfg = config(&dirs);
    let h = harness(&cfg).await;
    assert_eq!(h.engine.start_sync().await.synced, 1);

    write_photo(&dirs.source, "X.jpg", b"the real X");
    assert_eq!(h.engine.start_sync().await.synced, 1);

    let third = h.engine.start_sync().await;
    assert_eq!(third.synced, 0);
    assert_eq!(third.skipped, 2);

    assert_eq!(
        fs::read(dirs.mirror.join(".idphoto-partial-X.jpg")).unwrap(),
        b"lookalike"
    );
    assert_eq!(fs::read(dirs.mirror.join("X.jpg")).unwrap(), b"the real X");

    let restarted = harness(&cfg).await;
    assert!(restarted.store.has_file(".idphoto-partial-X.jpg").await);
    assert!(restarted.store.has_file("X.jpg").await);
    assert_eq!(restarted.engine.start_sync().await.synced, 0);
}

#[tokio::test]
async fn test_abort_during_diff_copies_nothing() {
    let dirs = dirs();
    for i in 0..60 {
        write_photo(&dirs.source, &format!("S{:03}.jpg", i), b"photo");
    }

    let cfg = MirrorConfig {
        batch_size: 10,
        ..config(&dirs)
    };
    let h = harness(&cfg).await;
    let mut rx = h.events.subscribe();

    let engine = Arc::clone(&h.engine);
    let pass = tokio::spawn(async move { engine.start_sync().await });

    loop {
        if let MirrorEvent::SyncProgress(p) = rx.recv().await.unwrap() {
            if p.phase == SyncPhase::Diffing {
                assert!(h.engine.abort_sync());
                break;
            }
        }
    }

    let result = pass.await.unwrap();
    assert!(result.is_aborted());
    assert_eq!(result.synced, 0);
    assert!(h.store.is_empty().await);
    assert!(photo_listing(&dirs.mirror).is_empty());
    assert_eq!(h.engine.state(), SyncState::Idle);
    assert!(h.engine.last_sync_time().is_none());
}

#[tokio::test]
async fn test_abort_during_cleanup_keeps_index_consistent() {
    let dirs = dirs();
    write_photo(&dirs.source, "keep.jpg", b"stays");
    for i in 0..30 {
        write_photo(&dirs.source, &format!("S{:03}.jpg", i), b"photo");
    }

    let h = harness(&config(&dirs)).await;
    assert_eq!(h.engine.start_sync().await.synced, 31);

    for i in 0..30 {
        fs::remove_file(dirs.source.join(format!("S{:03}.jpg", i))).unwrap();
    }

    let mut rx = h.events.subscribe();
    let engine = Arc::clone(&h.engine);
    let pass = tokio::spawn(async move { engine.start_sync().await });

    loop {
        if let MirrorEvent::SyncProgress(p) = rx.recv().await.unwrap() {
            if p.phase == SyncPhase::Cleanup {
                assert!(h.engine.abort_sync());
                break;
            }
        }
    }

    let result = pass.await.unwrap();
    assert!(result.is_aborted());
    assert!(result.removed >= 1);
    assert!(result.removed < 30);

    // Index and mirror directory agree entry for entry
    let indexed = keys(h.store.get_all_files().await);
    let on_disk: BTreeSet<String> = photo_listing(&dirs.mirror).into_keys().collect();
    assert_eq!(indexed, on_disk);
    assert_eq!(indexed.len(), 31 - result.removed);
    assert!(indexed.contains("keep.jpg"));

    let finish = h.engine.start_sync().await;
    assert!(finish.success);
    assert_eq!(finish.removed, 30 - result.removed);
    assert_eq!(
        keys(h.store.get_all_files().await),
        BTreeSet::from(["keep.jpg".to_string()])
    );
}

#[tokio::test]
async fn test_spawned_pass_is_claimed_before_it_runs() {
    let dirs = dirs();
    for i in 0..120 {
        write_photo(&dirs.source, &format!("S{:03}.jpg", i), b"photo");
    }

    let h = harness(&config(&dirs)).await;
    let mut rx = h.events.subscribe();

    let handle = h.engine.spawn_sync().expect("session should be free");
    assert!(h.engine.is_syncing());
    assert!(h.engine.spawn_sync().is_none());
    assert!(h.engine.start_sync().await.is_rejected());

    // Abort lands before the listing is read
    assert!(h.engine.abort_sync());
    let result = handle.await.unwrap();

    assert!(result.is_aborted());
    assert_eq!(result.synced, 0);
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, MirrorEvent::SyncProgress(_))));
    assert!(!h.engine.is_syncing());
    assert!(h.store.is_empty().await);
}
