//! Retention passes over a real directory and over scripted races.

use std::fs;
use std::io;
use std::path::Path;

use corekeeper_core::retention::fakes::MemoryCoreDir;
use corekeeper_core::{enforce, FsCoreDir, RetentionPolicy};

fn touch(dir: &Path, name: &str) {
    fs::write(dir.join(name), b"core").unwrap();
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

#[test]
fn five_legacy_cores_trimmed_to_three() {
    let dir = tempfile::tempdir().unwrap();
    for n in 1..=5 {
        touch(dir.path(), &format!("core.000{n}"));
    }
    touch(dir.path(), "notes.txt");

    let report = enforce(&FsCoreDir::new(dir.path()), &RetentionPolicy::new(3).unwrap()).unwrap();

    assert_eq!(report.matched, 5);
    let deleted: Vec<&str> = report.deleted.iter().map(|n| n.as_str()).collect();
    assert_eq!(deleted, ["core.0001", "core.0002"]);
    assert_eq!(
        listing(dir.path()),
        ["core.0003", "core.0004", "core.0005", "notes.txt"]
    );
}

#[test]
fn survivors_are_min_of_count_and_limit() {
    for (existing, max) in [(0usize, 1usize), (1, 1), (4, 10), (10, 10), (11, 10), (25, 7)] {
        let dir = tempfile::tempdir().unwrap();
        for secs in 0..existing {
            let name = format!("core.2026-01-01_{}.000000000.app", 1_767_225_600 + secs);
            touch(dir.path(), &name);
        }

        let report =
            enforce(&FsCoreDir::new(dir.path()), &RetentionPolicy::new(max).unwrap()).unwrap();

        let left = listing(dir.path());
        assert_eq!(left.len(), existing.min(max), "existing={existing} max={max}");
        assert_eq!(report.deleted_count(), existing.saturating_sub(max));

        // The survivors are the newest ones.
        if let Some(first) = left.first() {
            let first_secs = 1_767_225_600 + existing.saturating_sub(max);
            assert!(first.contains(&format!("_{first_secs}.")), "{first}");
        }
    }
}

#[test]
fn subdirectories_and_partials_are_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("core.0000")).unwrap();
    touch(dir.path(), ".core-partial.abc123");
    touch(dir.path(), "core.0001");
    touch(dir.path(), "core.0002");

    let report = enforce(&FsCoreDir::new(dir.path()), &RetentionPolicy::new(1).unwrap()).unwrap();

    assert_eq!(report.matched, 2);
    assert!(dir.path().join("core.0000").is_dir());
    assert!(dir.path().join(".core-partial.abc123").exists());
    assert!(!dir.path().join("core.0001").exists());
    assert!(dir.path().join("core.0002").exists());
}

#[test]
fn missing_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = enforce(
        &FsCoreDir::new(dir.path().join("gone")),
        &RetentionPolicy::default(),
    )
    .unwrap_err();
    assert_eq!(err.io_error().kind(), io::ErrorKind::NotFound);
}

#[test]
fn sibling_passes_converge_without_failures() {
    let dir = tempfile::tempdir().unwrap();
    for secs in 0..40u64 {
        touch(
            dir.path(),
            &format!("core.2026-01-01_{}.000000000.app", 1_767_225_600 + secs),
        );
    }
    let policy = RetentionPolicy::new(10).unwrap();

    let reports: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| enforce(&FsCoreDir::new(dir.path()), &policy).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for report in &reports {
        assert!(report.is_clean(), "{:?}", report.failures);
    }
    // Every excess file is unlinked by exactly one pass.
    let deleted: usize = reports.iter().map(|r| r.deleted_count()).sum();
    assert_eq!(deleted, 30);
    assert_eq!(listing(dir.path()).len(), 10);
}

#[test]
fn scripted_race_counts_vanished_entry_as_removed() {
    let dir = MemoryCoreDir::new("/var/core");
    for n in 1..=5 {
        dir.add(&format!("core.000{n}"));
    }
    dir.vanish_on_remove("core.0001");

    let report = enforce(&dir, &RetentionPolicy::new(3).unwrap()).unwrap();

    assert_eq!(report.vanished.len(), 1);
    assert_eq!(report.vanished[0].as_str(), "core.0001");
    assert_eq!(report.deleted_count(), 1);
    assert!(report.is_clean());
    assert_eq!(dir.names(), ["core.0003", "core.0004", "core.0005"]);
}

#[test]
fn scripted_permission_failure_keeps_going() {
    let dir = MemoryCoreDir::new("/var/core");
    for n in 1..=5 {
        dir.add(&format!("core.000{n}"));
    }
    dir.deny_remove("core.0001");

    let report = enforce(&dir, &RetentionPolicy::new(3).unwrap()).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].name.as_str(), "core.0001");
    assert_eq!(
        report.first_error().map(|f| f.source.kind()),
        Some(io::ErrorKind::PermissionDenied)
    );
    assert!(dir.contains("core.0001"));
    assert!(!dir.contains("core.0002"));
}
