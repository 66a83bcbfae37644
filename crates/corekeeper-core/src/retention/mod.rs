//! Count-based retention over the core directory.
//!
//! One pass enumerates the namespace once, keeps the `scan_limit` oldest
//! candidates in a bounded heap, and deletes from the oldest end until
//! `max_count` of the enumerated entries remain. The directory is shared with
//! concurrent invocations and operators: an entry that disappears before we
//! delete it is a benign race, not an error.

pub mod fakes;
pub mod fs;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::num::NonZeroUsize;
use std::path::Path;

use crate::error::{ConfigError, RetentionError};
use crate::naming::{CoreName, OrderKey};

/// Default number of retained cores.
pub const DEFAULT_MAX_CORES: usize = 10;

/// Default number of candidates held in memory per pass.
pub const DEFAULT_SCAN_LIMIT: usize = 4096;

/// Directory holding core artifacts.
pub trait CoreDir {
    /// Location used in logs and errors.
    fn path(&self) -> &Path;

    /// Stream entry names. Directories are not reported.
    fn entries(&self) -> io::Result<Box<dyn Iterator<Item = io::Result<String>> + '_>>;

    /// Remove the entry called `name`.
    fn remove(&self, name: &str) -> io::Result<()>;
}

/// How many cores to keep and how much of the directory one pass may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    max_count: NonZeroUsize,
    scan_limit: NonZeroUsize,
}

impl RetentionPolicy {
    pub fn new(max_count: usize) -> Result<Self, ConfigError> {
        let max_count = NonZeroUsize::new(max_count).ok_or(ConfigError::InvalidMaxCount(max_count))?;
        Ok(Self {
            max_count,
            ..Self::default()
        })
    }

    pub fn with_scan_limit(self, scan_limit: usize) -> Result<Self, ConfigError> {
        let scan_limit =
            NonZeroUsize::new(scan_limit).ok_or(ConfigError::InvalidScanLimit(scan_limit))?;
        Ok(Self { scan_limit, ..self })
    }

    pub fn max_count(&self) -> NonZeroUsize {
        self.max_count
    }

    pub fn scan_limit(&self) -> NonZeroUsize {
        self.scan_limit
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        const MAX: NonZeroUsize = match NonZeroUsize::new(DEFAULT_MAX_CORES) {
            Some(n) => n,
            None => panic!("default max cores is zero"),
        };
        const SCAN: NonZeroUsize = match NonZeroUsize::new(DEFAULT_SCAN_LIMIT) {
            Some(n) => n,
            None => panic!("default scan limit is zero"),
        };
        Self {
            max_count: MAX,
            scan_limit: SCAN,
        }
    }
}

/// A deletion that failed for a reason other than the entry being gone.
#[derive(Debug, thiserror::Error)]
#[error("unable to delete {name}: {source}")]
pub struct DeletionFailure {
    pub name: CoreName,
    #[source]
    pub source: io::Error,
}

/// Outcome of one retention pass. Partial success is representable.
#[derive(Debug, Default)]
pub struct RetentionReport {
    /// Namespace entries seen by the enumeration.
    pub matched: usize,
    /// Entries this pass removed, oldest first.
    pub deleted: Vec<CoreName>,
    /// Entries that were already gone when we tried to remove them.
    pub vanished: Vec<CoreName>,
    pub failures: Vec<DeletionFailure>,
    /// Excess entries beyond the scan limit, left for a later pass.
    pub deferred: usize,
}

impl RetentionReport {
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    /// Representative error of the pass: the first failed deletion.
    pub fn first_error(&self) -> Option<&DeletionFailure> {
        self.failures.first()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Candidate {
    key: OrderKey,
    name: CoreName,
}

impl Candidate {
    fn new(name: CoreName) -> Self {
        Self {
            key: name.order_key(),
            name,
        }
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.name.as_str().cmp(other.name.as_str()))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Run one retention pass over `dir`.
///
/// Only a failure to enumerate the directory is fatal. Per-entry deletion
/// failures are collected in the report and the pass carries on.
pub fn enforce<D>(dir: &D, policy: &RetentionPolicy) -> Result<RetentionReport, RetentionError>
where
    D: CoreDir + ?Sized,
{
    let enumerate_err = |source| RetentionError::Enumerate {
        dir: dir.path().to_path_buf(),
        source,
    };

    let limit = policy.scan_limit().get();
    // Max-heap on age: the top is the newest held candidate, evicted first
    // once more than `limit` are held.
    let mut oldest: BinaryHeap<Candidate> = BinaryHeap::new();
    let mut matched = 0usize;

    for entry in dir.entries().map_err(enumerate_err)? {
        let raw = entry.map_err(enumerate_err)?;
        let Some(name) = CoreName::parse(&raw) else {
            continue;
        };
        matched += 1;
        oldest.push(Candidate::new(name));
        if oldest.len() > limit {
            oldest.pop();
        }
    }

    let mut report = RetentionReport {
        matched,
        ..RetentionReport::default()
    };

    let excess = matched.saturating_sub(policy.max_count().get());
    if excess == 0 {
        return Ok(report);
    }

    let held = oldest.into_sorted_vec();
    let to_delete = excess.min(held.len());
    report.deferred = excess - to_delete;

    for candidate in held.into_iter().take(to_delete) {
        match dir.remove(candidate.name.as_str()) {
            Ok(()) => report.deleted.push(candidate.name),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(name = %candidate.name, "core already removed by someone else");
                report.vanished.push(candidate.name);
            }
            Err(source) => report.failures.push(DeletionFailure {
                name: candidate.name,
                source,
            }),
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retention::fakes::MemoryCoreDir;

    fn names(list: &[CoreName]) -> Vec<&str> {
        list.iter().map(CoreName::as_str).collect()
    }

    fn numbered(count: usize) -> MemoryCoreDir {
        let dir = MemoryCoreDir::new("/var/core");
        for i in 1..=count {
            dir.add(&format!("core.{i:04}"));
        }
        dir
    }

    #[test]
    fn policy_rejects_zero() {
        assert!(matches!(
            RetentionPolicy::new(0),
            Err(ConfigError::InvalidMaxCount(0))
        ));
        assert!(matches!(
            RetentionPolicy::new(3).unwrap().with_scan_limit(0),
            Err(ConfigError::InvalidScanLimit(0))
        ));
    }

    #[test]
    fn policy_defaults() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.max_count().get(), DEFAULT_MAX_CORES);
        assert_eq!(policy.scan_limit().get(), DEFAULT_SCAN_LIMIT);
    }

    #[test]
    fn under_limit_deletes_nothing() {
        let dir = numbered(3);
        let report = enforce(&dir, &RetentionPolicy::new(3).unwrap()).unwrap();
        assert_eq!(report.matched, 3);
        assert_eq!(report.deleted_count(), 0);
        assert!(report.first_error().is_none());
        assert_eq!(dir.names().len(), 3);
    }

    #[test]
    fn deletes_oldest_beyond_limit() {
        let dir = numbered(5);
        let report = enforce(&dir, &RetentionPolicy::new(3).unwrap()).unwrap();

        assert_eq!(report.deleted_count(), 2);
        assert_eq!(names(&report.deleted), vec!["core.0001", "core.0002"]);
        assert!(report.is_clean());
        assert_eq!(dir.names(), vec!["core.0003", "core.0004", "core.0005"]);
    }

    #[test]
    fn ignores_foreign_entries() {
        let dir = numbered(2);
        dir.add("vmcore");
        dir.add(".core-partial.abc123");
        dir.add("README");

        let report = enforce(&dir, &RetentionPolicy::new(1).unwrap()).unwrap();

        assert_eq!(report.matched, 2);
        assert_eq!(names(&report.deleted), vec!["core.0001"]);
        assert!(dir.contains("vmcore"));
        assert!(dir.contains(".core-partial.abc123"));
        assert!(dir.contains("README"));
    }

    #[test]
    fn vanished_entry_is_not_an_error() {
        let dir = numbered(5);
        dir.vanish_on_remove("core.0001");

        let report = enforce(&dir, &RetentionPolicy::new(3).unwrap()).unwrap();

        assert!(report.is_clean());
        assert_eq!(names(&report.vanished), vec!["core.0001"]);
        assert_eq!(names(&report.deleted), vec!["core.0002"]);
        // The vanished entry counts toward the excess; nothing newer is taken.
        assert_eq!(dir.names(), vec!["core.0003", "core.0004", "core.0005"]);
    }

    #[test]
    fn failed_deletion_does_not_stop_the_pass() {
        let dir = numbered(6);
        dir.deny_remove("core.0002");

        let report = enforce(&dir, &RetentionPolicy::new(2).unwrap()).unwrap();

        assert_eq!(names(&report.deleted), vec!["core.0001", "core.0003", "core.0004"]);
        assert_eq!(report.failures.len(), 1);
        let failure = report.first_error().unwrap();
        assert_eq!(failure.name.as_str(), "core.0002");
        assert_eq!(failure.source.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(dir.names(), vec!["core.0002", "core.0005", "core.0006"]);
    }

    #[test]
    fn enumeration_failure_is_fatal() {
        let dir = numbered(4);
        dir.fail_listing(io::ErrorKind::PermissionDenied);

        let err = enforce(&dir, &RetentionPolicy::new(1).unwrap()).unwrap_err();

        assert_eq!(err.io_error().kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(dir.names().len(), 4);
    }

    #[test]
    fn mid_listing_failure_is_fatal() {
        let dir = numbered(4);
        dir.fail_listing_after(2, io::ErrorKind::Other);

        let err = enforce(&dir, &RetentionPolicy::new(1).unwrap()).unwrap_err();

        assert!(matches!(err, RetentionError::Enumerate { .. }));
        assert_eq!(dir.names().len(), 4);
    }

    #[test]
    fn scan_limit_defers_the_rest() {
        let dir = numbered(10);
        let policy = RetentionPolicy::new(2).unwrap().with_scan_limit(3).unwrap();

        let report = enforce(&dir, &policy).unwrap();

        assert_eq!(report.matched, 10);
        assert_eq!(names(&report.deleted), vec!["core.0001", "core.0002", "core.0003"]);
        assert_eq!(report.deferred, 5);

        // Later passes converge.
        let second = enforce(&dir, &policy).unwrap();
        assert_eq!(second.deleted_count(), 3);
        let third = enforce(&dir, &policy).unwrap();
        assert_eq!(third.deleted_count(), 2);
        assert_eq!(third.deferred, 0);
        assert_eq!(dir.names(), vec!["core.0009", "core.0010"]);
    }

    #[test]
    fn scan_limit_still_keeps_the_oldest() {
        let dir = MemoryCoreDir::new("/var/core");
        // Listing order is arbitrary; the heap must still find the oldest.
        for i in [7, 3, 9, 1, 5, 2, 8, 4, 6] {
            dir.add(&format!("core.{i}"));
        }
        let policy = RetentionPolicy::new(5).unwrap().with_scan_limit(2).unwrap();

        let report = enforce(&dir, &policy).unwrap();

        assert_eq!(names(&report.deleted), vec!["core.1", "core.2"]);
        assert_eq!(report.deferred, 2);
    }

    #[test]
    fn unpadded_numbers_order_numerically() {
        let dir = MemoryCoreDir::new("/var/core");
        for name in ["core.10", "core.9", "core.100", "core.11"] {
            dir.add(name);
        }

        let report = enforce(&dir, &RetentionPolicy::new(2).unwrap()).unwrap();

        assert_eq!(names(&report.deleted), vec!["core.9", "core.10"]);
    }

    #[test]
    fn stamped_names_order_by_embedded_time() {
        let dir = MemoryCoreDir::new("/var/core");
        dir.add("core.2026-10-18_1792281600.000000002.b");
        dir.add("core.2026-10-18_1792281600.000000001.z");
        dir.add("core.2001-09-09_999999999.000000000.old");
        dir.add("core.2024-8-3_1725300000.legacy");
        dir.add("core.4242");

        let report = enforce(&dir, &RetentionPolicy::new(2).unwrap()).unwrap();

        assert_eq!(
            names(&report.deleted),
            vec![
                "core.4242",
                "core.2001-09-09_999999999.000000000.old",
                "core.2024-8-3_1725300000.legacy",
            ]
        );
    }

    #[test]
    fn retained_are_newer_than_deleted() {
        let dir = numbered(20);
        let report = enforce(&dir, &RetentionPolicy::new(7).unwrap()).unwrap();

        let newest_deleted = report
            .deleted
            .iter()
            .map(CoreName::order_key)
            .max()
            .unwrap();
        for kept in dir.names() {
            let key = CoreName::parse(&kept).unwrap().order_key();
            assert!(key > newest_deleted, "{kept} retained but not newer");
        }
        assert_eq!(dir.names().len(), 7);
    }
}
