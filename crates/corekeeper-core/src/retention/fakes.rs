//! In-memory [`CoreDir`] for tests.
//!
//! Lets tests script the races a shared core directory produces: entries that
//! vanish between listing and removal, entries we may not delete, and
//! listings that fail up front or halfway through.

use std::collections::{BTreeSet, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::CoreDir;

#[derive(Debug, Clone, Copy)]
enum ListingFailure {
    Open(io::ErrorKind),
    After(usize, io::ErrorKind),
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeSet<String>,
    vanish: HashSet<String>,
    deny: HashSet<String>,
    listing_failure: Option<ListingFailure>,
}

/// Core directory held in memory. Entry names are kept sorted.
#[derive(Debug)]
pub struct MemoryCoreDir {
    path: PathBuf,
    state: Mutex<State>,
}

impl MemoryCoreDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(&self, name: &str) {
        self.state().entries.insert(name.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state().entries.contains(name)
    }

    /// Current entry names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.state().entries.iter().cloned().collect()
    }

    /// `name` is removed by a sibling right before we try to: our removal
    /// reports `NotFound`.
    pub fn vanish_on_remove(&self, name: &str) {
        self.state().vanish.insert(name.to_string());
    }

    /// Removing `name` fails with `PermissionDenied`.
    pub fn deny_remove(&self, name: &str) {
        self.state().deny.insert(name.to_string());
    }

    /// Opening the directory fails with `kind`.
    pub fn fail_listing(&self, kind: io::ErrorKind) {
        self.state().listing_failure = Some(ListingFailure::Open(kind));
    }

    /// The listing yields `count` entries, then fails with `kind`.
    pub fn fail_listing_after(&self, count: usize, kind: io::ErrorKind) {
        self.state().listing_failure = Some(ListingFailure::After(count, kind));
    }
}

impl CoreDir for MemoryCoreDir {
    fn path(&self) -> &Path {
        &self.path
    }

    fn entries(&self) -> io::Result<Box<dyn Iterator<Item = io::Result<String>> + '_>> {
        let state = self.state();
        let names: Vec<io::Result<String>> = state.entries.iter().cloned().map(Ok).collect();
        match state.listing_failure {
            None => Ok(Box::new(names.into_iter())),
            Some(ListingFailure::Open(kind)) => Err(io::Error::new(kind, "listing refused")),
            Some(ListingFailure::After(count, kind)) => {
                let failure = std::iter::once(Err(io::Error::new(kind, "listing interrupted")));
                Ok(Box::new(names.into_iter().take(count).chain(failure)))
            }
        }
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        let mut state = self.state();
        if state.vanish.remove(name) {
            state.entries.remove(name);
            return Err(io::Error::new(io::ErrorKind::NotFound, "removed by sibling"));
        }
        if state.deny.contains(name) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "not allowed"));
        }
        if state.entries.remove(name) {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such entry"))
        }
    }
}
