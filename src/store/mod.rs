//! The single source of truth: an in-memory state document guarded by one
//! exclusive lock and rewritten atomically after every mutation.

use std::convert::Infallible;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fs2::FileExt;
use thiserror::Error;

use crate::sync_ext::MutexExt;

mod document;
mod persist;
pub use document::StateDocument;

#[cfg(test)]
mod tests;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store I/O failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state document at {path} is not parsable: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

struct StoreInner {
    path: PathBuf,
    doc: Mutex<StateDocument>,
    /// Held for the process lifetime so a second coordinator pointed at the
    /// same state file fails fast instead of interleaving writes.
    _lock_file: File,
}

/// Handle to the state document. Cheap to clone; all clones share the same
/// lock and persistence path.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

impl StateStore {
    /// Open (or create) the state document at `path`.
    ///
    /// Missing fields are back-filled from defaults; unknown fields are kept
    /// in per-record extras bags and survive the next persist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let lock_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| StoreError::Io {
                path: lock_path.clone(),
                source,
            })?;
        lock_file
            .try_lock_exclusive()
            .map_err(|source| StoreError::Io {
                path: lock_path,
                source,
            })?;

        let doc = if path.exists() {
            let mut doc = persist::read_document(&path)?;
            doc.backfill();
            doc
        } else {
            let doc = StateDocument::default();
            persist::write_document(&path, &doc)?;
            doc
        };

        Ok(Self {
            inner: Arc::new(StoreInner {
                path,
                doc: Mutex::new(doc),
                _lock_file: lock_file,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Run a fallible mutator under the exclusive lock.
    ///
    /// The document is persisted only when the mutator succeeds; on a mutator
    /// error or a persist failure the in-memory document is rolled back, so
    /// callers never observe half-applied mutations.
    pub fn try_mutate<R, E>(
        &self,
        f: impl FnOnce(&mut StateDocument) -> Result<R, E>,
    ) -> Result<Result<R, E>, StoreError> {
        let mut guard = self.inner.doc.lock_unpoisoned();
        let backup = guard.clone();
        match f(&mut guard) {
            Ok(value) => match persist::write_document(&self.inner.path, &guard) {
                Ok(()) => Ok(Ok(value)),
                Err(err) => {
                    *guard = backup;
                    Err(err)
                }
            },
            Err(err) => {
                *guard = backup;
                Ok(Err(err))
            }
        }
    }

    /// Run an infallible mutator under the exclusive lock and persist.
    pub fn mutate<R>(
        &self,
        f: impl FnOnce(&mut StateDocument) -> R,
    ) -> Result<R, StoreError> {
        match self.try_mutate(|doc| Ok::<_, Infallible>(f(doc)))? {
            Ok(value) => Ok(value),
            Err(infallible) => match infallible {},
        }
    }

    /// Read-only access under the lock. The closure must not stash mutable
    /// aliases; clone what needs to outlive the call.
    pub fn read<R>(&self, f: impl FnOnce(&StateDocument) -> R) -> R {
        let guard = self.inner.doc.lock_unpoisoned();
        f(&guard)
    }

    /// Clone of the full document, valid for the caller's own use.
    pub fn snapshot(&self) -> StateDocument {
        self.read(Clone::clone)
    }
}
