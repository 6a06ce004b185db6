//! JSON file store with atomic, serialized writes.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, PoisonError, Weak};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{STORE_VERSION, StoreFile};
use crate::domain::StoreError;
use crate::ports::TaskStore;

/// One write lock per store path, shared by every live handle in the
/// process. Entries die with their last handle.
static PATH_LOCKS: LazyLock<std::sync::Mutex<HashMap<PathBuf, Weak<Mutex<()>>>>> =
    LazyLock::new(Default::default);

fn lock_for(path: &Path) -> Arc<Mutex<()>> {
    let mut locks = PATH_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(lock) = locks.get(path).and_then(Weak::upgrade) {
        return lock;
    }
    locks.retain(|_, lock| lock.strong_count() > 0);
    let lock = Arc::new(Mutex::new(()));
    locks.insert(path.to_path_buf(), Arc::downgrade(&lock));
    lock
}

/// `tasks.json` -> `tasks.json.lock`
fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

/// Exclusive advisory lock on `<store>.lock`, released when the file closes.
#[derive(Debug)]
struct OwnerLock {
    _file: File,
}

impl OwnerLock {
    fn try_acquire(lock_path: &Path) -> Result<Self, StoreError> {
        let io_err = |source| StoreError::Io {
            path: lock_path.to_path_buf(),
            source,
        };
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path)
            .map_err(io_err)?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(StoreError::Locked {
                    lock_path: lock_path.to_path_buf(),
                });
            }
            Err(TryLockError::Error(err)) => return Err(io_err(err)),
        }

        // pid for whoever finds the lock file; the lock itself is what counts
        file.set_len(0).map_err(io_err)?;
        writeln!(file, "{}", std::process::id()).map_err(io_err)?;
        Ok(Self { _file: file })
    }
}

/// Persists the whole task collection as one pretty-printed JSON document.
///
/// - `load` treats a missing or corrupt file as an empty store.
/// - `save` writes a uniquely named temp file next to the target and renames
///   it over the target, holding the per-path lock for the whole write.
/// - `acquire` takes an exclusive advisory lock on `<path>.lock`, so only one
///   runner (in any process) owns the document at a time. Clones share it.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
    owner: Arc<std::sync::Mutex<Option<OwnerLock>>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let path = std::path::absolute(&path).unwrap_or(path);
        let lock = lock_for(&path);
        Self {
            path,
            lock,
            owner: Arc::default(),
        }
    }

    /// `<config_dir>/stride/tasks.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stride").join("tasks.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        lock_path_for(&self.path)
    }
}

#[async_trait]
impl TaskStore for JsonFileStore {
    async fn load(&self) -> StoreFile {
        let path = self.path.clone();
        let read = tokio::task::spawn_blocking(move || fs::read_to_string(&path)).await;

        let contents = match read {
            Ok(Ok(contents)) => contents,
            Ok(Err(err)) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no task store yet, starting empty");
                return StoreFile::default();
            }
            Ok(Err(err)) => {
                warn!(path = %self.path.display(), error = %err, "unreadable task store, starting empty");
                return StoreFile::default();
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "task store read aborted, starting empty");
                return StoreFile::default();
            }
        };

        match serde_json::from_str::<StoreFile>(&contents) {
            Ok(store) => {
                if store.version != STORE_VERSION {
                    warn!(
                        path = %self.path.display(),
                        version = store.version,
                        expected = STORE_VERSION,
                        "task store version differs"
                    );
                }
                debug!(path = %self.path.display(), tasks = store.tasks.len(), "task store loaded");
                store
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "corrupt task store, starting empty");
                StoreFile::default()
            }
        }
    }

    async fn save(&self, store: &StoreFile) -> Result<(), StoreError> {
        let mut buf = serde_json::to_string_pretty(store)?;
        buf.push('\n');

        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, buf.as_bytes()))
            .await
            .map_err(|err| StoreError::Background(err.to_string()))??;

        debug!(path = %self.path.display(), tasks = store.tasks.len(), "task store saved");
        Ok(())
    }

    async fn acquire(&self) -> Result<(), StoreError> {
        let mut owner = self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        if owner.is_none() {
            let lock_path = self.lock_path();
            *owner = Some(OwnerLock::try_acquire(&lock_path)?);
            debug!(path = %lock_path.display(), "task store lock acquired");
        }
        Ok(())
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(io_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(io_err)?;
    tmp.write_all(contents).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|err| io_err(err.error))?;
    Ok(())
}
