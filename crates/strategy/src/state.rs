//! Persisted Heikin-Ashi state.
//!
//! The last HA open is the only value carried from one cycle to the next.
//! A missing or unreadable record is not fatal: callers fall back to the
//! seed policy.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use common::Error;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Record persisted between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HaState {
    pub last_ha_open: f64,
}

/// Storage for the HA seed.
pub trait StateStore {
    /// `None` means "no usable state": absent, unreadable or corrupt.
    fn load(&self) -> Option<HaState>;

    fn save(&self, state: HaState) -> Result<(), Error>;
}

/// JSON file store.
///
/// Reads and writes hold an exclusive advisory lock on a sidecar `.lock`
/// file, and writes go through a temp file + rename so readers never see a
/// partial record.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("lock");
        Self { path, lock_path }
    }

    fn lock(&self) -> std::io::Result<File> {
        if let Some(parent) = self.lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?;
        file.lock_exclusive()?;
        Ok(file)
    }

    fn read_record(&self) -> Option<HaState> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No HA state at {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!(
                    "HA state at {} unreadable, treating as absent: {}",
                    self.path.display(),
                    e
                );
                return None;
            }
        };

        match serde_json::from_str::<HaState>(&raw) {
            Ok(state) if state.last_ha_open.is_finite() => Some(state),
            Ok(state) => {
                warn!(
                    "HA state at {} holds non-finite open {}, treating as absent",
                    self.path.display(),
                    state.last_ha_open
                );
                None
            }
            Err(e) => {
                warn!(
                    "HA state at {} corrupt, treating as absent: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    fn write_record(&self, state: HaState) -> Result<(), Error> {
        let body = serde_json::to_string(&state)?;
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(body.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Option<HaState> {
        let lock = match self.lock() {
            Ok(f) => f,
            Err(e) => {
                warn!("Could not lock {}: {}", self.lock_path.display(), e);
                return None;
            }
        };
        let state = self.read_record();
        let _ = lock.unlock();
        state
    }

    fn save(&self, state: HaState) -> Result<(), Error> {
        let lock = self.lock()?;
        let result = self.write_record(state);
        let _ = lock.unlock();
        if result.is_ok() {
            debug!(
                "Saved HA state {} to {}",
                state.last_ha_open,
                self.path.display()
            );
        }
        result
    }
}

/// In-process store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: Mutex<Option<HaState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: HaState) -> Self {
        Self {
            inner: Mutex::new(Some(state)),
        }
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Option<HaState> {
        *self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn save(&self, state: HaState) -> Result<(), Error> {
        *self.inner.lock().unwrap_or_else(|p| p.into_inner()) = Some(state);
        Ok(())
    }
}
