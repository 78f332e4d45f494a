//! Paired memory/state snapshots of a paused VM.
//!
//! A paused sandbox holds no live process: it is exactly these two files on
//! disk. They are created together and loaded together; one without the
//! other is treated as no snapshot at all.

use std::path::PathBuf;

use getset::Getters;

use crate::vm::ControlPlane;
use crate::{AgentboxError, AgentboxResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The two files that together represent a paused VM.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct SnapshotPair {
    /// The guest memory image.
    mem_file: PathBuf,

    /// The VM execution state.
    state_file: PathBuf,
}

/// Creates, loads, and purges the snapshot pair, delegating the actual
/// snapshot I/O to the control plane.
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    pair: SnapshotPair,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SnapshotPair {
    /// Creates a pair from its two file paths.
    pub fn new(mem_file: impl Into<PathBuf>, state_file: impl Into<PathBuf>) -> Self {
        Self {
            mem_file: mem_file.into(),
            state_file: state_file.into(),
        }
    }
}

impl SnapshotManager {
    /// Creates a manager for `pair`.
    pub fn new(pair: SnapshotPair) -> Self {
        Self { pair }
    }

    /// The pair this manager operates on.
    pub fn pair(&self) -> &SnapshotPair {
        &self.pair
    }

    /// Whether a loadable snapshot is present: both files exist and are
    /// non-empty.
    pub fn is_present(&self) -> bool {
        self.verify().is_ok()
    }

    /// Fails with [`AgentboxError::SnapshotNotFound`] naming the first file
    /// of the pair that is absent or empty.
    pub fn verify(&self) -> AgentboxResult<()> {
        for path in [self.pair.mem_file(), self.pair.state_file()] {
            match std::fs::metadata(path) {
                Ok(meta) if meta.is_file() && meta.len() > 0 => {}
                _ => return Err(AgentboxError::SnapshotNotFound(path.clone())),
            }
        }
        Ok(())
    }

    /// Writes a fresh snapshot of the paused VM.
    ///
    /// Any pre-existing pair files are removed first so a failed write can
    /// never leave a mix of stale and fresh snapshot data. The caller
    /// guarantees the VM is paused; that ordering is not re-validated here.
    pub async fn create(&self, api: &dyn ControlPlane) -> AgentboxResult<()> {
        for path in [self.pair.mem_file(), self.pair.state_file()] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => tracing::debug!("removed stale snapshot file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        api.create_snapshot(&self.pair)
            .await
            .map_err(into_snapshot_error)?;

        tracing::info!(
            "created snapshot pair at {} and {}",
            self.pair.mem_file().display(),
            self.pair.state_file().display()
        );

        Ok(())
    }

    /// Loads the pair into a freshly launched hypervisor.
    ///
    /// The pair is consumed logically, not physically: the files stay on
    /// disk until [`SnapshotManager::purge`].
    pub async fn load(&self, api: &dyn ControlPlane) -> AgentboxResult<()> {
        self.verify()?;
        api.load_snapshot(&self.pair)
            .await
            .map_err(into_snapshot_error)
    }

    /// Deletes both files of the pair. Safe to call when no snapshot exists.
    pub async fn purge(&self) -> AgentboxResult<()> {
        for path in [self.pair.mem_file(), self.pair.state_file()] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => tracing::info!("removed snapshot file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Control-plane failures during snapshot work are reported in snapshot
/// terms; everything else propagates unchanged.
fn into_snapshot_error(err: AgentboxError) -> AgentboxError {
    match err {
        AgentboxError::Api {
            status,
            endpoint,
            message,
        } => AgentboxError::Snapshot(format!("{} returned {}: {}", endpoint, status, message)),
        other => other,
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
