//! The on-disk layout of a sandbox working directory.

use std::path::{Path, PathBuf};

use agentbox_utils::{
    API_SOCKET_FILENAME, ASSETS_SUBDIR, COMMAND_LOCK_FILENAME, FIRECRACKER_BIN_FILENAME,
    KERNEL_IMAGE_FILENAME, ROOTFS_IMAGE_FILENAME, SANDBOX_ENV_DIR, SNAPSHOTS_SUBDIR,
    SNAPSHOT_MEM_FILENAME, SNAPSHOT_STATE_FILENAME, VM_LOG_FILENAME, VM_PID_FILENAME,
};

use crate::AgentboxResult;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// All paths the controller persists under one working directory.
///
/// The working directory is the sole persistence boundary: everything lives
/// under its `.abx` subdirectory, and nothing is shared across instances.
#[derive(Debug, Clone)]
pub struct SandboxLayout {
    working_dir: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SandboxLayout {
    /// Creates the layout rooted at `working_dir`.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    /// The working directory this layout is rooted at.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// The sandbox state directory (`.abx`).
    pub fn env_dir(&self) -> PathBuf {
        self.working_dir.join(SANDBOX_ENV_DIR)
    }

    /// The directory holding downloaded assets.
    pub fn assets_dir(&self) -> PathBuf {
        self.env_dir().join(ASSETS_SUBDIR)
    }

    /// The directory holding the snapshot pair.
    pub fn snapshots_dir(&self) -> PathBuf {
        self.env_dir().join(SNAPSHOTS_SUBDIR)
    }

    /// The hypervisor's captured log.
    pub fn log_path(&self) -> PathBuf {
        self.env_dir().join(VM_LOG_FILENAME)
    }

    /// The PID record of the detached hypervisor process.
    pub fn pid_path(&self) -> PathBuf {
        self.env_dir().join(VM_PID_FILENAME)
    }

    /// The control API Unix socket.
    pub fn socket_path(&self) -> PathBuf {
        self.env_dir().join(API_SOCKET_FILENAME)
    }

    /// The advisory command lock file.
    pub fn lock_path(&self) -> PathBuf {
        self.env_dir().join(COMMAND_LOCK_FILENAME)
    }

    /// The hypervisor executable.
    pub fn firecracker_bin(&self) -> PathBuf {
        self.assets_dir().join(FIRECRACKER_BIN_FILENAME)
    }

    /// The guest kernel image.
    pub fn kernel_image(&self) -> PathBuf {
        self.assets_dir().join(KERNEL_IMAGE_FILENAME)
    }

    /// The guest root filesystem image.
    pub fn rootfs_image(&self) -> PathBuf {
        self.assets_dir().join(ROOTFS_IMAGE_FILENAME)
    }

    /// The guest memory image half of the snapshot pair.
    pub fn snapshot_mem(&self) -> PathBuf {
        self.snapshots_dir().join(SNAPSHOT_MEM_FILENAME)
    }

    /// The VM execution state half of the snapshot pair.
    pub fn snapshot_state(&self) -> PathBuf {
        self.snapshots_dir().join(SNAPSHOT_STATE_FILENAME)
    }

    /// Creates the state, assets, and snapshots directories if missing.
    pub async fn ensure_dirs(&self) -> AgentboxResult<()> {
        tokio::fs::create_dir_all(self.assets_dir()).await?;
        tokio::fs::create_dir_all(self.snapshots_dir()).await?;
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
