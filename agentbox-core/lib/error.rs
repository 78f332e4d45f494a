//! The error taxonomy for sandbox VM lifecycle operations.

use std::path::PathBuf;

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of an agentbox operation.
pub type AgentboxResult<T> = Result<T, AgentboxError>;

/// An error from an agentbox operation.
///
/// Provisioning, network, and control-plane failures are all fatal to the
/// command that hit them; the lifecycle machine surfaces the first failure
/// and stops rather than attempting compensating actions.
#[derive(Debug, Error)]
pub enum AgentboxError {
    /// An asset could not be fetched, or the fetched archive did not contain
    /// the expected executable.
    #[error("asset download failed: {0}")]
    Download(String),

    /// The host does not expose usable hardware virtualization. Fatal and
    /// non-retryable.
    #[error("virtualization check failed: {0}")]
    Verification(String),

    /// A host network device operation failed.
    #[error("network device operation failed: {0}")]
    Device(String),

    /// The command was refused because a live hypervisor already exists for
    /// this working directory.
    #[error("sandbox VM is already running (PID: {0})")]
    AlreadyRunning(u32),

    /// The command requires a running VM and none exists.
    #[error("sandbox VM is not running")]
    NotRunning,

    /// The hypervisor's control socket never appeared. The partially started
    /// process has already been killed and its record cleared.
    #[error("hypervisor API socket not ready after {attempts} attempts; log tail:\n{log_tail}")]
    StartupTimeout {
        /// How many readiness polls were made before giving up.
        attempts: u32,
        /// The last lines of the captured hypervisor log, for diagnosis.
        log_tail: String,
    },

    /// The hypervisor API answered with an error status (>= 400).
    #[error("hypervisor API returned {status} on {endpoint}: {message}")]
    Api {
        /// HTTP status code of the response.
        status: u16,
        /// The API endpoint that was hit.
        endpoint: String,
        /// The response body.
        message: String,
    },

    /// The hypervisor API socket could not be reached at the transport level.
    #[error("hypervisor API unreachable: {0}")]
    ControlPlaneUnreachable(String),

    /// A snapshot load was requested but a file of the pair is missing or empty.
    #[error("snapshot file missing or empty: {}", .0.display())]
    SnapshotNotFound(PathBuf),

    /// A snapshot create or load failed at the control plane.
    #[error("snapshot operation failed: {0}")]
    Snapshot(String),

    /// Another command already holds the working directory's advisory lock.
    #[error("another command is already in progress for this working directory")]
    CommandInProgress,

    /// The PID record on disk could not be interpreted.
    #[error("invalid PID file: {0}")]
    InvalidPidFile(String),

    /// An I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A payload serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
