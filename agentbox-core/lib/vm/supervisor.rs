//! Supervision of the detached hypervisor process.
//!
//! The hypervisor runs fully detached from the launching session (its own
//! session via `setsid`, output captured to the VM log), so it survives the
//! controller's own lifecycle. A PID file tracks the process between
//! invocations; a record whose process is gone, or whose process image no
//! longer matches the hypervisor name, is stale and gets discarded. That
//! check is what makes the controller self-healing after crashes and immune
//! to PID reuse.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use agentbox_utils::{tail_lines, RetryPolicy};

use crate::config::{
    SandboxLayout, FIRECRACKER_PROCESS_NAME, KILL_EXIT_POLICY, LOG_TAIL_LINES,
    SOCKET_READY_POLICY, TERMINATE_GRACE_POLICY, VM_ID,
};
use crate::{AgentboxError, AgentboxResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The persisted identity of a launched hypervisor process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    /// PID of the detached hypervisor process.
    pub pid: u32,

    /// The control API socket the process serves.
    pub socket_path: PathBuf,

    /// Where the process's output is captured.
    pub log_path: PathBuf,
}

/// Launches, inspects, and terminates the hypervisor process.
#[async_trait]
pub trait VmSupervisor: Send + Sync {
    /// Pure read: returns the live instance, if any. Never touches disk
    /// state, so `status` stays side-effect free.
    async fn probe(&self) -> AgentboxResult<Option<InstanceRecord>>;

    /// Like [`VmSupervisor::probe`], but discards stale PID/socket artifacts
    /// on the way. Run at the head of every mutating command.
    async fn current(&self) -> AgentboxResult<Option<InstanceRecord>>;

    /// Spawns the hypervisor detached and waits (bounded) for its control
    /// socket. On readiness timeout the spawned process is killed and the
    /// record cleared, so an orphan is never left behind.
    async fn launch(&self) -> AgentboxResult<InstanceRecord>;

    /// Waits for the process to exit after the caller's graceful shutdown
    /// signal, escalating to SIGKILL when the grace budget runs out. Always
    /// clears the PID file and control socket.
    async fn terminate(&self, record: &InstanceRecord) -> AgentboxResult<()>;

    /// Kills the process immediately, without a grace wait. Used after
    /// pausing: a paused guest cannot act on a shutdown signal anyway.
    async fn kill(&self, record: &InstanceRecord) -> AgentboxResult<()>;
}

/// [`VmSupervisor`] implementation for the Firecracker hypervisor.
#[derive(Debug)]
pub struct FirecrackerSupervisor {
    layout: SandboxLayout,
    readiness: RetryPolicy,
    grace: RetryPolicy,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FirecrackerSupervisor {
    /// Creates a supervisor with the default readiness and grace policies.
    pub fn new(layout: SandboxLayout) -> Self {
        Self::with_policies(layout, SOCKET_READY_POLICY, TERMINATE_GRACE_POLICY)
    }

    /// Creates a supervisor with explicit polling policies.
    pub fn with_policies(layout: SandboxLayout, readiness: RetryPolicy, grace: RetryPolicy) -> Self {
        Self {
            layout,
            readiness,
            grace,
        }
    }

    fn record(&self, pid: u32) -> InstanceRecord {
        InstanceRecord {
            pid,
            socket_path: self.layout.socket_path(),
            log_path: self.layout.log_path(),
        }
    }

    /// Removes the PID file and control socket, ignoring files already gone.
    async fn remove_instance_files(&self) -> AgentboxResult<()> {
        for path in [self.layout.pid_path(), self.layout.socket_path()] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!("removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl VmSupervisor for FirecrackerSupervisor {
    async fn probe(&self) -> AgentboxResult<Option<InstanceRecord>> {
        let pid_path = self.layout.pid_path();
        if !pid_path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&pid_path).await?;
        match content.trim().parse::<u32>() {
            Ok(pid) if process_matches(pid) => Ok(Some(self.record(pid))),
            _ => Ok(None),
        }
    }

    async fn current(&self) -> AgentboxResult<Option<InstanceRecord>> {
        let pid_path = self.layout.pid_path();
        if !pid_path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&pid_path).await?;
        match content.trim().parse::<u32>() {
            Ok(pid) if process_matches(pid) => Ok(Some(self.record(pid))),
            Ok(pid) => {
                tracing::warn!("found stale PID file for process {}, cleaning up", pid);
                self.remove_instance_files().await?;
                Ok(None)
            }
            Err(_) => {
                tracing::warn!("found invalid PID in {}, cleaning up", pid_path.display());
                self.remove_instance_files().await?;
                Ok(None)
            }
        }
    }

    async fn launch(&self) -> AgentboxResult<InstanceRecord> {
        if let Some(record) = self.current().await? {
            return Err(AgentboxError::AlreadyRunning(record.pid));
        }

        let socket = self.layout.socket_path();
        if socket.exists() {
            tracing::warn!("removing stale control socket {}", socket.display());
            tokio::fs::remove_file(&socket).await?;
        }

        let log_path = self.layout.log_path();
        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        let stderr_log = log.try_clone()?;

        let mut command = tokio::process::Command::new(self.layout.firecracker_bin());
        command
            .arg("--api-sock")
            .arg(&socket)
            .arg("--id")
            .arg(VM_ID)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(stderr_log));

        // The VM must survive the controller's own exit.
        unsafe {
            command.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let child = command.spawn()?;
        let pid = child.id().ok_or_else(|| {
            AgentboxError::InvalidPidFile("spawned hypervisor reported no PID".to_string())
        })?;

        tokio::fs::write(self.layout.pid_path(), pid.to_string()).await?;
        tracing::info!("started hypervisor process with PID: {}", pid);

        let ready = self.readiness.wait_for(|| socket.exists()).await;
        if !ready {
            tracing::error!(
                "hypervisor API socket not ready after {:?}, killing PID {}",
                self.readiness.max_wait(),
                pid
            );
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
            let log_tail = tail_lines(&log_path, LOG_TAIL_LINES).unwrap_or_default();
            self.remove_instance_files().await?;
            return Err(AgentboxError::StartupTimeout {
                attempts: self.readiness.max_attempts(),
                log_tail,
            });
        }

        Ok(self.record(pid))
    }

    async fn terminate(&self, record: &InstanceRecord) -> AgentboxResult<()> {
        let pid = record.pid;

        let exited = self.grace.wait_for(|| !process_alive(pid)).await;
        if !exited {
            tracing::warn!(
                "hypervisor PID {} still alive after {:?} grace, sending SIGKILL",
                pid,
                self.grace.max_wait()
            );
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
            KILL_EXIT_POLICY.wait_for(|| !process_alive(pid)).await;
        }

        self.remove_instance_files().await?;
        tracing::info!("stopped hypervisor process (PID: {})", pid);
        Ok(())
    }

    async fn kill(&self, record: &InstanceRecord) -> AgentboxResult<()> {
        let pid = record.pid;
        let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
        KILL_EXIT_POLICY.wait_for(|| !process_alive(pid)).await;

        self.remove_instance_files().await?;
        tracing::info!("killed hypervisor process (PID: {})", pid);
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Whether a process with this PID exists at all.
fn process_alive(pid: u32) -> bool {
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Whether the PID refers to a live process whose image is the hypervisor.
/// The comm comparison is what defeats PID reuse between runs.
fn process_matches(pid: u32) -> bool {
    if !process_alive(pid) {
        return false;
    }

    match std::fs::read_to_string(format!("/proc/{}/comm", pid)) {
        Ok(comm) => comm.trim() == FIRECRACKER_PROCESS_NAME,
        Err(_) => false,
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn supervisor_in(dir: &std::path::Path) -> FirecrackerSupervisor {
        let fast = RetryPolicy::new(Duration::from_millis(1), 3);
        FirecrackerSupervisor::with_policies(SandboxLayout::new(dir), fast, fast)
    }

    async fn prepare_env(supervisor: &FirecrackerSupervisor) {
        supervisor.layout.ensure_dirs().await.unwrap();
    }

    /// PID of a process that has already exited.
    fn dead_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[tokio::test]
    async fn test_current_discards_dead_pid() {
        let temp = tempfile::tempdir().unwrap();
        let supervisor = supervisor_in(temp.path());
        prepare_env(&supervisor).await;

        std::fs::write(supervisor.layout.pid_path(), dead_pid().to_string()).unwrap();
        std::fs::write(supervisor.layout.socket_path(), b"").unwrap();

        assert!(supervisor.current().await.unwrap().is_none());
        assert!(!supervisor.layout.pid_path().exists());
        assert!(!supervisor.layout.socket_path().exists());
    }

    #[tokio::test]
    async fn test_current_discards_reused_pid() {
        let temp = tempfile::tempdir().unwrap();
        let supervisor = supervisor_in(temp.path());
        prepare_env(&supervisor).await;

        // Our own PID is alive but its comm is not the hypervisor image, the
        // exact shape of PID reuse after a crash.
        std::fs::write(supervisor.layout.pid_path(), std::process::id().to_string()).unwrap();

        assert!(supervisor.current().await.unwrap().is_none());
        assert!(!supervisor.layout.pid_path().exists());
    }

    #[tokio::test]
    async fn test_current_discards_garbage_pid_file() {
        let temp = tempfile::tempdir().unwrap();
        let supervisor = supervisor_in(temp.path());
        prepare_env(&supervisor).await;

        std::fs::write(supervisor.layout.pid_path(), "not-a-pid").unwrap();

        assert!(supervisor.current().await.unwrap().is_none());
        assert!(!supervisor.layout.pid_path().exists());
    }

    #[tokio::test]
    async fn test_probe_never_mutates() {
        let temp = tempfile::tempdir().unwrap();
        let supervisor = supervisor_in(temp.path());
        prepare_env(&supervisor).await;

        std::fs::write(supervisor.layout.pid_path(), dead_pid().to_string()).unwrap();

        assert!(supervisor.probe().await.unwrap().is_none());
        // The stale file is still there; only `current` reconciles.
        assert!(supervisor.layout.pid_path().exists());
    }

    #[tokio::test]
    async fn test_terminate_dead_process_clears_files() {
        let temp = tempfile::tempdir().unwrap();
        let supervisor = supervisor_in(temp.path());
        prepare_env(&supervisor).await;

        let record = supervisor.record(dead_pid());
        std::fs::write(supervisor.layout.pid_path(), record.pid.to_string()).unwrap();
        std::fs::write(supervisor.layout.socket_path(), b"").unwrap();

        supervisor.terminate(&record).await.unwrap();
        assert!(!supervisor.layout.pid_path().exists());
        assert!(!supervisor.layout.socket_path().exists());
    }

    #[tokio::test]
    async fn test_launch_missing_binary_fails_without_record() {
        let temp = tempfile::tempdir().unwrap();
        let supervisor = supervisor_in(temp.path());
        prepare_env(&supervisor).await;

        // No hypervisor binary was provisioned; spawn fails with Io and no
        // PID file may be left behind.
        let err = supervisor.launch().await.unwrap_err();
        assert!(matches!(err, AgentboxError::Io(_)));
        assert!(!supervisor.layout.pid_path().exists());
    }
}
