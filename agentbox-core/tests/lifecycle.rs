//! Integration tests driving the lifecycle state machine against recording
//! fakes, one per collaborator, so command ordering and preconditions are
//! checked without a hypervisor, KVM, or root privileges.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use agentbox_core::config::{MachineResources, NetworkLink, SandboxLayout};
use agentbox_core::management::{LifecycleState, Sandbox};
use agentbox_core::vm::{
    AssetProvisioner, AssetSet, ControlPlane, InstanceRecord, NetworkBackend, SnapshotPair,
    VmSupervisor,
};
use agentbox_core::{AgentboxError, AgentboxResult};

//--------------------------------------------------------------------------------------------------
// Fakes
//--------------------------------------------------------------------------------------------------

/// Shared, ordered record of every collaborator call.
#[derive(Default)]
struct CallLog(Mutex<Vec<String>>);

impl CallLog {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn count_of(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }
}

struct FakeProvisioner {
    layout: SandboxLayout,
    log: Arc<CallLog>,
}

#[async_trait]
impl AssetProvisioner for FakeProvisioner {
    async fn ensure_assets(&self) -> AgentboxResult<AssetSet> {
        self.log.push("ensure_assets");
        Ok(AssetSet::new(
            self.layout.firecracker_bin(),
            self.layout.kernel_image(),
            self.layout.rootfs_image(),
        ))
    }
}

struct FakeNetwork {
    log: Arc<CallLog>,
}

#[async_trait]
impl NetworkBackend for FakeNetwork {
    async fn setup(&self, link: &NetworkLink) -> AgentboxResult<()> {
        self.log
            .push(format!("net_setup {} {}", link.get_device(), link.get_mac()));
        Ok(())
    }

    async fn teardown(&self, device: &str) -> AgentboxResult<()> {
        self.log.push(format!("net_teardown {}", device));
        Ok(())
    }
}

struct FakeSupervisor {
    layout: SandboxLayout,
    log: Arc<CallLog>,
    running: Arc<Mutex<Option<u32>>>,
    next_pid: AtomicU32,
}

impl FakeSupervisor {
    fn record(&self, pid: u32) -> InstanceRecord {
        InstanceRecord {
            pid,
            socket_path: self.layout.socket_path(),
            log_path: self.layout.log_path(),
        }
    }
}

#[async_trait]
impl VmSupervisor for FakeSupervisor {
    async fn probe(&self) -> AgentboxResult<Option<InstanceRecord>> {
        Ok(self.running.lock().unwrap().map(|pid| self.record(pid)))
    }

    async fn current(&self) -> AgentboxResult<Option<InstanceRecord>> {
        Ok(self.running.lock().unwrap().map(|pid| self.record(pid)))
    }

    async fn launch(&self) -> AgentboxResult<InstanceRecord> {
        let mut running = self.running.lock().unwrap();
        if let Some(pid) = *running {
            return Err(AgentboxError::AlreadyRunning(pid));
        }
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        *running = Some(pid);
        self.log.push("launch");
        Ok(self.record(pid))
    }

    async fn terminate(&self, _record: &InstanceRecord) -> AgentboxResult<()> {
        self.log.push("terminate");
        *self.running.lock().unwrap() = None;
        Ok(())
    }

    async fn kill(&self, _record: &InstanceRecord) -> AgentboxResult<()> {
        self.log.push("kill");
        *self.running.lock().unwrap() = None;
        Ok(())
    }
}

struct FakeControlPlane {
    log: Arc<CallLog>,
    fail_machine_config: bool,
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn put_boot_source(&self, _kernel: &Path, boot_args: &str) -> AgentboxResult<()> {
        self.log.push(format!("api_boot_source {}", boot_args));
        Ok(())
    }

    async fn put_root_drive(&self, _rootfs: &Path) -> AgentboxResult<()> {
        self.log.push("api_root_drive");
        Ok(())
    }

    async fn put_network_interface(&self, link: &NetworkLink) -> AgentboxResult<()> {
        self.log.push(format!(
            "api_network_interface {} {}",
            link.get_device(),
            link.get_mac()
        ));
        Ok(())
    }

    async fn put_machine_config(&self, resources: &MachineResources) -> AgentboxResult<()> {
        if self.fail_machine_config {
            return Err(AgentboxError::Api {
                status: 400,
                endpoint: "/machine-config".to_string(),
                message: "invalid vcpu count".to_string(),
            });
        }
        self.log
            .push(format!("api_machine_config {}", resources.get_vcpus()));
        Ok(())
    }

    async fn start_instance(&self) -> AgentboxResult<()> {
        self.log.push("api_instance_start");
        Ok(())
    }

    async fn pause_vm(&self) -> AgentboxResult<()> {
        self.log.push("api_pause");
        Ok(())
    }

    async fn resume_vm(&self) -> AgentboxResult<()> {
        self.log.push("api_resume");
        Ok(())
    }

    async fn create_snapshot(&self, pair: &SnapshotPair) -> AgentboxResult<()> {
        self.log.push("api_snapshot_create");
        std::fs::write(pair.mem_file(), b"guest memory").unwrap();
        std::fs::write(pair.state_file(), b"vm state").unwrap();
        Ok(())
    }

    async fn load_snapshot(&self, _pair: &SnapshotPair) -> AgentboxResult<()> {
        self.log.push("api_snapshot_load");
        Ok(())
    }

    async fn send_ctrl_alt_del(&self) -> AgentboxResult<()> {
        self.log.push("api_ctrl_alt_del");
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Harness
//--------------------------------------------------------------------------------------------------

struct Harness {
    sandbox: Sandbox,
    log: Arc<CallLog>,
    /// Shared handle to the fake process table, for simulating out-of-band
    /// crashes.
    running: Arc<Mutex<Option<u32>>>,
    _temp: tempfile::TempDir,
}

fn harness() -> Harness {
    harness_with(false)
}

fn harness_with(fail_machine_config: bool) -> Harness {
    let temp = tempfile::tempdir().unwrap();
    let layout = SandboxLayout::new(temp.path());
    let log = Arc::new(CallLog::default());
    let running = Arc::new(Mutex::new(None));

    let sandbox = Sandbox::with_collaborators(
        layout.clone(),
        NetworkLink::default(),
        MachineResources::default(),
        Box::new(FakeProvisioner {
            layout: layout.clone(),
            log: log.clone(),
        }),
        Box::new(FakeNetwork { log: log.clone() }),
        Box::new(FakeSupervisor {
            layout,
            log: log.clone(),
            running: running.clone(),
            next_pid: AtomicU32::new(4000),
        }),
        Box::new(FakeControlPlane {
            log: log.clone(),
            fail_machine_config,
        }),
    );

    Harness {
        sandbox,
        log,
        running,
        _temp: temp,
    }
}

/// The positions of `needles` within `calls`, asserting each is present
/// exactly where expected relative to the previous one.
fn assert_order(calls: &[String], needles: &[&str]) {
    let mut from = 0;
    for needle in needles {
        let position = calls[from..]
            .iter()
            .position(|call| call.starts_with(needle))
            .unwrap_or_else(|| panic!("expected `{}` after index {} in {:?}", needle, from, calls));
        from += position + 1;
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_start_issues_configuration_in_fixed_order() {
    let h = harness();
    let record = h.sandbox.start().await.unwrap();
    assert_eq!(record.pid, 4000);

    assert_order(
        &h.log.calls(),
        &[
            "ensure_assets",
            "net_setup",
            "launch",
            "api_boot_source",
            "api_root_drive",
            "api_network_interface",
            "api_machine_config",
            "api_instance_start",
        ],
    );
}

#[tokio::test]
async fn test_start_stop_start_boots_again_with_same_identity() {
    let h = harness();

    h.sandbox.start().await.unwrap();
    assert!(h.sandbox.stop().await.unwrap());
    h.sandbox.start().await.unwrap();

    assert_eq!(h.log.count_of("launch"), 2);
    assert_order(&h.log.calls(), &["api_ctrl_alt_del", "terminate", "net_teardown"]);

    // Both boots configured the identical network identity.
    let interfaces: Vec<String> = h
        .log
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("api_network_interface"))
        .collect();
    assert_eq!(interfaces.len(), 2);
    assert_eq!(interfaces[0], interfaces[1]);
}

#[tokio::test]
async fn test_start_when_running_is_refused_and_leaves_instance_untouched() {
    let h = harness();
    let record = h.sandbox.start().await.unwrap();

    let err = h.sandbox.start().await.unwrap_err();
    match err {
        AgentboxError::AlreadyRunning(pid) => assert_eq!(pid, record.pid),
        other => panic!("expected AlreadyRunning, got {:?}", other),
    }

    // One launch, one network setup: the refused command did nothing.
    assert_eq!(h.log.count_of("launch"), 1);
    assert_eq!(h.log.count_of("net_setup"), 1);
    assert_eq!(*h.running.lock().unwrap(), Some(record.pid));
}

#[tokio::test]
async fn test_stop_when_stopped_reports_not_running() {
    let h = harness();
    assert!(!h.sandbox.stop().await.unwrap());

    assert_eq!(h.log.count_of("terminate"), 0);
    // Teardown still runs so crash leftovers are cleared.
    assert_eq!(h.log.count_of("net_teardown"), 1);
}

#[test_log::test(tokio::test)]
async fn test_pause_snapshots_then_fully_stops() {
    let h = harness();
    h.sandbox.start().await.unwrap();
    h.sandbox.pause().await.unwrap();

    assert_order(
        &h.log.calls(),
        &["api_pause", "api_snapshot_create", "kill", "net_teardown"],
    );

    let status = h.sandbox.status().await.unwrap();
    assert_eq!(status.state, LifecycleState::Paused);
    assert!(status.snapshot_present);
    assert_eq!(status.pid, None);
}

#[tokio::test]
async fn test_pause_when_not_running_fails() {
    let h = harness();
    let err = h.sandbox.pause().await.unwrap_err();
    assert!(matches!(err, AgentboxError::NotRunning));
    assert_eq!(h.log.count_of("api_pause"), 0);
}

#[tokio::test]
async fn test_resume_restores_without_reconfiguring() {
    let h = harness();
    h.sandbox.start().await.unwrap();
    let started = h.sandbox.status().await.unwrap();
    h.sandbox.pause().await.unwrap();

    let marker = h.log.calls().len();
    h.sandbox.resume().await.unwrap();
    let resume_calls = h.log.calls()[marker..].to_vec();

    assert_order(
        &resume_calls,
        &["net_setup", "launch", "api_snapshot_load", "api_resume"],
    );
    // None of the five boot-time configuration calls run on resume.
    assert!(resume_calls.iter().all(|c| !c.starts_with("api_boot_source")));
    assert!(resume_calls.iter().all(|c| !c.starts_with("api_machine_config")));
    assert!(resume_calls.iter().all(|c| !c.starts_with("api_instance_start")));

    // The guest wakes at the address and MAC it paused with.
    let resumed = h.sandbox.status().await.unwrap();
    assert_eq!(resumed.guest_addr, started.guest_addr);
    let setups: Vec<String> = h
        .log
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("net_setup"))
        .collect();
    assert_eq!(setups[0], setups[1]);
}

#[tokio::test]
async fn test_resume_without_snapshot_launches_nothing() {
    let h = harness();
    let err = h.sandbox.resume().await.unwrap_err();
    assert!(matches!(err, AgentboxError::SnapshotNotFound(_)));
    assert_eq!(h.log.count_of("launch"), 0);
    assert_eq!(h.log.count_of("net_setup"), 0);
}

#[tokio::test]
async fn test_resume_when_running_is_refused() {
    let h = harness();
    h.sandbox.start().await.unwrap();
    let err = h.sandbox.resume().await.unwrap_err();
    assert!(matches!(err, AgentboxError::AlreadyRunning(_)));
}

#[tokio::test]
async fn test_purge_is_idempotent() {
    let h = harness();
    h.sandbox.start().await.unwrap();
    h.sandbox.pause().await.unwrap();

    h.sandbox.purge().await.unwrap();
    let after_first = h.sandbox.status().await.unwrap();
    assert_eq!(after_first.state, LifecycleState::Stopped);
    assert!(!after_first.snapshot_present);

    // Second purge finds nothing to do and must not error.
    h.sandbox.purge().await.unwrap();
    let after_second = h.sandbox.status().await.unwrap();
    assert_eq!(after_second.state, LifecycleState::Stopped);
    assert!(!after_second.snapshot_present);
}

#[tokio::test]
async fn test_status_reports_stopped_after_out_of_band_kill() {
    let h = harness();
    h.sandbox.start().await.unwrap();

    // The hypervisor dies behind the controller's back.
    *h.running.lock().unwrap() = None;

    let status = h.sandbox.status().await.unwrap();
    assert_eq!(status.state, LifecycleState::Stopped);
    assert_eq!(status.pid, None);
}

#[tokio::test]
async fn test_failed_configuration_aborts_without_rollback() {
    let h = harness_with(true);

    let err = h.sandbox.start().await.unwrap_err();
    assert!(matches!(err, AgentboxError::Api { status: 400, .. }));

    // The partially configured instance is intentionally left in place for
    // diagnosis; only an explicit stop cleans it up.
    assert_eq!(h.log.count_of("launch"), 1);
    assert_eq!(h.log.count_of("terminate"), 0);
    assert_eq!(h.log.count_of("kill"), 0);
    assert!(h.running.lock().unwrap().is_some());

    assert!(h.sandbox.stop().await.unwrap());
    assert!(h.running.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_command_is_refused() {
    let h = harness();

    // Hold the working directory's advisory lock the way a concurrent
    // command invocation would.
    std::fs::create_dir_all(h.sandbox.layout().env_dir()).unwrap();
    let options = file_lock::FileOptions::new().write(true).create(true);
    let _held = file_lock::FileLock::lock(
        h.sandbox.layout().lock_path().to_string_lossy().as_ref(),
        false,
        options,
    )
    .unwrap();

    let err = h.sandbox.stop().await.unwrap_err();
    assert!(matches!(err, AgentboxError::CommandInProgress));
}

#[tokio::test]
async fn test_clean_refused_while_running() {
    let h = harness();
    h.sandbox.start().await.unwrap();
    let err = h.sandbox.clean().await.unwrap_err();
    assert!(matches!(err, AgentboxError::AlreadyRunning(_)));
}

#[tokio::test]
async fn test_clean_removes_assets_when_stopped() {
    let h = harness();
    let assets_dir = h.sandbox.layout().assets_dir();
    std::fs::create_dir_all(&assets_dir).unwrap();
    std::fs::write(assets_dir.join("rootfs.ext4"), b"image").unwrap();

    h.sandbox.clean().await.unwrap();
    assert!(!assets_dir.exists());

    // Cleaning an already-clean directory is fine too.
    h.sandbox.clean().await.unwrap();
}
