//! The sandbox VM lifecycle state machine.
//!
//! This module sequences the collaborators (asset provisioner, network
//! backend, process supervisor, control plane, snapshot manager) in
//! response to commands, and enforces the preconditions between them. The
//! main operations are:
//! - `start`: boot a fresh VM
//! - `stop`: graceful-then-forced termination plus network teardown
//! - `pause`/`resume`: snapshot the VM to disk and restore it later
//! - `purge`: stop and delete the snapshot pair
//! - `status`: pure read of the derived lifecycle state
//!
//! Every mutating command holds the working directory's advisory lock for
//! its duration and begins by reconciling persisted state against the live
//! process table, so a crashed previous run never wedges the next one.

use std::fmt;
use std::net::Ipv4Addr;

use file_lock::{FileLock, FileOptions};

use crate::config::{MachineResources, NetworkLink, SandboxLayout, RESTART_SETTLE_DELAY};
use crate::vm::{
    AssetProvisioner, ControlPlane, FirecrackerApi, FirecrackerSupervisor, HttpAssetProvisioner,
    InstanceRecord, IpLinkNetwork, NetworkBackend, SnapshotManager, SnapshotPair, VmSupervisor,
};
use crate::{AgentboxError, AgentboxResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The derived lifecycle state of the sandbox. Never persisted: computed
/// from process liveness and snapshot presence at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No live hypervisor and no snapshot.
    Stopped,

    /// A live hypervisor process exists.
    Running,

    /// No live hypervisor, but a loadable snapshot pair is on disk.
    Paused,
}

/// A point-in-time status report for the sandbox.
#[derive(Debug, Clone)]
pub struct SandboxStatus {
    /// The derived lifecycle state.
    pub state: LifecycleState,

    /// PID of the hypervisor process, when running.
    pub pid: Option<u32>,

    /// Whether a loadable snapshot pair is present.
    pub snapshot_present: bool,

    /// The guest's fixed address.
    pub guest_addr: Ipv4Addr,
}

/// The lifecycle state machine for one sandbox VM.
///
/// Owns the working-directory layout and drives injected collaborators, so
/// every component can be substituted in tests. Production wiring comes from
/// [`Sandbox::firecracker`].
pub struct Sandbox {
    layout: SandboxLayout,
    link: NetworkLink,
    resources: MachineResources,
    provisioner: Box<dyn AssetProvisioner>,
    network: Box<dyn NetworkBackend>,
    supervisor: Box<dyn VmSupervisor>,
    api: Box<dyn ControlPlane>,
    snapshots: SnapshotManager,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Sandbox {
    /// Creates a sandbox with the production Firecracker collaborators.
    pub fn firecracker(layout: SandboxLayout, resources: MachineResources) -> Self {
        let link = NetworkLink::default();
        let provisioner = Box::new(HttpAssetProvisioner::new(layout.clone()));
        let network = Box::new(IpLinkNetwork);
        let supervisor = Box::new(FirecrackerSupervisor::new(layout.clone()));
        let api = Box::new(FirecrackerApi::new(layout.socket_path()));

        Self::with_collaborators(layout, link, resources, provisioner, network, supervisor, api)
    }

    /// Creates a sandbox from explicit collaborators.
    pub fn with_collaborators(
        layout: SandboxLayout,
        link: NetworkLink,
        resources: MachineResources,
        provisioner: Box<dyn AssetProvisioner>,
        network: Box<dyn NetworkBackend>,
        supervisor: Box<dyn VmSupervisor>,
        api: Box<dyn ControlPlane>,
    ) -> Self {
        let snapshots = SnapshotManager::new(SnapshotPair::new(
            layout.snapshot_mem(),
            layout.snapshot_state(),
        ));

        Self {
            layout,
            link,
            resources,
            provisioner,
            network,
            supervisor,
            api,
            snapshots,
        }
    }

    /// The working-directory layout this sandbox persists into.
    pub fn layout(&self) -> &SandboxLayout {
        &self.layout
    }

    /// The sandbox's network identity.
    pub fn link(&self) -> &NetworkLink {
        &self.link
    }

    /// Boots a fresh VM.
    ///
    /// Refused with [`AgentboxError::AlreadyRunning`] when a live instance
    /// exists; stale records from a crash are discarded first. On a
    /// configuration failure the partially applied state is intentionally
    /// left in place; `stop` is the recovery path.
    ///
    /// ## Example
    ///
    /// ```no_run
    /// use agentbox_core::config::{MachineResources, SandboxLayout};
    /// use agentbox_core::management::Sandbox;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let sandbox = Sandbox::firecracker(
    ///     SandboxLayout::new("."),
    ///     MachineResources::default(),
    /// );
    /// let record = sandbox.start().await?;
    /// println!("VM running with PID {}", record.pid);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn start(&self) -> AgentboxResult<InstanceRecord> {
        let _lock = self.acquire_command_lock()?;
        self.start_unlocked().await
    }

    /// Terminates the VM and tears down the network link.
    ///
    /// Idempotent: returns `Ok(false)` when nothing was running, `Ok(true)`
    /// when a VM was actually stopped. The network teardown runs in both
    /// cases so crash leftovers get cleared.
    pub async fn stop(&self) -> AgentboxResult<bool> {
        let _lock = self.acquire_command_lock()?;
        self.stop_unlocked().await
    }

    /// Stops, waits for the tap device to release, then starts again.
    pub async fn restart(&self) -> AgentboxResult<InstanceRecord> {
        let _lock = self.acquire_command_lock()?;
        self.stop_unlocked().await?;
        tokio::time::sleep(RESTART_SETTLE_DELAY).await;
        self.start_unlocked().await
    }

    /// Snapshots the running VM to disk and stops it.
    ///
    /// After a successful pause the VM exists purely as the snapshot pair;
    /// no process or network link remains. Fails with
    /// [`AgentboxError::NotRunning`] when there is nothing to pause.
    pub async fn pause(&self) -> AgentboxResult<()> {
        let _lock = self.acquire_command_lock()?;

        let record = self
            .supervisor
            .current()
            .await?
            .ok_or(AgentboxError::NotRunning)?;

        self.api.pause_vm().await?;
        self.snapshots.create(self.api.as_ref()).await?;

        // A paused guest cannot act on a shutdown signal; kill directly.
        self.supervisor.kill(&record).await?;
        self.network.teardown(self.link.get_device()).await?;

        tracing::info!("sandbox VM paused to snapshot");
        Ok(())
    }

    /// Restores the VM from its snapshot pair.
    ///
    /// Fails with [`AgentboxError::SnapshotNotFound`] before any process is
    /// launched when the pair is missing, and with
    /// [`AgentboxError::AlreadyRunning`] when a live instance exists. The
    /// guest wakes with the same memory, MAC, and address it paused with.
    pub async fn resume(&self) -> AgentboxResult<InstanceRecord> {
        let _lock = self.acquire_command_lock()?;

        if let Some(record) = self.supervisor.current().await? {
            return Err(AgentboxError::AlreadyRunning(record.pid));
        }
        self.snapshots.verify()?;

        self.layout.ensure_dirs().await?;
        self.provisioner.ensure_assets().await?;
        self.network.setup(&self.link).await?;
        let record = self.supervisor.launch().await?;

        self.snapshots.load(self.api.as_ref()).await?;
        self.api.resume_vm().await?;

        tracing::info!(
            "sandbox VM resumed from snapshot (PID: {}), guest at {}",
            record.pid,
            self.link.get_guest_addr()
        );
        Ok(record)
    }

    /// Stops the VM (idempotently) and deletes the snapshot pair.
    ///
    /// Always leaves the sandbox Stopped with no snapshot; the next `start`
    /// boots fresh. Calling purge twice in a row is the same as once.
    pub async fn purge(&self) -> AgentboxResult<()> {
        let _lock = self.acquire_command_lock()?;

        self.stop_unlocked().await?;
        self.snapshots.purge().await?;

        tracing::info!("sandbox purged");
        Ok(())
    }

    /// Reports the derived lifecycle state. Pure read: never repairs stale
    /// records or touches any file.
    pub async fn status(&self) -> AgentboxResult<SandboxStatus> {
        let record = self.supervisor.probe().await?;
        let snapshot_present = self.snapshots.is_present();

        let state = match &record {
            Some(_) => LifecycleState::Running,
            None if snapshot_present => LifecycleState::Paused,
            None => LifecycleState::Stopped,
        };

        Ok(SandboxStatus {
            state,
            pid: record.map(|r| r.pid),
            snapshot_present,
            guest_addr: *self.link.get_guest_addr(),
        })
    }

    /// Deletes the downloaded assets so the next start re-provisions.
    /// Refused while the VM is running.
    pub async fn clean(&self) -> AgentboxResult<()> {
        let _lock = self.acquire_command_lock()?;

        if let Some(record) = self.supervisor.current().await? {
            return Err(AgentboxError::AlreadyRunning(record.pid));
        }

        let assets_dir = self.layout.assets_dir();
        if assets_dir.exists() {
            tokio::fs::remove_dir_all(&assets_dir).await?;
            tracing::info!("removed assets at {}", assets_dir.display());
        } else {
            tracing::info!("no assets found at {}", assets_dir.display());
        }

        Ok(())
    }

    //----------------------------------------------------------------------------------------------
    // Methods: Helpers
    //----------------------------------------------------------------------------------------------

    /// Takes the working directory's advisory command lock, failing fast
    /// with [`AgentboxError::CommandInProgress`] when another command holds
    /// it. The lock releases on drop.
    fn acquire_command_lock(&self) -> AgentboxResult<FileLock> {
        std::fs::create_dir_all(self.layout.env_dir())?;

        let lock_path = self.layout.lock_path();
        let options = FileOptions::new().write(true).create(true);
        match FileLock::lock(lock_path.to_string_lossy().as_ref(), false, options) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(AgentboxError::CommandInProgress)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn start_unlocked(&self) -> AgentboxResult<InstanceRecord> {
        if let Some(record) = self.supervisor.current().await? {
            return Err(AgentboxError::AlreadyRunning(record.pid));
        }

        self.layout.ensure_dirs().await?;
        let assets = self.provisioner.ensure_assets().await?;
        self.network.setup(&self.link).await?;
        let record = self.supervisor.launch().await?;

        // Fixed order: the hypervisor rejects machine-config and
        // instance-start until boot source and root drive are in place.
        // No rollback on failure; the operator inspects and runs `stop`.
        self.api
            .put_boot_source(assets.get_kernel_image(), &self.link.boot_args())
            .await?;
        self.api.put_root_drive(assets.get_rootfs_image()).await?;
        self.api.put_network_interface(&self.link).await?;
        self.api.put_machine_config(&self.resources).await?;
        self.api.start_instance().await?;

        tracing::info!(
            "sandbox VM running (PID: {}), guest at {}",
            record.pid,
            self.link.get_guest_addr()
        );
        Ok(record)
    }

    async fn stop_unlocked(&self) -> AgentboxResult<bool> {
        match self.supervisor.current().await? {
            None => {
                tracing::info!("sandbox VM is not running");
                self.network.teardown(self.link.get_device()).await?;
                Ok(false)
            }
            Some(record) => {
                // Best-effort: an unresponsive guest is handled by the
                // forced-kill escalation in terminate.
                if let Err(e) = self.api.send_ctrl_alt_del().await {
                    tracing::debug!("guest shutdown signal not delivered: {}", e);
                }

                self.supervisor.terminate(&record).await?;
                self.network.teardown(self.link.get_device()).await?;
                Ok(true)
            }
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
        }
    }
}
