//! Request payloads for the hypervisor control API.

use serde::Serialize;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Kernel image and command line.
#[derive(Debug, Clone, Serialize)]
pub struct BootSource {
    /// Path to the kernel image on the host.
    pub kernel_image_path: String,
    /// Kernel command line.
    pub boot_args: String,
}

/// Block device configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Drive {
    /// Identifier of the drive.
    pub drive_id: String,
    /// Path to the backing image on the host.
    pub path_on_host: String,
    /// Whether this is the root device.
    pub is_root_device: bool,
    /// Whether the drive is read-only.
    pub is_read_only: bool,
}

/// Network interface configuration.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkInterface {
    /// Guest-side interface identifier.
    pub iface_id: String,
    /// The guest's MAC address.
    pub guest_mac: String,
    /// Name of the host tap device backing the interface.
    pub host_dev_name: String,
}

/// Machine resource configuration.
#[derive(Debug, Clone, Serialize)]
pub struct MachineConfig {
    /// Number of guest vCPUs.
    pub vcpu_count: u8,
    /// Guest memory size in MiB.
    pub mem_size_mib: u32,
    /// Whether simultaneous multithreading is exposed to the guest.
    pub smt: bool,
}

/// An instance action, e.g. `InstanceStart` or `SendCtrlAltDel`.
#[derive(Debug, Clone, Serialize)]
pub struct Action {
    /// The action to perform.
    pub action_type: String,
}

/// A VM state transition, e.g. `Paused` or `Resumed`.
#[derive(Debug, Clone, Serialize)]
pub struct VmState {
    /// The target state.
    pub state: String,
}

/// Snapshot creation parameters.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotCreate {
    /// Snapshot flavor; always a full snapshot.
    pub snapshot_type: String,
    /// Path the VM execution state is written to.
    pub snapshot_path: String,
    /// Path the guest memory image is written to.
    pub mem_file_path: String,
}

/// Memory backend for a snapshot load.
#[derive(Debug, Clone, Serialize)]
pub struct MemBackend {
    /// Backend kind; the memory image is a plain file.
    pub backend_type: String,
    /// Path of the guest memory image.
    pub backend_path: String,
}

/// Snapshot load parameters.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotLoad {
    /// Path of the VM execution state file.
    pub snapshot_path: String,
    /// Where the guest memory is restored from.
    pub mem_backend: MemBackend,
    /// Whether the VM resumes immediately on load. The controller issues an
    /// explicit resume instead, so failures are attributable.
    pub resume_vm: bool,
}
