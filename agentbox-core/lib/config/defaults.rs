//! Default values used across the sandbox VM configuration.

use std::time::Duration;

use agentbox_utils::RetryPolicy;

//--------------------------------------------------------------------------------------------------
// Constants: Assets
//--------------------------------------------------------------------------------------------------

/// Release archive for the hypervisor executable.
pub const DEFAULT_FIRECRACKER_URL: &str = "https://github.com/firecracker-microvm/firecracker/releases/download/v1.7.0/firecracker-v1.7.0-x86_64.tgz";

/// Guest kernel image.
pub const DEFAULT_KERNEL_URL: &str =
    "https://s3.amazonaws.com/spec.ccfc.min/firecracker-ci/v1.7/x86_64/vmlinux-5.10.210";

/// Guest root filesystem image. Operators point `AGENTBOX_ROOTFS_URL` at a
/// desktop image prepared for GUI workloads; the stock image is only a
/// bring-up default.
pub const DEFAULT_ROOTFS_URL: &str =
    "https://s3.amazonaws.com/spec.ccfc.min/firecracker-ci/v1.7/x86_64/ubuntu-22.04.ext4";

/// File name prefix identifying the hypervisor executable inside its release
/// archive.
pub const FIRECRACKER_ARCHIVE_PREFIX: &str = "firecracker-v";

/// Process image name of the hypervisor, as it appears in `/proc/<pid>/comm`.
pub const FIRECRACKER_PROCESS_NAME: &str = "firecracker";

/// The hardware virtualization device that must be writable.
pub const KVM_DEVICE_PATH: &str = "/dev/kvm";

/// Transient download failures are retried this many times by the HTTP
/// middleware before surfacing an error.
pub const DOWNLOAD_MAX_RETRIES: u32 = 3;

//--------------------------------------------------------------------------------------------------
// Constants: Machine
//--------------------------------------------------------------------------------------------------

/// Default number of guest vCPUs.
pub const DEFAULT_VCPUS: u8 = 2;

/// Default guest memory in MiB. GUI sessions need headroom for a compositor
/// and a browser.
pub const DEFAULT_MEMORY_MIB: u32 = 2048;

/// Kernel command line, minus the network clause appended per link.
pub const DEFAULT_BOOT_ARGS: &str = "console=ttyS0 reboot=k panic=1 pci=off";

/// Identifier the hypervisor uses for this VM.
pub const VM_ID: &str = "agentbox";

/// Drive ID of the root filesystem device.
pub const ROOT_DRIVE_ID: &str = "rootfs";

/// Guest-side interface ID for the network device.
pub const GUEST_IFACE_ID: &str = "eth0";

//--------------------------------------------------------------------------------------------------
// Constants: Timing
//--------------------------------------------------------------------------------------------------

/// Readiness poll for the control socket: 100ms × 50 ≈ 5 seconds.
pub const SOCKET_READY_POLICY: RetryPolicy = RetryPolicy::new(Duration::from_millis(100), 50);

/// Grace period polling for process exit after a shutdown signal:
/// 500ms × 20 ≈ 10 seconds, then SIGKILL.
pub const TERMINATE_GRACE_POLICY: RetryPolicy = RetryPolicy::new(Duration::from_millis(500), 20);

/// Exit poll after a forced kill; the process has no say in the matter so
/// this only covers kernel teardown latency.
pub const KILL_EXIT_POLICY: RetryPolicy = RetryPolicy::new(Duration::from_millis(100), 20);

/// Pause between stop and start during a restart, letting the tap device
/// fully release before re-creation.
pub const RESTART_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// How many log lines to surface when startup times out.
pub const LOG_TAIL_LINES: usize = 20;
