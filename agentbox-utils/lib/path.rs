//! Filesystem layout names for an agentbox working directory.
//!
//! All state for one sandbox VM lives under a single `.abx` directory inside
//! the working directory. These constants are the single source of truth for
//! that layout; path construction from them lives in `agentbox-core`.

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The directory holding all sandbox state inside a working directory.
pub const SANDBOX_ENV_DIR: &str = ".abx";

/// Subdirectory of the sandbox env dir holding downloaded assets.
pub const ASSETS_SUBDIR: &str = "assets";

/// Subdirectory of the sandbox env dir holding the snapshot pair.
pub const SNAPSHOTS_SUBDIR: &str = "snapshots";

/// The hypervisor's captured stdout/stderr log.
pub const VM_LOG_FILENAME: &str = "vm.log";

/// The PID record for the detached hypervisor process.
pub const VM_PID_FILENAME: &str = "vm.pid";

/// The hypervisor's control API Unix socket.
pub const API_SOCKET_FILENAME: &str = "firecracker.socket";

/// Advisory lock held for the duration of every mutating command.
pub const COMMAND_LOCK_FILENAME: &str = "cmd.lock";

/// The hypervisor executable inside the assets directory.
pub const FIRECRACKER_BIN_FILENAME: &str = "firecracker";

/// The guest kernel image inside the assets directory.
pub const KERNEL_IMAGE_FILENAME: &str = "vmlinux";

/// The guest root filesystem image inside the assets directory.
pub const ROOTFS_IMAGE_FILENAME: &str = "rootfs.ext4";

/// The guest memory image half of the snapshot pair.
pub const SNAPSHOT_MEM_FILENAME: &str = "snapshot.mem";

/// The VM execution state half of the snapshot pair.
pub const SNAPSHOT_STATE_FILENAME: &str = "snapshot.state";
