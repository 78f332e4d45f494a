//! Utility functions for working with environment variables.

use std::path::PathBuf;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment variable selecting the default working directory.
pub const AGENTBOX_HOME_ENV_VAR: &str = "AGENTBOX_HOME";

/// Environment variable overriding the hypervisor release archive URL.
pub const FIRECRACKER_URL_ENV_VAR: &str = "AGENTBOX_FIRECRACKER_URL";

/// Environment variable overriding the guest kernel image URL.
pub const KERNEL_URL_ENV_VAR: &str = "AGENTBOX_KERNEL_URL";

/// Environment variable overriding the guest root filesystem image URL.
pub const ROOTFS_URL_ENV_VAR: &str = "AGENTBOX_ROOTFS_URL";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the working directory for the current invocation.
///
/// Resolution order: the explicit CLI path if given, then the `AGENTBOX_HOME`
/// environment variable, then the current directory.
pub fn resolve_working_dir(cli_path: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli_path {
        return path;
    }

    if let Ok(home) = std::env::var(AGENTBOX_HOME_ENV_VAR) {
        return PathBuf::from(home);
    }

    PathBuf::from(".")
}

/// Returns the value of `env_var` if set, otherwise `default`.
///
/// Used for the asset URLs, which an operator overrides to point at a custom
/// guest image (e.g. a desktop rootfs prepared for GUI workloads).
pub fn resolve_env_url(env_var: &str, default: &str) -> String {
    std::env::var(env_var).unwrap_or_else(|_| default.to_string())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
