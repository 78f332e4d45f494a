//! Host-side virtual network setup for the sandbox VM.
//!
//! The controller owns exactly one tap device. Setup tears down any
//! pre-existing device of the same name first, so at most one link with the
//! configured name ever exists on the host. All operations are scoped to the
//! host network namespace; the guest side is configured entirely through
//! kernel boot parameters.

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::NetworkLink;
use crate::{AgentboxError, AgentboxResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const IP_COMMAND: &str = "ip";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Creates and destroys the host-side link for the sandbox VM.
#[async_trait]
pub trait NetworkBackend: Send + Sync {
    /// Creates the tap device, assigns the host address, and brings the
    /// link up. Removes any stale device of the same name first.
    async fn setup(&self, link: &NetworkLink) -> AgentboxResult<()>;

    /// Deletes the tap device. Idempotent: a missing device is not an error.
    async fn teardown(&self, device: &str) -> AgentboxResult<()>;
}

/// [`NetworkBackend`] implementation shelling out to `ip(8)`.
#[derive(Debug, Default)]
pub struct IpLinkNetwork;

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl NetworkBackend for IpLinkNetwork {
    async fn setup(&self, link: &NetworkLink) -> AgentboxResult<()> {
        let device = link.get_device();

        // A crashed run can leave the device behind; recreate from scratch.
        run_ip(&tuntap_del_args(device), true).await?;
        run_ip(&tuntap_add_args(device), false).await?;
        run_ip(&addr_add_args(&link.get_host_cidr().to_string(), device), false).await?;
        run_ip(&link_up_args(device), false).await?;

        tracing::info!(
            "network link {} up, host {}, guest {}",
            device,
            link.get_host_cidr(),
            link.get_guest_addr()
        );

        Ok(())
    }

    async fn teardown(&self, device: &str) -> AgentboxResult<()> {
        run_ip(&tuntap_del_args(device), true).await?;
        tracing::info!("network link {} removed", device);
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn tuntap_del_args(device: &str) -> Vec<String> {
    vec![
        "tuntap".into(),
        "del".into(),
        device.into(),
        "mode".into(),
        "tap".into(),
    ]
}

fn tuntap_add_args(device: &str) -> Vec<String> {
    vec![
        "tuntap".into(),
        "add".into(),
        device.into(),
        "mode".into(),
        "tap".into(),
    ]
}

fn addr_add_args(host_cidr: &str, device: &str) -> Vec<String> {
    vec![
        "addr".into(),
        "add".into(),
        host_cidr.into(),
        "dev".into(),
        device.into(),
    ]
}

fn link_up_args(device: &str) -> Vec<String> {
    vec!["link".into(), "set".into(), device.into(), "up".into()]
}

/// Whether stderr from `ip(8)` indicates the device simply does not exist.
fn is_missing_device(stderr: &str) -> bool {
    stderr.contains("Cannot find device") || stderr.contains("No such device")
}

/// Runs one `ip` invocation, mapping failure to [`AgentboxError::Device`].
/// With `tolerate_missing`, a "no such device" failure is treated as success.
async fn run_ip(args: &[String], tolerate_missing: bool) -> AgentboxResult<()> {
    let output = Command::new(IP_COMMAND).args(args).output().await?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if tolerate_missing && is_missing_device(&stderr) {
        return Ok(());
    }

    Err(AgentboxError::Device(format!(
        "`ip {}` failed: {}",
        args.join(" "),
        stderr.trim()
    )))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_command_arguments() {
        assert_eq!(
            tuntap_add_args("abx-tap0"),
            ["tuntap", "add", "abx-tap0", "mode", "tap"]
        );
        assert_eq!(
            addr_add_args("172.16.0.1/24", "abx-tap0"),
            ["addr", "add", "172.16.0.1/24", "dev", "abx-tap0"]
        );
        assert_eq!(link_up_args("abx-tap0"), ["link", "set", "abx-tap0", "up"]);
    }

    #[test]
    fn test_missing_device_detection() {
        assert!(is_missing_device("Cannot find device \"abx-tap0\""));
        assert!(is_missing_device("ioctl(TUNSETIFF): No such device"));
        assert!(!is_missing_device("Operation not permitted"));
    }
}
