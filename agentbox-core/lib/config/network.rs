//! The sandbox VM's network identity.

use std::net::Ipv4Addr;

use getset::Getters;
use ipnetwork::Ipv4Network;

use super::{DEFAULT_BOOT_ARGS, GUEST_IFACE_ID};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Host-side tap device name.
pub const DEFAULT_TAP_DEVICE: &str = "abx-tap0";

/// Host address and prefix on the tap link.
pub const DEFAULT_HOST_ADDR: Ipv4Addr = Ipv4Addr::new(172, 16, 0, 1);

/// Prefix length of the sandbox link.
pub const DEFAULT_HOST_PREFIX: u8 = 24;

/// The guest's fixed address.
pub const DEFAULT_GUEST_ADDR: Ipv4Addr = Ipv4Addr::new(172, 16, 0, 2);

/// The guest's fixed MAC. Encodes the guest address in its low bytes and
/// never changes across pause/resume, so a resumed guest keeps its ARP and
/// DHCP-free configuration intact.
pub const DEFAULT_GUEST_MAC: &str = "06:00:AC:10:00:02";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The host-side virtual link and guest addressing for the sandbox VM.
///
/// This is static configuration, not persisted state: it is reconstructed
/// identically on every start and resume, which is what guarantees the guest
/// sees the same network identity across its whole lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct NetworkLink {
    /// Name of the host tap device.
    device: String,

    /// Host address with prefix length, assigned to the tap device.
    host_cidr: Ipv4Network,

    /// The guest's address, passed via kernel boot parameters.
    guest_addr: Ipv4Addr,

    /// The guest's MAC address.
    mac: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl NetworkLink {
    /// The full kernel command line for this link: the base boot arguments
    /// plus the `ip=` clause that configures the guest statically, so no
    /// guest-side network configuration is needed.
    pub fn boot_args(&self) -> String {
        format!(
            "{} ip={}::{}:{}::{}:off",
            DEFAULT_BOOT_ARGS,
            self.guest_addr,
            self.host_cidr.ip(),
            self.host_cidr.mask(),
            GUEST_IFACE_ID,
        )
    }
}

impl Default for NetworkLink {
    fn default() -> Self {
        Self {
            device: DEFAULT_TAP_DEVICE.to_string(),
            host_cidr: Ipv4Network::new(DEFAULT_HOST_ADDR, DEFAULT_HOST_PREFIX)
                .expect("default prefix length is valid"),
            guest_addr: DEFAULT_GUEST_ADDR,
            mac: DEFAULT_GUEST_MAC.to_string(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
