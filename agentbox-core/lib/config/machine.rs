//! Guest machine resource configuration.

use getset::Getters;
use typed_builder::TypedBuilder;

use super::{DEFAULT_MEMORY_MIB, DEFAULT_VCPUS};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// CPU and memory sizing for the sandbox VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters, TypedBuilder)]
#[getset(get = "pub with_prefix")]
pub struct MachineResources {
    /// Number of guest vCPUs.
    #[builder(default = DEFAULT_VCPUS)]
    vcpus: u8,

    /// Guest memory size in MiB.
    #[builder(default = DEFAULT_MEMORY_MIB)]
    memory_mib: u32,
}

impl Default for MachineResources {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
