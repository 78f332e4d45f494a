//! Sandbox VM components.
//!
//! Each collaborator the lifecycle machine drives lives here behind a narrow
//! trait with one production implementation:
//! - [`assets`] - hypervisor/kernel/rootfs provisioning
//! - [`network`] - host tap device setup and teardown
//! - [`supervisor`] - detached process launch, liveness, and termination
//! - [`api`] - the hypervisor's control API over its Unix socket
//! - [`snapshot`] - paired memory/state snapshot files

pub mod api;
pub mod assets;
pub mod network;
pub mod payload;
pub mod snapshot;
pub mod supervisor;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use api::*;
pub use assets::*;
pub use network::*;
pub use snapshot::*;
pub use supervisor::*;
