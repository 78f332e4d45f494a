//! Configuration types and helpers.

mod defaults;
mod layout;
mod machine;
mod network;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;
pub use layout::*;
pub use machine::*;
pub use network::*;
