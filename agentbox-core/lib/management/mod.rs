//! Central management for the sandbox VM lifecycle.

mod lifecycle;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use lifecycle::*;
