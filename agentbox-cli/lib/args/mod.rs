//! Argument types for the agentbox binaries.

mod abx;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use abx::*;
