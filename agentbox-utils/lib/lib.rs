//! `agentbox_utils` is a library containing common utilities for the agentbox project.
//!
//! It provides:
//! - Filesystem layout names shared by the core library and the CLI
//! - Environment variable resolution helpers
//! - The bounded-retry policy used for readiness and shutdown polling
//! - Small file helpers (log tail extraction)
//! - Terminal progress primitives

mod env;
mod file;
mod path;
mod retry;

pub mod term;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use env::*;
pub use file::*;
pub use path::*;
pub use retry::*;
