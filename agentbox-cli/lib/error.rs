//! Error types for CLI command handling.

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a CLI command.
pub type AgentboxCliResult<T> = Result<T, AgentboxCliError>;

/// An error returned from a CLI command. The pretty `Debug` implementation
/// is what the user sees when `main` returns an error.
#[derive(pretty_error_debug::Debug, Error)]
pub enum AgentboxCliError {
    /// An error from the sandbox lifecycle machinery.
    #[error(transparent)]
    Core(#[from] agentbox_core::AgentboxError),

    /// An I/O error from the CLI layer itself.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Any other error.
    #[error(transparent)]
    Custom(#[from] anyhow::Error),
}
