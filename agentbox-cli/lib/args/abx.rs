//! Arguments for the `abx` command.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::styles;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Arguments for the `abx` command.
#[derive(Debug, Parser)]
#[command(
    name = "abx",
    author,
    about = "agentbox: lifecycle controller for a sandboxed GUI-automation microVM",
    styles = styles::styles()
)]
pub struct AgentboxArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<AgentboxSubcommand>,

    /// Working directory holding the sandbox state (defaults to
    /// $AGENTBOX_HOME, then the current directory)
    #[arg(short = 'p', long, global = true)]
    pub path: Option<PathBuf>,

    /// Enable trace logging
    #[arg(long, global = true)]
    pub trace: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Enable info logging
    #[arg(long, global = true)]
    pub info: bool,

    /// Enable warning logging
    #[arg(long, global = true)]
    pub warn: bool,

    /// Enable error logging
    #[arg(long, global = true)]
    pub error: bool,

    /// Print version
    #[arg(short = 'V', long)]
    pub version: bool,
}

/// Available subcommands for managing the sandbox VM.
#[derive(Debug, Subcommand)]
pub enum AgentboxSubcommand {
    /// Boot a fresh sandbox VM
    Start {
        /// Number of guest vCPUs
        #[arg(long)]
        cpus: Option<u8>,

        /// Guest memory size in MiB
        #[arg(long)]
        memory: Option<u32>,
    },

    /// Terminate the VM and tear down its network link
    Stop,

    /// Stop the VM, then boot it fresh
    Restart {
        /// Number of guest vCPUs
        #[arg(long)]
        cpus: Option<u8>,

        /// Guest memory size in MiB
        #[arg(long)]
        memory: Option<u32>,
    },

    /// Snapshot the running VM to disk and stop it
    Pause,

    /// Restore the VM from its snapshot
    Resume,

    /// Stop the VM and delete its snapshot
    Purge,

    /// Report lifecycle state, snapshot presence, and the guest address
    Status,

    /// Delete downloaded assets, forcing re-provisioning on the next start
    Clean,

    /// Stream the hypervisor's captured log
    Tail {
        /// How many existing log lines to print before following
        #[arg(short = 'n', long, default_value_t = 40)]
        lines: usize,
    },
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_well_formed() {
        AgentboxArgs::command().debug_assert();
    }

    #[test]
    fn test_global_path_applies_to_subcommands() {
        let args = AgentboxArgs::parse_from(["abx", "start", "--path", "/work/agent"]);
        assert_eq!(args.path, Some(PathBuf::from("/work/agent")));
        assert!(matches!(
            args.subcommand,
            Some(AgentboxSubcommand::Start { .. })
        ));
    }
}
