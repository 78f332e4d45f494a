#[path = "mod.rs"]
mod abx;

use abx::handlers;
use clap::{CommandFactory, Parser};

use agentbox_cli::{AgentboxArgs, AgentboxCliResult, AgentboxSubcommand, AnsiStyles};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> AgentboxCliResult<()> {
    // Parse command line arguments
    let args = AgentboxArgs::parse();

    handlers::log_level(&args);
    tracing_subscriber::fmt::init();

    // Print version if requested
    if args.version {
        println!("{}", format!("v{}", env!("CARGO_PKG_VERSION")).literal());
        return Ok(());
    }

    match args.subcommand {
        Some(AgentboxSubcommand::Start { cpus, memory }) => {
            handlers::start_subcommand(cpus, memory, args.path).await?;
        }
        Some(AgentboxSubcommand::Stop) => {
            handlers::stop_subcommand(args.path).await?;
        }
        Some(AgentboxSubcommand::Restart { cpus, memory }) => {
            handlers::restart_subcommand(cpus, memory, args.path).await?;
        }
        Some(AgentboxSubcommand::Pause) => {
            handlers::pause_subcommand(args.path).await?;
        }
        Some(AgentboxSubcommand::Resume) => {
            handlers::resume_subcommand(args.path).await?;
        }
        Some(AgentboxSubcommand::Purge) => {
            handlers::purge_subcommand(args.path).await?;
        }
        Some(AgentboxSubcommand::Status) => {
            handlers::status_subcommand(args.path).await?;
        }
        Some(AgentboxSubcommand::Clean) => {
            handlers::clean_subcommand(args.path).await?;
        }
        Some(AgentboxSubcommand::Tail { lines }) => {
            handlers::tail_subcommand(lines, args.path).await?;
        }
        None => {
            AgentboxArgs::command().print_help()?;
        }
    }

    Ok(())
}
