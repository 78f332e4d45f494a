use std::io::{SeekFrom, Write};
use std::path::PathBuf;
use std::time::Duration;

use console::style;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use agentbox_cli::{AgentboxArgs, AgentboxCliResult, AnsiStyles};
use agentbox_core::config::{
    MachineResources, SandboxLayout, DEFAULT_MEMORY_MIB, DEFAULT_VCPUS,
};
use agentbox_core::management::{LifecycleState, Sandbox};
use agentbox_utils::term::CHECKMARK;
use agentbox_utils::{resolve_working_dir, tail_lines};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const TAIL_FOLLOW_INTERVAL: Duration = Duration::from_millis(500);

//--------------------------------------------------------------------------------------------------
// Functions: Handlers
//--------------------------------------------------------------------------------------------------

pub fn log_level(args: &AgentboxArgs) {
    let level = if args.trace {
        Some("trace")
    } else if args.debug {
        Some("debug")
    } else if args.info {
        Some("info")
    } else if args.warn {
        Some("warn")
    } else if args.error {
        Some("error")
    } else {
        None
    };

    // Set RUST_LOG environment variable only if a level is specified
    if let Some(level) = level {
        std::env::set_var(
            "RUST_LOG",
            format!("agentbox_core={},agentbox_utils={},abx={}", level, level, level),
        );
    }
}

pub async fn start_subcommand(
    cpus: Option<u8>,
    memory: Option<u32>,
    path: Option<PathBuf>,
) -> AgentboxCliResult<()> {
    let sandbox = build_sandbox(path, cpus, memory)?;
    let record = sandbox.start().await?;

    println!(
        "{} Sandbox VM started (PID: {}), guest at {}",
        &*CHECKMARK,
        record.pid,
        sandbox.link().get_guest_addr().literal()
    );
    Ok(())
}

pub async fn stop_subcommand(path: Option<PathBuf>) -> AgentboxCliResult<()> {
    let sandbox = build_sandbox(path, None, None)?;

    if sandbox.stop().await? {
        println!("{} Sandbox VM stopped", &*CHECKMARK);
    } else {
        println!("Sandbox VM is {}", "not running".warning());
    }
    Ok(())
}

pub async fn restart_subcommand(
    cpus: Option<u8>,
    memory: Option<u32>,
    path: Option<PathBuf>,
) -> AgentboxCliResult<()> {
    let sandbox = build_sandbox(path, cpus, memory)?;
    let record = sandbox.restart().await?;

    println!(
        "{} Sandbox VM restarted (PID: {}), guest at {}",
        &*CHECKMARK,
        record.pid,
        sandbox.link().get_guest_addr().literal()
    );
    Ok(())
}

pub async fn pause_subcommand(path: Option<PathBuf>) -> AgentboxCliResult<()> {
    let sandbox = build_sandbox(path, None, None)?;
    sandbox.pause().await?;

    println!(
        "{} Sandbox VM paused; snapshot stored under {}",
        &*CHECKMARK,
        sandbox.layout().snapshots_dir().display().literal()
    );
    Ok(())
}

pub async fn resume_subcommand(path: Option<PathBuf>) -> AgentboxCliResult<()> {
    let sandbox = build_sandbox(path, None, None)?;
    let record = sandbox.resume().await?;

    println!(
        "{} Sandbox VM resumed (PID: {}), guest at {}",
        &*CHECKMARK,
        record.pid,
        sandbox.link().get_guest_addr().literal()
    );
    Ok(())
}

pub async fn purge_subcommand(path: Option<PathBuf>) -> AgentboxCliResult<()> {
    let sandbox = build_sandbox(path, None, None)?;
    sandbox.purge().await?;

    println!(
        "{} Sandbox purged; the next start boots fresh",
        &*CHECKMARK
    );
    Ok(())
}

pub async fn status_subcommand(path: Option<PathBuf>) -> AgentboxCliResult<()> {
    let sandbox = build_sandbox(path, None, None)?;
    let status = sandbox.status().await?;

    let state_text = match status.state {
        LifecycleState::Running => "RUNNING".success(),
        LifecycleState::Paused => "PAUSED".warning(),
        LifecycleState::Stopped => "STOPPED".error(),
    };

    println!("{:<10} {}", style("STATE").bold(), state_text);
    if let Some(pid) = status.pid {
        println!("{:<10} {}", style("PID").bold(), pid);
    }
    println!(
        "{:<10} {}",
        style("SNAPSHOT").bold(),
        if status.snapshot_present {
            "present"
        } else {
            "none"
        }
    );
    println!("{:<10} {}", style("GUEST").bold(), status.guest_addr);
    Ok(())
}

pub async fn clean_subcommand(path: Option<PathBuf>) -> AgentboxCliResult<()> {
    let sandbox = build_sandbox(path, None, None)?;
    sandbox.clean().await?;

    println!(
        "{} Removed downloaded assets; the next start re-provisions",
        &*CHECKMARK
    );
    Ok(())
}

pub async fn tail_subcommand(lines: usize, path: Option<PathBuf>) -> AgentboxCliResult<()> {
    let layout = resolve_layout(path)?;
    let log_path = layout.log_path();

    if !log_path.exists() {
        println!(
            "No hypervisor log captured yet at {}",
            log_path.display().literal()
        );
        return Ok(());
    }

    let tail = tail_lines(&log_path, lines)?;
    if !tail.is_empty() {
        println!("{}", tail);
    }

    // Follow appended output until interrupted.
    let mut offset = tokio::fs::metadata(&log_path).await?.len();
    loop {
        tokio::time::sleep(TAIL_FOLLOW_INTERVAL).await;

        let len = match tokio::fs::metadata(&log_path).await {
            Ok(meta) => meta.len(),
            Err(_) => continue,
        };

        // The log was truncated by a fresh launch; start over.
        if len < offset {
            offset = 0;
        }

        if len > offset {
            let mut file = tokio::fs::File::open(&log_path).await?;
            file.seek(SeekFrom::Start(offset)).await?;
            let mut buf = vec![0u8; (len - offset) as usize];
            file.read_exact(&mut buf).await?;
            print!("{}", String::from_utf8_lossy(&buf));
            std::io::stdout().flush()?;
            offset = len;
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Resolves and canonicalizes the working directory. The hypervisor runs
/// detached with its own lifetime, so every path it receives must stay valid
/// regardless of where later commands are invoked from.
fn resolve_layout(path: Option<PathBuf>) -> AgentboxCliResult<SandboxLayout> {
    let dir = resolve_working_dir(path);
    std::fs::create_dir_all(&dir)?;
    Ok(SandboxLayout::new(dir.canonicalize()?))
}

fn build_sandbox(
    path: Option<PathBuf>,
    cpus: Option<u8>,
    memory: Option<u32>,
) -> AgentboxCliResult<Sandbox> {
    let layout = resolve_layout(path)?;
    let resources = MachineResources::builder()
        .vcpus(cpus.unwrap_or(DEFAULT_VCPUS))
        .memory_mib(memory.unwrap_or(DEFAULT_MEMORY_MIB))
        .build();

    Ok(Sandbox::firecracker(layout, resources))
}
