//! `agentbox` is a microVM provisioning system for sandboxing GUI-automation workloads.
//!
//! # Overview
//!
//! agentbox manages the full lifecycle of exactly one hardware-isolated
//! microVM per working directory. An autonomous agent uses it to obtain a
//! disposable guest desktop it can drive, pause between task batches, and
//! resume with all guest state intact. It handles:
//! - Asset provisioning (hypervisor binary, kernel image, root filesystem)
//! - Host-side virtual network device setup and teardown
//! - Detached hypervisor process supervision with crash-safe recovery
//! - Control-plane configuration over the hypervisor's local API socket
//! - Paired memory/state snapshots for pause and resume
//!
//! # Key Features
//!
//! - **Secure Isolation**: true VM-level isolation for untrusted GUI sessions
//! - **Stable Identity**: the guest keeps the same MAC and address across pause/resume
//! - **Crash Safety**: stale PID and socket records are detected and discarded
//! - **Bounded Waiting**: every poll is an explicit interval × attempts policy
//! - **Single Writer**: an advisory lock serializes commands per working directory
//!
//! # Modules
//!
//! - [`config`] - Configuration types, defaults, and the on-disk layout
//! - [`management`] - The lifecycle state machine driving all components
//! - [`vm`] - Asset provisioning, networking, supervision, control plane, snapshots

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod config;
pub mod management;
pub mod vm;

pub use error::*;
