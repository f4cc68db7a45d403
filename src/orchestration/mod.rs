//! Concurrent task supervision.
//!
//! Provides the [`supervisor::TaskSupervisor`] registry of asynchronous units
//! of work -- background shell commands and autonomous sub-agents -- with
//! uniform status/cancel/wait operations, along with the execution units
//! themselves ([`command_task`], [`agent_task`]).

pub mod agent_task;
pub mod command_task;
pub mod supervisor;
pub mod types;

pub use supervisor::TaskSupervisor;
pub use types::{TaskId, TaskKind, TaskSnapshot, TaskStatus, WaitOutcome};
