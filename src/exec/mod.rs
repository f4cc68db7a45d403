//! Shell command execution with timeout enforcement.

mod shell;

pub use shell::{execute_shell, ExecResult};
