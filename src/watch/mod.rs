//! Watch mode: periodic build/test cycles with error detection and
//! knowledge-driven auto-repair.

pub mod detect;
pub mod parse;
pub mod repair;
pub mod types;
pub mod watcher;

pub use types::{ErrorEvent, RepairResult, WatchConfig};
pub use watcher::WatchService;
