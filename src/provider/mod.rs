//! Provider protocol adapter.
//!
//! Normalizes the two LLM wire families -- tool-calling chat completions and
//! plain streaming chat -- into a single turn interface consumed by the
//! sub-agent orchestrator and the top-level session.

mod adapter;
pub mod wire;

pub use adapter::{ProviderClient, TurnOutput};
pub use wire::{ChatMessage, ToolCall};
