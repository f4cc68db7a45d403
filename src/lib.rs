pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod knowledge;
pub mod orchestration;
pub mod provider;
pub mod session;
mod text;
pub mod tools;
pub mod watch;
