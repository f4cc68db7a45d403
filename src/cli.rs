use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "quill", version, about = "Terminal agent that turns questions into tool calls")]
pub struct Cli {
    /// Provider name from config (defaults to the configured default)
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Path to config file (overrides default search)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Disable live partial-output display for streaming backends
    #[arg(long)]
    pub no_stream: bool,

    /// The question to ask. Starts an interactive session when omitted.
    #[arg(trailing_var_arg = true)]
    pub query: Vec<String>,
}
