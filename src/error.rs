use std::path::PathBuf;

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Unknown provider '{0}' (not in config or built-in presets)")]
    UnknownProvider(String),

    #[error("API key environment variable {env_var} is not set")]
    MissingApiKey { env_var: String },
}

/// Structural errors from the provider protocol adapter.
///
/// These abort the current loop or agent and cross component boundaries as
/// typed errors. Soft failures (a tool handler reporting a bad path, a
/// non-zero exit) never appear here -- they are encoded as result text.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Failed to build request: {0}")]
    RequestBuild(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API request failed ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse API response: {0}")]
    MalformedResponse(String),

    #[error("No choices in response")]
    NoChoices,
}

/// Structural errors from tool dispatch.
///
/// Only unknown tool names and malformed argument JSON are structural; a
/// handler-level failure is returned as descriptive result text so the model
/// can observe it and react.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}

/// Errors surfaced by the top-level query loop.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Max tool iterations reached")]
    MaxToolIterations,
}
