use serde::Deserialize;

/// The TOML file structure for quill.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub default_provider: Option<String>,
    pub preferences: Option<PreferencesFile>,
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
}

/// One `[[providers]]` table in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    pub model_name: String,
    pub endpoint: String,
    pub auth_env_var: Option<String>,
    /// Header carrying the API key. `Authorization` (the default) gets a
    /// `Bearer ` prefix; any other header carries the raw key.
    pub auth_header: Option<String>,
    /// Whether the backend speaks the tool-calling chat-completion schema.
    pub supports_tools: Option<bool>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PreferencesFile {
    pub stream_responses: Option<bool>,
    pub command_timeout_secs: Option<u64>,
}

/// Fully-resolved backend configuration. The API key has already been read
/// from the environment.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub model_name: String,
    pub endpoint: String,
    pub api_key: String,
    pub auth_header: Option<String>,
    pub supports_tools: bool,
    pub system_prompt: String,
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub stream_responses: bool,
    pub command_timeout_secs: u64,
}
