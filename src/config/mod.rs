pub mod schema;

pub use schema::*;

use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::error::ConfigError;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a capable terminal assistant. You can run shell \
commands, manage background tasks, delegate work to sub-agents, and watch builds for errors. \
Answer concisely. Prefer doing over explaining.";

const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Load configuration by merging the config file and CLI arguments.
/// Precedence: CLI > config file > built-in presets.
///
/// A missing config file is not an error -- built-in presets apply.
pub fn load_config(cli: &Cli) -> Result<AppConfig, ConfigError> {
    let file = match cli.config.as_deref() {
        Some(path) => load_toml_file(path)?,
        None => match default_config_path() {
            Some(path) if path.exists() => load_toml_file(&path)?,
            _ => {
                tracing::debug!("No config file found, using built-in presets");
                ConfigFile::default()
            }
        },
    };

    let provider_name = cli
        .provider
        .clone()
        .or(file.default_provider.clone())
        .unwrap_or_else(|| "openai".to_string());

    let entry = file
        .providers
        .iter()
        .find(|p| p.name == provider_name)
        .cloned()
        .or_else(|| builtin_preset(&provider_name))
        .ok_or(ConfigError::UnknownProvider(provider_name))?;

    let provider = resolve_provider(entry)?;

    let prefs = file.preferences;
    Ok(AppConfig {
        provider,
        stream_responses: prefs
            .as_ref()
            .and_then(|p| p.stream_responses)
            .unwrap_or(true)
            && !cli.no_stream,
        command_timeout_secs: prefs
            .as_ref()
            .and_then(|p| p.command_timeout_secs)
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
    })
}

/// Resolve a file entry into a runtime provider config, reading the API key
/// from the configured environment variable.
fn resolve_provider(entry: ProviderEntry) -> Result<ProviderConfig, ConfigError> {
    let api_key = match &entry.auth_env_var {
        Some(var) => std::env::var(var).map_err(|_| ConfigError::MissingApiKey {
            env_var: var.clone(),
        })?,
        None => String::new(),
    };

    Ok(ProviderConfig {
        name: entry.name,
        model_name: entry.model_name,
        endpoint: entry.endpoint,
        api_key,
        auth_header: entry.auth_header,
        supports_tools: entry.supports_tools.unwrap_or(true),
        system_prompt: entry
            .system_prompt
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
    })
}

/// Built-in provider presets for the common backends, used when the config
/// file does not define the requested provider.
fn builtin_preset(name: &str) -> Option<ProviderEntry> {
    match name {
        "openai" => Some(ProviderEntry {
            name: "openai".into(),
            model_name: "gpt-4o".into(),
            endpoint: "https://api.openai.com/v1/chat/completions".into(),
            auth_env_var: Some("OPENAI_API_KEY".into()),
            auth_header: None,
            supports_tools: Some(true),
            system_prompt: None,
        }),
        "groq" => Some(ProviderEntry {
            name: "groq".into(),
            model_name: "llama-3.3-70b-versatile".into(),
            endpoint: "https://api.groq.com/openai/v1/chat/completions".into(),
            auth_env_var: Some("GROQ_API_KEY".into()),
            auth_header: None,
            supports_tools: Some(true),
            system_prompt: None,
        }),
        "ollama" => Some(ProviderEntry {
            name: "ollama".into(),
            model_name: "llama3.2".into(),
            endpoint: "http://localhost:11434/api/chat".into(),
            auth_env_var: None,
            auth_header: None,
            // Local Ollama speaks the plain-chat NDJSON protocol.
            supports_tools: Some(false),
            system_prompt: None,
        }),
        _ => None,
    }
}

/// Platform config path: ~/.config/quill/quill.toml or equivalent.
fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "quill")
        .map(|dirs| dirs.config_dir().join("quill.toml"))
}

fn load_toml_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            provider: None,
            config: None,
            no_stream: false,
            query: vec![],
        }
    }

    #[test]
    fn builtin_preset_known_names() {
        assert!(builtin_preset("openai").is_some());
        assert!(builtin_preset("ollama").is_some());
        assert!(builtin_preset("nonsense").is_none());
    }

    #[test]
    fn ollama_preset_is_plain_chat() {
        let entry = builtin_preset("ollama").unwrap();
        assert_eq!(entry.supports_tools, Some(false));
        assert!(entry.auth_env_var.is_none());
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let mut cli = base_cli();
        cli.provider = Some("does-not-exist".into());
        let err = load_config(&cli).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProvider(_)));
    }

    #[test]
    fn config_file_overrides_presets() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("quill.toml");
        std::fs::write(
            &path,
            r#"
default_provider = "local"

[preferences]
command_timeout_secs = 5

[[providers]]
name = "local"
model_name = "test-model"
endpoint = "http://localhost:9999/v1/chat/completions"
supports_tools = true
"#,
        )
        .unwrap();

        let mut cli = base_cli();
        cli.config = Some(path);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.provider.name, "local");
        assert_eq!(config.provider.model_name, "test-model");
        assert_eq!(config.command_timeout_secs, 5);
        assert!(config.provider.api_key.is_empty());
    }

    #[test]
    fn parse_error_reports_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("quill.toml");
        std::fs::write(&path, "not [valid toml").unwrap();

        let mut cli = base_cli();
        cli.config = Some(path.clone());
        let err = load_config(&cli).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
