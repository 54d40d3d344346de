//! Loading and validation of the repository's command configuration file.
//!
//! The file lives at `.llm/commands.json` by default and is parsed as JSON
//! with comments. A missing or invalid file is a fatal pre-flight error: no
//! command executes without a valid configuration.

use jsonc_parser::{parse_to_serde_value, ParseOptions};
use std::fs;
use std::path::Path;
use tracing::info;

use llmcmd_types::LlmCommandsConfig;

pub const DEFAULT_CONFIG_PATH: &str = ".llm/commands.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    NotFound(String),

    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Load and validate the command configuration under `workspace_path`.
pub fn load_config(
    workspace_path: &Path,
    config_path: &str,
) -> Result<LlmCommandsConfig, ConfigError> {
    let path = workspace_path.join(config_path);
    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }

    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let config = parse_config(&content)?;
    info!(
        commands = config.commands.len(),
        path = %path.display(),
        "loaded command configuration"
    );
    Ok(config)
}

/// Parse configuration content (JSON with comments) and validate it.
pub fn parse_config(content: &str) -> Result<LlmCommandsConfig, ConfigError> {
    let value = parse_to_serde_value(content, &ParseOptions::default())
        .map_err(|e| ConfigError::Parse(e.to_string()))?
        .ok_or_else(|| ConfigError::Parse("empty configuration file".to_string()))?;

    let config: LlmCommandsConfig =
        serde_json::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &LlmCommandsConfig) -> Result<(), ConfigError> {
    if config.commands.is_empty() {
        return Err(ConfigError::Invalid(
            "commands section must define at least one command".to_string(),
        ));
    }

    for (name, command) in &config.commands {
        if command.instructions.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "command '{name}' has no instructions"
            )));
        }
        for (idx, instruction) in command.instructions.iter().enumerate() {
            if instruction.prompt.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "command '{name}' instruction {idx} has an empty prompt"
                )));
            }
        }
    }

    Ok(())
}

/// Filter the requested command names down to those the configuration defines,
/// preserving request order. When triggered from a PR comment, commands with
/// `canExecuteFromComment: false` are excluded.
pub fn commands_to_run(
    config: &LlmCommandsConfig,
    requested: &[String],
    from_comment: bool,
) -> Vec<String> {
    requested
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .filter(|name| match config.commands.get(*name) {
            Some(command) => !from_comment || command.can_execute_from_comment,
            None => false,
        })
        .map(str::to_string)
        .collect()
}

/// Commands that may be invoked from PR comments, as (name, description) pairs
/// sorted by name for stable listing.
pub fn comment_enabled_commands(config: &LlmCommandsConfig) -> Vec<(String, String)> {
    let mut commands: Vec<(String, String)> = config
        .commands
        .iter()
        .filter(|(_, command)| command.can_execute_from_comment)
        .map(|(name, command)| (name.clone(), command.description.clone()))
        .collect();
    commands.sort();
    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        // comments are allowed
        "llm-clients": {
            "large": { "provider": "openai", "options": { "model": "gpt-4o" } },
            "small": { "provider": "openai", "options": { "model": "gpt-4o-mini" } }
        },
        "commands": {
            "lint": {
                "description": "Lint the changes",
                "instructions": [{ "applyTo": "*.py", "prompt": "lint" }]
            },
            "deploy-notes": {
                "description": "Draft deploy notes",
                "canExecuteFromComment": false,
                "instructions": [{ "applyTo": "none", "prompt": "summarize" }]
            }
        }
    }"#;

    #[test]
    fn parses_jsonc_with_comments() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.commands.len(), 2);
        assert_eq!(config.llm_clients.large.option_str("model"), Some("gpt-4o"));
        assert!(!config.commands["deploy-notes"].can_execute_from_comment);
    }

    #[test]
    fn rejects_empty_commands() {
        let err = parse_config(
            r#"{
                "llm-clients": {
                    "large": { "provider": "openai" },
                    "small": { "provider": "openai" }
                },
                "commands": {}
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_empty_prompt() {
        let err = parse_config(
            r#"{
                "llm-clients": {
                    "large": { "provider": "openai" },
                    "small": { "provider": "openai" }
                },
                "commands": {
                    "lint": { "description": "d", "instructions": [{ "prompt": " " }] }
                }
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn selects_requested_commands_in_order() {
        let config = parse_config(MINIMAL).unwrap();
        let requested = vec![
            "deploy-notes".to_string(),
            " lint ".to_string(),
            "missing".to_string(),
        ];
        assert_eq!(
            commands_to_run(&config, &requested, false),
            vec!["deploy-notes".to_string(), "lint".to_string()]
        );
    }

    #[test]
    fn comment_trigger_excludes_disabled_commands() {
        let config = parse_config(MINIMAL).unwrap();
        let requested = vec!["deploy-notes".to_string(), "lint".to_string()];
        assert_eq!(
            commands_to_run(&config, &requested, true),
            vec!["lint".to_string()]
        );
        assert_eq!(
            comment_enabled_commands(&config),
            vec![("lint".to_string(), "Lint the changes".to_string())]
        );
    }

    #[test]
    fn missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path(), DEFAULT_CONFIG_PATH).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn loads_from_default_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".llm")).unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_PATH), MINIMAL).unwrap();
        let config = load_config(dir.path(), DEFAULT_CONFIG_PATH).unwrap();
        assert!(config.commands.contains_key("lint"));
    }
}
