use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sentinel `applyTo` value meaning "do not match any files": the instruction
/// runs on reference files and pull-request context alone.
pub const APPLY_TO_NONE: &str = "none";

/// A named, user-triggerable unit of work composed of one or more instructions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    pub description: String,

    pub instructions: Vec<CommandInstruction>,

    /// Whether the command may be triggered from a PR comment.
    #[serde(
        rename = "canExecuteFromComment",
        default = "default_true",
        skip_serializing_if = "is_true"
    )]
    pub can_execute_from_comment: bool,
}

/// One prompt plus file-scope rule within a command. A command's instructions
/// execute in sequence and their outputs are concatenated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInstruction {
    /// Glob pattern selecting target files, or [`APPLY_TO_NONE`]. Absent means
    /// the same as `"none"`.
    #[serde(rename = "applyTo", default, skip_serializing_if = "Option::is_none")]
    pub apply_to: Option<String>,

    pub prompt: String,

    /// Reference files attached to every invocation of this instruction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileReference>,

    /// Match only files modified in the pull request (default) rather than the
    /// entire tree.
    #[serde(
        rename = "modifiedOnly",
        default = "default_true",
        skip_serializing_if = "is_true"
    )]
    pub modified_only: bool,
}

/// Pointer to supplementary content: a local path, a GitHub blob URL, or any
/// other HTTP(S) URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReference {
    pub path: String,

    /// Semantic label surfaced to the model alongside the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmClientConfig {
    pub provider: String,

    /// Provider options bag. Well-known keys: `api_key` (supports `env.VARNAME`
    /// indirection), `model`, `base_url`.
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
}

impl LlmClientConfig {
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }
}

/// The two clients the action distinguishes: a cheap `small` client for
/// planning and a `large` client for content generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmClientsConfig {
    pub large: LlmClientConfig,
    pub small: LlmClientConfig,
}

/// Root of the repository configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCommandsConfig {
    /// Custom invocation handle recognized in PR comments, e.g. `@reviewbot`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,

    #[serde(rename = "llm-clients")]
    pub llm_clients: LlmClientsConfig,

    pub commands: HashMap<String, CommandConfig>,
}

impl CommandInstruction {
    /// Effective scope pattern: `None` when the instruction targets no files.
    pub fn scope_pattern(&self) -> Option<&str> {
        match self.apply_to.as_deref() {
            None | Some(APPLY_TO_NONE) => None,
            Some(pattern) => Some(pattern),
        }
    }
}

fn default_true() -> bool {
    true
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_true(v: &bool) -> bool {
    *v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_defaults() {
        let instruction: CommandInstruction =
            serde_json::from_str(r#"{ "prompt": "review this" }"#).unwrap();
        assert!(instruction.modified_only);
        assert!(instruction.apply_to.is_none());
        assert!(instruction.files.is_empty());
        assert!(instruction.scope_pattern().is_none());
    }

    #[test]
    fn none_sentinel_disables_scope() {
        let instruction: CommandInstruction =
            serde_json::from_str(r#"{ "applyTo": "none", "prompt": "p" }"#).unwrap();
        assert!(instruction.scope_pattern().is_none());

        let instruction: CommandInstruction =
            serde_json::from_str(r#"{ "applyTo": "*.py", "prompt": "p" }"#).unwrap();
        assert_eq!(instruction.scope_pattern(), Some("*.py"));
    }

    #[test]
    fn command_defaults_comment_execution_on() {
        let command: CommandConfig = serde_json::from_str(
            r#"{ "description": "d", "instructions": [{ "prompt": "p" }] }"#,
        )
        .unwrap();
        assert!(command.can_execute_from_comment);
    }
}
