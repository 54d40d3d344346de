//! Model backend collaborator: the two calls the execution pipeline makes
//! (`plan` and `execute_command`), their wire types, and an HTTP
//! implementation over OpenAI-compatible and Anthropic APIs.

mod http;
mod prompt;
mod retry;

pub use http::{extract_json, resolve_api_key, HttpBackend};
pub use retry::{with_retry, IsRetryable, RetryConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use llmcmd_types::{CommandOutput, CommandPlan, PullRequestComment, ReferenceFile, TargetFile};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Missing API key: {0}")]
    MissingApiKey(String),

    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
}

impl IsRetryable for BackendError {
    fn is_retryable(&self) -> Option<String> {
        match self {
            BackendError::Network(msg) | BackendError::RateLimited(msg) => Some(msg.clone()),
            BackendError::Api { status, message } if *status >= 500 => Some(message.clone()),
            _ => None,
        }
    }
}

/// Token accounting for a single model call, logged after the call returns.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl std::fmt::Display for TokenUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "input={} output={}",
            self.input_tokens, self.output_tokens
        )
    }
}

/// Pull-request context attached to an `execute_command` call, assembled
/// fresh per call (comments may change between calls).
#[derive(Debug, Clone, Serialize)]
pub struct PullRequestContext {
    pub title: String,
    pub body: String,
    pub comments: Vec<PullRequestComment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileForPlan {
    pub filename: String,
    pub status: String,
}

/// The planning request's view of the pull request: metadata and file names
/// only, no content.
#[derive(Debug, Clone, Serialize)]
pub struct PullRequestForPlan {
    pub title: String,
    pub body: String,
    pub comments: Vec<PullRequestComment>,
    pub files: Vec<FileForPlan>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReferenceForPlan {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub path: String,
}

/// What the planner sees of one instruction. Deliberately only the first
/// instruction of each command is sent.
#[derive(Debug, Clone, Serialize)]
pub struct InstructionForPlan {
    #[serde(rename = "applyTo", skip_serializing_if = "Option::is_none")]
    pub apply_to: Option<String>,
    pub prompt: String,
    pub files: Vec<FileReferenceForPlan>,
    #[serde(rename = "modifiedOnly")]
    pub modified_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandForPlan {
    pub name: String,
    pub description: String,
    pub instructions: InstructionForPlan,
}

/// One command's plan as produced by the model, paired with the command name.
#[derive(Debug, Clone, Deserialize)]
pub struct NamedPlan {
    pub name: String,
    #[serde(flatten)]
    pub plan: CommandPlan,
}

#[derive(Debug, Deserialize)]
pub struct PlanOutcome {
    pub plans: Vec<NamedPlan>,
}

#[derive(Debug)]
pub struct PlanResponse {
    pub plans: Vec<NamedPlan>,
    pub usage: TokenUsage,
}

/// The structured fields consumed from an execution response.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandOutcome {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub pull_request_comment: String,
}

#[derive(Debug)]
pub struct CommandResponse {
    pub summary: String,
    pub pull_request_comment: String,
    pub usage: TokenUsage,
}

/// The model backend the pipeline invokes: once per run for planning, once
/// per instruction for execution.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn plan(
        &self,
        pull_request: &PullRequestForPlan,
        commands: &[CommandForPlan],
    ) -> Result<PlanResponse, BackendError>;

    async fn execute_command(
        &self,
        prompt: &str,
        target_files: &[TargetFile],
        pull_request: &PullRequestContext,
        reference_files: &[ReferenceFile],
        prior_outputs: &[CommandOutput],
    ) -> Result<CommandResponse, BackendError>;
}
