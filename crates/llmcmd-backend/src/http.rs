use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::prompt::{
    render_execute_request, render_plan_request, EXECUTE_SYSTEM_PROMPT, PLAN_SYSTEM_PROMPT,
};
use crate::retry::{with_retry, RetryConfig};
use crate::{
    BackendError, CommandForPlan, CommandOutcome, CommandResponse, ModelBackend, PlanOutcome,
    PlanResponse, PullRequestContext, PullRequestForPlan, TokenUsage,
};
use llmcmd_types::{CommandOutput, LlmClientConfig, LlmClientsConfig, ReferenceFile, TargetFile};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u64 = 8192;

/// HTTP model backend. The `small` client serves planning, the `large` client
/// serves command execution; each call resolves its API key at call time.
pub struct HttpBackend {
    client: Client,
    clients: LlmClientsConfig,
    retry: RetryConfig,
}

impl HttpBackend {
    pub fn new(clients: LlmClientsConfig) -> Self {
        Self {
            client: Client::new(),
            clients,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// One chat-style completion against whichever provider the client config
    /// names. Returns the raw model text plus token usage.
    async fn complete(
        &self,
        config: &LlmClientConfig,
        system: &str,
        user: &str,
    ) -> Result<(String, TokenUsage), BackendError> {
        let api_key = resolve_api_key(config)?;
        let model = config
            .option_str("model")
            .ok_or_else(|| {
                BackendError::InvalidConfig(format!(
                    "client for provider '{}' has no model option",
                    config.provider
                ))
            })?
            .to_string();

        debug!(provider = %config.provider, model = %model, "model call");

        with_retry(&self.retry, || async {
            match config.provider.as_str() {
                "anthropic" => {
                    self.anthropic_complete(&api_key, &model, system, user)
                        .await
                }
                // Everything else speaks the OpenAI chat-completions dialect,
                // optionally against a custom base_url.
                _ => {
                    let base = config.option_str("base_url").unwrap_or(OPENAI_API_BASE);
                    self.openai_complete(base, &api_key, &model, system, user)
                        .await
                }
            }
        })
        .await
    }

    async fn openai_complete(
        &self,
        base_url: &str,
        api_key: &str,
        model: &str,
        system: &str,
        user: &str,
    ) -> Result<(String, TokenUsage), BackendError> {
        let body = serde_json::json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let value = check_and_decode(response).await?;

        let text = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| BackendError::InvalidResponse("no message content".to_string()))?
            .to_string();
        let usage = TokenUsage {
            input_tokens: value["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            output_tokens: value["usage"]["completion_tokens"].as_u64().unwrap_or(0),
        };

        Ok((text, usage))
    }

    async fn anthropic_complete(
        &self,
        api_key: &str,
        model: &str,
        system: &str,
        user: &str,
    ) -> Result<(String, TokenUsage), BackendError> {
        let body = serde_json::json!({
            "model": model,
            "max_tokens": ANTHROPIC_MAX_TOKENS,
            "system": system,
            "messages": [ { "role": "user", "content": user } ],
        });

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let value = check_and_decode(response).await?;

        let text = value["content"][0]["text"]
            .as_str()
            .ok_or_else(|| BackendError::InvalidResponse("no text content".to_string()))?
            .to_string();
        let usage = TokenUsage {
            input_tokens: value["usage"]["input_tokens"].as_u64().unwrap_or(0),
            output_tokens: value["usage"]["output_tokens"].as_u64().unwrap_or(0),
        };

        Ok((text, usage))
    }
}

#[async_trait]
impl ModelBackend for HttpBackend {
    async fn plan(
        &self,
        pull_request: &PullRequestForPlan,
        commands: &[CommandForPlan],
    ) -> Result<PlanResponse, BackendError> {
        let user = render_plan_request(pull_request, commands);
        let (text, usage) = self
            .complete(&self.clients.small, PLAN_SYSTEM_PROMPT, &user)
            .await?;

        let json = extract_json(&text)
            .ok_or_else(|| BackendError::InvalidResponse("no JSON object in plan".to_string()))?;
        let outcome: PlanOutcome = serde_json::from_str(&json)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        info!(plans = outcome.plans.len(), usage = %usage, "planning call complete");
        Ok(PlanResponse {
            plans: outcome.plans,
            usage,
        })
    }

    async fn execute_command(
        &self,
        prompt: &str,
        target_files: &[TargetFile],
        pull_request: &PullRequestContext,
        reference_files: &[ReferenceFile],
        prior_outputs: &[CommandOutput],
    ) -> Result<CommandResponse, BackendError> {
        let user = render_execute_request(
            prompt,
            target_files,
            pull_request,
            reference_files,
            prior_outputs,
        );
        let (text, usage) = self
            .complete(&self.clients.large, EXECUTE_SYSTEM_PROMPT, &user)
            .await?;

        let json = extract_json(&text).ok_or_else(|| {
            BackendError::InvalidResponse("no JSON object in command output".to_string())
        })?;
        let outcome: CommandOutcome = serde_json::from_str(&json)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        Ok(CommandResponse {
            summary: outcome.summary,
            pull_request_comment: outcome.pull_request_comment,
            usage,
        })
    }
}

async fn check_and_decode(response: reqwest::Response) -> Result<serde_json::Value, BackendError> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let message = response.text().await.unwrap_or_default();
        return Err(BackendError::RateLimited(message));
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(BackendError::Api {
            status: status.as_u16(),
            message,
        });
    }
    response
        .json()
        .await
        .map_err(|e| BackendError::InvalidResponse(e.to_string()))
}

/// Resolve the configured `api_key`, honoring `env.VARNAME` indirection at
/// call time.
pub fn resolve_api_key(config: &LlmClientConfig) -> Result<String, BackendError> {
    let raw = config
        .option_str("api_key")
        .ok_or_else(|| BackendError::MissingApiKey(config.provider.clone()))?;

    if let Some(var) = raw.strip_prefix("env.") {
        return std::env::var(var)
            .map_err(|_| BackendError::MissingApiKey(format!("environment variable {var}")));
    }

    Ok(raw.to_string())
}

/// Pull the first JSON object out of model text, tolerating code fences and
/// surrounding prose.
pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
            return Some(trimmed.to_string());
        }
    }

    // Fenced block, with or without a language tag.
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.split_once('\n').map_or(after, |(_, rest)| rest);
        if let Some(end) = after.find("```") {
            let candidate = after[..end].trim();
            if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
                return Some(candidate.to_string());
            }
        }
    }

    // Widest brace span in prose.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    let candidate = &trimmed[start..=end];
    serde_json::from_str::<serde_json::Value>(candidate)
        .ok()
        .map(|_| candidate.to_string())
}
