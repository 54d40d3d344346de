use serde_json::Value;
use std::path::Path;
use tracing::warn;

/// The GitHub Actions event this run was triggered by: event name, repository
/// coordinates, and the deserialized event payload.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub event_name: String,
    pub owner: String,
    pub repo: String,
    pub payload: Value,
}

impl ActionContext {
    pub fn new(
        event_name: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            event_name: event_name.into(),
            owner: owner.into(),
            repo: repo.into(),
            payload,
        }
    }

    /// Build the context from the standard Actions environment:
    /// `GITHUB_EVENT_NAME`, `GITHUB_REPOSITORY` (`owner/repo`), and the event
    /// payload file at `GITHUB_EVENT_PATH`.
    pub fn from_env() -> Option<Self> {
        let event_name = std::env::var("GITHUB_EVENT_NAME").ok()?;
        let repository = std::env::var("GITHUB_REPOSITORY").ok()?;
        let (owner, repo) = repository.split_once('/')?;

        let payload = match std::env::var("GITHUB_EVENT_PATH") {
            Ok(path) => read_payload(Path::new(&path)),
            Err(_) => Value::Null,
        };

        Some(Self::new(event_name, owner, repo, payload))
    }

    /// PR number from the payload: `pull_request.number` for pull_request
    /// events, `issue.number` for issue_comment events.
    pub fn pull_request_number(&self) -> Option<u64> {
        match self.event_name.as_str() {
            "pull_request" => self.payload["pull_request"]["number"].as_u64(),
            "issue_comment" => self.payload["issue"]["number"].as_u64(),
            _ => None,
        }
    }

    /// Whether an issue_comment event is attached to a pull request.
    pub fn is_pull_request_comment(&self) -> bool {
        self.event_name == "issue_comment" && self.payload["issue"]["pull_request"].is_object()
    }

    pub fn comment_body(&self) -> Option<&str> {
        self.payload["comment"]["body"].as_str()
    }

    /// The payload `action` field, e.g. `opened` for a freshly opened PR.
    pub fn action(&self) -> Option<&str> {
        self.payload["action"].as_str()
    }
}

fn read_payload(path: &Path) -> Value {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "failed to parse event payload");
            Value::Null
        }),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read event payload");
            Value::Null
        }
    }
}
