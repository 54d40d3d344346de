//! GitHub collaborator: the `GithubClient` trait the execution pipeline talks
//! to, a REST implementation over the GitHub v3 API, and the Actions event
//! context it is driven by.

mod context;
mod rest;

pub use context::ActionContext;
pub use rest::{parse_github_blob_url, BlobRef, RestGithub};

use async_trait::async_trait;
use llmcmd_types::{ChangedFile, PullRequestComment, PullRequestInfo};

#[derive(Debug, thiserror::Error)]
pub enum GithubError {
    #[error("GitHub API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Missing pull request context")]
    NoPullRequest,
}

/// The fixed surface the core consumes. Fetch-style calls degrade to empty
/// results on failure; only comment posting propagates an error.
#[async_trait]
pub trait GithubClient: Send + Sync {
    /// The pull request the triggering event refers to, or `None` when the
    /// event carries no PR (or the lookup fails).
    async fn get_pull_request_info(&self) -> Option<PullRequestInfo>;

    /// Files changed in the PR, with head-revision content where fetchable.
    async fn get_changed_files(&self, pr: &PullRequestInfo) -> Vec<ChangedFile>;

    async fn get_pull_request_comments(&self, pr: &PullRequestInfo) -> Vec<PullRequestComment>;

    async fn add_pull_request_comment(
        &self,
        pr: &PullRequestInfo,
        body: &str,
        command_name: Option<&str>,
    ) -> Result<(), GithubError>;

    /// Resolve a reference path (GitHub blob URL, generic URL, or local path)
    /// to its content. Never fails: unreadable references yield `""`.
    async fn get_reference_file_content(&self, path_or_url: &str) -> String;
}
