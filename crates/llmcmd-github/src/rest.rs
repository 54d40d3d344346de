use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use tracing::{error, info, warn};
use url::Url;

use crate::{ActionContext, GithubClient, GithubError};
use llmcmd_types::{ChangedFile, FileStatus, GitRef, PullRequestComment, PullRequestInfo};

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "llm-commands";

/// GitHub REST v3 client bound to the repository the action runs in.
pub struct RestGithub {
    client: Client,
    token: String,
    context: ActionContext,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct UserDto {
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefDto {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PullDto {
    number: u64,
    title: String,
    body: Option<String>,
    user: Option<UserDto>,
    base: RefDto,
    head: RefDto,
}

#[derive(Debug, Deserialize)]
struct FileDto {
    filename: String,
    status: String,
    patch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentDto {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentDto {
    user: Option<UserDto>,
    body: Option<String>,
}

impl RestGithub {
    pub fn new(token: impl Into<String>, context: ActionContext) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
            context,
            api_base: API_BASE.to_string(),
        }
    }

    /// Point the client at a different API root. Used against GitHub
    /// Enterprise instances.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.api_base, path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
    }

    async fn fetch_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<String, GithubError> {
        let response = self
            .get(&format!("/repos/{owner}/{repo}/contents/{path}"))
            .query(&[("ref", git_ref)])
            .send()
            .await
            .map_err(|e| GithubError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GithubError::Api(format!("{status}: {body}")));
        }

        let dto: ContentDto = response
            .json()
            .await
            .map_err(|e| GithubError::Api(e.to_string()))?;

        match dto.content {
            Some(encoded) => decode_base64_content(&encoded)
                .ok_or_else(|| GithubError::Api(format!("{path} is not a regular file"))),
            None => Err(GithubError::Api(format!("{path} is not a regular file"))),
        }
    }
}

#[async_trait]
impl GithubClient for RestGithub {
    async fn get_pull_request_info(&self) -> Option<PullRequestInfo> {
        let number = self.context.pull_request_number()?;

        let response = self
            .get(&format!(
                "/repos/{}/{}/pulls/{}",
                self.context.owner, self.context.repo, number
            ))
            .send()
            .await;

        let pr: PullDto = match response {
            Ok(r) if r.status().is_success() => match r.json().await {
                Ok(pr) => pr,
                Err(e) => {
                    warn!(error = %e, "failed to decode pull request info");
                    return None;
                }
            },
            Ok(r) => {
                warn!(status = %r.status(), "failed to get pull request info");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "failed to get pull request info");
                return None;
            }
        };

        Some(PullRequestInfo {
            number: pr.number,
            title: pr.title,
            body: pr.body.unwrap_or_default(),
            author: pr.user.and_then(|u| u.login).unwrap_or_default(),
            base: GitRef {
                git_ref: pr.base.git_ref,
                sha: pr.base.sha,
            },
            head: GitRef {
                git_ref: pr.head.git_ref,
                sha: pr.head.sha,
            },
        })
    }

    async fn get_changed_files(&self, pr: &PullRequestInfo) -> Vec<ChangedFile> {
        let response = self
            .get(&format!(
                "/repos/{}/{}/pulls/{}/files",
                self.context.owner, self.context.repo, pr.number
            ))
            .query(&[("per_page", "100")])
            .send()
            .await;

        let files: Vec<FileDto> = match response {
            Ok(r) if r.status().is_success() => r.json().await.unwrap_or_else(|e| {
                error!(error = %e, "failed to decode changed files");
                Vec::new()
            }),
            Ok(r) => {
                error!(status = %r.status(), "failed to list changed files");
                return Vec::new();
            }
            Err(e) => {
                error!(error = %e, "failed to list changed files");
                return Vec::new();
            }
        };

        let mut changed = Vec::with_capacity(files.len());
        for file in files {
            let status = parse_file_status(&file.status);

            let content = if status == FileStatus::Removed {
                None
            } else {
                match self
                    .fetch_content(
                        &self.context.owner,
                        &self.context.repo,
                        &file.filename,
                        &pr.head.sha,
                    )
                    .await
                {
                    Ok(content) => Some(content),
                    Err(e) => {
                        warn!(file = %file.filename, error = %e, "failed to get file content");
                        None
                    }
                }
            };

            changed.push(ChangedFile {
                filename: file.filename,
                status,
                patch: file.patch,
                content,
            });
        }

        changed
    }

    async fn get_pull_request_comments(&self, pr: &PullRequestInfo) -> Vec<PullRequestComment> {
        let response = self
            .get(&format!(
                "/repos/{}/{}/issues/{}/comments",
                self.context.owner, self.context.repo, pr.number
            ))
            .send()
            .await;

        let comments: Vec<CommentDto> = match response {
            Ok(r) if r.status().is_success() => r.json().await.unwrap_or_default(),
            Ok(r) => {
                warn!(status = %r.status(), "failed to list PR comments");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "failed to list PR comments");
                return Vec::new();
            }
        };

        comments
            .into_iter()
            .map(|c| PullRequestComment {
                author: c.user.and_then(|u| u.login).unwrap_or_default(),
                body: c.body.unwrap_or_default(),
            })
            .collect()
    }

    async fn add_pull_request_comment(
        &self,
        pr: &PullRequestInfo,
        body: &str,
        command_name: Option<&str>,
    ) -> Result<(), GithubError> {
        let response = self
            .client
            .post(format!(
                "{}/repos/{}/{}/issues/{}/comments",
                self.api_base, self.context.owner, self.context.repo, pr.number
            ))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await
            .map_err(|e| GithubError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GithubError::Api(format!("{status}: {text}")));
        }

        info!(
            pr = pr.number,
            command = command_name.unwrap_or("-"),
            "posted comment"
        );
        Ok(())
    }

    async fn get_reference_file_content(&self, path_or_url: &str) -> String {
        info!(path = path_or_url, "fetching reference file");

        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            if let Some(blob) = parse_github_blob_url(path_or_url) {
                return match self
                    .fetch_content(&blob.owner, &blob.repo, &blob.path, &blob.git_ref)
                    .await
                {
                    Ok(content) => content,
                    Err(e) => {
                        warn!(url = path_or_url, error = %e, "failed to fetch GitHub file");
                        String::new()
                    }
                };
            }

            let response = self
                .client
                .get(path_or_url)
                .header("User-Agent", USER_AGENT)
                .send()
                .await;
            return match response {
                Ok(r) if r.status().is_success() => r.text().await.unwrap_or_default(),
                Ok(r) => {
                    warn!(url = path_or_url, status = %r.status(), "failed to fetch remote file");
                    String::new()
                }
                Err(e) => {
                    warn!(url = path_or_url, error = %e, "failed to fetch remote file");
                    String::new()
                }
            };
        }

        match tokio::fs::read_to_string(path_or_url).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = path_or_url, error = %e, "reference file not readable");
                String::new()
            }
        }
    }
}

fn parse_file_status(status: &str) -> FileStatus {
    match status {
        "added" => FileStatus::Added,
        "modified" => FileStatus::Modified,
        "removed" => FileStatus::Removed,
        "renamed" => FileStatus::Renamed,
        other => {
            // The API also reports copied/changed/unchanged; treat them as
            // ordinary modifications.
            warn!(status = other, "unexpected file status");
            FileStatus::Modified
        }
    }
}

fn decode_base64_content(encoded: &str) -> Option<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .ok()?;
    String::from_utf8(bytes).ok()
}

/// Coordinates of a file addressed by a `github.com/{owner}/{repo}/blob/{ref}/{path}` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub owner: String,
    pub repo: String,
    pub git_ref: String,
    pub path: String,
}

/// Parse a GitHub blob URL into API coordinates. Returns `None` for anything
/// that is not a github.com blob link.
pub fn parse_github_blob_url(raw: &str) -> Option<BlobRef> {
    let url = Url::parse(raw).ok()?;
    if url.host_str() != Some("github.com") {
        return None;
    }

    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    if segments.len() < 5 || segments[2] != "blob" {
        return None;
    }

    Some(BlobRef {
        owner: segments[0].to_string(),
        repo: segments[1].to_string(),
        git_ref: segments[3].to_string(),
        path: segments[4..].join("/"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_blob_url() {
        let blob =
            parse_github_blob_url("https://github.com/octo/repo/blob/main/docs/guide.md").unwrap();
        assert_eq!(blob.owner, "octo");
        assert_eq!(blob.repo, "repo");
        assert_eq!(blob.git_ref, "main");
        assert_eq!(blob.path, "docs/guide.md");
    }

    #[test]
    fn rejects_non_blob_urls() {
        assert!(parse_github_blob_url("https://github.com/octo/repo").is_none());
        assert!(parse_github_blob_url("https://github.com/octo/repo/tree/main/docs").is_none());
        assert!(parse_github_blob_url("https://example.com/octo/repo/blob/main/x").is_none());
        assert!(parse_github_blob_url("not a url").is_none());
    }

    #[test]
    fn decodes_wrapped_base64() {
        // The contents API wraps base64 at 60 columns.
        let encoded = "aGVsbG8g\nd29ybGQ=\n";
        assert_eq!(decode_base64_content(encoded).as_deref(), Some("hello world"));
        assert!(decode_base64_content("!!!").is_none());
    }

    #[test]
    fn maps_unknown_status_to_modified() {
        assert_eq!(parse_file_status("added"), FileStatus::Added);
        assert_eq!(parse_file_status("removed"), FileStatus::Removed);
        assert_eq!(parse_file_status("copied"), FileStatus::Modified);
    }
}
