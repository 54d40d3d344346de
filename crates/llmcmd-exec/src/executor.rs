use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::matcher::{FileMatcher, Scope};
use crate::reference::ReferenceLoader;
use crate::{ExecError, OutputSink};
use llmcmd_backend::{ModelBackend, PullRequestContext};
use llmcmd_github::GithubClient;
use llmcmd_types::{
    ChangedFile, CommandConfig, CommandInstruction, CommandOutput, CommandPlan, PullRequestInfo,
    ReferenceFile,
};

/// Orchestrates one command: scope resolution, reference and plan-directed
/// loading, prior-output filtering, the model invocation, and comment/output
/// emission. Commands run strictly sequentially; instructions within a
/// command run in order and their results are concatenated.
pub struct CommandExecutor {
    github: Arc<dyn GithubClient>,
    backend: Arc<dyn ModelBackend>,
    outputs: Arc<dyn OutputSink>,
    matcher: FileMatcher,
    references: ReferenceLoader,
    debug: bool,
}

struct InstructionResult {
    pull_request_comment: String,
    summary: String,
}

impl CommandExecutor {
    pub fn new(
        github: Arc<dyn GithubClient>,
        backend: Arc<dyn ModelBackend>,
        outputs: Arc<dyn OutputSink>,
        base_dir: impl Into<PathBuf>,
        debug: bool,
    ) -> Self {
        Self {
            matcher: FileMatcher::new(base_dir),
            references: ReferenceLoader::new(github.clone()),
            github,
            backend,
            outputs,
            debug,
        }
    }

    /// Execute every instruction of `name` in order. Returns `Ok(None)` when
    /// no instruction produced a result — the command contributed nothing to
    /// the run. A backend failure is posted as an "Execution Failed" comment
    /// and propagated so the caller can record it and continue the run.
    pub async fn execute(
        &self,
        name: &str,
        config: &CommandConfig,
        changed_files: &[ChangedFile],
        pr: &PullRequestInfo,
        prior_outputs: &[CommandOutput],
        plan: Option<&CommandPlan>,
    ) -> Result<Option<CommandOutput>, ExecError> {
        info!(command = name, description = %config.description, "executing command");

        let mut combined_comment = String::new();
        let mut combined_summary = String::new();

        for instruction in &config.instructions {
            let result = self
                .execute_instruction(name, config, instruction, changed_files, pr, prior_outputs, plan)
                .await?;

            if let Some(result) = result {
                combined_comment.push_str(&result.pull_request_comment);
                combined_comment.push_str("\n\n");
                combined_summary.push_str(&result.summary);
                combined_summary.push(' ');
            }
        }

        let comment = combined_comment.trim().to_string();
        let summary = combined_summary.trim().to_string();
        if comment.is_empty() && summary.is_empty() {
            return Ok(None);
        }

        Ok(Some(CommandOutput {
            command: name.to_string(),
            pull_request_comment: comment,
            summary,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_instruction(
        &self,
        name: &str,
        config: &CommandConfig,
        instruction: &CommandInstruction,
        changed_files: &[ChangedFile],
        pr: &PullRequestInfo,
        prior_outputs: &[CommandOutput],
        plan: Option<&CommandPlan>,
    ) -> Result<Option<InstructionResult>, ExecError> {
        // 1. Scope resolution. A `none` scope is intentional: the instruction
        // runs on reference files and PR context alone.
        let mut target_files = Vec::new();
        if let Some(pattern) = instruction.scope_pattern() {
            let scope = if instruction.modified_only {
                Scope::Changed(changed_files)
            } else {
                Scope::Tree
            };
            target_files = self.matcher.resolve(pattern, scope).await;

            // 2. Empty-match policy: under modified-only scope the silence is
            // worth surfacing on the PR; under tree scope it is routine.
            if target_files.is_empty() {
                if instruction.modified_only {
                    let body = format!(
                        "{}No modified files match the pattern \"{pattern}\" in this pull request.",
                        comment_header(name, config)
                    );
                    self.github
                        .add_pull_request_comment(pr, &body, Some(name))
                        .await?;
                }
                info!(command = name, pattern, "no files match pattern");
                return Ok(None);
            }

            info!(command = name, pattern, count = target_files.len(), "matched files");
        }

        // 3. Reference assembly: declared references, then planner extras.
        let mut reference_files = self.references.load(&instruction.files).await;
        if let Some(plan) = plan {
            self.references
                .merge_planned(&mut reference_files, &plan.load_files, changed_files)
                .await;
        }

        // 4. Prior-output filtering: the plan narrows visibility; without one
        // every earlier output is passed along. Out-of-order names simply
        // match nothing.
        let relevant_outputs = filter_prior_outputs(prior_outputs, plan);

        // 5. Model invocation, with a fresh comment snapshot.
        let comments = self.github.get_pull_request_comments(pr).await;
        let pull_request = PullRequestContext {
            title: pr.title.clone(),
            body: pr.body.clone(),
            comments,
        };

        info!(command = name, "invoking model backend");
        let response = match self
            .backend
            .execute_command(
                &instruction.prompt,
                &target_files,
                &pull_request,
                &reference_files,
                &relevant_outputs,
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                // 8. Hard failure: visible on the PR and to the caller.
                error!(command = name, error = %e, "command execution failed");
                let body = format!(
                    "## ❌ {name} - Execution Failed\n\n{}\n\n**Error:** {e}\n\n\
                     Please check the action logs for more details.",
                    config.description
                );
                if let Err(post_err) = self
                    .github
                    .add_pull_request_comment(pr, &body, Some(name))
                    .await
                {
                    // The backend error is the one that matters.
                    error!(command = name, error = %post_err, "failed to post failure comment");
                }
                return Err(e.into());
            }
        };
        info!(command = name, usage = %response.usage, "model usage");

        // 6. Result handling: post when there is a comment body, always emit
        // the named outputs.
        if !response.pull_request_comment.is_empty() {
            let mut body = format!(
                "{}{}",
                comment_header(name, config),
                response.pull_request_comment
            );
            if self.debug {
                body.push_str(&format!(
                    "\n\n<!-- llm-commands:debug\nToken Usage: {}\nCommand: {}\nTimestamp: {}\n-->",
                    response.usage,
                    name,
                    chrono::Utc::now().to_rfc3339()
                ));
            }
            self.github
                .add_pull_request_comment(pr, &body, Some(name))
                .await?;
            info!(command = name, "posted comment");
        }

        self.outputs
            .set(&format!("{name}_summary"), &response.summary);
        self.outputs
            .set(&format!("{name}_comment"), &response.pull_request_comment);

        Ok(Some(InstructionResult {
            pull_request_comment: response.pull_request_comment,
            summary: response.summary,
        }))
    }
}

fn comment_header(name: &str, config: &CommandConfig) -> String {
    format!("## 🤖 {name}\n\n{}\n\n", config.description)
}

fn filter_prior_outputs(
    prior_outputs: &[CommandOutput],
    plan: Option<&CommandPlan>,
) -> Vec<CommandOutput> {
    match plan {
        Some(plan) if !plan.load_command_outputs.is_empty() => {
            let wanted: HashSet<&str> = plan
                .load_command_outputs
                .iter()
                .map(|o| o.command_name.as_str())
                .collect();
            prior_outputs
                .iter()
                .filter(|output| wanted.contains(output.command.as_str()))
                .cloned()
                .collect()
        }
        _ => prior_outputs.to_vec(),
    }
}
