//! Rendering of the request text the backend sends to the model: structured
//! markdown sections for execution, JSON payloads for planning.

use crate::{CommandForPlan, PullRequestContext, PullRequestForPlan};
use llmcmd_types::{CommandOutput, ReferenceFile, TargetFile};

pub const EXECUTE_SYSTEM_PROMPT: &str = "\
You are an automated reviewer running inside a CI pipeline for a pull request. \
Follow the instruction using the provided target files, reference material, and \
prior command outputs. Respond with a single JSON object and nothing else:\n\
{\"summary\": \"one-line status of what you did\", \"pull_request_comment\": \
\"markdown comment to post on the pull request, or an empty string when there \
is nothing worth posting\"}";

pub const PLAN_SYSTEM_PROMPT: &str = "\
You decide what extra context each configured command needs before it runs \
against a pull request. For every command, list repository files worth loading \
(set fullContent to false when the diff alone suffices) and the names of earlier \
commands whose outputs it should see. Be frugal: request only context that \
changes the outcome. Respond with a single JSON object and nothing else:\n\
{\"plans\": [{\"name\": \"<command>\", \"loadFiles\": [{\"path\": \"...\", \
\"reason\": \"...\", \"fullContent\": true}], \"loadCommandOutputs\": \
[{\"commandName\": \"...\", \"reason\": \"...\"}]}]}";

pub fn render_execute_request(
    prompt: &str,
    target_files: &[TargetFile],
    pull_request: &PullRequestContext,
    reference_files: &[ReferenceFile],
    prior_outputs: &[CommandOutput],
) -> String {
    let mut out = String::new();

    out.push_str("# Instruction\n\n");
    out.push_str(prompt);
    out.push_str("\n\n# Pull request\n\n");
    out.push_str(&format!("Title: {}\n\n{}\n", pull_request.title, pull_request.body));

    if !pull_request.comments.is_empty() {
        out.push_str("\n## Comments\n\n");
        for comment in &pull_request.comments {
            out.push_str(&format!("@{}: {}\n\n", comment.author, comment.body));
        }
    }

    out.push_str("\n# Target files\n");
    if target_files.is_empty() {
        out.push_str("\n(none)\n");
    }
    for file in target_files {
        out.push_str(&format!("\n## {}\n", file.filename));
        if let Some(patch) = &file.patch {
            out.push_str(&format!("\nDiff:\n```diff\n{patch}\n```\n"));
        }
        out.push_str(&format!("\nContent:\n```\n{}\n```\n", file.content));
    }

    if !reference_files.is_empty() {
        out.push_str("\n# Reference files\n");
        for file in reference_files {
            let label = file.name.as_deref().unwrap_or(&file.path);
            out.push_str(&format!(
                "\n## {label} ({})\n\n```\n{}\n```\n",
                file.path, file.content
            ));
        }
    }

    if !prior_outputs.is_empty() {
        out.push_str("\n# Prior command outputs\n");
        for output in prior_outputs {
            out.push_str(&format!(
                "\n## {}\n\nSummary: {}\n\n{}\n",
                output.command, output.summary, output.pull_request_comment
            ));
        }
    }

    out
}

pub fn render_plan_request(
    pull_request: &PullRequestForPlan,
    commands: &[CommandForPlan],
) -> String {
    // Both structures go over as JSON: the planner reasons about shape, not prose.
    let pr_json = serde_json::to_string_pretty(pull_request).unwrap_or_default();
    let commands_json = serde_json::to_string_pretty(commands).unwrap_or_default();

    format!(
        "# Pull request\n\n```json\n{pr_json}\n```\n\n# Configured commands\n\n```json\n{commands_json}\n```\n"
    )
}
