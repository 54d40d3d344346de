//! Action entrypoint: resolves inputs, routes the triggering event, runs the
//! configured commands in order, and emits the run-level outputs.

use anyhow::{bail, Context, Result};
use clap::Parser;
use regex::Regex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use llmcmd_backend::HttpBackend;
use llmcmd_config::{commands_to_run, comment_enabled_commands, load_config, DEFAULT_CONFIG_PATH};
use llmcmd_exec::{CommandExecutor, ExecutionPlanner, OutputSink};
use llmcmd_github::{ActionContext, GithubClient, RestGithub};
use llmcmd_types::{CommandOutput, PullRequestInfo};

#[derive(Parser)]
#[command(name = "llmcmd")]
#[command(about = "Run configured LLM commands against a pull request", long_about = None)]
struct Cli {
    /// Comma- or newline-separated command names to run.
    #[arg(long)]
    commands: Option<String>,

    /// GitHub token; falls back to INPUT_GITHUB_TOKEN, then GITHUB_TOKEN.
    #[arg(long)]
    github_token: Option<String>,

    /// Path to the command configuration file, relative to the workspace.
    #[arg(long)]
    config_path: Option<String>,

    /// Append a debug block (token usage, timestamp) to posted comments.
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    run(Cli::parse()).await
}

async fn run(cli: Cli) -> Result<()> {
    let context = ActionContext::from_env()
        .context("not running under GitHub Actions: GITHUB_EVENT_NAME/GITHUB_REPOSITORY unset")?;
    info!(
        event = %context.event_name,
        repository = format!("{}/{}", context.owner, context.repo),
        "starting run"
    );

    let token = cli
        .github_token
        .or_else(|| action_input("github_token"))
        .or_else(|| std::env::var("GITHUB_TOKEN").ok())
        .filter(|t| !t.is_empty());
    let Some(token) = token else {
        bail!("GitHub token is required");
    };

    let config_path = cli
        .config_path
        .or_else(|| action_input("config_path"))
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let debug = cli.debug || action_input("debug").as_deref() == Some("true");

    let workspace = std::env::current_dir()?;
    let config = load_config(&workspace, &config_path)?;
    info!(commands = config.commands.len(), "loaded configuration");

    let from_comment = context.event_name == "issue_comment";
    let requested: Vec<String> = if from_comment {
        if !context.is_pull_request_comment() {
            info!("comment is not on a pull request, skipping");
            return Ok(());
        }
        parse_commands_from_comment(
            context.comment_body().unwrap_or_default(),
            config.handle.as_deref(),
        )
    } else {
        let input = cli
            .commands
            .or_else(|| action_input("commands"))
            .context("commands input is required")?;
        split_commands_input(&input)
    };

    if requested.is_empty() {
        warn!("no commands specified or found in comment");
        return Ok(());
    }

    let to_run = commands_to_run(&config, &requested, from_comment);
    if to_run.is_empty() {
        let mut available: Vec<&str> = config.commands.keys().map(String::as_str).collect();
        available.sort_unstable();
        warn!(
            available = available.join(", "),
            "no valid commands found"
        );
        return Ok(());
    }
    info!(commands = to_run.join(", "), "commands to execute");

    let github: Arc<dyn GithubClient> = Arc::new(RestGithub::new(token, context.clone()));
    let backend = Arc::new(HttpBackend::new(config.llm_clients.clone()));
    let outputs = Arc::new(GithubActionOutputs::from_env());

    let Some(pr) = github.get_pull_request_info().await else {
        warn!("not in a pull request context - some features may be limited");
        outputs.set("executed_commands", "[]");
        outputs.set("commands_summary", "No commands executed - not in PR context");
        return Ok(());
    };

    if context.event_name == "pull_request" && context.action() == Some("opened") {
        let enabled = comment_enabled_commands(&config);
        if !enabled.is_empty() {
            post_available_commands(github.as_ref(), &enabled, &pr, config.handle.as_deref())
                .await;
        }
    }

    let changed_files = github.get_changed_files(&pr).await;
    info!(
        count = changed_files.len(),
        pr = pr.number,
        "found changed files"
    );

    let planner = ExecutionPlanner::new(github.clone(), backend.clone());
    let plan = planner.plan(&config.commands, &changed_files, &pr).await;

    let executor = CommandExecutor::new(
        github.clone(),
        backend,
        outputs.clone(),
        workspace,
        debug,
    );

    let mut executed: Vec<String> = Vec::new();
    let mut summaries: Vec<String> = Vec::new();
    let mut command_outputs: Vec<CommandOutput> = Vec::new();

    for name in &to_run {
        let command_config = &config.commands[name];
        match executor
            .execute(
                name,
                command_config,
                &changed_files,
                &pr,
                &command_outputs,
                plan.get(name),
            )
            .await
        {
            Ok(output) => {
                if let Some(output) = output {
                    command_outputs.push(output);
                }
                executed.push(name.clone());
                summaries.push(format!("✅ {name}: {}", command_config.description));
                info!(command = name, "successfully executed command");
            }
            Err(e) => {
                summaries.push(format!("❌ {name}: Failed - {e}"));
                error!(command = name, error = %e, "failed to execute command");
            }
        }
    }

    outputs.set(
        "executed_commands",
        &serde_json::to_string(&executed).unwrap_or_else(|_| "[]".to_string()),
    );
    outputs.set("commands_summary", &summaries.join("\n"));

    if executed.is_empty() {
        bail!("No commands were executed successfully");
    }
    info!(
        executed = executed.len(),
        requested = to_run.len(),
        "run complete"
    );
    Ok(())
}

/// GitHub Actions passes inputs as `INPUT_<NAME>` environment variables.
fn action_input(name: &str) -> Option<String> {
    std::env::var(format!("INPUT_{}", name.to_uppercase()))
        .ok()
        .filter(|v| !v.is_empty())
}

fn split_commands_input(input: &str) -> Vec<String> {
    input
        .split(|c| c == ',' || c == '\n')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extract requested commands from a PR comment. A configured handle
/// (`@bot "do something"`) takes precedence; otherwise every `/command`
/// token counts.
fn parse_commands_from_comment(body: &str, handle: Option<&str>) -> Vec<String> {
    if let Some(handle) = handle {
        let pattern = format!(
            r#"(?i){}\s+"([^"]+)""#,
            regex::escape(handle.trim_start_matches('@'))
        );
        if let Ok(re) = Regex::new(&pattern) {
            if let Some(captures) = re.captures(body) {
                return vec![captures[1].trim().to_string()];
            }
        }
    }

    let slash = Regex::new(r"/([a-zA-Z0-9_-]+)").expect("static regex");
    slash
        .captures_iter(body)
        .map(|c| c[1].to_string())
        .collect()
}

async fn post_available_commands(
    github: &dyn GithubClient,
    commands: &[(String, String)],
    pr: &PullRequestInfo,
    handle: Option<&str>,
) {
    let slash_commands = commands
        .iter()
        .map(|(name, description)| format!("- `/{name}` - {description}"))
        .collect::<Vec<_>>()
        .join("\n");
    let handle_example = handle
        .map(|h| format!("`{h} \"your custom request\"`"))
        .unwrap_or_else(|| "`@llm_command \"your custom request\"`".to_string());

    let body = format!(
        "## 🤖 LLM Commands Available\n\n\
         You can trigger the following commands by commenting on this PR:\n\n\
         **Slash Commands:**\n{slash_commands}\n\n\
         **Custom Handle:**\n- {handle_example}\n\n\
         Simply comment with any of the above formats to execute the corresponding command!"
    );

    match github.add_pull_request_comment(pr, &body, None).await {
        Ok(()) => info!(count = commands.len(), "posted available commands comment"),
        Err(e) => warn!(error = %e, "failed to post available commands comment"),
    }
}

/// Writes step outputs to the `GITHUB_OUTPUT` file; logs them when the file
/// is not configured (local runs).
struct GithubActionOutputs {
    path: Option<PathBuf>,
}

impl GithubActionOutputs {
    fn from_env() -> Self {
        Self {
            path: std::env::var("GITHUB_OUTPUT").ok().map(PathBuf::from),
        }
    }
}

impl OutputSink for GithubActionOutputs {
    fn set(&self, name: &str, value: &str) {
        let Some(path) = &self.path else {
            info!(output = name, value, "step output");
            return;
        };

        let entry = format_output_entry(name, value);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| f.write_all(entry.as_bytes()));
        if let Err(e) = result {
            error!(output = name, error = %e, "failed to write step output");
        }
    }
}

/// Single-line outputs use `name=value`; anything with a newline uses the
/// heredoc form with a delimiter not contained in the value.
fn format_output_entry(name: &str, value: &str) -> String {
    if !value.contains('\n') {
        return format!("{name}={value}\n");
    }

    let mut delimiter = "llmcmd_EOF".to_string();
    while value.contains(&delimiter) {
        delimiter.push('_');
    }
    format!("{name}<<{delimiter}\n{value}\n{delimiter}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_commands_on_commas_and_newlines() {
        assert_eq!(
            split_commands_input("lint, review\n deploy-notes ,,"),
            vec!["lint", "review", "deploy-notes"]
        );
        assert!(split_commands_input("  \n , ").is_empty());
    }

    #[test]
    fn slash_commands_are_collected_in_order() {
        assert_eq!(
            parse_commands_from_comment("please /lint and then /review", None),
            vec!["lint", "review"]
        );
        assert!(parse_commands_from_comment("nothing here", None).is_empty());
    }

    #[test]
    fn handle_match_wins_over_slash_commands() {
        let body = "@reviewbot \"check the docs\" and also /lint";
        assert_eq!(
            parse_commands_from_comment(body, Some("@reviewbot")),
            vec!["check the docs"]
        );
    }

    #[test]
    fn handle_match_is_case_insensitive() {
        assert_eq!(
            parse_commands_from_comment("ReviewBot \"summary\"", Some("reviewbot")),
            vec!["summary"]
        );
    }

    #[test]
    fn missing_handle_falls_back_to_slash_commands() {
        assert_eq!(
            parse_commands_from_comment("/lint please", Some("@reviewbot")),
            vec!["lint"]
        );
    }

    #[test]
    fn single_line_outputs_use_equals_form() {
        assert_eq!(format_output_entry("lint_summary", "ok"), "lint_summary=ok\n");
    }

    #[test]
    fn multi_line_outputs_use_heredoc_form() {
        let entry = format_output_entry("commands_summary", "a\nb");
        assert_eq!(entry, "commands_summary<<llmcmd_EOF\na\nb\nllmcmd_EOF\n");
    }

    #[test]
    fn heredoc_delimiter_avoids_value_collisions() {
        let entry = format_output_entry("x", "llmcmd_EOF\nrest");
        assert!(entry.starts_with("x<<llmcmd_EOF_\n"));
        assert!(entry.ends_with("\nllmcmd_EOF_\n"));
    }
}
