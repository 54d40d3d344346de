use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Planner hint: a file a command should pull into context before executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedFile {
    pub path: String,
    pub reason: String,
    /// When false and the path is a changed file carrying a patch, the patch
    /// substitutes for the full content.
    #[serde(rename = "fullContent", default = "default_full_content")]
    pub full_content: bool,
}

/// Planner hint: a prior command whose output should be visible to this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedOutput {
    #[serde(rename = "commandName")]
    pub command_name: String,
    pub reason: String,
}

/// Per-command slice of the execution plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandPlan {
    #[serde(rename = "loadFiles", default)]
    pub load_files: Vec<PlannedFile>,
    #[serde(rename = "loadCommandOutputs", default)]
    pub load_command_outputs: Vec<PlannedOutput>,
}

/// The run-wide plan, keyed by command name. Computed once before any command
/// executes; absence of a command's entry means "no extra context".
pub type ExecutionPlan = HashMap<String, CommandPlan>;

fn default_full_content() -> bool {
    true
}
