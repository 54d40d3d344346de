//! Shared data model for the llm-commands action: command configuration,
//! pull-request snapshots, file records, execution plans, and command outputs.

mod command;
mod files;
mod plan;
mod pull_request;

pub use command::{
    CommandConfig, CommandInstruction, FileReference, LlmClientConfig, LlmClientsConfig,
    LlmCommandsConfig, APPLY_TO_NONE,
};
pub use files::{ChangedFile, CommandOutput, FileStatus, ReferenceFile, TargetFile};
pub use plan::{CommandPlan, ExecutionPlan, PlannedFile, PlannedOutput};
pub use pull_request::{GitRef, PullRequestComment, PullRequestInfo};
