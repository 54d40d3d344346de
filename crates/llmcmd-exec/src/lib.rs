//! Command execution and file-targeting pipeline: resolves which files are in
//! scope for a command, assembles execution context (references, plan-directed
//! extras, prior outputs), invokes the model backend, and turns the result
//! into a posted PR comment plus machine-readable outputs.

mod executor;
mod matcher;
mod planner;
mod reference;

pub use executor::CommandExecutor;
pub use matcher::{FileMatcher, Scope, MAX_TARGET_FILE_BYTES};
pub use planner::ExecutionPlanner;
pub use reference::ReferenceLoader;

use llmcmd_backend::BackendError;
use llmcmd_github::GithubError;

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Github(#[from] GithubError),
}

/// Sink for the named step outputs a command emits (`<name>_summary`,
/// `<name>_comment`, plus the run-level outputs).
pub trait OutputSink: Send + Sync {
    fn set(&self, name: &str, value: &str);
}

/// In-memory sink, for tests and dry runs.
#[derive(Debug, Default)]
pub struct BufferedOutputs {
    values: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

impl BufferedOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.values.lock().expect("outputs lock").get(name).cloned()
    }
}

impl OutputSink for BufferedOutputs {
    fn set(&self, name: &str, value: &str) {
        self.values
            .lock()
            .expect("outputs lock")
            .insert(name.to_string(), value.to_string());
    }
}
