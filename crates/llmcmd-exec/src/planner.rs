use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use llmcmd_backend::{
    CommandForPlan, FileForPlan, FileReferenceForPlan, InstructionForPlan, ModelBackend,
    PullRequestForPlan,
};
use llmcmd_github::GithubClient;
use llmcmd_types::{ChangedFile, CommandConfig, ExecutionPlan, PullRequestInfo};

/// Optional pre-pass: one model call deciding, per command, which extra files
/// and prior command outputs it actually needs. Best-effort — any failure
/// degrades to an empty plan, never to a run abort.
pub struct ExecutionPlanner {
    github: Arc<dyn GithubClient>,
    backend: Arc<dyn ModelBackend>,
}

impl ExecutionPlanner {
    pub fn new(github: Arc<dyn GithubClient>, backend: Arc<dyn ModelBackend>) -> Self {
        Self { github, backend }
    }

    pub async fn plan(
        &self,
        commands: &HashMap<String, CommandConfig>,
        changed_files: &[ChangedFile],
        pr: &PullRequestInfo,
    ) -> ExecutionPlan {
        info!("planning command execution");

        let comments = self.github.get_pull_request_comments(pr).await;
        let pull_request = PullRequestForPlan {
            title: pr.title.clone(),
            body: pr.body.clone(),
            comments,
            files: changed_files
                .iter()
                .map(|f| FileForPlan {
                    filename: f.filename.clone(),
                    status: f.status.as_str().to_string(),
                })
                .collect(),
        };

        let mut commands_for_plan: Vec<CommandForPlan> = commands
            .iter()
            .map(|(name, config)| describe_command(name, config))
            .collect();
        commands_for_plan.sort_by(|a, b| a.name.cmp(&b.name));

        match self.backend.plan(&pull_request, &commands_for_plan).await {
            Ok(response) => {
                let plan: ExecutionPlan = response
                    .plans
                    .into_iter()
                    .map(|named| (named.name, named.plan))
                    .collect();
                info!(
                    commands = plan.len(),
                    usage = %response.usage,
                    "generated execution plan"
                );
                plan
            }
            Err(e) => {
                warn!(error = %e, "planning failed, falling back to default execution");
                ExecutionPlan::new()
            }
        }
    }
}

/// Only the first instruction of a multi-instruction command informs
/// planning. Deliberate simplification, kept as documented behavior.
fn describe_command(name: &str, config: &CommandConfig) -> CommandForPlan {
    let first = config.instructions.first();
    CommandForPlan {
        name: name.to_string(),
        description: config.description.clone(),
        instructions: InstructionForPlan {
            apply_to: first.and_then(|i| i.apply_to.clone()),
            prompt: first.map(|i| i.prompt.clone()).unwrap_or_default(),
            files: first
                .map(|i| {
                    i.files
                        .iter()
                        .map(|f| FileReferenceForPlan {
                            name: f.name.clone(),
                            path: f.path.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            modified_only: first.map(|i| i.modified_only).unwrap_or(true),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llmcmd_backend::{
        BackendError, CommandResponse, NamedPlan, PlanResponse, PullRequestContext, TokenUsage,
    };
    use llmcmd_github::GithubError;
    use llmcmd_types::{
        CommandInstruction, CommandOutput, CommandPlan, PlannedFile, PullRequestComment,
        ReferenceFile, TargetFile,
    };
    use std::sync::Mutex;

    struct StubGithub;

    #[async_trait]
    impl GithubClient for StubGithub {
        async fn get_pull_request_info(&self) -> Option<PullRequestInfo> {
            None
        }

        async fn get_changed_files(&self, _pr: &PullRequestInfo) -> Vec<ChangedFile> {
            Vec::new()
        }

        async fn get_pull_request_comments(
            &self,
            _pr: &PullRequestInfo,
        ) -> Vec<PullRequestComment> {
            vec![PullRequestComment {
                author: "octocat".to_string(),
                body: "ping".to_string(),
            }]
        }

        async fn add_pull_request_comment(
            &self,
            _pr: &PullRequestInfo,
            _body: &str,
            _command_name: Option<&str>,
        ) -> Result<(), GithubError> {
            Ok(())
        }

        async fn get_reference_file_content(&self, _path_or_url: &str) -> String {
            String::new()
        }
    }

    struct FakeBackend {
        fail: bool,
        seen_commands: Mutex<Vec<CommandForPlan>>,
    }

    #[async_trait]
    impl ModelBackend for FakeBackend {
        async fn plan(
            &self,
            _pull_request: &PullRequestForPlan,
            commands: &[CommandForPlan],
        ) -> Result<PlanResponse, BackendError> {
            *self.seen_commands.lock().unwrap() = commands.to_vec();
            if self.fail {
                return Err(BackendError::Network("boom".to_string()));
            }
            Ok(PlanResponse {
                plans: vec![NamedPlan {
                    name: "review".to_string(),
                    plan: CommandPlan {
                        load_files: vec![PlannedFile {
                            path: "src/lib.rs".to_string(),
                            reason: "entry".to_string(),
                            full_content: true,
                        }],
                        load_command_outputs: vec![],
                    },
                }],
                usage: TokenUsage::default(),
            })
        }

        async fn execute_command(
            &self,
            _prompt: &str,
            _target_files: &[TargetFile],
            _pull_request: &PullRequestContext,
            _reference_files: &[ReferenceFile],
            _prior_outputs: &[CommandOutput],
        ) -> Result<CommandResponse, BackendError> {
            unreachable!("planner never executes commands")
        }
    }

    fn instruction(prompt: &str) -> CommandInstruction {
        CommandInstruction {
            apply_to: Some("*.rs".to_string()),
            prompt: prompt.to_string(),
            files: Vec::new(),
            modified_only: true,
        }
    }

    fn commands() -> HashMap<String, CommandConfig> {
        let mut map = HashMap::new();
        map.insert(
            "review".to_string(),
            CommandConfig {
                description: "Review changes".to_string(),
                instructions: vec![instruction("first"), instruction("second")],
                can_execute_from_comment: true,
            },
        );
        map
    }

    fn pr() -> PullRequestInfo {
        PullRequestInfo {
            number: 1,
            title: "t".to_string(),
            body: "b".to_string(),
            author: "a".to_string(),
            base: llmcmd_types::GitRef {
                git_ref: "main".to_string(),
                sha: "base".to_string(),
            },
            head: llmcmd_types::GitRef {
                git_ref: "feat".to_string(),
                sha: "head".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn rekeys_plans_by_command_name() {
        let backend = Arc::new(FakeBackend {
            fail: false,
            seen_commands: Mutex::new(Vec::new()),
        });
        let planner = ExecutionPlanner::new(Arc::new(StubGithub), backend.clone());

        let plan = planner.plan(&commands(), &[], &pr()).await;
        assert_eq!(plan.len(), 1);
        assert_eq!(plan["review"].load_files[0].path, "src/lib.rs");
    }

    #[tokio::test]
    async fn only_first_instruction_informs_planning() {
        let backend = Arc::new(FakeBackend {
            fail: false,
            seen_commands: Mutex::new(Vec::new()),
        });
        let planner = ExecutionPlanner::new(Arc::new(StubGithub), backend.clone());

        planner.plan(&commands(), &[], &pr()).await;
        let seen = backend.seen_commands.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].instructions.prompt, "first");
    }

    #[tokio::test]
    async fn failure_degrades_to_empty_plan() {
        let backend = Arc::new(FakeBackend {
            fail: true,
            seen_commands: Mutex::new(Vec::new()),
        });
        let planner = ExecutionPlanner::new(Arc::new(StubGithub), backend);

        let plan = planner.plan(&commands(), &[], &pr()).await;
        assert!(plan.is_empty());
    }
}
