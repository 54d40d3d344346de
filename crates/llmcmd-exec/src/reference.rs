use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use llmcmd_github::GithubClient;
use llmcmd_types::{ChangedFile, FileReference, PlannedFile, ReferenceFile};

/// Loads reference material for an instruction: the statically declared
/// references first, then any planner-directed extras, deduplicated by path.
pub struct ReferenceLoader {
    github: Arc<dyn GithubClient>,
}

impl ReferenceLoader {
    pub fn new(github: Arc<dyn GithubClient>) -> Self {
        Self { github }
    }

    /// Resolve declared references in input order. Unresolvable references
    /// come back with empty content (the collaborator never fails), since
    /// reference material is supplementary.
    pub async fn load(&self, references: &[FileReference]) -> Vec<ReferenceFile> {
        let mut loaded = Vec::with_capacity(references.len());
        for reference in references {
            let content = self.github.get_reference_file_content(&reference.path).await;
            loaded.push(ReferenceFile {
                name: reference.name.clone(),
                path: reference.path.clone(),
                content,
            });
        }
        loaded
    }

    /// Append planner-directed files to an already-loaded reference list,
    /// skipping paths that are present (first wins). When the planner asks
    /// for `fullContent: false` and the path is a changed file carrying a
    /// patch, the patch substitutes for the fetched content.
    pub async fn merge_planned(
        &self,
        references: &mut Vec<ReferenceFile>,
        planned: &[PlannedFile],
        changed: &[ChangedFile],
    ) {
        let mut seen: HashSet<String> = references.iter().map(|r| r.path.clone()).collect();

        info!(count = planned.len(), "processing planner-directed files");
        for file in planned {
            if seen.contains(&file.path) {
                info!(path = %file.path, "skipping duplicate planned file");
                continue;
            }

            let mut content = self.github.get_reference_file_content(&file.path).await;
            if !file.full_content {
                if let Some(patch) = changed
                    .iter()
                    .find(|c| c.filename == file.path)
                    .and_then(|c| c.patch.as_deref())
                {
                    content = patch.to_string();
                }
            }

            info!(path = %file.path, reason = %file.reason, "loaded planned file");
            seen.insert(file.path.clone());
            references.push(ReferenceFile {
                name: Some(file.reason.clone()),
                path: file.path.clone(),
                content,
            });
        }
    }
}
