use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use llmcmd_types::{ChangedFile, FileStatus, TargetFile};

/// Files above this size are skipped with a warning, not an error.
pub const MAX_TARGET_FILE_BYTES: u64 = 1024 * 1024;

/// Directory names excluded from matching unconditionally.
const IGNORED_DIRS: &[&str] = &[".git", "node_modules", "target", "dist", "build", "vendor"];

/// `*` and `?` stop at `/`; recursing into directories takes an explicit `**`.
const MATCH_OPTIONS: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// What the pattern is matched against.
pub enum Scope<'a> {
    /// Only files changed in the pull request.
    Changed(&'a [ChangedFile]),
    /// The entire working tree.
    Tree,
}

/// Resolves a glob pattern to target files. Matching never fails: syntax
/// errors, unreadable files, and empty results all degrade to fewer files.
pub struct FileMatcher {
    base_dir: PathBuf,
}

impl FileMatcher {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub async fn resolve(&self, pattern: &str, scope: Scope<'_>) -> Vec<TargetFile> {
        let pattern = normalize_pattern(pattern);
        let glob_pattern = match glob::Pattern::new(pattern) {
            Ok(p) => p,
            Err(e) => {
                error!(pattern, error = %e, "invalid glob pattern");
                return Vec::new();
            }
        };

        let files = match scope {
            Scope::Changed(changed) => self.resolve_changed(&glob_pattern, changed).await,
            Scope::Tree => self.resolve_tree(&glob_pattern).await,
        };

        info!(pattern, count = files.len(), "matched target files");
        files
    }

    async fn resolve_changed(
        &self,
        pattern: &glob::Pattern,
        changed: &[ChangedFile],
    ) -> Vec<TargetFile> {
        let mut files = Vec::new();

        for file in changed {
            if file.status == FileStatus::Removed {
                continue;
            }
            if is_ignored(&file.filename) || !pattern.matches_with(&file.filename, MATCH_OPTIONS) {
                continue;
            }

            // Content fetched by the GitHub collaborator is reused; otherwise
            // fall back to the local checkout.
            if let Some(content) = &file.content {
                files.push(TargetFile {
                    filename: file.filename.clone(),
                    content: content.clone(),
                    patch: file.patch.clone(),
                });
                continue;
            }

            match self.read_capped(&self.base_dir.join(&file.filename)).await {
                Some(content) => files.push(TargetFile {
                    filename: file.filename.clone(),
                    content,
                    patch: file.patch.clone(),
                }),
                None => continue,
            }
        }

        files
    }

    async fn resolve_tree(&self, pattern: &glob::Pattern) -> Vec<TargetFile> {
        let mut paths: Vec<String> = WalkDir::new(&self.base_dir)
            .into_iter()
            .filter_entry(|e| !is_ignored_dir(e.path()))
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter_map(|e| {
                let rel = e
                    .path()
                    .strip_prefix(&self.base_dir)
                    .unwrap_or(e.path())
                    .to_string_lossy()
                    .to_string();
                (!is_ignored(&rel) && pattern.matches_with(&rel, MATCH_OPTIONS)).then_some(rel)
            })
            .collect();
        paths.sort();

        let mut files = Vec::with_capacity(paths.len());
        for rel in paths {
            if let Some(content) = self.read_capped(&self.base_dir.join(&rel)).await {
                files.push(TargetFile {
                    filename: rel,
                    content,
                    patch: None,
                });
            }
        }

        files
    }

    async fn read_capped(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.base_dir).unwrap_or(path);

        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) => {
                warn!(file = %rel.display(), error = %e, "failed to read file");
                return None;
            }
        };
        if metadata.len() > MAX_TARGET_FILE_BYTES {
            warn!(
                file = %rel.display(),
                bytes = metadata.len(),
                "skipping large file"
            );
            return None;
        }

        match tokio::fs::read_to_string(path).await {
            Ok(content) => Some(content),
            Err(e) => {
                warn!(file = %rel.display(), error = %e, "failed to read file");
                None
            }
        }
    }
}

/// The sentinel patterns all mean "match everything".
fn normalize_pattern(pattern: &str) -> &str {
    match pattern {
        "" | "." | "**" | "**/*" => "**/*",
        other => other,
    }
}

fn is_ignored_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| IGNORED_DIRS.contains(&name))
}

fn is_ignored(rel_path: &str) -> bool {
    let path = Path::new(rel_path);
    let in_ignored_dir = path
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .any(|component| IGNORED_DIRS.contains(&component));

    in_ignored_dir || rel_path.ends_with(".min.js") || rel_path.ends_with(".map")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed(filename: &str, status: FileStatus, content: Option<&str>) -> ChangedFile {
        ChangedFile {
            filename: filename.to_string(),
            status,
            patch: None,
            content: content.map(str::to_string),
        }
    }

    fn filenames(files: &[TargetFile]) -> Vec<&str> {
        files.iter().map(|f| f.filename.as_str()).collect()
    }

    #[tokio::test]
    async fn sentinel_patterns_are_equivalent() {
        let matcher = FileMatcher::new(".");
        let set = vec![
            changed("a.py", FileStatus::Modified, Some("x")),
            changed("src/b.rs", FileStatus::Added, Some("y")),
            changed("gone.txt", FileStatus::Removed, None),
        ];

        let baseline = matcher.resolve("**/*", Scope::Changed(&set)).await;
        assert_eq!(filenames(&baseline), vec!["a.py", "src/b.rs"]);

        for pattern in ["", ".", "**"] {
            let files = matcher.resolve(pattern, Scope::Changed(&set)).await;
            assert_eq!(files, baseline, "pattern {pattern:?} diverged");
        }
    }

    #[tokio::test]
    async fn removed_files_are_never_candidates() {
        let matcher = FileMatcher::new(".");
        let set = vec![changed("dead.py", FileStatus::Removed, None)];
        let files = matcher.resolve("*.py", Scope::Changed(&set)).await;
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn pattern_filters_changed_files() {
        let matcher = FileMatcher::new(".");
        let set = vec![
            changed("a.py", FileStatus::Modified, Some("x")),
            changed("b.js", FileStatus::Modified, Some("y")),
        ];
        let files = matcher.resolve("*.py", Scope::Changed(&set)).await;
        assert_eq!(filenames(&files), vec!["a.py"]);
        assert_eq!(files[0].content, "x");
    }

    #[tokio::test]
    async fn carried_content_is_reused_and_missing_files_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("on_disk.py"), "disk").unwrap();
        let matcher = FileMatcher::new(dir.path());

        let set = vec![
            changed("fetched.py", FileStatus::Modified, Some("from api")),
            changed("on_disk.py", FileStatus::Modified, None),
            changed("missing.py", FileStatus::Modified, None),
        ];
        let files = matcher.resolve("*.py", Scope::Changed(&set)).await;
        assert_eq!(filenames(&files), vec!["fetched.py", "on_disk.py"]);
        assert_eq!(files[0].content, "from api");
        assert_eq!(files[1].content, "disk");
    }

    #[tokio::test]
    async fn tree_scope_reads_from_disk_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("z.rs"), "z").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.rs"), "a").unwrap();
        std::fs::write(dir.path().join("readme.md"), "m").unwrap();

        let matcher = FileMatcher::new(dir.path());
        let files = matcher.resolve("**/*.rs", Scope::Tree).await;
        assert_eq!(filenames(&files), vec!["src/a.rs", "z.rs"]);
        assert!(files.iter().all(|f| f.patch.is_none()));
    }

    #[tokio::test]
    async fn ignored_directories_and_assets_never_match() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["node_modules", ".git", "dist"] {
            std::fs::create_dir(dir.path().join(sub)).unwrap();
            std::fs::write(dir.path().join(sub).join("x.js"), "x").unwrap();
        }
        std::fs::write(dir.path().join("app.min.js"), "x").unwrap();
        std::fs::write(dir.path().join("app.js.map"), "x").unwrap();
        std::fs::write(dir.path().join("app.js"), "x").unwrap();

        let matcher = FileMatcher::new(dir.path());
        let files = matcher.resolve("**/*", Scope::Tree).await;
        assert_eq!(filenames(&files), vec!["app.js"]);

        let set = vec![
            changed("node_modules/dep/index.js", FileStatus::Modified, Some("x")),
            changed("bundle.min.js", FileStatus::Modified, Some("x")),
            changed("app.js", FileStatus::Modified, Some("x")),
        ];
        let files = matcher.resolve("**/*", Scope::Changed(&set)).await;
        assert_eq!(filenames(&files), vec!["app.js"]);
    }

    #[tokio::test]
    async fn oversize_files_are_skipped_with_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("small.txt"), "ok").unwrap();
        let big = "a".repeat(MAX_TARGET_FILE_BYTES as usize + 1);
        std::fs::write(dir.path().join("big.txt"), big).unwrap();

        let matcher = FileMatcher::new(dir.path());
        let files = matcher.resolve("*.txt", Scope::Tree).await;
        assert_eq!(filenames(&files), vec!["small.txt"]);
    }

    #[tokio::test]
    async fn star_does_not_cross_directory_separators() {
        let matcher = FileMatcher::new(".");
        let set = vec![
            changed("a.py", FileStatus::Modified, Some("x")),
            changed("src/nested.py", FileStatus::Modified, Some("y")),
        ];

        let files = matcher.resolve("*.py", Scope::Changed(&set)).await;
        assert_eq!(filenames(&files), vec!["a.py"]);

        let files = matcher.resolve("**/*.py", Scope::Changed(&set)).await;
        assert_eq!(filenames(&files), vec!["a.py", "src/nested.py"]);
    }

    #[tokio::test]
    async fn no_match_is_empty_not_an_error() {
        let matcher = FileMatcher::new(".");
        let set = vec![changed("a.py", FileStatus::Modified, Some("x"))];
        assert!(matcher.resolve("*.go", Scope::Changed(&set)).await.is_empty());
        assert!(matcher.resolve("[invalid", Scope::Changed(&set)).await.is_empty());
    }

    #[tokio::test]
    async fn resolution_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "a").unwrap();
        std::fs::write(dir.path().join("b.rs"), "b").unwrap();

        let matcher = FileMatcher::new(dir.path());
        let first = matcher.resolve("*.rs", Scope::Tree).await;
        let second = matcher.resolve("*.rs", Scope::Tree).await;
        assert_eq!(first, second);
    }
}
