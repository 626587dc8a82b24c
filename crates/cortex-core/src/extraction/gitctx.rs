//! Git context derivation
//!
//! Branch, recent commit subjects, and a deduplicated union of recently
//! changed files, read with libgit2. Non-git directories degrade to
//! `branch = "unknown"` and empty lists; git errors never abort extraction.

use std::collections::BTreeSet;
use std::path::Path;

use git2::{Repository, StatusOptions};

/// Commit log depth consulted for context
const COMMIT_LIMIT: usize = 10;

/// Branch plus recent activity of a workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitContext {
    pub branch: String,
    /// Most recent commit subjects, newest first
    pub commits: Vec<String>,
    /// Sorted, deduplicated union of changed files (history + staged +
    /// unstaged)
    pub files: Vec<String>,
}

impl Default for GitContext {
    fn default() -> Self {
        GitContext {
            branch: "unknown".to_string(),
            commits: Vec::new(),
            files: Vec::new(),
        }
    }
}

/// Derive git context for a directory. Every failure path yields the
/// default context rather than an error.
pub fn derive_git_context(cwd: &Path) -> GitContext {
    let repo = match Repository::discover(cwd) {
        Ok(repo) => repo,
        Err(_) => return GitContext::default(),
    };

    let branch = current_branch(&repo);
    let (commits, mut files) = recent_history(&repo);

    for file in working_tree_changes(&repo) {
        files.insert(file);
    }

    GitContext {
        branch,
        commits,
        files: files.into_iter().collect(),
    }
}

fn current_branch(repo: &Repository) -> String {
    match repo.head() {
        Ok(head) => head
            .shorthand()
            .map(str::to_string)
            .unwrap_or_else(|| "unknown".to_string()),
        Err(_) => "unknown".to_string(),
    }
}

/// Walk the last few commits collecting subjects and touched paths.
fn recent_history(repo: &Repository) -> (Vec<String>, BTreeSet<String>) {
    let mut commits = Vec::new();
    let mut files = BTreeSet::new();

    let mut walk = match repo.revwalk() {
        Ok(walk) => walk,
        Err(_) => return (commits, files),
    };
    if walk.push_head().is_err() {
        return (commits, files);
    }

    for oid in walk.flatten().take(COMMIT_LIMIT) {
        let Ok(commit) = repo.find_commit(oid) else {
            continue;
        };
        commits.push(commit.summary().unwrap_or("").to_string());

        let tree = commit.tree().ok();
        let parent_tree = commit.parent(0).ok().and_then(|p| p.tree().ok());
        if let Ok(diff) =
            repo.diff_tree_to_tree(parent_tree.as_ref(), tree.as_ref(), None)
        {
            for delta in diff.deltas() {
                if let Some(path) = delta.new_file().path().and_then(Path::to_str) {
                    files.insert(path.to_string());
                }
            }
        }
    }

    (commits, files)
}

/// Paths with staged or unstaged changes.
fn working_tree_changes(repo: &Repository) -> Vec<String> {
    let mut options = StatusOptions::new();
    options.include_untracked(true).include_ignored(false);

    let Ok(statuses) = repo.statuses(Some(&mut options)) else {
        return Vec::new();
    };
    statuses
        .iter()
        .filter_map(|entry| entry.path().map(str::to_string))
        .collect()
}
