//! Context Sniffer (§4.I): produces a live, never-cached
//! [`EnvironmentSnapshot`] consumed by the Router and the Agent Loop on
//! every reasoning cycle.
//!
//! `git2` is already carried in the workspace dependency table for exactly
//! this purpose; no other kept module used it, so this is the first real
//! consumer. `scan_vcs`/`scan_context` run concurrently via `tokio::join!`,
//! the same fan-out idiom `registry.rs` uses for observer notification.

use crate::errors::{KernelError, Result};
use crate::types::EnvironmentSnapshot;
use std::path::{Path, PathBuf};

/// First N modified paths kept in the snapshot's preview (§4.I).
const DIRTY_PREVIEW_LIMIT: usize = 3;

/// Scans a working copy and a scratchpad file to build `EnvironmentSnapshot`s.
pub struct ContextSniffer {
    repo_root: PathBuf,
    scratchpad_path: PathBuf,
}

impl ContextSniffer {
    pub fn new(repo_root: impl Into<PathBuf>, scratchpad_path: impl Into<PathBuf>) -> Self {
        Self { repo_root: repo_root.into(), scratchpad_path: scratchpad_path.into() }
    }

    /// Assemble a fresh snapshot; never cached (§4.I). Budgeted at ≤10ms on
    /// a warm working copy — both subtasks run concurrently since neither
    /// depends on the other's result.
    pub async fn get_snapshot(&self) -> Result<EnvironmentSnapshot> {
        let (vcs, context_lines) = tokio::join!(self.scan_vcs(), self.scan_context());
        let vcs = vcs?;

        Ok(EnvironmentSnapshot {
            git_branch: vcs.branch,
            git_modified_count: vcs.modified_count,
            git_staged_count: vcs.staged_count,
            dirty_files: vcs.dirty_preview,
            dirty_files_total: vcs.dirty_total,
            active_context_lines: context_lines?,
            timestamp: chrono::Utc::now(),
        })
    }

    /// Branch name, staged/modified counts, and the first N unique modified
    /// paths in lexical order (§4.I). A missing or non-git `repo_root`
    /// yields an empty-but-valid VCS snapshot rather than an error — the
    /// sniffer degrades gracefully outside a repository.
    async fn scan_vcs(&self) -> Result<VcsSnapshot> {
        let repo_root = self.repo_root.clone();
        tokio::task::spawn_blocking(move || scan_vcs_blocking(&repo_root))
            .await
            .map_err(|e| KernelError::Runtime(format!("vcs scan task panicked: {e}")))?
    }

    /// Line count of the scratchpad file, or 0 if absent (§4.I).
    async fn scan_context(&self) -> Result<usize> {
        match tokio::fs::read_to_string(&self.scratchpad_path).await {
            Ok(contents) => Ok(contents.lines().count()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(KernelError::Io(e)),
        }
    }
}

struct VcsSnapshot {
    branch: Option<String>,
    staged_count: usize,
    modified_count: usize,
    dirty_preview: Vec<String>,
    dirty_total: usize,
}

fn scan_vcs_blocking(repo_root: &Path) -> Result<VcsSnapshot> {
    let repo = match git2::Repository::discover(repo_root) {
        Ok(repo) => repo,
        Err(_) => {
            return Ok(VcsSnapshot {
                branch: None,
                staged_count: 0,
                modified_count: 0,
                dirty_preview: Vec::new(),
                dirty_total: 0,
            })
        }
    };

    let branch = repo
        .head()
        .ok()
        .and_then(|head| head.shorthand().map(|s| s.to_string()));

    let mut opts = git2::StatusOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true);
    let statuses = repo
        .statuses(Some(&mut opts))
        .map_err(|e| KernelError::Runtime(format!("git status failed: {e}")))?;

    let staged_mask = git2::Status::INDEX_NEW
        | git2::Status::INDEX_MODIFIED
        | git2::Status::INDEX_DELETED
        | git2::Status::INDEX_RENAMED
        | git2::Status::INDEX_TYPECHANGE;
    let modified_mask = git2::Status::WT_NEW
        | git2::Status::WT_MODIFIED
        | git2::Status::WT_DELETED
        | git2::Status::WT_RENAMED
        | git2::Status::WT_TYPECHANGE;

    let mut staged_count = 0;
    let mut modified_paths: Vec<String> = Vec::new();

    for entry in statuses.iter() {
        let status = entry.status();
        if status.intersects(staged_mask) {
            staged_count += 1;
        }
        if status.intersects(modified_mask) {
            if let Some(path) = entry.path() {
                modified_paths.push(path.to_string());
            }
        }
    }

    modified_paths.sort();
    modified_paths.dedup();
    let dirty_total = modified_paths.len();
    modified_paths.truncate(DIRTY_PREVIEW_LIMIT);

    Ok(VcsSnapshot {
        branch,
        staged_count,
        modified_count: dirty_total,
        dirty_preview: modified_paths,
        dirty_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn init_repo(dir: &Path) {
        let run = |args: &[&str]| {
            let status = Command::new("git").args(args).current_dir(dir).status().unwrap();
            assert!(status.success());
        };
        run(&["init", "-q"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "test"]);
    }

    #[tokio::test]
    async fn snapshot_outside_a_repo_is_empty_but_valid() {
        let tmp = tempfile::tempdir().unwrap();
        let sniffer = ContextSniffer::new(tmp.path(), tmp.path().join("SCRATCHPAD.md"));
        let snapshot = sniffer.get_snapshot().await.unwrap();
        assert!(snapshot.git_branch.is_none());
        assert_eq!(snapshot.git_modified_count, 0);
        assert_eq!(snapshot.active_context_lines, 0);
    }

    #[tokio::test]
    async fn snapshot_counts_untracked_files_as_modified() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());
        std::fs::write(tmp.path().join("a.rs"), "fn main() {}").unwrap();
        std::fs::write(tmp.path().join("b.rs"), "fn main() {}").unwrap();

        let sniffer = ContextSniffer::new(tmp.path(), tmp.path().join("SCRATCHPAD.md"));
        let snapshot = sniffer.get_snapshot().await.unwrap();

        assert_eq!(snapshot.git_modified_count, 2);
        assert_eq!(snapshot.dirty_files, vec!["a.rs".to_string(), "b.rs".to_string()]);
    }

    #[tokio::test]
    async fn scratchpad_line_count_reflects_file_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let scratchpad = tmp.path().join("SCRATCHPAD.md");
        std::fs::write(&scratchpad, "line one\nline two\nline three\n").unwrap();

        let sniffer = ContextSniffer::new(tmp.path(), &scratchpad);
        let snapshot = sniffer.get_snapshot().await.unwrap();
        assert_eq!(snapshot.active_context_lines, 3);
    }

    #[tokio::test]
    async fn dirty_preview_caps_at_three_with_total_preserved() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());
        for name in ["a.rs", "b.rs", "c.rs", "d.rs", "e.rs"] {
            std::fs::write(tmp.path().join(name), "x").unwrap();
        }

        let sniffer = ContextSniffer::new(tmp.path(), tmp.path().join("SCRATCHPAD.md"));
        let snapshot = sniffer.get_snapshot().await.unwrap();

        assert_eq!(snapshot.dirty_files.len(), 3);
        assert_eq!(snapshot.dirty_files_total, 5);
    }
}
