use crate::config::SnapshotConfig;
use crate::error::{BenchError, Result};
use crate::process::run_with_deadline;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info};

const REINSTALL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceState {
    pub current_branch: String,
    pub last_commit: String,
    pub is_clean: bool,
    pub changed_files: usize,
}

/// Pins a git workspace to a baseline tag and restores it between trials.
/// Every restore discards uncommitted and untracked work.
#[derive(Debug, Clone)]
pub struct WorkspaceSnapshotter {
    root: PathBuf,
    config: SnapshotConfig,
}

impl WorkspaceSnapshotter {
    pub fn new(root: impl Into<PathBuf>, config: SnapshotConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn baseline_tag(&self) -> &str {
        &self.config.baseline_tag
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|source| BenchError::Spawn {
                program: "git".to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(BenchError::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn ref_exists(&self, full_ref: &str) -> Result<bool> {
        match self.git(&["rev-parse", "--verify", "--quiet", full_ref]) {
            Ok(_) => Ok(true),
            Err(BenchError::Git { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Creates the baseline tag and branch at HEAD unless they already exist.
    pub fn setup_baseline(&self) -> Result<()> {
        let tag = &self.config.baseline_tag;
        let branch = &self.config.baseline_branch;
        if self.ref_exists(&format!("refs/tags/{}", tag))? {
            debug!(tag = %tag, "baseline tag already present");
        } else {
            self.git(&["tag", tag])?;
            info!(tag = %tag, "created baseline tag");
        }
        if self.ref_exists(&format!("refs/heads/{}", branch))? {
            debug!(branch = %branch, "baseline branch already present");
        } else {
            self.git(&["branch", branch])?;
            info!(branch = %branch, "created baseline branch");
        }
        Ok(())
    }

    pub fn verify_baseline(&self) -> bool {
        self.ref_exists(&format!("refs/tags/{}", self.config.baseline_tag))
            .unwrap_or(false)
    }

    fn restore(&self) -> Result<()> {
        let tag = &self.config.baseline_tag;
        if !self.verify_baseline() {
            return Err(BenchError::MissingBaseline(tag.clone()));
        }
        self.git(&["reset", "--hard", tag])?;
        let mut clean: Vec<&str> = vec!["clean", "-fdx"];
        for keep in &self.config.preserve {
            clean.push("-e");
            clean.push(keep);
        }
        self.git(&clean)?;
        Ok(())
    }

    /// Restores the baseline tree ahead of a trial.
    pub fn prepare(&self) -> Result<()> {
        self.restore()?;
        info!(tag = %self.config.baseline_tag, "workspace prepared");
        Ok(())
    }

    /// Discards whatever a trial left behind.
    pub fn reset(&self) -> Result<()> {
        self.restore()?;
        info!(tag = %self.config.baseline_tag, "workspace reset");
        Ok(())
    }

    /// `reset` followed by a clean dependency install.
    pub fn full_reset(&self) -> Result<()> {
        self.reset()?;
        let dir = self.root.join(&self.config.reinstall_dir);
        let Some((program, args)) = self.config.reinstall_command.split_first() else {
            return Ok(());
        };
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "no dependency directory to reinstall");
            return Ok(());
        }
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&dir);
        let output = run_with_deadline(cmd, "full-reset", REINSTALL_TIMEOUT, true)?;
        if !output.success() {
            return Err(BenchError::Other(anyhow::anyhow!(
                "{} exited with {:?}",
                self.config.reinstall_command.join(" "),
                output.code()
            )));
        }
        info!(dir = %dir.display(), "dependencies reinstalled");
        Ok(())
    }

    pub fn state(&self) -> Result<WorkspaceState> {
        let current_branch = self
            .git(&["rev-parse", "--abbrev-ref", "HEAD"])?
            .trim()
            .to_string();
        let last_commit = self.git(&["log", "-1", "--oneline"])?.trim().to_string();
        let changed_files = self
            .git(&["status", "--porcelain"])?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .count();
        Ok(WorkspaceState {
            current_branch,
            last_commit,
            is_clean: changed_files == 0,
            changed_files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .status()
            .expect("git");
        assert!(status.success(), "git {:?}", args);
    }

    fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        git(dir.path(), &["init", "-q"]);
        git(dir.path(), &["config", "user.email", "bench@example.com"]);
        git(dir.path(), &["config", "user.name", "bench"]);
        fs::write(dir.path().join("README.md"), "baseline\n").expect("write");
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "-q", "-m", "baseline"]);
        dir
    }

    #[test]
    fn restore_requires_baseline() {
        let repo = init_repo();
        let snap = WorkspaceSnapshotter::new(repo.path(), SnapshotConfig::default());
        assert!(!snap.verify_baseline());
        let err = snap.prepare().expect_err("no baseline yet");
        assert!(matches!(err, BenchError::MissingBaseline(ref tag) if tag == "benchmark-baseline"));
    }

    #[test]
    fn setup_is_idempotent() {
        let repo = init_repo();
        let snap = WorkspaceSnapshotter::new(repo.path(), SnapshotConfig::default());
        snap.setup_baseline().expect("setup");
        snap.setup_baseline().expect("setup again");
        assert!(snap.verify_baseline());
    }

    #[test]
    fn reset_discards_edits_and_untracked_files_but_keeps_preserved() {
        let repo = init_repo();
        let snap = WorkspaceSnapshotter::new(repo.path(), SnapshotConfig::default());
        snap.setup_baseline().expect("setup");

        fs::write(repo.path().join("README.md"), "agent edit\n").expect("write");
        fs::write(repo.path().join("new.txt"), "junk").expect("write");
        fs::create_dir_all(repo.path().join("node_modules/pkg")).expect("mkdir");
        fs::write(repo.path().join("node_modules/pkg/index.js"), "").expect("write");
        assert!(!snap.state().expect("state").is_clean);

        snap.reset().expect("reset");
        assert_eq!(
            fs::read_to_string(repo.path().join("README.md")).expect("read"),
            "baseline\n"
        );
        assert!(!repo.path().join("new.txt").exists());
        assert!(repo.path().join("node_modules/pkg/index.js").exists());
    }

    #[test]
    fn state_reports_changed_files() {
        let repo = init_repo();
        let snap = WorkspaceSnapshotter::new(repo.path(), SnapshotConfig::default());
        let state = snap.state().expect("state");
        assert!(state.is_clean);
        assert!(state.last_commit.contains("baseline"));

        fs::write(repo.path().join("a.txt"), "a").expect("write");
        fs::write(repo.path().join("b.txt"), "b").expect("write");
        let state = snap.state().expect("state");
        assert!(!state.is_clean);
        assert_eq!(state.changed_files, 2);
    }
}
