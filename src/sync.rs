use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::SyncConfig;

/// Best-effort git synchronization of the members file.
///
/// Pulls on startup and commits/pushes on shutdown or on /sync. Failures are
/// surfaced to the caller to log; they never affect the registry itself, and
/// the bot runs fine with sync disabled or the git remote unreachable.
pub struct GitSync {
    enabled: bool,
    repo_dir: PathBuf,
    members_file: PathBuf,
}

impl GitSync {
    pub fn new(config: &SyncConfig, members_file: impl Into<PathBuf>) -> Self {
        Self {
            enabled: config.enabled,
            repo_dir: config.repo_dir.clone(),
            members_file: members_file.into(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Fetch the latest members file from the remote. Fast-forward only, so a
    /// diverged local state fails loudly instead of merging.
    pub async fn pull(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.git(&["pull", "--ff-only"]).await?;
        info!("Pulled latest member store from remote");
        Ok(())
    }

    /// Commit and push the members file if it has local changes.
    /// Returns true when something was actually pushed.
    pub async fn push_if_changed(&self) -> Result<bool> {
        if !self.enabled {
            return Ok(false);
        }

        let file = self.members_file.to_string_lossy().into_owned();
        let status = self.git(&["status", "--porcelain", "--", &file]).await?;
        if status.trim().is_empty() {
            debug!("Member store unchanged, nothing to push");
            return Ok(false);
        }

        let message = format!(
            "Auto-sync: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        self.git(&["add", "--", &file]).await?;
        self.git(&["commit", "-m", &message]).await?;
        self.git(&["push"]).await?;
        info!("Pushed member store changes: {}", message);
        Ok(true)
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .await
            .with_context(|| format!("Failed to run git {}", args.join(" ")))?;

        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
