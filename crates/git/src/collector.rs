//! Mirror clones and updates through the git CLI.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use harvest_core::{CollectError, GitCollector, ProgressBuffer, RepoHandle, TaskContext};
use tracing::{debug, info};

use crate::command::Git;

/// [`GitCollector`] backed by `git clone --mirror` / `git remote update`.
///
/// Fresh clones land in a temporary directory under `staging_root` and are
/// renamed into place once complete, so a half-finished clone never sits at
/// the final path. `staging_root` must be on the same filesystem as the
/// target paths.
#[derive(Debug, Clone)]
pub struct GitCommandCollector {
    git: Git,
    staging_root: PathBuf,
}

impl GitCommandCollector {
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self { git: Git::default(), staging_root: staging_root.into() }
    }

    pub fn with_git(mut self, git: Git) -> Self {
        self.git = git;
        self
    }

    fn update(
        &self,
        path: &Path,
        progress: &ProgressBuffer,
        ctx: &TaskContext,
    ) -> Result<(), CollectError> {
        debug!(path = %path.display(), "updating existing repository");
        let status = self
            .git
            .run_streaming(Some(path), ["remote", "update", "--prune"], progress, ctx)?;
        if !status.success() {
            return Err(CollectError::GitFailed { status: status.to_string() });
        }
        Ok(())
    }

    fn clone_fresh(
        &self,
        link: &str,
        path: &Path,
        progress: &ProgressBuffer,
        ctx: &TaskContext,
    ) -> Result<(), CollectError> {
        fs::create_dir_all(&self.staging_root)?;
        let staging = tempfile::Builder::new()
            .prefix(".clone-")
            .tempdir_in(&self.staging_root)?;
        let target = staging.path().join("repo");

        let status = self.git.run_streaming(
            None,
            [
                OsStr::new("clone"),
                OsStr::new("--mirror"),
                OsStr::new("--progress"),
                OsStr::new(link),
                target.as_os_str(),
            ],
            progress,
            ctx,
        )?;
        if !status.success() {
            return Err(CollectError::GitFailed { status: status.to_string() });
        }

        if path.exists() {
            fs::remove_dir_all(path)?;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&target, path)?;
        Ok(())
    }
}

impl GitCollector for GitCommandCollector {
    fn collect_or_update(
        &self,
        link: &str,
        path: &Path,
        progress: &ProgressBuffer,
        ctx: &TaskContext,
    ) -> Result<RepoHandle, CollectError> {
        if is_git_dir(path) {
            self.update(path, progress, ctx)?;
        } else {
            info!(link, path = %path.display(), "cloning repository");
            self.clone_fresh(link, path, progress, ctx)?;
        }
        Ok(RepoHandle { link: link.to_string(), path: path.to_path_buf() })
    }
}

/// A bare repository or a working tree with a `.git` directory.
pub fn is_git_dir(path: &Path) -> bool {
    let bare = path.join("HEAD").is_file() && path.join("objects").is_dir();
    bare || path.join(".git").is_dir()
}
