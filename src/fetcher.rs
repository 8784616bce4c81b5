//! Shallow clones of remote repositories into throwaway workspaces.
//!
//! Every clone lands in its own `repo-<uuid>` directory under the configured
//! workspace root. The directory is owned by a [`Workspace`] guard and is
//! removed when the guard is dropped, whatever path the analysis took.

use crate::config::AnalyzerConfig;
use crate::error::{Error, Result};
use log::{debug, info, warn};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Ephemeral directory removed on drop.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    /// Creates a fresh `repo-<uuid>` directory under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create(root: &Path) -> Result<Self> {
        let path = root.join(format!("repo-{}", Uuid::new_v4()));
        fs::create_dir_all(&path)?;
        debug!("Created workspace {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed workspace {}", self.path.display()),
            Err(e) => warn!("Failed to remove workspace {}: {}", self.path.display(), e),
        }
    }
}

/// A cloned repository and the branch that was actually checked out.
#[derive(Debug)]
pub struct FetchedRepository {
    pub workspace: Workspace,
    pub branch: String,
}

impl FetchedRepository {
    pub fn root(&self) -> &Path {
        self.workspace.path()
    }
}

/// Clones repositories with the `git` executable.
///
/// # Example
///
/// ```no_run
/// use openapi_from_repo::config::AnalyzerConfig;
/// use openapi_from_repo::fetcher::RepoFetcher;
///
/// let config = AnalyzerConfig::default();
/// let repo = RepoFetcher::new(&config)
///     .fetch("https://github.com/expressjs/express", None)
///     .unwrap();
/// println!("Cloned {} into {}", repo.branch, repo.root().display());
/// ```
pub struct RepoFetcher<'a> {
    config: &'a AnalyzerConfig,
    program: String,
}

impl<'a> RepoFetcher<'a> {
    pub fn new(config: &'a AnalyzerConfig) -> Self {
        Self {
            config,
            program: "git".to_string(),
        }
    }

    /// Uses another executable in place of `git`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Shallow-clones `url` at `branch` (the configured default when `None`).
    ///
    /// When no branch is given and the default one cannot be cloned, the
    /// fallback branch is tried once. Branches asked for explicitly are never
    /// substituted, even when they name the default branch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] when no attempt succeeds. No workspace
    /// directory survives a failed attempt.
    pub fn fetch(&self, url: &str, branch: Option<&str>) -> Result<FetchedRepository> {
        let requested = branch.unwrap_or(&self.config.default_branch);
        info!("Cloning {} ({})", url, requested);

        match self.clone_branch(url, requested) {
            Ok(workspace) => Ok(FetchedRepository {
                workspace,
                branch: requested.to_string(),
            }),
            Err(err) if branch.is_none() && self.config.fallback_branch != requested => {
                let fallback = &self.config.fallback_branch;
                warn!("{}; retrying with branch {}", err, fallback);
                let workspace = self.clone_branch(url, fallback)?;
                Ok(FetchedRepository {
                    workspace,
                    branch: fallback.clone(),
                })
            }
            Err(err) => Err(err),
        }
    }

    fn clone_branch(&self, url: &str, branch: &str) -> Result<Workspace> {
        let workspace = Workspace::create(&self.config.workspace_root())?;
        let fetch_error = |message: String| Error::Fetch {
            url: url.to_string(),
            branch: branch.to_string(),
            message,
        };

        let mut child = Command::new(&self.program)
            .args(["clone", "--quiet", "--depth", "1", "--single-branch", "--branch"])
            .arg(branch)
            .arg(url)
            .arg(workspace.path())
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| fetch_error(format!("cannot run {}: {}", self.program, e)))?;

        let status = wait_with_timeout(&mut child, self.config.clone_timeout())
            .map_err(|e| fetch_error(e.to_string()))?;
        let Some(status) = status else {
            return Err(fetch_error(format!(
                "timed out after {}s",
                self.config.clone_timeout().as_secs()
            )));
        };

        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            let message = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("git clone failed")
                .trim()
                .to_string();
            return Err(fetch_error(message));
        }

        info!("Cloned {} ({}) into {}", url, branch, workspace.path().display());
        Ok(workspace)
    }
}

/// Polls the child until it exits; kills it and returns `None` past the deadline.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(root: &Path) -> AnalyzerConfig {
        AnalyzerConfig {
            workspace_root: Some(root.to_path_buf()),
            ..AnalyzerConfig::default()
        }
    }

    fn leftover_entries(root: &Path) -> usize {
        fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_workspace_is_removed_on_drop() {
        let root = TempDir::new().unwrap();
        let workspace = Workspace::create(root.path()).unwrap();
        let path = workspace.path().to_path_buf();
        fs::write(path.join("file.txt"), "x").unwrap();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("repo-"));

        drop(workspace);
        assert!(!path.exists());
    }

    #[test]
    fn test_workspace_names_are_unique() {
        let root = TempDir::new().unwrap();
        let a = Workspace::create(root.path()).unwrap();
        let b = Workspace::create(root.path()).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_failed_clone_leaves_nothing_behind() {
        let root = TempDir::new().unwrap();
        let config = config_in(root.path());
        let result = RepoFetcher::new(&config)
            .with_program("definitely-not-a-git-binary")
            .fetch("https://example.invalid/repo.git", None);

        match result {
            Err(Error::Fetch { branch, .. }) => assert_eq!(branch, "master"),
            other => panic!("expected a fetch failure, got {:?}", other),
        }
        assert_eq!(leftover_entries(root.path()), 0);
    }

    #[test]
    fn test_explicit_branch_is_not_substituted() {
        let root = TempDir::new().unwrap();
        let config = config_in(root.path());
        let result = RepoFetcher::new(&config)
            .with_program("definitely-not-a-git-binary")
            .fetch("https://example.invalid/repo.git", Some("develop"));

        match result {
            Err(Error::Fetch { branch, .. }) => assert_eq!(branch, "develop"),
            other => panic!("expected a fetch failure, got {:?}", other),
        }
    }

    #[test]
    fn test_explicit_default_branch_is_not_substituted() {
        let root = TempDir::new().unwrap();
        let config = config_in(root.path());
        let result = RepoFetcher::new(&config)
            .with_program("definitely-not-a-git-binary")
            .fetch("https://example.invalid/repo.git", Some("main"));

        match result {
            Err(Error::Fetch { branch, .. }) => assert_eq!(branch, "main"),
            other => panic!("expected a fetch failure, got {:?}", other),
        }
        assert_eq!(leftover_entries(root.path()), 0);
    }
}
