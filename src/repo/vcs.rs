// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version control capability.
//!
//! The inventory never talks to Git directly. Everything it needs from
//! version control, i.e., listing tracked files, checking for local changes,
//! staging and committing, and reading configuration, goes through the
//! [`VersionControl`] trait. The default implementation [`Git2Backend`] uses
//! libgit2, but tests are free to swap in an in-memory fake.

use crate::{config::ConfigLocation, path::home_dir};

use git2::{
    Config, ConfigLevel, ErrorCode, IndexAddOption, Repository, RepositoryInitOptions,
    Signature, StatusOptions,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Version control operations needed by the inventory.
///
/// All paths exchanged through this trait are relative to the root of the
/// work tree.
pub trait VersionControl {
    /// Absolute path to the root of the work tree.
    fn root(&self) -> &Path;

    /// List every file currently tracked.
    fn tracked_files(&self) -> Result<Vec<PathBuf>>;

    /// List every file that differs from the last commit, untracked files
    /// included.
    fn changed_files(&self) -> Result<Vec<PathBuf>>;

    /// Stage the current state of each path, and record one commit.
    ///
    /// Paths that no longer exist are staged as deletions. Returns the
    /// hexsha of the new commit.
    fn stage_and_commit(&mut self, paths: &[PathBuf], message: &str) -> Result<String>;

    /// Resolve revision to commit hexsha, defaulting to `HEAD`.
    ///
    /// Returns `None` if the repository has no commits yet.
    fn hexsha(&self, revision: Option<&str>) -> Result<Option<String>>;

    /// Full message of a commit, defaulting to `HEAD`.
    fn commit_message(&self, revision: Option<&str>) -> Result<String>;

    /// Read configuration value from the version control configuration stack.
    fn get_config(&self, name: &str) -> Result<Option<String>>;

    /// Write configuration value to the given configuration level.
    fn set_config(&mut self, name: &str, value: &str, location: ConfigLocation) -> Result<()>;

    /// Check if the work tree has no changes relative to the last commit.
    fn is_clean_worktree(&self) -> Result<bool> {
        Ok(self.changed_files()?.is_empty())
    }
}

/// Version control through libgit2.
pub struct Git2Backend {
    repository: Repository,
    root: PathBuf,
}

impl Git2Backend {
    /// Open existing Git repository containing `path`.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::Git2`] if no repository can be opened.
    /// - Return [`VcsError::Bare`] if repository has no work tree.
    #[instrument(skip(path), level = "debug")]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        debug!("open repository at {:?}", path.as_ref().display());
        let repository = Repository::discover(path.as_ref())?;
        Self::from_repository(repository)
    }

    /// Initialize new Git repository at `path`, or open it if it exists.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::Git2`] if repository cannot be initialized.
    #[instrument(skip(path), level = "debug")]
    pub fn init(path: impl AsRef<Path>) -> Result<Self> {
        if let Ok(repository) = Repository::open(path.as_ref()) {
            info!("reuse existing repository {:?}", path.as_ref().display());
            return Self::from_repository(repository);
        }

        info!("initialize new repository {:?}", path.as_ref().display());
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repository = Repository::init_opts(path.as_ref(), &opts)?;
        Self::from_repository(repository)
    }

    fn from_repository(repository: Repository) -> Result<Self> {
        let root = repository
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| VcsError::Bare(repository.path().to_path_buf()))?;

        Ok(Self { repository, root })
    }

    fn signature(&self) -> Result<Signature<'static>> {
        // INVARIANT: Fall back to placeholder identity if user never configured one.
        match self.repository.signature() {
            Ok(signature) => Ok(signature),
            Err(_) => Ok(Signature::now("stowage", "stowage@localhost")?),
        }
    }

    fn peel(&self, revision: Option<&str>) -> Result<Option<git2::Commit<'_>>> {
        let revision = revision.unwrap_or("HEAD");
        match self.repository.revparse_single(revision) {
            Ok(object) => Ok(Some(object.peel_to_commit()?)),
            Err(error)
                if revision == "HEAD"
                    && matches!(error.code(), ErrorCode::NotFound | ErrorCode::UnbornBranch) =>
            {
                Ok(None)
            }
            Err(error) if error.code() == ErrorCode::NotFound => {
                Err(VcsError::NoSuchRevision(revision.into()))
            }
            Err(error) => Err(error.into()),
        }
    }

    fn global_config(&self) -> Result<Config> {
        let path = match Config::find_global() {
            Ok(path) => path,
            Err(_) => home_dir()?.join(".gitconfig"),
        };

        Ok(Config::open(&path)?)
    }
}

impl VersionControl for Git2Backend {
    fn root(&self) -> &Path {
        &self.root
    }

    fn tracked_files(&self) -> Result<Vec<PathBuf>> {
        let index = self.repository.index()?;
        let files = index
            .iter()
            .map(|entry| PathBuf::from(String::from_utf8_lossy(&entry.path).into_owned()))
            .collect();

        Ok(files)
    }

    fn changed_files(&self) -> Result<Vec<PathBuf>> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = self.repository.statuses(Some(&mut opts))?;
        let files = statuses
            .iter()
            .filter_map(|entry| entry.path().map(PathBuf::from))
            .collect();

        Ok(files)
    }

    #[instrument(skip(self, paths, message), level = "debug")]
    fn stage_and_commit(&mut self, paths: &[PathBuf], message: &str) -> Result<String> {
        let mut index = self.repository.index()?;
        let present = paths
            .iter()
            .filter(|path| self.root.join(path).exists())
            .map(PathBuf::as_path)
            .collect::<Vec<_>>();

        // INVARIANT: Drop vanished entries first, so a file may replace a directory.
        if !paths.is_empty() {
            index.update_all(paths.iter().map(PathBuf::as_path), None)?;
        }
        if !present.is_empty() {
            index.add_all(present, IndexAddOption::DEFAULT, None)?;
        }
        index.write()?;

        let tree_oid = index.write_tree()?;
        let tree = self.repository.find_tree(tree_oid)?;
        let signature = self.signature()?;
        let parent = self.peel(None)?;
        let parents = parent.iter().collect::<Vec<_>>();

        let oid = self.repository.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;
        info!("commit {oid}");

        Ok(oid.to_string())
    }

    fn hexsha(&self, revision: Option<&str>) -> Result<Option<String>> {
        Ok(self.peel(revision)?.map(|commit| commit.id().to_string()))
    }

    fn commit_message(&self, revision: Option<&str>) -> Result<String> {
        let commit = self
            .peel(revision)?
            .ok_or_else(|| VcsError::NoSuchRevision(revision.unwrap_or("HEAD").into()))?;

        Ok(commit.message().unwrap_or_default().to_string())
    }

    fn get_config(&self, name: &str) -> Result<Option<String>> {
        let config = self.repository.config()?;
        match config.get_string(name) {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.code() == ErrorCode::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    #[instrument(skip(self, value), level = "debug")]
    fn set_config(&mut self, name: &str, value: &str, location: ConfigLocation) -> Result<()> {
        let mut config = match location {
            ConfigLocation::Local => self.repository.config()?.open_level(ConfigLevel::Local)?,
            ConfigLocation::Global => self.global_config()?,
            ConfigLocation::Inventory => {
                return Err(VcsError::Unsupported(
                    "inventory configuration is not stored by version control".into(),
                ))
            }
        };
        config.set_str(name, value)?;

        Ok(())
    }
}

/// Version control error types.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// User's home directory cannot be determined.
    #[error(transparent)]
    Path(#[from] crate::path::PathError),

    /// Repository has no work tree to hold an inventory.
    #[error("repository {:?} has no work tree", .0.display())]
    Bare(PathBuf),

    /// Revision does not name a commit.
    #[error("no such revision {0:?}")]
    NoSuchRevision(String),

    /// Request cannot be served by version control.
    #[error("{0}")]
    Unsupported(String),
}

/// Friendly result alias :3
pub type Result<T, E = VcsError> = std::result::Result<T, E>;
