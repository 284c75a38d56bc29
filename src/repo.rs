// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Inventory repository facade.
//!
//! An __inventory repository__ is a Git work tree whose directories and files
//! are the inventory itself. The facade answers structural questions about
//! that tree, e.g., whether a path is an asset or an inventory directory,
//! reads and writes asset records, and records commits through an injected
//! [`VersionControl`] capability.
//!
//! # Layout
//!
//! ```text
//! inventory/
//! ├── .stowage/
//! │   ├── .anchor
//! │   ├── config.toml
//! │   └── templates/
//! │       └── laptop
//! ├── shelf/
//! │   ├── .anchor
//! │   ├── laptop_apple_macbookpro.1
//! │   └── rack_dell_r640.77/
//! │       ├── .anchor
//! │       └── .stowage-asset
//! └── ...
//! ```
//!
//! Git does not track empty directories. Hence, every inventory directory
//! carries a zero-byte `.anchor` file. The record of an asset directory lives
//! in its reserved `.stowage-asset` file.

pub mod vcs;

use crate::{
    config::{assign, lookup, ConfigError, ConfigLocation, InventoryDefinition},
    naming::NameTemplate,
    path::{
        is_hidden, is_protected, relative_to_root, ANCHOR_FILE, ASSET_DIR_FILE, CONFIG_FILE,
        STOWAGE_DIR, TEMPLATE_DIR,
    },
    record::{read_record, Record, RecordError},
    repo::vcs::{Git2Backend, VersionControl},
};

use mkdirp::mkdirp;
use std::{
    collections::BTreeSet,
    fs::{read_to_string, write},
    path::{Component, Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Subject of the commit that turns a repository into an inventory.
pub const INIT_MESSAGE: &str = "Initialize as a stowage inventory";

/// Section of the Git configuration holding stowage settings.
const GIT_CONFIG_SECTION: &str = "stowage";

/// Inventory repository bound to one work tree root.
pub struct InventoryRepo<V = Git2Backend>
where
    V: VersionControl,
{
    root: PathBuf,
    vcs: V,
}

impl InventoryRepo<Git2Backend> {
    /// Open existing inventory at `path` through libgit2.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Vcs`] if no Git repository contains `path`.
    /// - Return [`RepoError::NotAnInventory`] if the repository was never
    ///   initialized as an inventory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Git2Backend::open(path)?)
    }

    /// Initialize new inventory at `path` through libgit2.
    ///
    /// Creates the directory and the Git repository as needed.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::AlreadyInitialized`] if `path` already holds an
    ///   inventory.
    /// - Return [`RepoError::Io`] if the directory cannot be created.
    /// - Return [`RepoError::Vcs`] if Git operations fail.
    pub fn init(path: impl AsRef<Path>) -> Result<Self> {
        mkdirp(path.as_ref()).map_err(|source| RepoError::Io {
            source,
            path: path.as_ref().to_path_buf(),
        })?;
        Self::init_with(Git2Backend::init(path)?)
    }
}

impl<V> InventoryRepo<V>
where
    V: VersionControl,
{
    /// Bind facade to existing inventory managed by `vcs`.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::NotAnInventory`] if the control directory is
    ///   missing.
    pub fn new(vcs: V) -> Result<Self> {
        let root = vcs.root().to_path_buf();
        if !root.join(STOWAGE_DIR).is_dir() {
            return Err(RepoError::NotAnInventory(root));
        }

        Ok(Self { root, vcs })
    }

    /// Turn the work tree managed by `vcs` into an inventory.
    ///
    /// Writes the default configuration and the anchor of the control
    /// directory, and commits both.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::AlreadyInitialized`] if the control directory
    ///   already exists.
    /// - Return [`RepoError::Io`] if files cannot be written.
    /// - Return [`RepoError::Vcs`] if the commit fails.
    #[instrument(skip(vcs), level = "debug")]
    pub fn init_with(vcs: V) -> Result<Self> {
        let root = vcs.root().to_path_buf();
        let control = root.join(STOWAGE_DIR);
        if control.exists() {
            return Err(RepoError::AlreadyInitialized(root));
        }

        info!("initialize inventory at {:?}", root.display());
        let mut repo = Self { root, vcs };
        repo.mk_inventory_dirs([Path::new(STOWAGE_DIR)])?;
        let config = Path::new(STOWAGE_DIR).join(CONFIG_FILE);
        repo.write_file(&config, InventoryDefinition::default().to_string())?;
        repo.stage_and_commit(&[PathBuf::from(STOWAGE_DIR)], INIT_MESSAGE)?;

        Ok(repo)
    }

    /// Absolute path to work tree root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Version control capability in use.
    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    /// Resolve path to a path relative to the work tree root.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Path`] if path lies outside the work tree.
    pub fn relative(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        Ok(relative_to_root(&self.root, path)?)
    }

    /// Absolute path of a root-relative path.
    pub fn absolute(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    /// List every tracked file relative to the work tree root.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Vcs`] if the index cannot be read.
    pub fn tracked_files(&self) -> Result<Vec<PathBuf>> {
        Ok(self.vcs.tracked_files()?)
    }

    /// Check if path is a tracked inventory directory.
    ///
    /// The root is always an inventory directory.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Path`] if path lies outside the work tree.
    /// - Return [`RepoError::Vcs`] if the index cannot be read.
    pub fn is_inventory_dir(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = self.relative(path)?;
        if path.as_os_str().is_empty() {
            return Ok(true);
        }

        if is_protected(&path) {
            return Ok(false);
        }

        let anchor = path.join(ANCHOR_FILE);
        Ok(self.tracked_files()?.contains(&anchor))
    }

    /// Check if path is a tracked asset, either plain file or asset directory.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Path`] if path lies outside the work tree.
    /// - Return [`RepoError::Vcs`] if the index cannot be read.
    pub fn is_asset_path(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = self.relative(path)?;
        if path.as_os_str().is_empty() || is_protected(&path) || is_hidden(&path) {
            return Ok(false);
        }

        let tracked = self.tracked_files()?;
        Ok(tracked.contains(&path) || tracked.contains(&path.join(ASSET_DIR_FILE)))
    }

    /// Create directories with their anchors, parents included.
    ///
    /// Returns the root-relative paths of all anchors that had to be created.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::NotADirectory`] if a component is an existing
    ///   file.
    /// - Return [`RepoError::Io`] if a directory or anchor cannot be created.
    #[instrument(skip(self, paths), level = "debug")]
    pub fn mk_inventory_dirs(
        &self,
        paths: impl IntoIterator<Item = impl AsRef<Path>>,
    ) -> Result<Vec<PathBuf>> {
        let mut targets = BTreeSet::new();
        for path in paths {
            let path = self.relative(path)?;
            targets.extend(
                path.ancestors()
                    .filter(|ancestor| !ancestor.as_os_str().is_empty())
                    .map(Path::to_path_buf),
            );
        }

        let mut anchors = Vec::new();
        for dir in targets {
            let absolute = self.absolute(&dir);
            if absolute.is_file() {
                return Err(RepoError::NotADirectory(dir));
            }

            mkdirp(&absolute).map_err(|source| RepoError::Io {
                source,
                path: absolute.clone(),
            })?;

            let anchor = dir.join(ANCHOR_FILE);
            if !self.absolute(&anchor).exists() {
                debug!("create anchor {:?}", anchor.display());
                self.write_file(&anchor, "")?;
                anchors.push(anchor);
            }
        }

        Ok(anchors)
    }

    /// Root-relative path of the file holding the record of an asset.
    pub fn record_file(&self, path: impl AsRef<Path>, is_asset_directory: bool) -> PathBuf {
        if is_asset_directory {
            path.as_ref().join(ASSET_DIR_FILE)
        } else {
            path.as_ref().to_path_buf()
        }
    }

    /// Read record of asset at root-relative path.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Record`] if record file cannot be read or
    ///   parsed.
    pub fn read_record(&self, path: impl AsRef<Path>, is_asset_directory: bool) -> Result<Record> {
        let file = self.absolute(self.record_file(path.as_ref(), is_asset_directory));
        let mut record = read_record(&file)?;
        record.path = Some(self.absolute(path));
        record.is_asset_directory = is_asset_directory;

        Ok(record)
    }

    /// Read record template by name from `.stowage/templates`.
    ///
    /// Templates are plain YAML records that new assets start from.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::NoSuchTemplate`] if the name is not a plain
    ///   relative path, or no such template exists.
    /// - Return [`RepoError::Record`] if the template cannot be parsed.
    pub fn template_record(&self, name: &str) -> Result<Record> {
        let plain = !name.is_empty()
            && Path::new(name)
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        let file = self.absolute(Path::new(STOWAGE_DIR).join(TEMPLATE_DIR).join(name));
        if !plain || !file.is_file() {
            return Err(RepoError::NoSuchTemplate(name.into()));
        }

        debug!("start record from template {name:?}");
        Ok(read_record(&file)?)
    }

    /// Write record of asset at root-relative path.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Record`] if record cannot be rendered or
    ///   written.
    pub fn write_record(&self, path: impl AsRef<Path>, record: &Record) -> Result<()> {
        let file = self.absolute(self.record_file(path, record.is_asset_directory));
        let contents = record.render()?;
        write(&file, contents).map_err(|source| RecordError::Write { source, path: file })?;

        Ok(())
    }

    /// Stage paths and record exactly one commit.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Vcs`] if staging or committing fails.
    #[instrument(skip(self, paths, message), level = "debug")]
    pub fn stage_and_commit(&mut self, paths: &[PathBuf], message: &str) -> Result<String> {
        debug!("stage {} paths", paths.len());
        Ok(self.vcs.stage_and_commit(paths, message)?)
    }

    /// Resolve revision to commit hexsha, defaulting to `HEAD`.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Vcs`] if revision does not exist.
    pub fn get_hexsha(&self, revision: Option<&str>) -> Result<Option<String>> {
        Ok(self.vcs.hexsha(revision)?)
    }

    /// Full message of a commit, defaulting to `HEAD`.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Vcs`] if revision does not exist.
    pub fn commit_message(&self, revision: Option<&str>) -> Result<String> {
        Ok(self.vcs.commit_message(revision)?)
    }

    /// Check if the work tree has no uncommitted changes.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Vcs`] if status cannot be determined.
    pub fn is_clean_worktree(&self) -> Result<bool> {
        Ok(self.vcs.is_clean_worktree()?)
    }

    /// List files that differ from the last commit.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Vcs`] if status cannot be determined.
    pub fn changed_files(&self) -> Result<Vec<PathBuf>> {
        Ok(self.vcs.changed_files()?)
    }

    /// Look up configuration value by dotted name.
    ///
    /// The Git configuration stack wins over the inventory configuration
    /// file.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Vcs`] if Git configuration cannot be read.
    /// - Return [`RepoError::Config`] if the inventory configuration file is
    ///   malformed.
    pub fn get_config(&self, name: &str) -> Result<Option<String>> {
        if let Some(value) = self.vcs.get_config(&format!("{GIT_CONFIG_SECTION}.{name}"))? {
            debug!("config {name:?} taken from git configuration");
            return Ok(Some(value));
        }

        Ok(lookup(&self.config_table()?, name))
    }

    /// Assign configuration value by dotted name.
    ///
    /// Writing to [`ConfigLocation::Inventory`] edits the tracked inventory
    /// configuration file, and commits it.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Config`] if name is malformed.
    /// - Return [`RepoError::Vcs`] if Git configuration cannot be written.
    #[instrument(skip(self, value), level = "debug")]
    pub fn set_config(&mut self, name: &str, value: &str, location: ConfigLocation) -> Result<()> {
        match location {
            ConfigLocation::Inventory => {
                let mut table = self.config_table()?;
                assign(&mut table, name, value)?;
                let contents =
                    toml::ser::to_string_pretty(&table).map_err(ConfigError::Serialize)?;
                let config = Path::new(STOWAGE_DIR).join(CONFIG_FILE);
                self.write_file(&config, contents)?;
                self.stage_and_commit(&[config], &format!("config: set {name}"))?;
            }
            location => {
                self.vcs
                    .set_config(&format!("{GIT_CONFIG_SECTION}.{name}"), value, location)?;
            }
        }

        Ok(())
    }

    /// Name template configured for this inventory.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Naming`] if the configured template is
    ///   malformed.
    pub fn name_template(&self) -> Result<NameTemplate> {
        match self.get_config("assets.filename")? {
            Some(template) => Ok(template.parse()?),
            None => Ok(NameTemplate::default()),
        }
    }

    fn config_table(&self) -> Result<toml::Table> {
        let path = self.absolute(Path::new(STOWAGE_DIR).join(CONFIG_FILE));
        if !path.exists() {
            return Ok(toml::Table::new());
        }

        let contents = read_to_string(&path).map_err(|source| RepoError::Io { source, path })?;
        toml::de::from_str(&contents).map_err(|error| RepoError::Config(error.into()))
    }

    fn write_file(&self, path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
        let absolute = self.absolute(path);
        write(&absolute, contents).map_err(|source| RepoError::Io {
            source,
            path: absolute,
        })
    }
}

/// Repository facade error types.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Version control operations fail.
    #[error(transparent)]
    Vcs(#[from] crate::repo::vcs::VcsError),

    /// Record cannot be read or written.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// Configuration cannot be parsed or assigned.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configured name template is malformed.
    #[error(transparent)]
    Naming(#[from] crate::naming::NamingError),

    /// Path cannot be resolved inside the work tree.
    #[error(transparent)]
    Path(#[from] crate::path::PathError),

    /// File system operation fails.
    #[error("failed to access {:?}", .path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Work tree is not an inventory.
    #[error("{:?} is not a stowage inventory, run 'stowage init' first", .0.display())]
    NotAnInventory(PathBuf),

    /// Work tree is already an inventory.
    #[error("{:?} is already a stowage inventory", .0.display())]
    AlreadyInitialized(PathBuf),

    /// Record template does not exist.
    #[error("no record template named {0:?} in .stowage/templates")]
    NoSuchTemplate(String),

    /// Directory cannot be created over an existing file.
    #[error("cannot create directory {:?}, a file is in the way", .0.display())]
    NotADirectory(PathBuf),
}

/// Friendly result alias :3
type Result<T, E = RepoError> = std::result::Result<T, E>;
