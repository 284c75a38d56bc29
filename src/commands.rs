// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Caller-facing inventory commands.
//!
//! Each command is one transaction: it refuses to run on a dirty work tree or
//! next to pending operations, queues its requests, and commits them with a
//! subject like `rm [2]: shelf/a, shelf/b` unless the caller supplies a
//! message. A failing command discards whatever it queued.

use crate::{
    config::{ConfigError, ConfigLocation, Settings},
    filter::{Filter, FilterError},
    fsck::{fsck as run_fsck, parse_checks, FsckError, FsckReport},
    inventory::{
        operation::subject, CommitOutcome, FieldUpdate, Inventory, InventoryError, RemoveMode, Row,
    },
    path::display,
    record::{parse_value, value_to_string, Record},
    repo::{vcs::VersionControl, InventoryRepo, RepoError},
    ui::{InquirePrompt, Prompt},
};

use serde_yaml::Value;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Assets targeted by a command.
#[derive(Debug, Default, Clone)]
pub struct Selection {
    /// Paths to look at or below. No paths select the whole inventory.
    pub paths: Vec<PathBuf>,

    /// How deep to look below each path, zero being unlimited.
    pub depth: usize,

    /// Filters every selected asset must match.
    pub filters: Vec<Filter>,
}

impl Selection {
    /// Select everything at or below paths.
    pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Limit selection depth.
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Compile and add filter expressions.
    ///
    /// # Errors
    ///
    /// - Return [`CommandError::Filter`] if an expression is malformed.
    pub fn with_filters(mut self, expressions: &[String]) -> Result<Self> {
        for expression in expressions {
            self.filters.push(Filter::compile(expression)?);
        }

        Ok(self)
    }

    fn paths_or_root(&self, root: &Path) -> Vec<PathBuf> {
        if self.paths.is_empty() {
            vec![root.to_path_buf()]
        } else {
            self.paths.clone()
        }
    }
}

/// Open inventory containing `path` for interactive use.
///
/// # Errors
///
/// - Return [`CommandError::Repo`] if `path` is not inside an inventory.
/// - Return [`CommandError::Inventory`] if the inventory cannot be indexed.
pub fn open(path: impl AsRef<Path>, settings: Settings) -> Result<Inventory> {
    let repo = InventoryRepo::open(path)?;
    Ok(Inventory::new(repo, InquirePrompt, settings)?)
}

/// Initialize new inventory at `path`.
///
/// # Errors
///
/// - Return [`CommandError::Repo`] if the inventory cannot be created, or
///   already exists.
pub fn init(path: impl AsRef<Path>) -> Result<InventoryRepo> {
    let repo = InventoryRepo::init(path)?;
    info!("initialized inventory at {:?}", repo.root().display());

    Ok(repo)
}

/// Create inventory directories, parents included.
///
/// # Errors
///
/// - Return [`CommandError::DirtyTree`] or [`CommandError::PendingOperations`]
///   if the inventory is not ready.
/// - Return [`CommandError::Inventory`] if a directory cannot be added.
pub fn mkdir<V, P>(
    inventory: &mut Inventory<V, P>,
    paths: &[PathBuf],
    message: Option<&str>,
) -> Result<CommitOutcome>
where
    V: VersionControl,
    P: Prompt,
{
    transact(inventory, "mkdir", message, |inventory| {
        paths
            .iter()
            .map(|path| inventory.add_directory(path))
            .collect::<Result<Vec<_>, _>>()
    })
}

/// Record new assets start from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Base {
    /// Empty record.
    #[default]
    Empty,

    /// Named record template from `.stowage/templates`.
    Template(String),

    /// Record of an existing asset.
    Clone(PathBuf),
}

/// Assets created by one `new` command.
#[derive(Debug, Clone, Default)]
pub struct NewAssets {
    /// Directory to create assets in. Conflicts with a `directory` column.
    pub directory: Option<PathBuf>,

    /// Record every asset starts from.
    pub base: Base,

    /// `key=value` fields applied to every asset.
    pub assignments: Vec<String>,

    /// One record per asset, e.g., from [`parse_table`]. No rows create a
    /// single asset.
    pub rows: Vec<Record>,
}

/// Create new asset in `directory` from `key=value` assignments.
///
/// Returns the root-relative path of the new asset.
///
/// # Errors
///
/// - Return [`CommandError::InvalidAssignment`] for malformed assignments.
/// - Return [`CommandError::Inventory`] if the asset cannot be added, or a
///   key is assigned twice.
pub fn new_asset<V, P>(
    inventory: &mut Inventory<V, P>,
    directory: impl AsRef<Path>,
    assignments: &[String],
    message: Option<&str>,
) -> Result<(PathBuf, CommitOutcome)>
where
    V: VersionControl,
    P: Prompt,
{
    let spec = NewAssets {
        directory: Some(directory.as_ref().to_path_buf()),
        assignments: assignments.to_vec(),
        ..Default::default()
    };
    let (mut added, outcome) = new_assets(inventory, &spec, message)?;

    Ok((added.pop().unwrap_or_default(), outcome))
}

/// Create every asset described by `spec` in one commit.
///
/// Each row is layered over the base record, and the assignments over each
/// row. A row may name its own root-relative `directory`, and its own
/// `template`. Rows without a directory land in `spec.directory`, or the
/// root.
///
/// # Errors
///
/// - Return [`CommandError::InvalidAssignment`] for malformed assignments.
/// - Return [`CommandError::Repo`] if a template does not exist.
/// - Return [`CommandError::Inventory`] for keys given twice, conflicting
///   directory or template choices, or assets that cannot be added. Nothing
///   is created then.
#[instrument(skip(inventory, spec, message), level = "debug")]
pub fn new_assets<V, P>(
    inventory: &mut Inventory<V, P>,
    spec: &NewAssets,
    message: Option<&str>,
) -> Result<(Vec<PathBuf>, CommitOutcome)>
where
    V: VersionControl,
    P: Prompt,
{
    let fields = parse_assignments(&spec.assignments)?;
    let rows = if spec.rows.is_empty() {
        vec![Record::default()]
    } else {
        spec.rows.clone()
    };

    let mut planned = Vec::new();
    for mut row in rows {
        if let Some(key) = row.keys().find(|key| fields.get(key).is_some()) {
            return Err(usage(format!("key {key:?} is given by a row and an assignment")));
        }

        let directory = match (row.unset("directory"), &spec.directory) {
            (Some(_), Some(_)) => {
                return Err(usage("cannot combine a directory column with a directory"));
            }
            (Some(directory), None) => inventory.repo().root().join(value_to_string(&directory)),
            (None, Some(directory)) => directory.clone(),
            (None, None) => inventory.repo().root().to_path_buf(),
        };

        let mut record = match (row.unset("template"), &spec.base) {
            (Some(_), Base::Template(_) | Base::Clone(_)) => {
                return Err(usage("cannot combine a template column with a template or clone"));
            }
            (Some(name), Base::Empty) => inventory.repo().template_record(&value_to_string(&name))?,
            (None, Base::Empty) => Record::default(),
            (None, Base::Template(name)) => inventory.repo().template_record(name)?,
            (None, Base::Clone(source)) => {
                let mut record = inventory.get_record(source)?;
                record.path = None;
                record.is_asset_directory = false;
                record
            }
        };

        for (key, value) in row.content.into_iter().chain(fields.content.clone()) {
            record.content.insert(key, value);
        }
        planned.push((directory, record));
    }

    let mut added = Vec::new();
    let outcome = transact(inventory, "new", message, |inventory| {
        for (directory, record) in planned {
            added.push(inventory.add_asset(directory, record)?);
        }
        Ok(added.clone())
    })?;

    Ok((added, outcome))
}

/// Parse tab-separated table into one record per row.
///
/// The first non-blank line names the columns. Cells are parsed like
/// assignment values, and missing trailing cells leave their key out.
///
/// # Errors
///
/// - Return [`CommandError::InvalidTable`] for blank or repeated column
///   names, rows with more values than columns, or tables without rows.
pub fn parse_table(text: &str) -> Result<Vec<Record>> {
    let invalid = |line: usize, reason: &str| CommandError::InvalidTable {
        line,
        reason: reason.into(),
    };

    let mut lines = text
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line))
        .filter(|(_, line)| !line.trim().is_empty());
    let Some((header_line, header)) = lines.next() else {
        return Err(invalid(1, "table has no header"));
    };

    let columns = header.split('\t').map(str::trim).collect::<Vec<_>>();
    let mut seen = HashSet::new();
    for column in &columns {
        if column.is_empty() {
            return Err(invalid(header_line, "blank column name"));
        }
        if !seen.insert(*column) {
            return Err(invalid(header_line, "repeated column name"));
        }
    }

    let mut rows = Vec::new();
    for (number, line) in lines {
        let cells = line.split('\t').collect::<Vec<_>>();
        if cells.iter().skip(columns.len()).any(|cell| !cell.is_empty()) {
            return Err(invalid(number, "more values than columns"));
        }

        rows.push(Record::from_pairs(columns.iter().copied().zip(cells)));
    }

    if rows.is_empty() {
        return Err(invalid(header_line, "table has no assets"));
    }

    Ok(rows)
}

/// Remove assets and directories.
///
/// # Errors
///
/// - Return [`CommandError::Inventory`] if any path cannot be removed. Nothing
///   is removed then.
#[instrument(skip(inventory, paths, message), level = "debug")]
pub fn rm<V, P>(
    inventory: &mut Inventory<V, P>,
    paths: &[PathBuf],
    mode: RemoveMode,
    message: Option<&str>,
) -> Result<CommitOutcome>
where
    V: VersionControl,
    P: Prompt,
{
    transact(inventory, "rm", message, |inventory| {
        inventory.remove(paths, mode)
    })
}

/// Move sources into destination, or rename a directory.
///
/// A single directory source with a destination that does not exist yet, but
/// whose parent does, renames the directory.
///
/// # Errors
///
/// - Return [`CommandError::Inventory`] if any source cannot be moved.
pub fn mv<V, P>(
    inventory: &mut Inventory<V, P>,
    sources: &[PathBuf],
    destination: impl AsRef<Path>,
    message: Option<&str>,
) -> Result<CommitOutcome>
where
    V: VersionControl,
    P: Prompt,
{
    let destination = destination.as_ref();
    let renaming = match sources {
        [source] => is_rename(inventory, source, destination),
        _ => false,
    };

    transact(inventory, "mv", message, |inventory| {
        if renaming {
            Ok(vec![inventory.rename_directory(&sources[0], destination)?])
        } else {
            inventory.move_to(sources, destination)
        }
    })
}

/// Set fields of selected assets from `key=value` assignments.
///
/// # Errors
///
/// - Return [`CommandError::InvalidAssignment`] for malformed assignments.
/// - Return [`CommandError::Inventory`] if selection or modification fails.
pub fn set<V, P>(
    inventory: &mut Inventory<V, P>,
    selection: &Selection,
    assignments: &[String],
    rename: bool,
    message: Option<&str>,
) -> Result<CommitOutcome>
where
    V: VersionControl,
    P: Prompt,
{
    let updates = assignments
        .iter()
        .map(|assignment| {
            parse_assignment(assignment).map(|(key, value)| FieldUpdate::Set { key, value })
        })
        .collect::<Result<Vec<_>>>()?;

    modify(inventory, selection, &updates, rename, message)
}

/// Remove fields from selected assets.
///
/// # Errors
///
/// - Return [`CommandError::Inventory`] if selection or modification fails.
pub fn unset<V, P>(
    inventory: &mut Inventory<V, P>,
    selection: &Selection,
    keys: &[String],
    rename: bool,
    message: Option<&str>,
) -> Result<CommitOutcome>
where
    V: VersionControl,
    P: Prompt,
{
    let updates = keys
        .iter()
        .map(|key| FieldUpdate::Unset { key: key.clone() })
        .collect::<Vec<_>>();

    modify(inventory, selection, &updates, rename, message)
}

/// Query fields of selected assets.
///
/// # Errors
///
/// - Return [`CommandError::Inventory`] if selection fails.
pub fn get<V, P>(
    inventory: &Inventory<V, P>,
    keys: &[String],
    selection: &Selection,
) -> Result<Vec<Row>>
where
    V: VersionControl,
    P: Prompt,
{
    let paths = selection.paths_or_root(inventory.repo().root());
    Ok(inventory.query(keys, paths, selection.depth, &selection.filters)?)
}

/// Run integrity checks by name, where no names run every check.
///
/// # Errors
///
/// - Return [`CommandError::Fsck`] for unknown check names, or if the tree
///   cannot be inspected.
pub fn fsck<V>(repo: &InventoryRepo<V>, names: &[String]) -> Result<FsckReport>
where
    V: VersionControl,
{
    let checks = parse_checks(names)?;
    Ok(run_fsck(repo, &checks)?)
}

/// Read configuration value.
///
/// # Errors
///
/// - Return [`CommandError::Repo`] if configuration cannot be read.
pub fn config_get<V>(repo: &InventoryRepo<V>, name: &str) -> Result<Option<String>>
where
    V: VersionControl,
{
    Ok(repo.get_config(name)?)
}

/// Write configuration value.
///
/// # Errors
///
/// - Return [`CommandError::Config`] if location is unknown.
/// - Return [`CommandError::Repo`] if configuration cannot be written.
pub fn config_set<V>(
    repo: &mut InventoryRepo<V>,
    name: &str,
    value: &str,
    location: &str,
) -> Result<()>
where
    V: VersionControl,
{
    let location = location.parse::<ConfigLocation>()?;
    repo.set_config(name, value, location)?;

    Ok(())
}

/// Collect `key=value` assignments into one record.
///
/// # Errors
///
/// - Return [`CommandError::InvalidAssignment`] for malformed assignments.
/// - Return [`CommandError::Inventory`] if a key is assigned twice.
pub fn parse_assignments(assignments: &[String]) -> Result<Record> {
    let mut record = Record::default();
    for assignment in assignments {
        let (key, value) = parse_assignment(assignment)?;
        if record.get(&key).is_some() {
            return Err(usage(format!("key {key:?} is assigned more than once")));
        }
        record.set(key, value);
    }

    Ok(record)
}

/// Split `key=value` assignment, parsing value as YAML scalar.
///
/// # Errors
///
/// - Return [`CommandError::InvalidAssignment`] if there is no `=`, or the
///   key is empty.
pub fn parse_assignment(assignment: &str) -> Result<(String, Value)> {
    let (key, value) = assignment
        .split_once('=')
        .ok_or_else(|| CommandError::InvalidAssignment(assignment.into()))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(CommandError::InvalidAssignment(assignment.into()));
    }

    Ok((key.to_string(), parse_value(value)))
}

fn usage(message: impl Into<String>) -> CommandError {
    CommandError::Inventory(InventoryError::Usage(message.into()))
}

fn modify<V, P>(
    inventory: &mut Inventory<V, P>,
    selection: &Selection,
    updates: &[FieldUpdate],
    rename: bool,
    message: Option<&str>,
) -> Result<CommitOutcome>
where
    V: VersionControl,
    P: Prompt,
{
    let paths = selection.paths_or_root(inventory.repo().root());
    transact(inventory, "set", message, |inventory| {
        let targets = inventory.select(&paths, selection.depth, &selection.filters)?;
        inventory.modify(&targets, updates, rename)
    })
}

fn is_rename<V, P>(inventory: &Inventory<V, P>, source: &Path, destination: &Path) -> bool
where
    V: VersionControl,
    P: Prompt,
{
    let (Ok(source), Ok(destination)) = (
        inventory.repo().relative(source),
        inventory.repo().relative(destination),
    ) else {
        return false;
    };

    let index = inventory.index();
    let source_is_directory = index
        .kind(&source)
        .is_some_and(|kind| kind.is_directory());
    let parent_exists = destination
        .parent()
        .is_some_and(|parent| index.kind(parent).is_some_and(|kind| kind.is_directory()));

    source_is_directory && !index.contains(&destination) && parent_exists
}

fn ensure_ready<V, P>(inventory: &Inventory<V, P>) -> Result<()>
where
    V: VersionControl,
    P: Prompt,
{
    if inventory.has_pending() {
        return Err(CommandError::PendingOperations);
    }

    let changed = inventory.repo().changed_files()?;
    if !changed.is_empty() {
        return Err(CommandError::DirtyTree(changed));
    }

    Ok(())
}

fn transact<V, P>(
    inventory: &mut Inventory<V, P>,
    verb: &str,
    message: Option<&str>,
    queue: impl FnOnce(&mut Inventory<V, P>) -> Result<Vec<PathBuf>, InventoryError>,
) -> Result<CommitOutcome>
where
    V: VersionControl,
    P: Prompt,
{
    ensure_ready(inventory)?;

    let paths = match queue(inventory) {
        Ok(paths) => paths,
        Err(error) => {
            if let Err(reset) = inventory.reset() {
                warn!("failed to discard pending operations: {reset}");
            }
            return Err(error.into());
        }
    };

    if !inventory.has_pending() {
        return Ok(CommitOutcome::NothingToCommit);
    }

    let subject = message
        .map(str::to_string)
        .unwrap_or_else(|| subject(verb, &paths));
    let outcome = inventory.commit(Some(&subject))?;
    match &outcome {
        CommitOutcome::Committed { hexsha, .. } => info!("{verb}: committed {hexsha}"),
        CommitOutcome::Declined => info!("no changes made"),
        CommitOutcome::NothingToCommit => info!("nothing to commit"),
    }

    Ok(outcome)
}

fn list_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(display).collect::<Vec<_>>().join(", ")
}

/// Command error types.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Work tree carries uncommitted changes.
    #[error("work tree is not clean, commit or discard changes first: {}", list_paths(.0))]
    DirtyTree(Vec<PathBuf>),

    /// Inventory already holds queued operations.
    #[error("inventory has pending operations")]
    PendingOperations,

    /// Assignment is not of the form `key=value`.
    #[error("invalid assignment {0:?}, expected key=value")]
    InvalidAssignment(String),

    /// Asset table is malformed.
    #[error("invalid table at line {line}: {reason}")]
    InvalidTable { line: usize, reason: String },

    /// Inventory request fails.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Integrity check cannot run.
    #[error(transparent)]
    Fsck(#[from] FsckError),

    /// Filter expression is malformed.
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// Configuration location or name is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Repository facade fails.
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Friendly result alias :3
type Result<T, E = CommandError> = std::result::Result<T, E>;
