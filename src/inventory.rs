// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Inventory transaction engine.
//!
//! An [`Inventory`] accepts high-level requests like adding, removing,
//! moving, or modifying assets, and expands each of them into primitive
//! [`Operation`]s. Nothing touches the disk until [`Inventory::commit`] is
//! called. A commit validates the whole queue, shows a diff, asks for
//! confirmation, carries out every operation, verifies the result, and
//! records exactly one commit.
//!
//! # Planning
//!
//! Requests are planned against an in-memory [`TreeIndex`] so that later
//! requests observe the effects of earlier ones. Each request plans on a copy
//! of the index first. Only if the whole request is valid does the copy
//! replace the index, and do its operations join the queue. A failing request
//! therefore leaves no trace.
//!
//! # Failure During Commit
//!
//! Once operations start being carried out there is no turning back. If an
//! operation fails, or the resulting tree does not match the plan, the commit
//! stops with a fatal error and leaves the uncommitted changes in the work
//! tree for manual recovery. No rollback is attempted.

pub mod operation;
pub mod snapshot;

use crate::{
    config::Settings,
    filter::{matches_all, Filter, FilterError},
    inventory::{
        operation::{
            execution_order, generated_subject, operations_record, Operation, OperationError,
        },
        snapshot::{EntryKind, TreeIndex},
    },
    naming::{validate_rename, NameIndex, NameTemplate, NamingError},
    path::{display, is_hidden, is_protected, PathError, ANCHOR_FILE, ASSET_DIR_FILE},
    record::{read_record, value_to_string, Record, RecordError, RESERVED_KEYS},
    repo::{
        vcs::{Git2Backend, VersionControl},
        InventoryRepo, RepoError,
    },
    ui::{InquirePrompt, Prompt, UiError},
};

use serde_yaml::{Mapping, Value};
use std::{
    collections::{BTreeSet, HashSet},
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, info, instrument, warn};

/// Question asked before pending operations are carried out.
pub const CONFIRM_QUESTION: &str = "Save changes? No discards all changes.";

/// Placeholder reported for keys an asset does not have.
pub const UNSET_VALUE: &str = "<unset>";

/// What to remove from a path.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RemoveMode {
    /// Remove the record aspect only.
    Asset,

    /// Remove the directory aspect only.
    Dir,

    /// Remove everything.
    #[default]
    All,
}

impl FromStr for RemoveMode {
    type Err = InventoryError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data {
            "asset" => Ok(Self::Asset),
            "dir" => Ok(Self::Dir),
            "all" => Ok(Self::All),
            other => Err(InventoryError::Usage(format!(
                "invalid remove mode {other:?}, expected asset, dir, or all"
            ))),
        }
    }
}

impl Display for RemoveMode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Asset => fmt.write_str("asset"),
            Self::Dir => fmt.write_str("dir"),
            Self::All => fmt.write_str("all"),
        }
    }
}

/// Change to one field of an asset record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Insert or overwrite field.
    Set { key: String, value: Value },

    /// Remove field.
    Unset { key: String },
}

impl FieldUpdate {
    /// Key this update targets.
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::Unset { key } => key,
        }
    }
}

/// Result of committing pending operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Operations were carried out and recorded.
    Committed { hexsha: String, message: String },

    /// Queue was empty.
    NothingToCommit,

    /// User declined, and the queue was discarded.
    Declined,
}

/// One row of an asset query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Root-relative path of the asset.
    pub path: PathBuf,

    /// Requested keys with their string values, in request order.
    pub values: Vec<(String, String)>,
}

/// Offending path of an invalid request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPath {
    pub path: PathBuf,
    pub reason: String,
}

impl InvalidPath {
    fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl Display for InvalidPath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}: {}", display(&self.path), self.reason)
    }
}

/// Transaction boundary over one inventory repository.
pub struct Inventory<V = Git2Backend, P = InquirePrompt>
where
    V: VersionControl,
    P: Prompt,
{
    repo: InventoryRepo<V>,
    prompt: P,
    settings: Settings,
    template: NameTemplate,
    operations: Vec<Operation>,
    index: TreeIndex,
}

impl<V, P> Inventory<V, P>
where
    V: VersionControl,
    P: Prompt,
{
    /// Bind inventory to repository.
    ///
    /// # Errors
    ///
    /// - Return [`InventoryError::Repo`] if the name template or tracked
    ///   files cannot be read.
    #[instrument(skip(repo, prompt), level = "debug")]
    pub fn new(repo: InventoryRepo<V>, prompt: P, settings: Settings) -> Result<Self> {
        let template = repo.name_template()?;
        let index = TreeIndex::from_tracked(repo.tracked_files()?);
        debug!("bind inventory at {:?}", repo.root().display());

        Ok(Self {
            repo,
            prompt,
            settings,
            template,
            operations: Vec::new(),
            index,
        })
    }

    /// Repository facade in use.
    pub fn repo(&self) -> &InventoryRepo<V> {
        &self.repo
    }

    /// Repository facade in use, mutably.
    pub fn repo_mut(&mut self) -> &mut InventoryRepo<V> {
        &mut self.repo
    }

    /// Interaction settings in use.
    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Name template in use.
    pub fn template(&self) -> &NameTemplate {
        &self.template
    }

    /// Queued operations in queue order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Check if any operation is queued.
    pub fn has_pending(&self) -> bool {
        !self.operations.is_empty()
    }

    /// Tree index including the effects of queued operations.
    pub fn index(&self) -> &TreeIndex {
        &self.index
    }

    /// Queue creation of a new asset in `directory`.
    ///
    /// The file name is derived from the record. Missing parent directories
    /// are created. Setting `is_asset_directory` to true in the record
    /// creates an asset directory. Returns the root-relative path of the new
    /// asset.
    ///
    /// # Errors
    ///
    /// - Return [`InventoryError::AlreadyExists`] if the path or the asset
    ///   name is taken.
    /// - Return [`InventoryError::Naming`] if no name can be derived.
    /// - Return [`InventoryError::Usage`] if the record sets a reserved key.
    /// - Return [`InventoryError::InvalidOperation`] if the directory is
    ///   outside the tree or protected.
    pub fn add_asset(&mut self, directory: impl AsRef<Path>, record: Record) -> Result<PathBuf> {
        self.plan(|draft| draft.add_asset(directory.as_ref(), record))
    }

    /// Queue creation of an inventory directory, parents included.
    ///
    /// An existing asset file at `path` is turned into an asset directory.
    ///
    /// # Errors
    ///
    /// - Return [`InventoryError::AlreadyExists`] if a directory already
    ///   exists at `path`.
    /// - Return [`InventoryError::InvalidOperation`] if the path is the root,
    ///   outside the tree, or protected.
    pub fn add_directory(&mut self, path: impl AsRef<Path>) -> Result<PathBuf> {
        self.plan(|draft| draft.add_directory(path.as_ref()))
    }

    /// Queue removal of paths.
    ///
    /// Every path is validated before anything is queued. Duplicate and
    /// nested paths collapse into one removal. Returns the root-relative
    /// paths that were targeted.
    ///
    /// # Errors
    ///
    /// - Return [`InventoryError::InvalidOperation`] listing every illegal
    ///   path, e.g., the root, protected paths, or unknown paths.
    /// - Return [`InventoryError::Usage`] if `mode` does not fit a target.
    pub fn remove(
        &mut self,
        paths: impl IntoIterator<Item = impl AsRef<Path>>,
        mode: RemoveMode,
    ) -> Result<Vec<PathBuf>> {
        let paths = paths
            .into_iter()
            .map(|path| path.as_ref().to_path_buf())
            .collect::<Vec<_>>();
        self.plan(|draft| draft.remove(&paths, mode))
    }

    /// Queue moving sources into an existing inventory directory.
    ///
    /// An asset file as destination is turned into an asset directory first.
    /// Returns the new root-relative paths.
    ///
    /// # Errors
    ///
    /// - Return [`InventoryError::InvalidOperation`] listing every illegal
    ///   source or destination, including name collisions.
    pub fn move_to(
        &mut self,
        sources: impl IntoIterator<Item = impl AsRef<Path>>,
        destination: impl AsRef<Path>,
    ) -> Result<Vec<PathBuf>> {
        let sources = sources
            .into_iter()
            .map(|path| path.as_ref().to_path_buf())
            .collect::<Vec<_>>();
        self.plan(|draft| draft.move_to(&sources, destination.as_ref()))
    }

    /// Queue renaming a plain inventory directory within its parent.
    ///
    /// # Errors
    ///
    /// - Return [`InventoryError::InvalidOperation`] if source is not a plain
    ///   directory, or destination is not a free sibling path.
    /// - Return [`InventoryError::AlreadyExists`] if destination is taken.
    pub fn rename_directory(
        &mut self,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
    ) -> Result<PathBuf> {
        self.plan(|draft| draft.rename_directory(source.as_ref(), destination.as_ref()))
    }

    /// Queue field updates for assets.
    ///
    /// Updating a naming field renames the asset, and requires
    /// `rename_allowed`. Targets whose content would not change are skipped.
    /// Returns the root-relative paths of all modified assets, empty if no
    /// asset was updated.
    ///
    /// # Errors
    ///
    /// - Return [`InventoryError::Usage`] for duplicate or reserved keys, or
    ///   naming field updates without `rename_allowed`.
    /// - Return [`InventoryError::InvalidOperation`] if a target is not an
    ///   asset.
    /// - Return [`InventoryError::Naming`] if a rename collides.
    pub fn modify(
        &mut self,
        targets: impl IntoIterator<Item = impl AsRef<Path>>,
        updates: &[FieldUpdate],
        rename_allowed: bool,
    ) -> Result<Vec<PathBuf>> {
        let targets = targets
            .into_iter()
            .map(|path| path.as_ref().to_path_buf())
            .collect::<Vec<_>>();
        self.plan(|draft| draft.modify(&targets, updates, rename_allowed))
    }

    /// Select assets at or below paths that match every filter.
    ///
    /// A `depth` of zero means unlimited. Filters on naming fields and
    /// reserved keys are evaluated from paths alone, before any record is
    /// read.
    ///
    /// # Errors
    ///
    /// - Return [`InventoryError::InvalidOperation`] if a path is unknown.
    /// - Return [`InventoryError::Record`] if a record must be read, but
    ///   cannot be parsed.
    pub fn select(
        &self,
        paths: impl IntoIterator<Item = impl AsRef<Path>>,
        depth: usize,
        filters: &[Filter],
    ) -> Result<Vec<PathBuf>> {
        let mut problems = Vec::new();
        let mut roots = Vec::new();
        for path in paths {
            let Some(path) = resolve(&self.repo, path.as_ref(), &mut problems) else {
                continue;
            };

            if is_protected(&path) || !self.index.contains(&path) {
                problems.push(InvalidPath::new(path, "no such asset or directory"));
                continue;
            }
            roots.push(path);
        }

        if !problems.is_empty() {
            return Err(InventoryError::InvalidOperation(problems));
        }

        let (pseudo, content): (Vec<&Filter>, Vec<&Filter>) =
            filters.iter().partition(|filter| self.is_pseudo_key(filter.key()));

        let mut selected = BTreeSet::new();
        for root in roots {
            let base = crate::path::depth(&root);
            let mut candidates = vec![root.clone()];
            candidates.extend(self.index.descendants(&root).into_iter().filter(|path| {
                depth == 0 || crate::path::depth(path) - base <= depth
            }));

            for candidate in candidates {
                let is_asset = self
                    .index
                    .kind(&candidate)
                    .is_some_and(EntryKind::is_asset);
                if !is_asset || selected.contains(&candidate) {
                    continue;
                }

                let view = self.pseudo_view(&candidate);
                if !pseudo.iter().all(|filter| filter.matches_mapping(&view)) {
                    continue;
                }

                if !content.is_empty() {
                    let record = load(&self.repo, &self.index, &candidate)?;
                    if !matches_all(content.iter().copied(), &record) {
                        continue;
                    }
                }

                selected.insert(candidate);
            }
        }

        Ok(selected.into_iter().collect())
    }

    /// Query key values of selected assets.
    ///
    /// Keys default to the naming fields followed by `path`. Missing values
    /// are reported as `<unset>`.
    ///
    /// # Errors
    ///
    /// - Return any error of [`Inventory::select`].
    pub fn query(
        &self,
        keys: &[String],
        paths: impl IntoIterator<Item = impl AsRef<Path>>,
        depth: usize,
        filters: &[Filter],
    ) -> Result<Vec<Row>> {
        let keys = if keys.is_empty() {
            self.template
                .fields()
                .map(String::from)
                .chain(["path".to_string()])
                .collect()
        } else {
            keys.to_vec()
        };
        let needs_record = keys.iter().any(|key| !self.is_pseudo_key(key));

        let mut rows = Vec::new();
        for path in self.select(paths, depth, filters)? {
            let view = self.pseudo_view(&path);
            let record = if needs_record {
                Some(load(&self.repo, &self.index, &path)?)
            } else {
                None
            };

            let values = keys
                .iter()
                .map(|key| {
                    let value = if self.is_pseudo_key(key) {
                        view.get(key.as_str())
                    } else {
                        record.as_ref().and_then(|record| record.get(key))
                    };
                    let value = match value {
                        None | Some(Value::Null) => UNSET_VALUE.to_string(),
                        Some(value) => value_to_string(value),
                    };
                    (key.clone(), value)
                })
                .collect();

            rows.push(Row { path, values });
        }

        Ok(rows)
    }

    /// Read current record of an asset, queued changes included.
    ///
    /// # Errors
    ///
    /// - Return [`InventoryError::InvalidOperation`] if path is not an asset.
    /// - Return [`InventoryError::Record`] if the record cannot be parsed.
    pub fn get_record(&self, path: impl AsRef<Path>) -> Result<Record> {
        let mut problems = Vec::new();
        let Some(path) = resolve(&self.repo, path.as_ref(), &mut problems) else {
            return Err(InventoryError::InvalidOperation(problems));
        };

        load(&self.repo, &self.index, &path)
    }

    /// Human-readable diff of all queued operations.
    pub fn diff(&self) -> Vec<String> {
        self.operations.iter().flat_map(Operation::diff).collect()
    }

    /// Discard queued operations, and rebuild the tree index from disk.
    ///
    /// # Errors
    ///
    /// - Return [`InventoryError::Repo`] if tracked files cannot be listed.
    pub fn reset(&mut self) -> Result<()> {
        self.operations.clear();
        self.index = TreeIndex::from_tracked(self.repo.tracked_files()?);

        Ok(())
    }

    /// Carry out queued operations, and record them in one commit.
    ///
    /// Uses `message` as commit subject, or generates one from the queue.
    /// Declining the confirmation discards the queue and is not an error.
    ///
    /// # Errors
    ///
    /// - Return any validation error. The queue is discarded, and nothing
    ///   is touched.
    /// - Return [`InventoryError::Execution`] or
    ///   [`InventoryError::Verification`] if carrying out the queue fails.
    ///   The work tree then holds uncommitted partial changes.
    #[instrument(skip(self, message), level = "debug")]
    pub fn commit(&mut self, message: Option<&str>) -> Result<CommitOutcome> {
        if self.operations.is_empty() {
            info!("no pending operations to commit");
            return Ok(CommitOutcome::NothingToCommit);
        }

        if let Err(error) = self.validate() {
            self.discard();
            return Err(error);
        }

        let diff = self.diff();
        if !self.settings.quiet {
            self.prompt.show(&diff);
        }

        if !self.settings.yes {
            let confirmed = match self.prompt.confirm(CONFIRM_QUESTION) {
                Ok(confirmed) => confirmed,
                Err(error) => {
                    self.discard();
                    return Err(error.into());
                }
            };

            if !confirmed {
                info!("no changes made");
                self.discard();
                return Ok(CommitOutcome::Declined);
            }
        }

        let subject = message
            .map(str::to_string)
            .unwrap_or_else(|| generated_subject(&self.operations));
        let message = format!("{subject}\n\n{}", operations_record(&self.operations));

        let order = execution_order(&self.operations);
        let total = order.len();
        for (completed, index) in order.into_iter().enumerate() {
            if let Err(source) = self.operations[index].execute(&self.repo) {
                self.discard();
                return Err(InventoryError::Execution {
                    completed,
                    total,
                    source: Box::new(source),
                });
            }
        }

        if let Err(error) = self.verify() {
            self.discard();
            return Err(error);
        }

        let touched = self
            .operations
            .iter()
            .flat_map(Operation::touched)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        let hexsha = match self.repo.stage_and_commit(&touched, &message) {
            Ok(hexsha) => hexsha,
            Err(error) => {
                self.discard();
                return Err(error.into());
            }
        };
        info!("recorded {total} operations in {hexsha}");
        self.reset()?;

        Ok(CommitOutcome::Committed { hexsha, message })
    }

    fn plan<T>(&mut self, build: impl FnOnce(&mut Draft<'_, V>) -> Result<T>) -> Result<T> {
        let mut draft = Draft {
            repo: &self.repo,
            template: &self.template,
            index: self.index.clone(),
            operations: Vec::new(),
        };
        let value = build(&mut draft)?;

        let Draft {
            index, operations, ..
        } = draft;
        debug!("queue {} operations", operations.len());
        self.index = index;
        self.operations.extend(operations);

        Ok(value)
    }

    fn discard(&mut self) {
        self.operations.clear();
        match self.repo.tracked_files() {
            Ok(files) => self.index = TreeIndex::from_tracked(files),
            Err(error) => warn!("failed to rebuild tree index: {error}"),
        }
    }

    fn is_pseudo_key(&self, key: &str) -> bool {
        self.template.is_naming_field(key) || RESERVED_KEYS.contains(&key)
    }

    fn pseudo_view(&self, path: &Path) -> Mapping {
        let mut view = Mapping::new();
        let is_asset_directory = self.index.kind(path) == Some(EntryKind::AssetDirectory);
        if let Ok((values, _)) = self.template.split_path(path) {
            for (key, value) in values {
                view.insert(Value::from(key), Value::from(value));
            }
        }

        view.insert("path".into(), display(path).into());
        view.insert(
            "directory".into(),
            display(path.parent().unwrap_or(Path::new(""))).into(),
        );
        view.insert("is_asset_directory".into(), is_asset_directory.into());

        view
    }

    fn validate(&self) -> Result<()> {
        let mut touched = BTreeSet::new();
        for operation in &self.operations {
            for path in operation.touched() {
                if is_protected(&path) {
                    return Err(InventoryError::InvalidOperation(vec![InvalidPath::new(
                        path,
                        "protected path",
                    )]));
                }
                touched.insert(path);
            }

            if let Operation::NewAsset { record, .. } | Operation::ModifyAsset { new: record, .. } =
                operation
            {
                record.render()?;
            }
        }

        let is_touched =
            |path: &Path| touched.iter().any(|target: &PathBuf| path.starts_with(target));

        for (name, paths) in self.index.duplicate_names() {
            if paths.iter().any(|path| is_touched(path.as_path())) {
                return Err(InventoryError::Conflict { name, paths });
            }
        }

        // INVARIANT: Committed records affected by the queue must still parse.
        for (path, aspect) in self.index.assets() {
            if let Some(source) = &aspect.source {
                if is_touched(path.as_path()) {
                    read_record(self.repo.absolute(source))?;
                }
            }
        }

        Ok(())
    }

    fn verify(&self) -> Result<()> {
        let touched = self
            .operations
            .iter()
            .flat_map(Operation::touched)
            .collect::<BTreeSet<_>>();

        for path in touched {
            let expected = self.index.kind(&path);
            let found = kind_on_disk(&self.repo.absolute(&path));
            if expected != found {
                return Err(InventoryError::Verification {
                    path,
                    expected: describe(expected).into(),
                    found: describe(found).into(),
                });
            }

            let planned = self
                .index
                .get(&path)
                .and_then(|entry| entry.record.as_ref())
                .and_then(|aspect| aspect.content.as_ref());
            if let Some(planned) = planned {
                let is_asset_directory = expected == Some(EntryKind::AssetDirectory);
                let written = self.repo.read_record(&path, is_asset_directory)?;
                if !written.same_content(planned) {
                    return Err(InventoryError::Verification {
                        path,
                        expected: "planned record content".into(),
                        found: "different content".into(),
                    });
                }
            }
        }

        Ok(())
    }
}

// Planning state of one request.
struct Draft<'inv, V>
where
    V: VersionControl,
{
    repo: &'inv InventoryRepo<V>,
    template: &'inv NameTemplate,
    index: TreeIndex,
    operations: Vec<Operation>,
}

impl<V> Draft<'_, V>
where
    V: VersionControl,
{
    fn queue(&mut self, operation: Operation) {
        operation.apply(&mut self.index);
        self.operations.push(operation);
    }

    fn load(&self, path: &Path) -> Result<Record> {
        load(self.repo, &self.index, path)
    }

    fn resolve_one(&self, path: &Path) -> Result<PathBuf> {
        let mut problems = Vec::new();
        resolve(self.repo, path, &mut problems).ok_or(InventoryError::InvalidOperation(problems))
    }

    // Classify target of a destructive request.
    fn validate_target(&self, path: &Path) -> Result<EntryKind, String> {
        if path.as_os_str().is_empty() {
            return Err("cannot operate on the inventory root".into());
        }

        if is_protected(path) {
            return Err("protected path".into());
        }

        self.index
            .kind(path)
            .ok_or_else(|| "no such asset or directory".into())
    }

    fn ensure_directory(&mut self, path: &Path) -> Result<()> {
        match self.index.kind(path) {
            Some(kind) if kind.is_directory() => Ok(()),
            Some(_) => {
                let mut record = self.load(path)?;
                record.is_asset_directory = true;
                self.queue(Operation::NewDirectory {
                    path: path.to_path_buf(),
                    record: Some(record),
                });
                Ok(())
            }
            None => {
                if let Some(parent) = path.parent() {
                    self.ensure_directory(parent)?;
                }

                if self.repo.absolute(path).exists() {
                    return Err(InventoryError::AlreadyExists {
                        path: path.to_path_buf(),
                    });
                }

                self.queue(Operation::NewDirectory {
                    path: path.to_path_buf(),
                    record: None,
                });
                Ok(())
            }
        }
    }

    fn add_asset(&mut self, directory: &Path, mut record: Record) -> Result<PathBuf> {
        let directory = self.resolve_one(directory)?;
        if is_protected(&directory) || is_hidden(&directory) {
            return Err(InventoryError::InvalidOperation(vec![InvalidPath::new(
                directory,
                "protected path",
            )]));
        }

        match record.unset("is_asset_directory") {
            None => {}
            Some(Value::Bool(flag)) => record.is_asset_directory = flag,
            Some(_) => {
                return Err(InventoryError::Usage(
                    "is_asset_directory must be true or false".into(),
                ))
            }
        }

        if let Some(key) = record.reserved_keys().first() {
            return Err(InventoryError::Usage(format!(
                "{key:?} is a reserved key and cannot be set"
            )));
        }

        let index = &self.index;
        let name = self
            .template
            .derive(&mut record, |name| index.asset_named(name).is_some())?;
        let path = directory.join(&name);
        if self.index.contains(&path) || self.repo.absolute(&path).exists() {
            return Err(InventoryError::AlreadyExists { path });
        }

        if let Some(other) = self.index.asset_named(&name) {
            return Err(InventoryError::AlreadyExists { path: other });
        }

        self.ensure_directory(&directory)?;
        if record.is_asset_directory {
            self.queue(Operation::NewDirectory {
                path: path.clone(),
                record: None,
            });
        }

        info!("add asset {:?}", path.display());
        record.path = Some(self.repo.absolute(&path));
        self.queue(Operation::NewAsset {
            path: path.clone(),
            record,
        });

        Ok(path)
    }

    fn add_directory(&mut self, path: &Path) -> Result<PathBuf> {
        let path = self.resolve_one(path)?;
        if path.as_os_str().is_empty() {
            return Err(InventoryError::InvalidOperation(vec![InvalidPath::new(
                path,
                "the inventory root already exists",
            )]));
        }

        if is_protected(&path) || is_hidden(&path) {
            return Err(InventoryError::InvalidOperation(vec![InvalidPath::new(
                path,
                "protected path",
            )]));
        }

        if self.index.kind(&path).is_some_and(EntryKind::is_directory) {
            return Err(InventoryError::AlreadyExists { path });
        }

        info!("add directory {:?}", path.display());
        self.ensure_directory(&path)?;

        Ok(path)
    }

    fn remove(&mut self, paths: &[PathBuf], mode: RemoveMode) -> Result<Vec<PathBuf>> {
        let mut problems = Vec::new();
        let mut mismatches = Vec::new();
        let mut targets = BTreeSet::new();
        for path in paths {
            let Some(path) = resolve(self.repo, path, &mut problems) else {
                continue;
            };

            match self.validate_target(&path) {
                Err(reason) => problems.push(InvalidPath::new(path, reason)),
                Ok(EntryKind::Directory) if mode == RemoveMode::Asset => {
                    mismatches.push(format!("{} is not an asset", display(&path)));
                }
                Ok(EntryKind::Asset) if mode == RemoveMode::Dir => {
                    mismatches.push(format!("{} is not a directory", display(&path)));
                }
                Ok(_) => {
                    targets.insert(path);
                }
            }
        }

        if !problems.is_empty() {
            return Err(InventoryError::InvalidOperation(problems));
        }

        if !mismatches.is_empty() {
            return Err(InventoryError::Usage(format!(
                "cannot remove in mode '{mode}': {}",
                mismatches.join(", ")
            )));
        }

        let mut targets = targets.into_iter().collect::<Vec<_>>();
        if mode == RemoveMode::Asset {
            // INVARIANT: Record aspects do not cascade, so deeper targets go first.
            targets.sort_by_key(|path| std::cmp::Reverse(crate::path::depth(path)));
        } else {
            let all = targets.clone();
            targets.retain(|path| {
                !all.iter()
                    .any(|other| crate::path::is_strict_descendant(path, other))
            });
        }

        for target in &targets {
            info!("remove {:?} in mode '{mode}'", target.display());
            self.remove_entry(target, mode)?;
        }

        Ok(targets)
    }

    fn remove_entry(&mut self, path: &Path, mode: RemoveMode) -> Result<()> {
        let Some(kind) = self.index.kind(path) else {
            return Ok(());
        };

        match (kind, mode) {
            (EntryKind::Asset, _) | (EntryKind::AssetDirectory, RemoveMode::Asset) => {
                let record = self.load(path)?;
                self.queue(Operation::RemoveAsset {
                    path: path.to_path_buf(),
                    record,
                });
            }
            (EntryKind::Directory, _) => {
                self.remove_children(path)?;
                self.queue(Operation::RemoveDirectory {
                    path: path.to_path_buf(),
                    record: None,
                });
            }
            (EntryKind::AssetDirectory, RemoveMode::Dir) => {
                self.remove_children(path)?;
                let mut record = self.load(path)?;
                record.is_asset_directory = false;
                self.queue(Operation::RemoveDirectory {
                    path: path.to_path_buf(),
                    record: Some(record),
                });
            }
            (EntryKind::AssetDirectory, RemoveMode::All) => {
                self.remove_children(path)?;
                let record = self.load(path)?;
                self.queue(Operation::RemoveAsset {
                    path: path.to_path_buf(),
                    record,
                });
                self.queue(Operation::RemoveDirectory {
                    path: path.to_path_buf(),
                    record: None,
                });
            }
        }

        Ok(())
    }

    fn remove_children(&mut self, path: &Path) -> Result<()> {
        for child in self.index.children(path) {
            self.remove_entry(&child, RemoveMode::All)?;
        }

        Ok(())
    }

    fn move_to(&mut self, sources: &[PathBuf], destination: &Path) -> Result<Vec<PathBuf>> {
        let mut problems = Vec::new();
        let destination = resolve(self.repo, destination, &mut problems);
        if let Some(destination) = &destination {
            let usable = destination.as_os_str().is_empty()
                || (!is_protected(destination) && self.index.contains(destination));
            if !usable {
                problems.push(InvalidPath::new(
                    destination,
                    "destination is not an inventory directory",
                ));
            }
        }

        let mut planned = Vec::new();
        let mut claimed = HashSet::new();
        for source in sources {
            let Some(source) = resolve(self.repo, source, &mut problems) else {
                continue;
            };

            let kind = match self.validate_target(&source) {
                Ok(kind) => kind,
                Err(reason) => {
                    problems.push(InvalidPath::new(source, reason));
                    continue;
                }
            };

            let Some(destination) = &destination else {
                continue;
            };

            if source.parent() == Some(destination.as_path()) {
                problems.push(InvalidPath::new(source, "already in destination"));
                continue;
            }

            if destination.starts_with(&source) {
                problems.push(InvalidPath::new(source, "cannot move into itself"));
                continue;
            }

            let Some(name) = source.file_name() else {
                problems.push(InvalidPath::new(source, "no name to move"));
                continue;
            };

            let target = destination.join(name);
            if self.index.contains(&target)
                || self.repo.absolute(&target).exists()
                || !claimed.insert(target.clone())
            {
                problems.push(InvalidPath::new(target, "destination already exists"));
                continue;
            }

            planned.push((source, target, kind));
        }

        // INVARIANT: A source inside another source would vanish with it.
        let roots = planned
            .iter()
            .map(|(source, _, _)| source.clone())
            .collect::<Vec<_>>();
        for (source, _, _) in &planned {
            if roots
                .iter()
                .any(|other| crate::path::is_strict_descendant(source, other))
            {
                problems.push(InvalidPath::new(source, "nested in another source"));
            }
        }

        if !problems.is_empty() {
            return Err(InventoryError::InvalidOperation(problems));
        }

        if let Some(destination) = &destination {
            self.ensure_directory(destination)?;
        }

        let mut moved = Vec::new();
        for (source, target, kind) in planned {
            info!("move {:?} to {:?}", source.display(), target.display());
            self.queue(Operation::Move {
                source,
                destination: target.clone(),
                is_directory: kind == EntryKind::Directory,
            });
            moved.push(target);
        }

        Ok(moved)
    }

    fn rename_directory(&mut self, source: &Path, destination: &Path) -> Result<PathBuf> {
        let source = self.resolve_one(source)?;
        let destination = self.resolve_one(destination)?;
        let invalid = |path: &Path, reason: &str| {
            Err(InventoryError::InvalidOperation(vec![InvalidPath::new(
                path, reason,
            )]))
        };

        match self.validate_target(&source) {
            Err(reason) => return invalid(&source, reason.as_str()),
            Ok(EntryKind::Directory) => {}
            Ok(EntryKind::AssetDirectory) => {
                return invalid(
                    &source,
                    "asset directories are renamed through their naming fields",
                )
            }
            Ok(EntryKind::Asset) => return invalid(&source, "not a directory"),
        }

        if source.parent() != destination.parent() {
            return invalid(&destination, "not a sibling, consider moving instead");
        }

        if source == destination {
            return invalid(&destination, "directory already has this name");
        }

        if is_protected(&destination) || is_hidden(&destination) {
            return invalid(&destination, "protected path");
        }

        if self.index.contains(&destination) || self.repo.absolute(&destination).exists() {
            return Err(InventoryError::AlreadyExists { path: destination });
        }

        info!(
            "rename {:?} to {:?}",
            source.display(),
            destination.display()
        );
        self.queue(Operation::Rename {
            source,
            destination: destination.clone(),
            is_directory: true,
        });

        Ok(destination)
    }

    fn modify(
        &mut self,
        targets: &[PathBuf],
        updates: &[FieldUpdate],
        rename_allowed: bool,
    ) -> Result<Vec<PathBuf>> {
        let mut keys = HashSet::new();
        for update in updates {
            let key = update.key();
            if !keys.insert(key) {
                return Err(InventoryError::Usage(format!(
                    "key {key:?} is given more than once"
                )));
            }

            match (key, update) {
                ("is_asset_directory", FieldUpdate::Set {
                    value: Value::Bool(_),
                    ..
                }) => {}
                ("is_asset_directory", _) => {
                    return Err(InventoryError::Usage(
                        "is_asset_directory can only be set to true or false".into(),
                    ))
                }
                (key, _) if RESERVED_KEYS.contains(&key) => {
                    return Err(InventoryError::Usage(format!(
                        "{key:?} is a reserved key and cannot be changed"
                    )))
                }
                _ => {}
            }
        }

        let renaming = updates
            .iter()
            .any(|update| self.template.is_naming_field(update.key()));
        if renaming && !rename_allowed {
            return Err(InventoryError::Usage(
                "changing naming fields renames assets, and must be explicitly allowed".into(),
            ));
        }

        let mut problems = Vec::new();
        let mut paths = BTreeSet::new();
        for target in targets {
            let Some(path) = resolve(self.repo, target, &mut problems) else {
                continue;
            };

            match self.validate_target(&path) {
                Ok(kind) if kind.is_asset() => {
                    paths.insert(path);
                }
                Ok(_) => problems.push(InvalidPath::new(path, "not an asset")),
                Err(reason) => problems.push(InvalidPath::new(path, reason)),
            }
        }

        if !problems.is_empty() {
            return Err(InventoryError::InvalidOperation(problems));
        }

        let mut modified = Vec::new();
        for path in paths {
            let current = self.load(&path)?;
            let mut updated = current.clone();
            let mut wants_directory = current.is_asset_directory;
            for update in updates {
                match update {
                    FieldUpdate::Set {
                        key,
                        value: Value::Bool(flag),
                    } if key == "is_asset_directory" => wants_directory = *flag,
                    FieldUpdate::Set { key, value } => updated.set(key.clone(), value.clone()),
                    FieldUpdate::Unset { key } => {
                        updated.unset(key);
                    }
                }
            }

            let content_changed = !updated.same_content(&current);
            if !content_changed && wants_directory == current.is_asset_directory {
                debug!("{:?} already up to date", path.display());
                continue;
            }

            let location = if renaming && content_changed {
                validate_rename(self.template, &path, &mut updated, &self.index)?
            } else {
                path.clone()
            };

            if content_changed {
                self.queue(Operation::ModifyAsset {
                    path: path.clone(),
                    old: current.clone(),
                    new: updated.clone(),
                });
            }

            if location != path {
                self.queue(Operation::Rename {
                    source: path.clone(),
                    destination: location.clone(),
                    is_directory: false,
                });
            }

            if wants_directory != current.is_asset_directory {
                let mut record = updated.clone();
                record.is_asset_directory = wants_directory;
                if wants_directory {
                    self.queue(Operation::NewDirectory {
                        path: location.clone(),
                        record: Some(record),
                    });
                } else {
                    if !self.index.children(&location).is_empty() {
                        return Err(InventoryError::InvalidOperation(vec![InvalidPath::new(
                            location,
                            "asset directory is not empty",
                        )]));
                    }
                    self.queue(Operation::RemoveDirectory {
                        path: location.clone(),
                        record: Some(record),
                    });
                }
            }

            modified.push(location);
        }

        if modified.is_empty() {
            info!("no assets updated");
        }

        Ok(modified)
    }
}

// Resolve path inside the tree, or note why it cannot be.
fn resolve<V>(
    repo: &InventoryRepo<V>,
    path: &Path,
    problems: &mut Vec<InvalidPath>,
) -> Option<PathBuf>
where
    V: VersionControl,
{
    match repo.relative(path) {
        Ok(path) => Some(path),
        Err(RepoError::Path(PathError::OutsideTree { path })) => {
            problems.push(InvalidPath::new(path, "outside of the inventory"));
            None
        }
        Err(error) => {
            problems.push(InvalidPath::new(path, error.to_string()));
            None
        }
    }
}

// Read record of an asset as planned in the index.
fn load<V>(repo: &InventoryRepo<V>, index: &TreeIndex, path: &Path) -> Result<Record>
where
    V: VersionControl,
{
    let entry = index
        .get(path)
        .filter(|entry| entry.record.is_some())
        .ok_or_else(|| {
            InventoryError::InvalidOperation(vec![InvalidPath::new(path, "not an asset")])
        })?;

    let mut record = match entry.record.as_ref().and_then(|aspect| aspect.content.clone()) {
        Some(record) => record,
        None => {
            let source = entry
                .record
                .as_ref()
                .and_then(|aspect| aspect.source.clone())
                .unwrap_or_else(|| repo.record_file(path, entry.directory));
            read_record(repo.absolute(source))?
        }
    };
    record.path = Some(repo.absolute(path));
    record.is_asset_directory = entry.directory;

    Ok(record)
}

fn kind_on_disk(path: &Path) -> Option<EntryKind> {
    let anchored = path.join(ANCHOR_FILE).is_file();
    let recorded = path.join(ASSET_DIR_FILE).is_file();
    match (anchored, recorded) {
        (_, true) => Some(EntryKind::AssetDirectory),
        (true, false) => Some(EntryKind::Directory),
        _ if path.is_file() => Some(EntryKind::Asset),
        _ => None,
    }
}

fn describe(kind: Option<EntryKind>) -> &'static str {
    match kind {
        Some(EntryKind::Asset) => "an asset",
        Some(EntryKind::Directory) => "a directory",
        Some(EntryKind::AssetDirectory) => "an asset directory",
        None => "nothing",
    }
}

fn list_problems(problems: &[InvalidPath]) -> String {
    problems
        .iter()
        .map(|problem| format!("\n  {problem}"))
        .collect()
}

fn list_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(display).collect::<Vec<_>>().join(", ")
}

/// Inventory error types.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    /// Request is structurally illegal.
    #[error("invalid inventory operation:{}", list_problems(.0))]
    InvalidOperation(Vec<InvalidPath>),

    /// Path or asset name is already taken.
    #[error("{:?} already exists", .path.display())]
    AlreadyExists { path: PathBuf },

    /// Asset name would be used more than once in the tree.
    #[error("asset name {name:?} used more than once: {}", list_paths(.paths))]
    Conflict { name: String, paths: Vec<PathBuf> },

    /// Request is malformed.
    #[error("{0}")]
    Usage(String),

    /// Asset name cannot be derived or collides.
    #[error(transparent)]
    Naming(#[from] NamingError),

    /// Record cannot be parsed or rendered.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// Filter expression is malformed.
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// Repository facade fails.
    #[error(transparent)]
    Repo(#[from] RepoError),

    /// User interaction fails.
    #[error(transparent)]
    Ui(#[from] UiError),

    /// Carrying out an operation fails midway.
    #[error(
        "operation {} of {} failed, the work tree holds uncommitted partial changes",
        .completed + 1,
        .total
    )]
    Execution {
        completed: usize,
        total: usize,
        #[source]
        source: Box<OperationError>,
    },

    /// Work tree does not match the plan after carrying out operations.
    #[error("expected {expected} at {:?}, but found {found}", .path.display())]
    Verification {
        path: PathBuf,
        expected: String,
        found: String,
    },
}

/// Friendly result alias :3
type Result<T, E = InventoryError> = std::result::Result<T, E>;
