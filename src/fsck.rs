// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Integrity checker.
//!
//! Whole-tree checks that do not depend on any pending operation. Every
//! selected check runs, and all failures are collected into one
//! [`FsckReport`] instead of stopping at the first one.

use crate::{
    inventory::snapshot::{EntryKind, TreeIndex},
    path::{display, is_hidden, is_protected, ANCHOR_FILE, STOWAGE_DIR},
    repo::{vcs::VersionControl, InventoryRepo, RepoError},
};

use ignore::WalkBuilder;
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};
use tracing::{debug, info, instrument, warn};

/// Integrity check that can be selected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Check {
    /// Every inventory directory carries exactly one empty anchor.
    Anchors,

    /// No two assets share a name.
    AssetUnique,

    /// Every asset record parses.
    AssetYaml,

    /// Every asset name matches the name derived from its record.
    AssetNames,

    /// No record body stores a reserved key.
    PseudoKeys,

    /// Protected paths are intact and unchanged.
    ProtectedPaths,

    /// Work tree has no uncommitted changes.
    CleanTree,
}

impl Check {
    /// Every check in the order they run.
    pub const ALL: [Check; 7] = [
        Check::Anchors,
        Check::AssetUnique,
        Check::AssetYaml,
        Check::AssetNames,
        Check::PseudoKeys,
        Check::ProtectedPaths,
        Check::CleanTree,
    ];

    /// Name used to select the check.
    pub fn name(self) -> &'static str {
        match self {
            Self::Anchors => "anchors",
            Self::AssetUnique => "asset-unique",
            Self::AssetYaml => "asset-yaml",
            Self::AssetNames => "asset-names",
            Self::PseudoKeys => "pseudo-keys",
            Self::ProtectedPaths => "protected-paths",
            Self::CleanTree => "clean-tree",
        }
    }
}

impl FromStr for Check {
    type Err = FsckError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|check| check.name() == data)
            .ok_or_else(|| FsckError::UnknownCheck(data.to_string()))
    }
}

impl Display for Check {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.name())
    }
}

/// One failed integrity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsckFailure {
    /// Check that failed.
    pub check: Check,

    /// Offending root-relative path, if the failure concerns one.
    pub path: Option<PathBuf>,

    /// What is wrong.
    pub message: String,
}

impl Display for FsckFailure {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match &self.path {
            Some(path) => write!(fmt, "[{}] {}: {}", self.check, display(path), self.message),
            None => write!(fmt, "[{}] {}", self.check, self.message),
        }
    }
}

/// Aggregated outcome of all selected checks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FsckReport {
    /// Checks that ran.
    pub checks: Vec<Check>,

    /// Every failure found, in check order.
    pub failures: Vec<FsckFailure>,
}

impl FsckReport {
    /// Check if every selected check passed.
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failures of a specific check.
    pub fn failures_of(&self, check: Check) -> impl Iterator<Item = &FsckFailure> {
        self.failures
            .iter()
            .filter(move |failure| failure.check == check)
    }

    fn fail(&mut self, check: Check, path: Option<PathBuf>, message: impl Into<String>) {
        let failure = FsckFailure {
            check,
            path,
            message: message.into(),
        };
        warn!("{failure}");
        self.failures.push(failure);
    }
}

/// Parse check names, where no names select every check.
///
/// # Errors
///
/// - Return [`FsckError::UnknownCheck`] for any unknown name.
pub fn parse_checks(names: &[String]) -> Result<Vec<Check>> {
    if names.is_empty() {
        return Ok(Check::ALL.to_vec());
    }

    let checks = names
        .iter()
        .map(|name| name.parse::<Check>())
        .collect::<Result<BTreeSet<_>>>()?;

    Ok(checks.into_iter().collect())
}

/// Run integrity checks over the whole tree.
///
/// An empty list of checks runs all of them.
///
/// # Errors
///
/// - Return [`FsckError::Repo`] if tracked files or the work tree status
///   cannot be read. Broken records are reported as failures instead.
#[instrument(skip(repo), level = "debug")]
pub fn fsck<V>(repo: &InventoryRepo<V>, checks: &[Check]) -> Result<FsckReport>
where
    V: VersionControl,
{
    let checks = if checks.is_empty() {
        Check::ALL.to_vec()
    } else {
        checks.to_vec()
    };

    let tracked = repo.tracked_files()?;
    let index = TreeIndex::from_tracked(&tracked);
    let mut report = FsckReport {
        checks: checks.clone(),
        failures: Vec::new(),
    };

    for check in checks {
        debug!("run check {check}");
        match check {
            Check::Anchors => check_anchors(repo, &tracked, &index, &mut report),
            Check::AssetUnique => check_asset_unique(&index, &mut report),
            Check::AssetYaml => check_asset_yaml(repo, &index, &mut report),
            Check::AssetNames => check_asset_names(repo, &index, &mut report),
            Check::PseudoKeys => check_pseudo_keys(repo, &index, &mut report),
            Check::ProtectedPaths => check_protected_paths(repo, &mut report)?,
            Check::CleanTree => check_clean_tree(repo, &mut report)?,
        }
    }

    if report.is_ok() {
        info!("all {} checks passed", report.checks.len());
    }

    Ok(report)
}

fn check_anchors<V>(
    repo: &InventoryRepo<V>,
    tracked: &[PathBuf],
    index: &TreeIndex,
    report: &mut FsckReport,
) where
    V: VersionControl,
{
    let tracked_set = tracked.iter().collect::<BTreeSet<_>>();
    for (path, entry) in index.iter() {
        if !entry.directory {
            continue;
        }

        let anchor = path.join(ANCHOR_FILE);
        if !tracked_set.contains(&anchor) {
            report.fail(
                Check::Anchors,
                Some(path.clone()),
                "inventory directory has no tracked anchor",
            );
            continue;
        }

        match repo.absolute(&anchor).metadata() {
            Ok(metadata) if metadata.len() == 0 => {}
            Ok(_) => report.fail(Check::Anchors, Some(anchor), "anchor is not empty"),
            Err(_) => report.fail(Check::Anchors, Some(anchor), "anchor is missing on disk"),
        }
    }

    // Directories git cannot see yet still need their anchor.
    let walker = WalkBuilder::new(repo.root())
        .hidden(true)
        .git_ignore(true)
        .git_exclude(true)
        .follow_links(false)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                debug!("skip unreadable entry: {error}");
                continue;
            }
        };

        if !entry.file_type().is_some_and(|kind| kind.is_dir()) {
            continue;
        }

        let Ok(path) = repo.relative(entry.path()) else {
            continue;
        };

        if path.as_os_str().is_empty() || is_protected(&path) || is_hidden(&path) {
            continue;
        }

        if index.kind(&path).is_none() && !entry.path().join(ANCHOR_FILE).is_file() {
            report.fail(
                Check::Anchors,
                Some(path),
                "directory inside the inventory has no anchor",
            );
        }
    }
}

fn check_asset_unique(index: &TreeIndex, report: &mut FsckReport) {
    for (name, paths) in index.duplicate_names() {
        let listing = paths.iter().map(display).collect::<Vec<_>>().join(", ");
        report.fail(
            Check::AssetUnique,
            None,
            format!("asset name {name:?} is used by {listing}"),
        );
    }
}

fn check_asset_yaml<V>(repo: &InventoryRepo<V>, index: &TreeIndex, report: &mut FsckReport)
where
    V: VersionControl,
{
    for (path, _) in index.assets() {
        let is_asset_directory = index.kind(path) == Some(EntryKind::AssetDirectory);
        if let Err(error) = repo.read_record(path, is_asset_directory) {
            report.fail(Check::AssetYaml, Some(path.clone()), error.to_string());
        }
    }
}

fn check_asset_names<V>(repo: &InventoryRepo<V>, index: &TreeIndex, report: &mut FsckReport)
where
    V: VersionControl,
{
    let template = match repo.name_template() {
        Ok(template) => template,
        Err(error) => {
            report.fail(Check::AssetNames, None, error.to_string());
            return;
        }
    };

    for (path, _) in index.assets() {
        let is_asset_directory = index.kind(path) == Some(EntryKind::AssetDirectory);
        let Ok(record) = repo.read_record(path, is_asset_directory) else {
            // Parse failures belong to the asset-yaml check.
            continue;
        };

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let derived = template
            .values_of(&record)
            .and_then(|values| template.format(&values));
        match derived {
            Ok(derived) if derived == name => {}
            Ok(derived) => report.fail(
                Check::AssetNames,
                Some(path.clone()),
                format!("record derives name {derived:?}"),
            ),
            Err(error) => report.fail(Check::AssetNames, Some(path.clone()), error.to_string()),
        }
    }
}

fn check_pseudo_keys<V>(repo: &InventoryRepo<V>, index: &TreeIndex, report: &mut FsckReport)
where
    V: VersionControl,
{
    for (path, _) in index.assets() {
        let is_asset_directory = index.kind(path) == Some(EntryKind::AssetDirectory);
        let Ok(record) = repo.read_record(path, is_asset_directory) else {
            continue;
        };

        for key in record.reserved_keys() {
            report.fail(
                Check::PseudoKeys,
                Some(path.clone()),
                format!("record stores reserved key {key:?}"),
            );
        }
    }
}

fn check_protected_paths<V>(repo: &InventoryRepo<V>, report: &mut FsckReport) -> Result<()>
where
    V: VersionControl,
{
    let stowage = repo.absolute(STOWAGE_DIR);
    if !stowage.join(ANCHOR_FILE).is_file() {
        report.fail(
            Check::ProtectedPaths,
            Some(PathBuf::from(STOWAGE_DIR)),
            "inventory marker is missing",
        );
    }

    if let Err(error) = repo.name_template() {
        report.fail(Check::ProtectedPaths, None, error.to_string());
    }

    for path in repo.changed_files()? {
        if is_protected(&path) {
            report.fail(
                Check::ProtectedPaths,
                Some(path),
                "protected path changed outside of stowage",
            );
        }
    }

    Ok(())
}

fn check_clean_tree<V>(repo: &InventoryRepo<V>, report: &mut FsckReport) -> Result<()>
where
    V: VersionControl,
{
    for path in repo.changed_files()? {
        report.fail(Check::CleanTree, Some(path), "uncommitted change");
    }

    Ok(())
}

/// Integrity checker error types.
#[derive(Debug, thiserror::Error)]
pub enum FsckError {
    /// Check name is not known.
    #[error("unknown check {:?}, expected one of: {}", .0, list_checks())]
    UnknownCheck(String),

    /// Repository facade fails.
    #[error(transparent)]
    Repo(#[from] RepoError),
}

fn list_checks() -> String {
    Check::ALL
        .iter()
        .map(|check| check.name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Friendly result alias :3
type Result<T, E = FsckError> = std::result::Result<T, E>;
