// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Primitive inventory operations.
//!
//! Every high-level request of the inventory expands into a list of
//! [`Operation`]s. An operation knows how to apply itself to the in-memory
//! tree index, how to carry itself out on disk, how to render itself as a
//! diff for the user, and where it belongs in the operations record that is
//! appended to each commit message.

use crate::{
    inventory::snapshot::{RecordAspect, TreeIndex},
    path::{depth, display, ANCHOR_FILE, ASSET_DIR_FILE},
    record::{Record, RecordError},
    repo::{vcs::VersionControl, InventoryRepo, RepoError},
};

use std::{
    collections::BTreeMap,
    fs::{remove_dir_all, remove_file, rename},
    path::{Path, PathBuf},
};
use tracing::debug;

/// Header of the operations record in commit messages.
pub const RECORD_HEADER: &str = "--- Inventory Operations ---";

/// Longest subject line generated for commit messages.
const MAX_SUBJECT: usize = 79;

/// Primitive change to the inventory.
///
/// Paths are relative to the work tree root.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Create inventory directory with its anchor.
    ///
    /// Carries a record if an existing asset file turns into an asset
    /// directory.
    NewDirectory {
        path: PathBuf,
        record: Option<Record>,
    },

    /// Write record of a new asset.
    NewAsset { path: PathBuf, record: Record },

    /// Delete record aspect of an asset.
    RemoveAsset { path: PathBuf, record: Record },

    /// Delete directory aspect of an inventory directory.
    ///
    /// Carries a record if an asset directory turns back into an asset file.
    RemoveDirectory {
        path: PathBuf,
        record: Option<Record>,
    },

    /// Relocate entry under a new parent.
    Move {
        source: PathBuf,
        destination: PathBuf,
        is_directory: bool,
    },

    /// Give entry a new name within its parent.
    Rename {
        source: PathBuf,
        destination: PathBuf,
        is_directory: bool,
    },

    /// Replace record content of an asset.
    ModifyAsset {
        path: PathBuf,
        old: Record,
        new: Record,
    },
}

impl Operation {
    /// Apply effect of operation to the tree index.
    pub fn apply(&self, index: &mut TreeIndex) {
        match self {
            Self::NewDirectory { path, record } => {
                index.insert_directory(path);
                if let Some(record) = record {
                    let source = index
                        .get(path)
                        .and_then(|entry| entry.record.as_ref())
                        .and_then(|aspect| aspect.source.clone());
                    index.insert_record(
                        path,
                        RecordAspect {
                            source,
                            content: Some(record.clone()),
                        },
                    );
                }
            }
            Self::NewAsset { path, record } => {
                index.insert_record(path, RecordAspect::planned(record.clone()));
            }
            Self::RemoveAsset { path, .. } => {
                index.remove_record(path);
            }
            Self::RemoveDirectory { path, record } => match record {
                Some(record) => {
                    index.remove_directory(path);
                    if let Some(aspect) = index
                        .get_mut(path)
                        .and_then(|entry| entry.record.as_mut())
                    {
                        aspect.content = Some(record.clone());
                    }
                }
                None => index.remove_subtree(path),
            },
            Self::Move {
                source,
                destination,
                ..
            }
            | Self::Rename {
                source,
                destination,
                ..
            } => index.rekey(source, destination),
            Self::ModifyAsset { path, new, .. } => {
                if let Some(aspect) = index
                    .get_mut(path)
                    .and_then(|entry| entry.record.as_mut())
                {
                    aspect.content = Some(new.clone());
                }
            }
        }
    }

    /// Carry out operation on disk.
    ///
    /// # Errors
    ///
    /// - Return [`OperationError::Io`] if a file system call fails.
    /// - Return [`OperationError::Repo`] if a record cannot be written.
    pub fn execute<V>(&self, repo: &InventoryRepo<V>) -> Result<()>
    where
        V: VersionControl,
    {
        debug!("execute {self:?}");
        match self {
            Self::NewDirectory { path, record } => {
                if let Some(record) = record {
                    let file = repo.absolute(path);
                    remove_file(&file).map_err(|source| io_error(source, &file))?;
                    repo.mk_inventory_dirs([path])?;
                    repo.write_record(path, &as_asset_directory(record, true))?;
                } else {
                    repo.mk_inventory_dirs([path])?;
                }
            }
            Self::NewAsset { path, record } => {
                repo.write_record(path, record)?;
            }
            Self::RemoveAsset { path, record } => {
                let file = repo.absolute(repo.record_file(path, record.is_asset_directory));
                remove_file(&file).map_err(|source| io_error(source, &file))?;
            }
            Self::RemoveDirectory { path, record } => {
                let dir = repo.absolute(path);
                remove_dir_all(&dir).map_err(|source| io_error(source, &dir))?;
                if let Some(record) = record {
                    repo.write_record(path, &as_asset_directory(record, false))?;
                }
            }
            Self::Move {
                source,
                destination,
                ..
            }
            | Self::Rename {
                source,
                destination,
                ..
            } => {
                let from = repo.absolute(source);
                rename(&from, repo.absolute(destination))
                    .map_err(|error| io_error(error, &from))?;
            }
            Self::ModifyAsset { path, new, .. } => {
                repo.write_record(path, new)?;
            }
        }

        Ok(())
    }

    /// Paths whose state on disk this operation changes.
    pub fn touched(&self) -> Vec<PathBuf> {
        match self {
            Self::NewDirectory { path, .. }
            | Self::NewAsset { path, .. }
            | Self::RemoveAsset { path, .. }
            | Self::RemoveDirectory { path, .. }
            | Self::ModifyAsset { path, .. } => vec![path.clone()],
            Self::Move {
                source,
                destination,
                ..
            }
            | Self::Rename {
                source,
                destination,
                ..
            } => vec![source.clone(), destination.clone()],
        }
    }

    /// Human-readable diff of this operation.
    pub fn diff(&self) -> Vec<String> {
        let mut lines = Vec::new();
        match self {
            Self::NewDirectory { path, record } => {
                if let Some(record) = record {
                    lines.push(format!("- {}", display(path)));
                    lines.push(format!("+ {}", display(path.join(ASSET_DIR_FILE))));
                    lines.extend(content_lines(record, "+ "));
                }
                lines.push(format!("+ {}", display(path.join(ANCHOR_FILE))));
            }
            Self::NewAsset { path, record } => {
                let file = record_file(path, record.is_asset_directory);
                lines.push(format!("+ {}", display(file)));
                lines.extend(content_lines(record, "+ "));
            }
            Self::RemoveAsset { path, record } => {
                let file = record_file(path, record.is_asset_directory);
                lines.push(format!("- {}", display(file)));
                lines.extend(content_lines(record, "- "));
            }
            Self::RemoveDirectory { path, record } => {
                lines.push(format!("- {}", display(path.join(ANCHOR_FILE))));
                if let Some(record) = record {
                    lines.push(format!("- {}", display(path.join(ASSET_DIR_FILE))));
                    lines.push(format!("+ {}", display(path)));
                    lines.extend(content_lines(record, "+ "));
                }
            }
            Self::Move {
                source,
                destination,
                ..
            }
            | Self::Rename {
                source,
                destination,
                ..
            } => lines.push(format!("{} -> {}", display(source), display(destination))),
            Self::ModifyAsset { path, old, new } => {
                lines.push(display(record_file(path, new.is_asset_directory)));
                let old = old.render().unwrap_or_default();
                let new = new.render().unwrap_or_default();
                lines.extend(line_diff(&old, &new));
            }
        }

        lines
    }

    /// Section and line of this operation in the operations record.
    pub fn record_entry(&self) -> (Section, String) {
        match self {
            Self::NewDirectory { path, .. } => (Section::NewDirectories, display(path)),
            Self::NewAsset { path, .. } => (Section::NewAssets, display(path)),
            Self::RemoveAsset { path, .. } => (Section::RemovedAssets, display(path)),
            Self::RemoveDirectory { path, .. } => (Section::RemovedDirectories, display(path)),
            Self::Move {
                source,
                destination,
                is_directory,
            } => (
                if *is_directory {
                    Section::MovedDirectories
                } else {
                    Section::MovedAssets
                },
                format!("{} -> {}", display(source), display(destination)),
            ),
            Self::Rename {
                source,
                destination,
                is_directory,
            } => (
                if *is_directory {
                    Section::RenamedDirectories
                } else {
                    Section::RenamedAssets
                },
                format!("{} -> {}", display(source), display(destination)),
            ),
            Self::ModifyAsset { path, .. } => (Section::ModifiedAssets, display(path)),
        }
    }

    /// Command verb summarizing this operation.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::NewDirectory { .. } => "mkdir",
            Self::NewAsset { .. } => "new",
            Self::RemoveAsset { .. } | Self::RemoveDirectory { .. } => "rm",
            Self::Move { .. } | Self::Rename { .. } => "mv",
            Self::ModifyAsset { .. } => "set",
        }
    }

    /// Path this operation is primarily about.
    pub fn primary_path(&self) -> &Path {
        match self {
            Self::NewDirectory { path, .. }
            | Self::NewAsset { path, .. }
            | Self::RemoveAsset { path, .. }
            | Self::RemoveDirectory { path, .. }
            | Self::ModifyAsset { path, .. } => path,
            Self::Move { destination, .. } | Self::Rename { destination, .. } => destination,
        }
    }

    fn is_creation(&self) -> bool {
        matches!(self, Self::NewDirectory { .. } | Self::NewAsset { .. })
    }

    fn is_removal(&self) -> bool {
        matches!(self, Self::RemoveAsset { .. } | Self::RemoveDirectory { .. })
    }

    // Depth of the deepest file this operation creates or deletes.
    fn order_depth(&self) -> usize {
        match self {
            Self::NewAsset { path, record } | Self::RemoveAsset { path, record } => {
                depth(&record_file(path, record.is_asset_directory))
            }
            other => depth(other.primary_path()),
        }
    }
}

/// Section of the operations record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Section {
    NewDirectories,
    NewAssets,
    RemovedAssets,
    RemovedDirectories,
    MovedAssets,
    MovedDirectories,
    RenamedAssets,
    RenamedDirectories,
    ModifiedAssets,
}

impl Section {
    /// Title of section.
    pub fn title(self) -> &'static str {
        match self {
            Self::NewDirectories => "New directories",
            Self::NewAssets => "New assets",
            Self::RemovedAssets => "Removed assets",
            Self::RemovedDirectories => "Removed directories",
            Self::MovedAssets => "Moved assets",
            Self::MovedDirectories => "Moved directories",
            Self::RenamedAssets => "Renamed assets",
            Self::RenamedDirectories => "Renamed directories",
            Self::ModifiedAssets => "Modified assets",
        }
    }
}

/// Determine order in which queued operations are carried out.
///
/// Queue order is kept, except that within each run of consecutive removals
/// the deepest paths go first, and within each run of consecutive creations
/// the shallowest paths go first.
pub fn execution_order(operations: &[Operation]) -> Vec<usize> {
    let mut order = Vec::with_capacity(operations.len());
    let mut start = 0;
    while start < operations.len() {
        let creation = operations[start].is_creation();
        let removal = operations[start].is_removal();
        let mut end = start + 1;
        while end < operations.len()
            && (creation || removal)
            && operations[end].is_creation() == creation
            && operations[end].is_removal() == removal
        {
            end += 1;
        }

        let mut run = (start..end).collect::<Vec<_>>();
        if creation {
            run.sort_by_key(|index| operations[*index].order_depth());
        } else if removal {
            run.sort_by_key(|index| std::cmp::Reverse(operations[*index].order_depth()));
        }
        order.extend(run);
        start = end;
    }

    order
}

/// Render operations record for commit messages.
///
/// Lines are sorted and deduplicated within each section. Empty sections are
/// left out.
pub fn operations_record(operations: &[Operation]) -> String {
    let mut sections: BTreeMap<Section, Vec<String>> = BTreeMap::new();
    for operation in operations {
        let (section, line) = operation.record_entry();
        sections.entry(section).or_default().push(line);
    }

    let mut record = String::from(RECORD_HEADER);
    for (section, mut lines) in sections {
        lines.sort();
        lines.dedup();
        record.push('\n');
        record.push_str(section.title());
        record.push(':');
        for line in lines {
            record.push_str("\n- ");
            record.push_str(&line);
        }
    }

    record
}

/// Generate one-line commit subject like `rm [2]: shelf/a, shelf/b`.
///
/// Paths are cut off so that the subject stays below 80 characters.
pub fn subject(verb: &str, paths: &[PathBuf]) -> String {
    let mut names = paths.iter().map(display).collect::<Vec<_>>();
    names.sort();
    names.dedup();

    let prefix = format!("{verb} [{}]: ", names.len());
    let joined = names.join(", ");
    if prefix.chars().count() + joined.chars().count() <= MAX_SUBJECT {
        return format!("{prefix}{joined}");
    }

    let room = MAX_SUBJECT.saturating_sub(prefix.chars().count() + 3);
    let cut = joined.chars().take(room).collect::<String>();
    format!("{prefix}{cut}...")
}

/// Generate subject for a batch of mixed operations.
pub fn generated_subject(operations: &[Operation]) -> String {
    let mut verbs = Vec::new();
    for operation in operations {
        if !verbs.contains(&operation.verb()) {
            verbs.push(operation.verb());
        }
    }

    let paths = operations
        .iter()
        .map(|operation| operation.primary_path().to_path_buf())
        .collect::<Vec<_>>();

    subject(&verbs.join(","), &paths)
}

fn record_file(path: &Path, is_asset_directory: bool) -> PathBuf {
    if is_asset_directory {
        path.join(ASSET_DIR_FILE)
    } else {
        path.to_path_buf()
    }
}

fn as_asset_directory(record: &Record, is_asset_directory: bool) -> Record {
    let mut record = record.clone();
    record.is_asset_directory = is_asset_directory;
    record
}

fn content_lines(record: &Record, prefix: &str) -> Vec<String> {
    record
        .render()
        .unwrap_or_default()
        .lines()
        .map(|line| format!("{prefix}{line}"))
        .collect()
}

// Longest common subsequence over lines.
fn line_diff(old: &str, new: &str) -> Vec<String> {
    let old = old.lines().collect::<Vec<_>>();
    let new = new.lines().collect::<Vec<_>>();
    let mut table = vec![vec![0usize; new.len() + 1]; old.len() + 1];
    for i in (0..old.len()).rev() {
        for j in (0..new.len()).rev() {
            table[i][j] = if old[i] == new[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut lines = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < old.len() && j < new.len() {
        if old[i] == new[j] {
            lines.push(format!("  {}", old[i]));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            lines.push(format!("- {}", old[i]));
            i += 1;
        } else {
            lines.push(format!("+ {}", new[j]));
            j += 1;
        }
    }
    lines.extend(old[i..].iter().map(|line| format!("- {line}")));
    lines.extend(new[j..].iter().map(|line| format!("+ {line}")));

    lines
}

fn io_error(source: std::io::Error, path: &Path) -> OperationError {
    OperationError::Io {
        source,
        path: path.to_path_buf(),
    }
}

/// Operation execution error types.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// File system call fails.
    #[error("failed to update {:?}", .path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Record cannot be rendered.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// Repository facade fails.
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Friendly result alias :3
type Result<T, E = OperationError> = std::result::Result<T, E>;
