// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! In-memory tree index.
//!
//! The inventory plans every change against a [`TreeIndex`] rather than the
//! file system, so operations queued later observe the effects of operations
//! queued earlier without touching the disk.
//!
//! Each [`Entry`] carries two independent aspects. A record aspect marks an
//! asset, a directory aspect marks an inventory directory, and an entry with
//! both is an asset directory. An entry with neither does not exist.

use crate::{
    naming::NameIndex,
    path::{is_hidden, is_protected, ANCHOR_FILE, ASSET_DIR_FILE},
    record::Record,
};

use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    path::{Path, PathBuf},
};

/// Record aspect of an entry.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordAspect {
    /// Root-relative record file on disk holding the committed content.
    pub source: Option<PathBuf>,

    /// Content planned in memory, replacing whatever the source holds.
    pub content: Option<Record>,
}

impl RecordAspect {
    /// Aspect backed by an existing record file.
    pub fn on_disk(source: impl Into<PathBuf>) -> Self {
        Self {
            source: Some(source.into()),
            content: None,
        }
    }

    /// Aspect holding planned content only.
    pub fn planned(content: Record) -> Self {
        Self {
            source: None,
            content: Some(content),
        }
    }
}

/// Node of the tree index.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Entry {
    /// Present if the entry is an asset.
    pub record: Option<RecordAspect>,

    /// Present if the entry is an inventory directory.
    pub directory: bool,
}

impl Entry {
    /// Determine what kind of entry this is.
    pub fn kind(&self) -> Option<EntryKind> {
        match (&self.record, self.directory) {
            (Some(_), false) => Some(EntryKind::Asset),
            (None, true) => Some(EntryKind::Directory),
            (Some(_), true) => Some(EntryKind::AssetDirectory),
            (None, false) => None,
        }
    }
}

/// Kind of entry in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Asset stored as plain file.
    Asset,

    /// Inventory directory without record.
    Directory,

    /// Inventory directory carrying its own record.
    AssetDirectory,
}

impl EntryKind {
    /// Check if kind carries a record aspect.
    pub fn is_asset(self) -> bool {
        matches!(self, Self::Asset | Self::AssetDirectory)
    }

    /// Check if kind carries a directory aspect.
    pub fn is_directory(self) -> bool {
        matches!(self, Self::Directory | Self::AssetDirectory)
    }
}

/// Index of every asset and inventory directory in the tree.
///
/// The root is implicit. It is always a directory and never an asset.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TreeIndex {
    entries: BTreeMap<PathBuf, Entry>,
}

impl TreeIndex {
    /// Build index from list of tracked files.
    ///
    /// Anchors mark directories, asset directory record files mark asset
    /// directories, and every other visible file is an asset. Ancestors of
    /// anything tracked are directories. Protected paths are left out.
    pub fn from_tracked<P>(files: impl IntoIterator<Item = P>) -> Self
    where
        P: AsRef<Path>,
    {
        let mut index = Self::default();
        for file in files {
            let file = file.as_ref();
            let name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let parent = file.parent().unwrap_or(Path::new(""));

            if name == ANCHOR_FILE || name == ASSET_DIR_FILE {
                if parent.as_os_str().is_empty() || is_protected(parent) || is_hidden(parent) {
                    continue;
                }

                index.insert_directory(parent);
                if name == ASSET_DIR_FILE {
                    index.insert_record(parent, RecordAspect::on_disk(file));
                }
                continue;
            }

            if is_protected(file) || is_hidden(file) {
                continue;
            }

            index.insert_record(file, RecordAspect::on_disk(file));
            if let Some(parent) = file.parent() {
                index.insert_directory(parent);
            }
        }

        index
    }

    /// Look up entry.
    pub fn get(&self, path: &Path) -> Option<&Entry> {
        self.entries.get(path)
    }

    /// Look up entry mutably.
    pub fn get_mut(&mut self, path: &Path) -> Option<&mut Entry> {
        self.entries.get_mut(path)
    }

    /// Kind of entry at path, the root being a directory.
    pub fn kind(&self, path: &Path) -> Option<EntryKind> {
        if path.as_os_str().is_empty() {
            return Some(EntryKind::Directory);
        }

        self.get(path).and_then(Entry::kind)
    }

    /// Check if path holds an entry.
    pub fn contains(&self, path: &Path) -> bool {
        self.kind(path).is_some()
    }

    /// Iterate over all entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &Entry)> {
        self.entries.iter()
    }

    /// Iterate over all assets in path order.
    pub fn assets(&self) -> impl Iterator<Item = (&PathBuf, &RecordAspect)> {
        self.entries
            .iter()
            .filter_map(|(path, entry)| entry.record.as_ref().map(|record| (path, record)))
    }

    /// All strict descendants of path in path order.
    pub fn descendants(&self, path: &Path) -> Vec<PathBuf> {
        if path.as_os_str().is_empty() {
            return self.entries.keys().cloned().collect();
        }

        self.entries
            .range::<Path, _>((Bound::Excluded(path), Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(path))
            .cloned()
            .collect()
    }

    /// Direct children of path in path order.
    pub fn children(&self, path: &Path) -> Vec<PathBuf> {
        self.descendants(path)
            .into_iter()
            .filter(|child| child.parent() == Some(path))
            .collect()
    }

    /// Add directory aspect to path, and to every missing ancestor.
    pub fn insert_directory(&mut self, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }

            self.entries.entry(ancestor.to_path_buf()).or_default().directory = true;
        }
    }

    /// Set record aspect of path.
    pub fn insert_record(&mut self, path: &Path, aspect: RecordAspect) {
        self.entries.entry(path.to_path_buf()).or_default().record = Some(aspect);
    }

    /// Drop record aspect of path, dropping the entry if nothing is left.
    pub fn remove_record(&mut self, path: &Path) -> Option<RecordAspect> {
        let entry = self.entries.get_mut(path)?;
        let aspect = entry.record.take();
        if !entry.directory {
            self.entries.remove(path);
        }

        aspect
    }

    /// Drop directory aspect of path, dropping the entry if nothing is left.
    pub fn remove_directory(&mut self, path: &Path) {
        if let Some(entry) = self.entries.get_mut(path) {
            entry.directory = false;
            if entry.record.is_none() {
                self.entries.remove(path);
            }
        }
    }

    /// Drop path and everything below it.
    pub fn remove_subtree(&mut self, path: &Path) {
        for descendant in self.descendants(path) {
            self.entries.remove(&descendant);
        }
        self.entries.remove(path);
    }

    /// Relocate path and everything below it to `destination`.
    pub fn rekey(&mut self, path: &Path, destination: &Path) {
        let mut moved = Vec::new();
        for descendant in self.descendants(path) {
            if let Some(entry) = self.entries.remove(&descendant) {
                moved.push((descendant, entry));
            }
        }

        if let Some(entry) = self.entries.remove(path) {
            self.entries.insert(destination.to_path_buf(), entry);
        }

        for (old, entry) in moved {
            // INVARIANT: Every descendant starts with the relocated path.
            let suffix = old.strip_prefix(path).unwrap_or(&old);
            self.entries.insert(destination.join(suffix), entry);
        }
    }

    /// Asset names used by more than one asset, with all their paths.
    pub fn duplicate_names(&self) -> BTreeMap<String, Vec<PathBuf>> {
        let mut names: HashMap<String, Vec<PathBuf>> = HashMap::new();
        for (path, _) in self.assets() {
            if let Some(name) = path.file_name() {
                names
                    .entry(name.to_string_lossy().into_owned())
                    .or_default()
                    .push(path.clone());
            }
        }

        names
            .into_iter()
            .filter(|(_, paths)| paths.len() > 1)
            .collect()
    }
}

impl NameIndex for TreeIndex {
    fn is_occupied(&self, path: &Path) -> bool {
        self.contains(path)
    }

    fn asset_named(&self, name: &str) -> Option<PathBuf> {
        self.assets()
            .map(|(path, _)| path)
            .find(|path| path.file_name().is_some_and(|file| file == name))
            .cloned()
    }
}
