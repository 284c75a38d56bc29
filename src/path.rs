// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Every path that enters the inventory is reduced to a path relative to the
//! root of the work tree before anything else happens to it. Lexical
//! normalization is used instead of [`std::fs::canonicalize`], because paths
//! handed to the inventory often do not exist yet, e.g., the destination of a
//! new asset or directory.
//!
//! # Protected Paths
//!
//! Some paths inside the work tree belong to the machinery of the inventory
//! rather than to the inventory itself. These __protected__ paths can never
//! be the target of an inventory operation:
//!
//! - Anything under `.git` or the inventory control directory `.stowage`.
//! - Any file whose name starts with `.git`, e.g., `.gitignore`.
//! - Structural anchors and asset directory record files.

use std::path::{Component, Path, PathBuf};

/// Name of the zero-byte file that keeps a directory tracked.
pub const ANCHOR_FILE: &str = ".anchor";

/// Name of the record file inside an asset directory.
pub const ASSET_DIR_FILE: &str = ".stowage-asset";

/// Name of the inventory control directory at the root of the work tree.
pub const STOWAGE_DIR: &str = ".stowage";

/// Name of the inventory configuration file inside [`STOWAGE_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

/// Name of the record template directory inside [`STOWAGE_DIR`].
pub const TEMPLATE_DIR: &str = "templates";

/// Lexically normalize a path.
///
/// Drops `.` components and resolves `..` against the preceding component.
/// A `..` that would climb above an absolute root is dropped, while a `..`
/// leading a relative path is kept.
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => continue,
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => continue,
                _ => parts.push(component),
            },
            _ => parts.push(component),
        }
    }

    parts.iter().collect()
}

/// Determine path relative to the root of the work tree.
///
/// Relative input is interpreted relative to `root`. The root itself maps to
/// the empty path.
///
/// # Errors
///
/// - Return [`PathError::OutsideTree`] if the normalized path escapes `root`.
pub fn relative_to_root(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Result<PathBuf> {
    let root = normalize(root);
    let path = path.as_ref();
    let absolute = if path.is_absolute() {
        normalize(path)
    } else {
        normalize(root.join(path))
    };

    absolute
        .strip_prefix(&root)
        .map(Path::to_path_buf)
        .map_err(|_| PathError::OutsideTree {
            path: path.to_path_buf(),
        })
}

/// Check if a root-relative path is protected.
pub fn is_protected(path: impl AsRef<Path>) -> bool {
    path.as_ref().components().any(|component| match component {
        Component::Normal(name) => {
            let name = name.to_string_lossy();
            name.starts_with(".git")
                || name == STOWAGE_DIR
                || name == ANCHOR_FILE
                || name == ASSET_DIR_FILE
        }
        Component::ParentDir => true,
        _ => false,
    })
}

/// Check if any component of a root-relative path is hidden.
pub fn is_hidden(path: impl AsRef<Path>) -> bool {
    path.as_ref().components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

/// Check if `path` lies strictly below `ancestor`.
pub fn is_strict_descendant(path: &Path, ancestor: &Path) -> bool {
    path != ancestor && path.starts_with(ancestor)
}

/// Number of normal components in a root-relative path.
pub fn depth(path: &Path) -> usize {
    path.components()
        .filter(|component| matches!(component, Component::Normal(_)))
        .count()
}

/// Render a root-relative path with forward slashes for messages.
///
/// The root itself is rendered as `.`.
pub fn display(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return ".".into();
    }

    path.components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if home directory path cannot be
///   determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(PathError::NoWayHome)
}

/// Expand `~` and environment variables in a user supplied path.
///
/// # Errors
///
/// - Return [`PathError::ShellExpansion`] if a variable cannot be resolved.
pub fn expand(path: impl AsRef<str>) -> Result<PathBuf> {
    Ok(PathBuf::from(shellexpand::full(path.as_ref())?.into_owned()))
}

/// Path resolution error types.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Path does not lie within the inventory work tree.
    #[error("{:?} is outside of the inventory", .path.display())]
    OutsideTree { path: PathBuf },

    /// No way to determine user's home directory.
    #[error("cannot determine absolute path to user's home directory")]
    NoWayHome,

    /// Shell expansion of a path failed.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;
