// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Asset record model.
//!
//! An __asset record__ is a small YAML mapping of field names to values that
//! describes one inventory item. Records are stored either as a plain file
//! whose name is derived from a few of its fields, or inside an
//! __asset directory__ as a reserved record file. The record itself does not
//! care where it is stored; it only remembers whether it belongs to an asset
//! directory, and the path it was read from, if any.
//!
//! # Reserved Keys
//!
//! The keys `path`, `directory`, and `is_asset_directory` describe where a
//! record lives rather than what it says. They are never written into the
//! body of a record file.

use serde_yaml::{Mapping, Value};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Keys that describe storage of a record instead of its content.
pub const RESERVED_KEYS: [&str; 3] = ["path", "directory", "is_asset_directory"];

/// In-memory asset record.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Record {
    /// Absolute path of the asset, if the record has been placed.
    pub path: Option<PathBuf>,

    /// Field data of the asset.
    pub content: Mapping,

    /// Whether the record is stored inside an asset directory.
    pub is_asset_directory: bool,
}

impl Record {
    /// Construct new unplaced record from content.
    pub fn new(content: Mapping) -> Self {
        Self {
            content,
            ..Default::default()
        }
    }

    /// Construct new unplaced record from string pairs.
    ///
    /// Values are interpreted through [`parse_value`], so `"3"` becomes a
    /// number and `"true"` becomes a boolean.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut record = Self::default();
        for (key, value) in pairs {
            record.set(key, parse_value(value.as_ref()));
        }

        record
    }

    /// Parse record from raw YAML text.
    ///
    /// Empty text is an empty record.
    ///
    /// # Errors
    ///
    /// - Return [`RecordError::InvalidFormat`] if text is not valid YAML.
    /// - Return [`RecordError::NotAMapping`] if the document is not a mapping.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(raw).map_err(|source| RecordError::InvalidFormat {
            path: None,
            source,
        })?;

        match value {
            Value::Null => Ok(Self::default()),
            Value::Mapping(content) => Ok(Self::new(content)),
            _ => Err(RecordError::NotAMapping { path: None }),
        }
    }

    /// Render record content as YAML text.
    ///
    /// Reserved keys are left out. An empty record renders as empty text.
    ///
    /// # Errors
    ///
    /// - Return [`RecordError::Render`] if content cannot be serialized.
    pub fn render(&self) -> Result<String> {
        let mut content = self.content.clone();
        for key in RESERVED_KEYS {
            content.remove(key);
        }

        if content.is_empty() {
            return Ok(String::new());
        }

        serde_yaml::to_string(&content).map_err(RecordError::Render)
    }

    /// Get value of field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.content.get(key)
    }

    /// Get value of field in its string representation.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(value_to_string)
    }

    /// Insert or overwrite field.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.content.insert(Value::String(key.into()), value.into());
    }

    /// Remove field, returning its old value.
    pub fn unset(&mut self, key: &str) -> Option<Value> {
        self.content.remove(key)
    }

    /// Iterate over field names.
    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        self.content.keys().map(value_to_string)
    }

    /// Check if content holds any reserved key.
    pub fn reserved_keys(&self) -> Vec<&'static str> {
        RESERVED_KEYS
            .into_iter()
            .filter(|key| self.content.contains_key(*key))
            .collect()
    }

    /// Content equality, ignoring placement.
    pub fn same_content(&self, other: &Record) -> bool {
        self.content == other.content
    }
}

impl FromStr for Record {
    type Err = RecordError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        Self::parse(data)
    }
}

impl Display for Record {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.render()?.as_str())
    }
}

/// Read record from file.
///
/// # Errors
///
/// - Return [`RecordError::Read`] if file cannot be read.
/// - Return [`RecordError::InvalidFormat`] or [`RecordError::NotAMapping`] if
///   content cannot be parsed, with the offending path attached.
pub fn read_record(path: impl AsRef<Path>) -> Result<Record> {
    let path = path.as_ref();
    let raw = read_to_string(path).map_err(|source| RecordError::Read {
        source,
        path: path.to_path_buf(),
    })?;

    Record::parse(&raw).map_err(|error| error.with_path(path))
}

/// Interpret raw string as typed value.
///
/// Scalars are parsed the way YAML would parse them, as long as the typed
/// value prints back to the exact same text. Anything else, e.g., `0123` or
/// `a: b`, is kept as a plain string.
pub fn parse_value(raw: &str) -> Value {
    match serde_yaml::from_str::<Value>(raw) {
        Ok(value @ (Value::Bool(_) | Value::Number(_))) if value_to_string(&value) == raw => value,
        _ => Value::String(raw.into()),
    }
}

/// String representation of a value.
///
/// Null renders empty. Sequences and mappings render as inline YAML.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(boolean) => boolean.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(string) => string.clone(),
        Value::Tagged(tagged) => value_to_string(&tagged.value),
        other => serde_yaml::to_string(other)
            .map(|text| text.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Record error types.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Record text is not valid YAML.
    #[error(
        "invalid syntax{}",
        .path.as_ref().map(|p| format!(" in {:?}", p.display())).unwrap_or_default()
    )]
    InvalidFormat {
        #[source]
        source: serde_yaml::Error,
        path: Option<PathBuf>,
    },

    /// Record text is valid YAML, but not a mapping.
    #[error(
        "record{} is not a key/value mapping",
        .path.as_ref().map(|p| format!(" {:?}", p.display())).unwrap_or_default()
    )]
    NotAMapping { path: Option<PathBuf> },

    /// Record file cannot be read.
    #[error("failed to read record at {:?}", .path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Record file cannot be written.
    #[error("failed to write record at {:?}", .path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Record content cannot be serialized.
    #[error(transparent)]
    Render(serde_yaml::Error),
}

impl RecordError {
    /// Attach offending path to parse errors.
    pub fn with_path(self, offending: &Path) -> Self {
        match self {
            Self::InvalidFormat { source, .. } => Self::InvalidFormat {
                source,
                path: Some(offending.to_path_buf()),
            },
            Self::NotAMapping { .. } => Self::NotAMapping {
                path: Some(offending.to_path_buf()),
            },
            other => other,
        }
    }

    /// Check if error is about malformed record text.
    pub fn is_invalid_format(&self) -> bool {
        matches!(self, Self::InvalidFormat { .. } | Self::NotAMapping { .. })
    }
}

impl From<RecordError> for FmtError {
    fn from(_: RecordError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = RecordError> = std::result::Result<T, E>;
