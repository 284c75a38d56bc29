// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Asset naming convention.
//!
//! The file name of an asset is not chosen freely. It is derived from a
//! handful of __naming fields__ in the asset's record through a
//! __name template__ like `{type}_{make}_{model}.{serial}`. Changing a naming
//! field therefore changes where the asset lives, which is why such a change
//! is always validated as a rename.
//!
//! # Round Trip
//!
//! A naming value may not contain the literal that follows its placeholder
//! in the template. Under this rule splitting a derived name recovers every
//! naming value exactly: each field extends up to the first occurrence of the
//! next literal, and the last field takes whatever is left.
//!
//! # Surrogates
//!
//! Sometimes the true value of a naming field is unknown, e.g., a serial
//! number that cannot be read off a device. Setting such a field to the
//! placeholder `faux` asks for a __surrogate__ instead: a token like
//! `fauxA1b2C3` that is minted at naming time and written back into the
//! record.

use crate::{
    path::ASSET_DIR_FILE,
    record::{value_to_string, Record},
};

use rand::{distributions::Alphanumeric, Rng};
use serde_yaml::Value;
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Template used when the inventory configuration does not name one.
pub const DEFAULT_TEMPLATE: &str = "{type}_{make}_{model}.{serial}";

/// Naming value that asks for a minted surrogate.
pub const SURROGATE_PLACEHOLDER: &str = "faux";

const SURROGATE_LENGTH: usize = 6;
const SURROGATE_ATTEMPTS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// Parsed asset name template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    segments: Vec<Segment>,
}

impl NameTemplate {
    /// Iterate over naming fields in template order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Field(field) => Some(field.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Check if key is a naming field.
    pub fn is_naming_field(&self, key: &str) -> bool {
        self.fields().any(|field| field == key)
    }

    /// Collect naming values of a record in their string representation.
    ///
    /// # Errors
    ///
    /// - Return [`NamingError::MissingField`] if a naming field is absent or
    ///   null.
    /// - Return [`NamingError::InvalidValue`] if a naming field is not a
    ///   scalar.
    pub fn values_of(&self, record: &Record) -> Result<BTreeMap<String, String>> {
        let mut values = BTreeMap::new();
        for field in self.fields() {
            let value = match record.get(field) {
                None | Some(Value::Null) => {
                    return Err(NamingError::MissingField {
                        field: field.into(),
                    })
                }
                Some(value @ (Value::Sequence(_) | Value::Mapping(_))) => {
                    return Err(NamingError::InvalidValue {
                        field: field.into(),
                        value: value_to_string(value),
                        reason: "naming values must be scalars",
                    })
                }
                Some(value) => value_to_string(value),
            };
            values.insert(field.to_string(), value);
        }

        Ok(values)
    }

    /// Format name from naming values.
    ///
    /// # Errors
    ///
    /// - Return [`NamingError::MissingField`] if a naming value is absent.
    /// - Return [`NamingError::InvalidValue`] if a naming value breaks the
    ///   round trip rule, is empty, or contains a path separator.
    pub fn format(&self, values: &BTreeMap<String, String>) -> Result<String> {
        let mut name = String::new();
        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(literal) => name.push_str(literal),
                Segment::Field(field) => {
                    let value = values.get(field).ok_or_else(|| NamingError::MissingField {
                        field: field.clone(),
                    })?;
                    let invalid = |reason| NamingError::InvalidValue {
                        field: field.clone(),
                        value: value.clone(),
                        reason,
                    };

                    if value.trim().is_empty() {
                        return Err(invalid("naming values cannot be empty"));
                    }

                    if value.contains('/') || value.contains('\\') {
                        return Err(invalid("naming values cannot contain path separators"));
                    }

                    if let Some(Segment::Literal(next)) = self.segments.get(index + 1) {
                        if value.contains(next.as_str()) {
                            return Err(invalid("naming value contains a template separator"));
                        }
                    }

                    name.push_str(value);
                }
            }
        }

        if name.starts_with('.') {
            return Err(NamingError::InvalidName { name });
        }

        Ok(name)
    }

    /// Derive file name of a record.
    ///
    /// Naming fields holding [`SURROGATE_PLACEHOLDER`] receive a freshly
    /// minted surrogate, which is written back into the record. The closure
    /// `taken` reports names that are already in use, and minting retries
    /// until the derived name is free.
    ///
    /// # Errors
    ///
    /// - Return [`NamingError::SurrogateExhausted`] if no free surrogate could
    ///   be minted.
    /// - Return any error of [`NameTemplate::values_of`] or
    ///   [`NameTemplate::format`].
    pub fn derive(&self, record: &mut Record, taken: impl Fn(&str) -> bool) -> Result<String> {
        let mut values = self.values_of(record)?;
        let surrogates = values
            .iter()
            .filter(|(_, value)| value.as_str() == SURROGATE_PLACEHOLDER)
            .map(|(field, _)| field.clone())
            .collect::<Vec<_>>();

        if surrogates.is_empty() {
            return self.format(&values);
        }

        for _ in 0..SURROGATE_ATTEMPTS {
            for field in &surrogates {
                values.insert(field.clone(), mint_surrogate());
            }

            let name = self.format(&values)?;
            if !taken(&name) {
                for field in &surrogates {
                    debug!("mint surrogate {:?} for field {field:?}", values[field]);
                    record.set(field.clone(), values[field].clone());
                }
                return Ok(name);
            }
        }

        Err(NamingError::SurrogateExhausted)
    }

    /// Split file name back into naming values.
    ///
    /// # Errors
    ///
    /// - Return [`NamingError::NotAnAsset`] if name does not follow the
    ///   template.
    pub fn split(&self, name: &str) -> Result<BTreeMap<String, String>> {
        let not_an_asset = || NamingError::NotAnAsset { name: name.into() };
        let mut values = BTreeMap::new();
        let mut rest = name;

        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(literal) => {
                    rest = rest.strip_prefix(literal.as_str()).ok_or_else(not_an_asset)?;
                }
                Segment::Field(field) => {
                    let end = match self.segments.get(index + 1) {
                        Some(Segment::Literal(next)) => {
                            rest.find(next.as_str()).ok_or_else(not_an_asset)?
                        }
                        _ => rest.len(),
                    };

                    let (value, remainder) = rest.split_at(end);
                    if value.is_empty() {
                        return Err(not_an_asset());
                    }
                    values.insert(field.clone(), value.to_string());
                    rest = remainder;
                }
            }
        }

        if !rest.is_empty() {
            return Err(not_an_asset());
        }

        Ok(values)
    }

    /// Split path into naming values, and whether it names an asset
    /// directory record.
    ///
    /// A path ending in the asset directory record file is split by the name
    /// of its parent directory.
    ///
    /// # Errors
    ///
    /// - Return [`NamingError::NotAnAsset`] if the final component does not
    ///   follow the template.
    pub fn split_path(&self, path: impl AsRef<Path>) -> Result<(BTreeMap<String, String>, bool)> {
        let path = path.as_ref();
        let name_of = |path: &Path| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| NamingError::NotAnAsset {
                    name: path.to_string_lossy().into_owned(),
                })
        };

        let name = name_of(path)?;
        if name == ASSET_DIR_FILE {
            let parent = path.parent().ok_or_else(|| NamingError::NotAnAsset { name })?;
            return Ok((self.split(&name_of(parent)?)?, true));
        }

        Ok((self.split(&name)?, false))
    }
}

impl Default for NameTemplate {
    fn default() -> Self {
        let field = |name: &str| Segment::Field(name.into());
        let literal = |text: &str| Segment::Literal(text.into());
        Self {
            segments: vec![
                field("type"),
                literal("_"),
                field("make"),
                literal("_"),
                field("model"),
                literal("."),
                field("serial"),
            ],
        }
    }
}

impl FromStr for NameTemplate {
    type Err = NamingError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| NamingError::Template {
            template: data.into(),
            reason: reason.into(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = data.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '{' => {
                    let mut field = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => return Err(invalid("unbalanced braces")),
                            Some(ch) => field.push(ch),
                        }
                    }

                    let field = field.trim();
                    if field.is_empty() {
                        return Err(invalid("empty field name"));
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    } else if matches!(segments.last(), Some(Segment::Field(_))) {
                        return Err(invalid("adjacent fields need a separator"));
                    }
                    segments.push(Segment::Field(field.into()));
                }
                '}' => return Err(invalid("unbalanced braces")),
                '/' | '\\' => return Err(invalid("path separators are not allowed")),
                ch => literal.push(ch),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let template = Self { segments };
        if template.fields().next().is_none() {
            return Err(invalid("no naming fields"));
        }

        Ok(template)
    }
}

impl Display for NameTemplate {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => fmt.write_str(literal)?,
                Segment::Field(field) => write!(fmt, "{{{field}}}")?,
            }
        }

        Ok(())
    }
}

/// Read access to the names already in use in a tree.
pub trait NameIndex {
    /// Check if any entry occupies root-relative path.
    fn is_occupied(&self, path: &Path) -> bool;

    /// Find root-relative path of an asset with the given file name.
    fn asset_named(&self, name: &str) -> Option<PathBuf>;
}

/// Mint fresh surrogate token.
pub fn mint_surrogate() -> String {
    let token = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SURROGATE_LENGTH)
        .map(char::from)
        .collect::<String>();

    format!("{SURROGATE_PLACEHOLDER}{token}")
}

/// Validate renaming an asset after its content changed.
///
/// Derives the new name of the asset at root-relative `old_path` from its
/// `updated` record, minting surrogates if asked for. Returns the
/// destination path, which equals `old_path` if no rename is implied.
///
/// # Errors
///
/// - Return [`NamingError::Collision`] if a distinct entry already occupies
///   the destination, or an asset elsewhere in the tree uses the same name.
/// - Return any error of [`NameTemplate::derive`].
pub fn validate_rename(
    template: &NameTemplate,
    old_path: &Path,
    updated: &mut Record,
    index: &impl NameIndex,
) -> Result<PathBuf> {
    let name = template.derive(updated, |name| index.asset_named(name).is_some())?;
    let destination = old_path
        .parent()
        .map(|parent| parent.join(&name))
        .unwrap_or_else(|| PathBuf::from(&name));

    if destination == old_path {
        return Ok(destination);
    }

    if index.is_occupied(&destination) {
        return Err(NamingError::Collision { path: destination });
    }

    if let Some(other) = index.asset_named(&name) {
        if other != old_path {
            return Err(NamingError::Collision { path: other });
        }
    }

    Ok(destination)
}

/// Naming error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamingError {
    /// Name template is malformed.
    #[error("invalid name template {template:?}: {reason}")]
    Template { template: String, reason: String },

    /// Record lacks value for naming field.
    #[error("asset missing value for required field {field:?}")]
    MissingField { field: String },

    /// Naming value cannot be encoded into a file name.
    #[error("invalid value {value:?} for naming field {field:?}: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: &'static str,
    },

    /// Derived name is not usable as a file name.
    #[error("derived asset name {name:?} is not a valid file name")]
    InvalidName { name: String },

    /// File name does not follow the naming convention.
    #[error("{name:?} does not follow the asset naming convention")]
    NotAnAsset { name: String },

    /// Derived name is already in use.
    #[error("asset name collides with existing entry {:?}", .path.display())]
    Collision { path: PathBuf },

    /// Could not mint a surrogate that is not in use yet.
    #[error("failed to mint unused surrogate value")]
    SurrogateExhausted,
}

/// Friendly result alias :3
type Result<T, E = NamingError> = std::result::Result<T, E>;
