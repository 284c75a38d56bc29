// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for configuration files that stowage uses to simplify
//! the process of serialization and deserialization. File I/O is left to the
//! caller to figure out.
//!
//! # Configuration Stack
//!
//! Configuration values are addressed through dotted names like
//! `assets.filename`. A value is looked up in the Git configuration stack
//! first under the `stowage.` section, e.g., `stowage.assets.filename`, and
//! only then in the tracked inventory configuration file
//! `.stowage/config.toml`. Thus, a user can override inventory-wide settings
//! locally without touching the history of the inventory.

use crate::naming::DEFAULT_TEMPLATE;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Inventory configuration file layout.
///
/// The configuration file is tracked at `.stowage/config.toml` so that every
/// clone of an inventory agrees on how assets are named.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct InventoryDefinition {
    /// Settings for asset records.
    #[serde(default)]
    pub assets: AssetSettings,
}

impl FromStr for InventoryDefinition {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data).map_err(ConfigError::Deserialize)
    }
}

impl Display for InventoryDefinition {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Asset record settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct AssetSettings {
    /// Template used to derive asset file names from record content.
    pub filename: String,
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            filename: DEFAULT_TEMPLATE.into(),
        }
    }
}

/// Location to write a configuration value to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Tracked inventory configuration file.
    #[default]
    Inventory,

    /// Git configuration of the local repository.
    Local,

    /// Git configuration of the current user.
    Global,
}

impl FromStr for ConfigLocation {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data {
            "inventory" => Ok(Self::Inventory),
            "local" => Ok(Self::Local),
            "global" => Ok(Self::Global),
            other => Err(ConfigError::InvalidLocation(other.into())),
        }
    }
}

/// User interaction settings threaded into the inventory.
///
/// Replaces process-wide flags. The inventory never consults the environment
/// to figure out whether it may ask the user something.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Answer every confirmation request with yes.
    pub yes: bool,

    /// Do not present diffs to the user.
    pub quiet: bool,
}

/// Look up dotted configuration name in a TOML table.
///
/// Only scalar values are reported. Strings are returned without quotes.
pub fn lookup(table: &toml::Table, name: &str) -> Option<String> {
    let mut keys = name.split('.');
    let mut value = table.get(keys.next()?)?;
    for key in keys {
        value = value.as_table()?.get(key)?;
    }

    match value {
        toml::Value::String(string) => Some(string.clone()),
        toml::Value::Table(_) | toml::Value::Array(_) => None,
        other => Some(other.to_string()),
    }
}

/// Assign string value to dotted configuration name in a TOML table.
///
/// Intermediate tables are created as needed.
///
/// # Errors
///
/// - Return [`ConfigError::InvalidName`] if name has empty components, or
///   if a component on the way is already a non-table value.
pub fn assign(table: &mut toml::Table, name: &str, value: impl Into<String>) -> Result<()> {
    let keys = name.split('.').collect::<Vec<_>>();
    if keys.iter().any(|key| key.trim().is_empty()) {
        return Err(ConfigError::InvalidName(name.into()));
    }

    let (last, sections) = keys
        .split_last()
        .ok_or_else(|| ConfigError::InvalidName(name.into()))?;
    let mut current = table;
    for key in sections {
        current = current
            .entry(key.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()))
            .as_table_mut()
            .ok_or_else(|| ConfigError::InvalidName(name.into()))?;
    }
    current.insert(last.to_string(), toml::Value::String(value.into()));

    Ok(())
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Configuration name is malformed.
    #[error("invalid configuration name {0:?}")]
    InvalidName(String),

    /// Configuration location is unknown.
    #[error("invalid configuration location {0:?}, expected inventory, local, or global")]
    InvalidLocation(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
