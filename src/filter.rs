// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Record filters.
//!
//! A filter is a `key=value` expression that selects asset records for bulk
//! operations. The value matches the string representation of a field either
//! exactly, or as a glob pattern, e.g., `make=dell*` or `serial=?12[34]`.
//!
//! A few special values match by shape instead of by content:
//!
//! - `<unset>` matches a field that is absent, null, or empty.
//! - `<list>` matches a sequence.
//! - `<dict>` matches a mapping.
//!
//! Several filters given to one selection combine with logical AND.

use crate::record::{value_to_string, Record};

use glob::Pattern;
use serde_yaml::{Mapping, Value};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Filter value matching absent fields.
pub const UNSET: &str = "<unset>";

/// Filter value matching sequences.
pub const LIST: &str = "<list>";

/// Filter value matching mappings.
pub const DICT: &str = "<dict>";

/// Compiled `key=value` filter.
#[derive(Debug, Clone)]
pub struct Filter {
    key: String,
    value: String,
    pattern: Option<Pattern>,
}

impl Filter {
    /// Compile filter expression.
    ///
    /// # Errors
    ///
    /// - Return [`FilterError::Invalid`] if expression has no `=` or an empty
    ///   key.
    pub fn compile(expression: &str) -> Result<Self> {
        let invalid = |reason| FilterError::Invalid {
            expression: expression.into(),
            reason,
        };

        let (key, value) = expression
            .split_once('=')
            .ok_or_else(|| invalid("expected key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(invalid("key cannot be empty"));
        }

        // INVARIANT: Malformed glob syntax falls back to exact matching.
        let pattern = Pattern::new(value).ok();

        Ok(Self {
            key: key.into(),
            value: value.into(),
            pattern,
        })
    }

    /// Key this filter inspects.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Raw value this filter expects.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Check if a single field value satisfies this filter.
    pub fn matches_value(&self, value: Option<&Value>) -> bool {
        match self.value.as_str() {
            UNSET => match value {
                None | Some(Value::Null) => true,
                Some(value) => value_to_string(value).is_empty(),
            },
            LIST => matches!(value, Some(Value::Sequence(_))),
            DICT => matches!(value, Some(Value::Mapping(_))),
            expected => value.map(value_to_string).is_some_and(|actual| {
                actual == expected
                    || self
                        .pattern
                        .as_ref()
                        .is_some_and(|pattern| pattern.matches(&actual))
            }),
        }
    }

    /// Check if a field mapping satisfies this filter.
    pub fn matches_mapping(&self, mapping: &Mapping) -> bool {
        self.matches_value(mapping.get(self.key.as_str()))
    }

    /// Check if a record satisfies this filter.
    pub fn matches(&self, record: &Record) -> bool {
        self.matches_mapping(&record.content)
    }
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        Self::compile(data)
    }
}

impl Display for Filter {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}={}", self.key, self.value)
    }
}

/// Check if a record satisfies every filter.
pub fn matches_all<'a>(filters: impl IntoIterator<Item = &'a Filter>, record: &Record) -> bool {
    filters.into_iter().all(|filter| filter.matches(record))
}

/// Filter error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// Filter expression is malformed.
    #[error("invalid filter {expression:?}: {reason}")]
    Invalid {
        expression: String,
        reason: &'static str,
    },
}

/// Friendly result alias :3
type Result<T, E = FilterError> = std::result::Result<T, E>;
