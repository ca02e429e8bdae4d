// Job and trigger key convention

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Group assigned to keys declared without an explicit group prefix.
pub const DEFAULT_GROUP: &str = "DEFAULT";

/// Error returned when a key string cannot name a job or trigger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid key '{0}': key must contain a non-empty name")]
pub struct InvalidKeyError(pub String);

/// Two-part identifier for jobs and triggers.
///
/// Keys are the sole means of referring to a job or trigger in any
/// operation. Two keys are equal iff both group and name match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    group: String,
    name: String,
}

impl Key {
    /// Create a key with an explicit group.
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Create a key in the default group.
    pub fn with_default_group(name: impl Into<String>) -> Self {
        Self::new(DEFAULT_GROUP, name)
    }

    /// Parse a `[<group>.]<name>` string.
    ///
    /// The raw string is split on the first `.`. The split is honored only
    /// when there is at least one character on each side; otherwise the
    /// whole string becomes the name and the group falls back to
    /// [`DEFAULT_GROUP`]. The same rule applies to jobs and triggers, both
    /// in schedule declarations and in management operations.
    pub fn parse(raw: &str) -> Result<Self, InvalidKeyError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(InvalidKeyError(raw.to_string()));
        }

        match raw.find('.') {
            Some(idx) if idx >= 1 && idx < raw.len() - 1 => {
                Ok(Self::new(&raw[..idx], &raw[idx + 1..]))
            }
            _ => Ok(Self::with_default_group(raw)),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}
