//! Table identity types.
//!
//! A table name doubles as the table's directory name under the store root,
//! so it is restricted to characters that are safe in a single path segment.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Validated table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName(String);

impl TableName {
    /// Parse and validate a table name.
    pub fn parse(s: &str) -> Result<Self> {
        let valid_chars = s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        let valid_start = s
            .chars()
            .next()
            .is_some_and(|c| c != '_' && c != '-');

        if valid_chars && valid_start {
            Ok(TableName(s.to_string()))
        } else {
            Err(Error::InvalidTableName(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TableName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        TableName::parse(&value)
    }
}

impl From<TableName> for String {
    fn from(name: TableName) -> Self {
        name.0
    }
}
