use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::error::MemoryError;

/// Longest accepted thread identifier, in bytes.
pub const MAX_THREAD_ID_LEN: usize = 256;

/// Stable identifier of a conversation thread.
///
/// Threads span sessions; every turn, profile attribute, summary and
/// vector entry is scoped to exactly one thread. The identifier is an
/// opaque caller-chosen string, trimmed and length-checked on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ThreadId(String);

impl ThreadId {
    /// Validate and wrap a thread identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self, MemoryError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(MemoryError::InvalidThreadId(
                "thread id must not be empty".to_string(),
            ));
        }
        if trimmed.len() > MAX_THREAD_ID_LEN {
            return Err(MemoryError::InvalidThreadId(format!(
                "thread id exceeds {MAX_THREAD_ID_LEN} bytes"
            )));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(MemoryError::InvalidThreadId(
                "thread id must not contain control characters".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ThreadId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ThreadId {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ThreadId {
    type Error = MemoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ThreadId> for String {
    fn from(id: ThreadId) -> Self {
        id.0
    }
}
