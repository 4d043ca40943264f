//! Store model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last known state of one remote resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Opaque revalidation token (the `ETag`), if the remote sent one.
    pub validator: Option<String>,
    /// `Last-Modified` value, if the remote sent one.
    pub last_modified: Option<String>,
    /// Raw body of the last full response.
    pub payload: String,
    pub retrieved_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(payload: impl Into<String>, validator: Option<String>) -> Self {
        Self {
            validator,
            last_modified: None,
            payload: payload.into(),
            retrieved_at: Utc::now(),
        }
    }

    /// Whether this entry can be used to ask the remote "has it changed?".
    pub fn is_revalidatable(&self) -> bool {
        self.validator.is_some() || self.last_modified.is_some()
    }

    /// Compare-and-update rule: a new entry replaces `current` only if its
    /// validator differs or it was retrieved strictly later.
    pub fn supersedes(&self, current: &CacheEntry) -> bool {
        self.validator != current.validator || self.retrieved_at > current.retrieved_at
    }
}
