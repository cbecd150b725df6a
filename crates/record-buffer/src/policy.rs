//! Retention Policy

use crate::BufferError;
use serde::{Deserialize, Serialize};

/// Default history length (1000 records, a few minutes of full passes)
pub const DEFAULT_MAX_RECORDS: usize = 1000;

/// How much history the buffer keeps
///
/// Count and age bounds both apply when set. The newest record is always
/// kept. With `respect_cursors`, nothing at or after the slowest live
/// cursor's position is trimmed, even past the bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Maximum number of records held
    pub max_records: usize,
    /// Maximum age relative to the newest record, in milliseconds
    pub max_age_ms: Option<u64>,
    /// Keep records still reachable from a live cursor
    pub respect_cursors: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
            max_age_ms: None,
            respect_cursors: true,
        }
    }
}

impl RetentionPolicy {
    /// Count bound only, ignoring cursors
    pub fn count(max_records: usize) -> Self {
        Self {
            max_records,
            max_age_ms: None,
            respect_cursors: false,
        }
    }

    /// Age bound only, respecting cursors
    pub fn age(max_age_ms: u64) -> Self {
        Self {
            max_records: usize::MAX,
            max_age_ms: Some(max_age_ms),
            respect_cursors: true,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), BufferError> {
        if self.max_records == 0 {
            return Err(BufferError::InvalidPolicy(
                "max_records must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
