//! Cache error types.
//!
//! None of these reach a pipeline caller: the tiered cache converts every
//! variant into a miss (reads) or a logged warning (writes).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache tier unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt cache record for key {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Invalid key pattern: {0}")]
    InvalidPattern(String),
}

impl CacheError {
    /// Returns true if this error indicates the tier itself is down.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
