//! Enhancement backend contract.
//!
//! The pool calls the backend from dedicated worker threads, so the trait is
//! synchronous. Backends may block for as long as the work takes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Options forwarded to the backend with every job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnhanceOptions {
    /// Backend selector, for deployments that route between engines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    /// Correction strength in `[0.0, 1.0]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl EnhanceOptions {
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }
}

/// Errors reported by an enhancement backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EnhancementError {
    #[error("Input rejected: {0}")]
    Rejected(String),

    #[error("Enhancement failed: {0}")]
    Failed(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Pluggable text enhancement engine.
pub trait EnhancementBackend: Send + Sync + 'static {
    fn name(&self) -> &str {
        "default"
    }

    fn enhance(&self, text: &str, options: &EnhanceOptions) -> Result<String, EnhancementError>;
}

impl<F> EnhancementBackend for F
where
    F: Fn(&str, &EnhanceOptions) -> Result<String, EnhancementError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "fn"
    }

    fn enhance(&self, text: &str, options: &EnhanceOptions) -> Result<String, EnhancementError> {
        self(text, options)
    }
}
