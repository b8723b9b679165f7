//! Request identity, options, results and errors.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::collaborators::{AcquisitionError, Artifact};
use crate::backend::EnhanceOptions;

/// Prefix of every pipeline cache key.
pub const KEY_PREFIX: &str = "refine";

/// Variant used when the caller gives none.
pub const DEFAULT_VARIANT: &str = "default";

/// Dimensions that identify one logical request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIdentity {
    pub source: String,
    pub content_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selectors: BTreeMap<String, String>,
}

impl RequestIdentity {
    pub fn new(source: impl Into<String>, content_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content_id: content_id.into(),
            variant: None,
            locale: None,
            selectors: BTreeMap::new(),
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_selector(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.selectors.insert(name.into(), value.into());
        self
    }

    pub fn variant_or_default(&self) -> &str {
        self.variant.as_deref().unwrap_or(DEFAULT_VARIANT)
    }

    /// Locale in canonical lowercase form, or `default_locale`.
    pub fn locale_or(&self, default_locale: &str) -> String {
        self.locale
            .as_deref()
            .unwrap_or(default_locale)
            .to_ascii_lowercase()
    }

    /// Reject identities that are incomplete or would produce ambiguous keys.
    pub fn validate(&self) -> Result<(), RequestError> {
        check_component("source", &self.source)?;
        check_component("content_id", &self.content_id)?;
        if let Some(variant) = &self.variant {
            check_component("variant", variant)?;
        }
        if let Some(locale) = &self.locale {
            check_component("locale", locale)?;
        }
        for (name, value) in &self.selectors {
            check_component("selector name", name)?;
            if name.contains('=') {
                return Err(RequestError::Validation(format!(
                    "selector name {name:?} contains '='"
                )));
            }
            check_component("selector value", value)?;
        }
        Ok(())
    }

    /// Deterministic cache key.
    ///
    /// `refine:{source}:{variant}:{content_id}:{locale}` followed by
    /// `:{name}={value}` per selector in name order.
    pub fn cache_key(&self, default_locale: &str) -> String {
        let mut key = format!(
            "{KEY_PREFIX}:{}:{}:{}:{}",
            self.source,
            self.variant_or_default(),
            self.content_id,
            self.locale_or(default_locale)
        );
        for (name, value) in &self.selectors {
            key.push(':');
            key.push_str(name);
            key.push('=');
            key.push_str(value);
        }
        key
    }
}

fn check_component(field: &str, value: &str) -> Result<(), RequestError> {
    if value.trim().is_empty() {
        return Err(RequestError::Validation(format!("{field} is required")));
    }
    if let Some(bad) = value.chars().find(|c| *c == ':' || *c == '*' || c.is_whitespace()) {
        return Err(RequestError::Validation(format!(
            "{field} {value:?} contains forbidden character {bad:?}"
        )));
    }
    Ok(())
}

/// Per-request knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    /// Job priority; falls back to the orchestrator default.
    pub priority: Option<i32>,
    /// Allow enhancement at all.
    pub enhance: bool,
    /// Skip cache and durable-store reads. Results are still written.
    pub bypass_cache: bool,
    pub enhance_options: EnhanceOptions,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            priority: None,
            enhance: true,
            bypass_cache: false,
            enhance_options: EnhanceOptions::default(),
        }
    }
}

impl RequestOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Final, cacheable result of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedResult {
    pub key: String,
    pub content: String,
    pub quality_score: f64,
    pub source_tag: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub enhanced: bool,
    pub produced_at: DateTime<Utc>,
}

impl EnhancedResult {
    /// Wrap an artifact as-is.
    pub fn from_artifact(key: &str, artifact: Artifact) -> Self {
        Self {
            key: key.to_string(),
            content: artifact.content,
            quality_score: artifact.quality_score,
            source_tag: artifact.source_tag,
            metadata: artifact.metadata,
            enhanced: artifact.enhanced,
            produced_at: Utc::now(),
        }
    }
}

/// Where a request's result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServedFrom {
    Cache,
    DurableStore,
    Fresh,
}

impl ServedFrom {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::DurableStore => "durable_store",
            Self::Fresh => "fresh",
        }
    }
}

/// Why a result was served unenhanced.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    #[error("enhancement failed: {0}")]
    Failed(String),

    #[error("enhancement timed out")]
    TimedOut,

    #[error("worker crashed during enhancement")]
    Crashed,

    #[error("worker pool unavailable")]
    PoolUnavailable,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failed(_) => "failed",
            Self::TimedOut => "timed_out",
            Self::Crashed => "crashed",
            Self::PoolUnavailable => "pool_unavailable",
        }
    }
}

/// Successful request result.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub result: EnhancedResult,
    pub served_from: ServedFrom,
    /// Set when enhancement was attempted and did not succeed.
    pub fallback: Option<FallbackReason>,
    pub elapsed: Duration,
}

/// Request lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPhase {
    Queued,
    Active,
    CacheHit,
    Acquiring,
    Enhancing,
    Caching,
    Complete,
    Failed,
}

/// Errors a pipeline caller can see.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RequestError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Pipeline is shutting down")]
    ShuttingDown,
}

impl RequestError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Acquisition(AcquisitionError::NotFound(_)) => "not_found",
            Self::Acquisition(AcquisitionError::Provider(_)) => "provider",
            Self::ShuttingDown => "shutting_down",
        }
    }
}
