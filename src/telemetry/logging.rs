//! Logging setup.
//!
//! JSON output for deployments, pretty output for local runs. The filter
//! accepts any `EnvFilter` directive string.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(LogError::UnknownFormat(other.to_string())),
        }
    }
}

/// Where and how pipeline logs are written.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives, e.g. `info` or `refine_core::scheduler=debug`.
    pub level: String,
    /// Append to this file instead of writing to stderr.
    pub output_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
            output_path: None,
        }
    }
}

/// Failures while installing the global subscriber.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Log filter rejected: {0}")]
    InvalidFilter(String),
    #[error("Cannot open log file {0}")]
    FileOpen(String),
    #[error("Global subscriber already set")]
    AlreadyInitialized,
    #[error("Unknown log format: {0}")]
    UnknownFormat(String),
}

/// Install the global tracing subscriber. Call once at startup.
///
/// `RUST_LOG`, when set, overrides `config.level`.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| config.level.clone());
    let filter = EnvFilter::try_new(&directives)
        .map_err(|e| LogError::InvalidFilter(e.to_string()))?;
    let writer = open_writer(config.output_path.as_deref())?;
    super::init_metrics();

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(writer),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(writer))
            .try_init(),
    };
    installed.map_err(|_| LogError::AlreadyInitialized)
}

/// Stderr, or the given file opened for append.
fn open_writer(path: Option<&Path>) -> Result<BoxMakeWriter, LogError> {
    match path {
        None => Ok(BoxMakeWriter::new(std::io::stderr)),
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| LogError::FileOpen(format!("{}: {e}", path.display())))?;
            Ok(BoxMakeWriter::new(Mutex::new(file)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn invalid_filter_is_rejected() {
        let config = LogConfig { level: "refine_core=loud".into(), ..LogConfig::default() };
        if std::env::var("RUST_LOG").is_err() {
            assert!(matches!(init_logging(&config), Err(LogError::InvalidFilter(_))));
        }
    }

    #[test]
    fn log_file_is_created_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refine.log");
        assert!(open_writer(Some(&path)).is_ok());
        assert!(path.exists());
    }

    #[test]
    fn unwritable_log_path_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("refine.log");
        assert!(matches!(open_writer(Some(&path)), Err(LogError::FileOpen(_))));
    }
}
