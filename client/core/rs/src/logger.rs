//! Logging configuration data model, shared between the `config` crate
//! (which resolves it) and the `logger` crate (which applies it). Kept
//! here rather than in `logger` itself so that any crate can read a
//! resolved `LogConfig` without depending on `tracing-subscriber`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
  Trace,
  Debug,
  #[default]
  Info,
  Warn,
  Error,
}

impl LogLevel {
  pub fn as_tracing_level(self) -> &'static str {
    match self {
      LogLevel::Trace => "trace",
      LogLevel::Debug => "debug",
      LogLevel::Info => "info",
      LogLevel::Warn => "warn",
      LogLevel::Error => "error",
    }
  }
}

/// Whether stdout logs are rendered for a human terminal or as
/// newline-delimited JSON for collection by a log shipper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StdioLogMode {
  #[default]
  Standard,
  Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
  pub level: LogLevel,
  pub stdio: StdioLogMode,
}

impl Default for LogConfig {
  fn default() -> Self {
    LogConfig {
      level: LogLevel::default(),
      stdio: StdioLogMode::default(),
    }
  }
}
