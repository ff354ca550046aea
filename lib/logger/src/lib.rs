use anyhow::Context;
use condor_client::logger::{LogConfig, StdioLogMode};
use tracing_subscriber::{
  EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Installs the global `tracing` subscriber. Call once, at process
/// startup, before any other crate emits a log record.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
  let filter = EnvFilter::try_new(config.level.as_tracing_level())
    .context("invalid log level")?;

  let registry = Registry::default().with(filter);

  match config.stdio {
    StdioLogMode::Standard => registry
      .with(
        tracing_subscriber::fmt::layer()
          .with_file(false)
          .with_line_number(false),
      )
      .try_init(),
    StdioLogMode::Json => {
      registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    }
  }
  .context("failed to init logger")
}
