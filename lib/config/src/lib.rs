//! The configuration store (C1, §4.1): loads a layered snapshot from a
//! TOML base file plus `_CONDOR_`-prefixed environment overrides (the
//! real daemons' env-override convention), and exposes it as a
//! process-global, atomically-swappable singleton.

use std::{collections::HashMap, path::Path, sync::OnceLock};

use arc_swap::ArcSwap;
use condor_client::config::ConfigSnapshot;

static GLOBAL: OnceLock<ArcSwap<ConfigSnapshot>> = OnceLock::new();

fn cell() -> &'static ArcSwap<ConfigSnapshot> {
  GLOBAL.get_or_init(|| ArcSwap::from_pointee(ConfigSnapshot::new()))
}

/// Returns the current process-global snapshot. Readers observe a
/// consistent, never-torn view even while a concurrent `reload` runs.
pub fn global() -> std::sync::Arc<ConfigSnapshot> {
  cell().load_full()
}

const ENV_PREFIX: &str = "_CONDOR_";

/// Reads `path` (if it exists) as TOML key/value pairs, overlays
/// `_CONDOR_*` environment variables ("environment wins"), and atomically
/// installs the result as the new global snapshot.
pub fn reload_default(path: impl AsRef<Path>) -> anyhow::Result<()> {
  let snapshot = build_snapshot(path.as_ref())?;
  cell().store(std::sync::Arc::new(snapshot));
  tracing::info!(path = %path.as_ref().display(), "configuration reloaded");
  Ok(())
}

fn build_snapshot(path: &Path) -> anyhow::Result<ConfigSnapshot> {
  let mut snapshot = ConfigSnapshot::new();

  if path.exists() {
    let text = std::fs::read_to_string(path)?;
    let table: toml::Table = toml::from_str(&text)?;
    for (key, value) in table {
      snapshot.set(key, toml_value_to_string(&value));
    }
  }

  let overrides: HashMap<String, String> =
    envy::prefixed(ENV_PREFIX).from_env().unwrap_or_default();
  for (key, value) in overrides {
    snapshot.set(key, value);
  }

  Ok(snapshot)
}

fn toml_value_to_string(value: &toml::Value) -> String {
  match value {
    toml::Value::String(s) => s.clone(),
    toml::Value::Integer(i) => i.to_string(),
    toml::Value::Float(f) => f.to_string(),
    toml::Value::Boolean(b) => b.to_string(),
    other => other.to_string(),
  }
}

/// `Get(key) -> (value, present)` against the current global snapshot.
pub fn get(key: &str) -> (String, bool) {
  global().get(key)
}

/// Executes a small statement language of bare `KEY = VALUE` assignment
/// lines (comments with `#`, blank lines ignored) against a fresh,
/// independent snapshot — used by the submit compiler (C5) to build a
/// config view seeded from the global defaults but scoped to one submit
/// file (§4.5: "executes remaining statements against a fresh config
/// view").
pub fn execute_statements(
  base: &ConfigSnapshot,
  statements: &str,
) -> ConfigSnapshot {
  let mut snapshot = base.clone();
  for line in statements.lines() {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }
    if let Some((key, value)) = line.split_once('=') {
      snapshot.set(key.trim(), value.trim());
    }
  }
  snapshot
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn execute_statements_sets_keys_and_skips_comments() {
    let base = ConfigSnapshot::new();
    let snapshot = execute_statements(
      &base,
      "# a comment\nEXECUTABLE = /bin/true\n\nARGUMENTS = --flag",
    );
    assert_eq!(snapshot.get("executable").0, "/bin/true");
    assert_eq!(snapshot.get("ARGUMENTS").0, "--flag");
  }

  #[test]
  fn statements_can_reference_base_macros() {
    let mut base = ConfigSnapshot::new();
    base.set("SPOOL", "/var/spool/condor");
    let snapshot =
      execute_statements(&base, "OUTPUT_DIR = $(SPOOL)/out");
    assert_eq!(snapshot.get("OUTPUT_DIR").0, "/var/spool/condor/out");
  }
}
