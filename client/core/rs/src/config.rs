//! The configuration data model (C1, §3/§4.1): a case-insensitive keyed
//! string map with `$(NAME)` macro expansion on read. Loading from files
//! and environment, and the process-global reloadable singleton, live in
//! the `config` crate; this module only holds the resolved snapshot and
//! its expansion algorithm so any crate can consult it without pulling
//! in file I/O.

use std::collections::HashMap;

/// An immutable, case-insensitive key→value snapshot. Cheap to clone
/// (wrap in `Arc` at the call site) since reloads replace the whole
/// snapshot rather than mutating one in place.
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
  // Keyed by the upper-cased name; the original-case name is kept
  // alongside the raw value for `Keys()`.
  entries: HashMap<String, (String, String)>,
}

impl ConfigSnapshot {
  pub fn new() -> ConfigSnapshot {
    ConfigSnapshot::default()
  }

  pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
    let key = key.into();
    let upper = key.to_ascii_uppercase();
    self.entries.insert(upper, (key, value.into()));
  }

  /// `Get(key) -> (value, present)`, with macros expanded.
  pub fn get(&self, key: &str) -> (String, bool) {
    match self.entries.get(&key.to_ascii_uppercase()) {
      Some((_, raw)) => (self.expand(raw, &mut Vec::new()), true),
      None => (String::new(), false),
    }
  }

  /// The raw, unexpanded value, if present.
  pub fn get_raw(&self, key: &str) -> Option<&str> {
    self.entries.get(&key.to_ascii_uppercase()).map(|(_, v)| v.as_str())
  }

  pub fn keys(&self) -> Vec<String> {
    self.entries.values().map(|(orig, _)| orig.clone()).collect()
  }

  pub fn contains(&self, key: &str) -> bool {
    self.entries.contains_key(&key.to_ascii_uppercase())
  }

  /// Expands `$(NAME)` references in `raw`, recursively, tracking
  /// `visiting` to detect cycles. A cyclic or undefined reference
  /// resolves to the empty string (§9 design note).
  fn expand(&self, raw: &str, visiting: &mut Vec<String>) -> String {
    let mut out = String::with_capacity(raw.len());
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
      if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'(') {
        if let Some(close) = raw[i + 2..].find(')') {
          let name = &raw[i + 2..i + 2 + close];
          let (name, default) = match name.split_once(':') {
            Some((n, d)) => (n, Some(d)),
            None => (name, None),
          };
          let upper = name.to_ascii_uppercase();
          if visiting.contains(&upper) {
            // cycle: contributes nothing
          } else if let Some((_, inner)) = self.entries.get(&upper) {
            visiting.push(upper);
            out.push_str(&self.expand(inner, visiting));
            visiting.pop();
          } else if let Some(default) = default {
            out.push_str(default);
          }
          i += 2 + close + 1;
          continue;
        }
      }
      let ch_len = raw[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
      out.push_str(&raw[i..i + ch_len]);
      i += ch_len;
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn keys_are_case_insensitive_first_insertion_case_preserved() {
    let mut cfg = ConfigSnapshot::new();
    cfg.set("Schedd_Name", "foo");
    let (val, present) = cfg.get("SCHEDD_NAME");
    assert!(present);
    assert_eq!(val, "foo");
    assert_eq!(cfg.keys(), vec!["Schedd_Name".to_string()]);
  }

  #[test]
  fn expands_macro_reference() {
    let mut cfg = ConfigSnapshot::new();
    cfg.set("BASE", "/var/lib/condor");
    cfg.set("SPOOL", "$(BASE)/spool");
    assert_eq!(cfg.get("SPOOL").0, "/var/lib/condor/spool");
  }

  #[test]
  fn undefined_macro_resolves_to_empty() {
    let mut cfg = ConfigSnapshot::new();
    cfg.set("X", "pre-$(MISSING)-post");
    assert_eq!(cfg.get("X").0, "pre--post");
  }

  #[test]
  fn macro_default_is_used_when_undefined() {
    let mut cfg = ConfigSnapshot::new();
    cfg.set("X", "$(MISSING:fallback)");
    assert_eq!(cfg.get("X").0, "fallback");
  }

  #[test]
  fn cyclic_macro_resolves_to_empty() {
    let mut cfg = ConfigSnapshot::new();
    cfg.set("A", "$(B)");
    cfg.set("B", "$(A)");
    assert_eq!(cfg.get("A").0, "");
  }
}
