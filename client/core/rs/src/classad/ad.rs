use indexmap::IndexMap;

use super::{Value, parse};

/// An ordered, case-insensitive attribute set. Attribute name comparisons
/// are ASCII case-insensitive; the case of the *first* insertion is
/// preserved and used for both enumeration and text serialization.
#[derive(Debug, Clone, Default)]
pub struct ClassAd {
  // Keyed by lowercased name; value holds the originally-inserted-case
  // name alongside the attribute value, preserving insertion order.
  entries: IndexMap<String, (String, Value)>,
}

impl ClassAd {
  pub fn new() -> ClassAd {
    ClassAd::default()
  }

  /// Insert `name = value`. If an attribute with the same name
  /// (case-insensitively) already exists, its value is replaced but its
  /// originally-inserted case and position are kept.
  pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
    let name = name.into();
    let key = name.to_ascii_lowercase();
    match self.entries.get_mut(&key) {
      Some((_, existing)) => *existing = value.into(),
      None => {
        self.entries.insert(key, (name, value.into()));
      }
    }
  }

  /// Looks up the raw (possibly unevaluated) value.
  pub fn lookup(&self, name: &str) -> Option<&Value> {
    self
      .entries
      .get(&name.to_ascii_lowercase())
      .map(|(_, v)| v)
  }

  /// Looks up and evaluates the value in the context of this ad.
  pub fn evaluate(&self, name: &str) -> Value {
    match self.lookup(name) {
      Some(value) => value.evaluate(self),
      None => Value::Undefined,
    }
  }

  pub fn remove(&mut self, name: &str) -> Option<Value> {
    self
      .entries
      .shift_remove(&name.to_ascii_lowercase())
      .map(|(_, v)| v)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.entries.contains_key(&name.to_ascii_lowercase())
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Enumerate attributes in insertion order, original case preserved.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
    self.entries.values().map(|(name, value)| (name.as_str(), value))
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.entries.values().map(|(name, _)| name.as_str())
  }

  /// Render as ClassAd "old form" text: one `NAME = EXPR` line per
  /// attribute, in insertion order.
  pub fn to_old_form(&self) -> String {
    let mut out = String::new();
    for (name, value) in self.iter() {
      out.push_str(name);
      out.push_str(" = ");
      out.push_str(&value.to_text());
      out.push('\n');
    }
    out
  }

  /// Render as a comma-separated attribute list, the form used for
  /// nested ClassAd values: `[ A = 1, B = "x" ]`.
  pub fn to_inline_text(&self) -> String {
    self
      .iter()
      .map(|(name, value)| format!("{name} = {}", value.to_text()))
      .collect::<Vec<_>>()
      .join(", ")
  }

  /// Parse the "old form" line-oriented text into a ClassAd.
  pub fn parse_old_form(text: &str) -> Result<ClassAd, parse::ParseError> {
    parse::parse_classad(text)
  }
}

/// Typed, name-case-insensitive equality: two ads are equal iff they
/// have the same set of attribute names (case-insensitive) each mapping
/// to an equal [`Value`]. Insertion order and original case are not
/// part of equality.
impl PartialEq for ClassAd {
  fn eq(&self, other: &Self) -> bool {
    if self.entries.len() != other.entries.len() {
      return false;
    }
    self.entries.iter().all(|(key, (_, value))| {
      other
        .entries
        .get(key)
        .is_some_and(|(_, other_value)| other_value == value)
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn case_insensitive_lookup_preserves_first_case() {
    let mut ad = ClassAd::new();
    ad.insert("Cmd", "/bin/true");
    ad.insert("cmd", "/bin/false");
    assert_eq!(ad.lookup("CMD").unwrap().as_str(), Some("/bin/false"));
    assert_eq!(ad.keys().collect::<Vec<_>>(), vec!["Cmd"]);
  }

  #[test]
  fn round_trip_old_form() {
    let mut ad = ClassAd::new();
    ad.insert("JobUniverse", 5i64);
    ad.insert("Cmd", "/bin/true");
    ad.insert("CopyToSpool", true);
    let text = ad.to_old_form();
    let parsed = ClassAd::parse_old_form(&text).unwrap();
    assert_eq!(ad, parsed);
  }

  #[test]
  fn equality_is_name_case_insensitive() {
    let mut a = ClassAd::new();
    a.insert("Cmd", "/bin/true");
    let mut b = ClassAd::new();
    b.insert("CMD", "/bin/true");
    assert_eq!(a, b);
  }
}
