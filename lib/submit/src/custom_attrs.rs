//! Typed fallback for `+NAME` / `MY.NAME` custom attributes (§4.5 step 2,
//! §9 supplement): string literal in quotes → `true`/`false` → integer
//! (no fractional or exponent part) → float → else kept as an
//! unevaluated expression.

use condor_client::classad::{Value, parse_expr};

/// Strips the `+` or `MY.` prefix from a statement key, if present.
pub fn strip_prefix(key: &str) -> Option<&str> {
  if let Some(rest) = key.strip_prefix('+') {
    return Some(rest);
  }
  if let Some(rest) = key.strip_prefix("MY.").or_else(|| key.strip_prefix("my.")) {
    return Some(rest);
  }
  None
}

/// Applies the typed fallback to a raw (already macro-expanded) value.
pub fn typed_value(raw: &str) -> Value {
  let trimmed = raw.trim();

  if let Some(inner) = trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
    return Value::String(inner.to_string());
  }
  match trimmed.to_ascii_lowercase().as_str() {
    "true" => return Value::Boolean(true),
    "false" => return Value::Boolean(false),
    _ => {}
  }
  if !trimmed.contains(['.', 'e', 'E']) {
    if let Ok(i) = trimmed.parse::<i64>() {
      return Value::Integer(i);
    }
  }
  if let Ok(r) = trimmed.parse::<f64>() {
    return Value::Real(r);
  }
  match parse_expr(trimmed) {
    Ok(expr) => Value::from(expr),
    Err(_) => Value::String(trimmed.to_string()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strips_plus_and_my_prefixes() {
    assert_eq!(strip_prefix("+ProjectName"), Some("ProjectName"));
    assert_eq!(strip_prefix("MY.ProjectName"), Some("ProjectName"));
    assert_eq!(strip_prefix("Executable"), None);
  }

  #[test]
  fn falls_back_through_string_bool_int_float() {
    assert_eq!(typed_value("\"a string\""), Value::String("a string".to_string()));
    assert_eq!(typed_value("TRUE"), Value::Boolean(true));
    assert_eq!(typed_value("42"), Value::Integer(42));
    assert_eq!(typed_value("3.5"), Value::Real(3.5));
  }

  #[test]
  fn unquoted_non_literal_becomes_expression_or_string() {
    match typed_value("TARGET.Memory") {
      Value::Expr(_) => {}
      other => panic!("expected an expression, got {other:?}"),
    }
  }
}
