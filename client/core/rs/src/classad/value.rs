use super::{ClassAd, Expr, expr::escape_string, expr::format_real};

/// A typed ClassAd attribute value. Comparisons (`PartialEq`) implement
/// the typed equality used by round-trip tests: values of different
/// kinds are never equal, `Real` compares as IEEE 754 `f64`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Undefined,
  Error,
  Boolean(bool),
  Integer(i64),
  Real(f64),
  String(String),
  List(Vec<Value>),
  ClassAd(ClassAd),
  /// An unevaluated expression tree, e.g. a composed `Requirements` or
  /// a macro-producing value the compiler never folds to a literal.
  Expr(Expr),
}

impl Value {
  /// Evaluate this value in the context of `ad`: literals pass through
  /// unchanged, `Expr` is evaluated against `ad`'s own attributes.
  pub fn evaluate(&self, ad: &ClassAd) -> Value {
    match self {
      Value::Expr(expr) => expr.evaluate(ad),
      other => other.clone(),
    }
  }

  /// Render in ClassAd "old form" value syntax (the right-hand side of
  /// a `NAME = ...` line).
  pub fn to_text(&self) -> String {
    match self {
      Value::Undefined => "UNDEFINED".to_string(),
      Value::Error => "ERROR".to_string(),
      Value::Boolean(b) => b.to_string(),
      Value::Integer(i) => i.to_string(),
      Value::Real(r) => format_real(*r),
      Value::String(s) => format!("\"{}\"", escape_string(s)),
      Value::List(items) => format!(
        "{{ {} }}",
        items
          .iter()
          .map(Value::to_text)
          .collect::<Vec<_>>()
          .join(", ")
      ),
      Value::ClassAd(ad) => format!("[{}]", ad.to_inline_text()),
      Value::Expr(expr) => expr.to_text(),
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Boolean(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_integer(&self) -> Option<i64> {
    match self {
      Value::Integer(i) => Some(*i),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Boolean(b)
  }
}

impl From<i64> for Value {
  fn from(i: i64) -> Self {
    Value::Integer(i)
  }
}

impl From<i32> for Value {
  fn from(i: i32) -> Self {
    Value::Integer(i as i64)
  }
}

impl From<f64> for Value {
  fn from(r: f64) -> Self {
    Value::Real(r)
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::String(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Value::String(s)
  }
}

impl From<Expr> for Value {
  fn from(e: Expr) -> Self {
    // Fold trivial literal expressions to their literal Value kind so
    // that building via `Expr` and via direct `Value` construction
    // compare equal (needed for the submit-compiler's rule table,
    // which sometimes builds an attribute as a composed Expr and
    // sometimes as a plain literal depending on the branch taken).
    match e {
      Expr::Int(i) => Value::Integer(i),
      Expr::Real(r) => Value::Real(r),
      Expr::Str(s) => Value::String(s),
      Expr::Bool(b) => Value::Boolean(b),
      Expr::Undefined => Value::Undefined,
      Expr::Error => Value::Error,
      other => Value::Expr(other),
    }
  }
}
