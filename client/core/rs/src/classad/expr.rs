//! The unevaluated-expression arm of [`Value`](super::Value): a small AST
//! over attribute references, literals, and the standard ClassAd
//! operators. Built both by the submit compiler (to assemble things like
//! `Requirements`) and by [`super::parse::parse_expr`] when reading text.

use super::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  /// A possibly dot-qualified attribute reference, e.g. `TARGET.Arch`.
  Attribute(String),
  Int(i64),
  Real(f64),
  Str(String),
  Bool(bool),
  Undefined,
  Error,
  /// `{ e1, e2, ... }`
  List(Vec<Expr>),
  Unary(UnaryOp, Box<Expr>),
  Binary(BinaryOp, Box<Expr>, Box<Expr>),
  /// `ident(args...)` — built-in functions are not evaluated here
  /// (no matchmaking context); they round-trip through text form intact.
  Function(String, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
  Neg,
  Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  And,
  Or,
  /// `==` — typed equality; `Undefined == x` is `Undefined`.
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  /// `=?=` — meta-equality; always defined, compares type and value.
  MetaEq,
  /// `=!=` — meta-inequality; the negation of `=?=`.
  MetaNe,
}

impl Expr {
  pub fn attr(name: impl Into<String>) -> Expr {
    Expr::Attribute(name.into())
  }

  pub fn and(self, other: Expr) -> Expr {
    Expr::Binary(BinaryOp::And, Box::new(self), Box::new(other))
  }

  /// Evaluate this expression against `ad` for attribute lookups.
  /// `TARGET.`-prefixed references always evaluate to `Undefined`
  /// here: this crate performs no matchmaking, so there is never an
  /// opposing ad to resolve them against.
  pub fn evaluate(&self, ad: &super::ClassAd) -> Value {
    match self {
      Expr::Attribute(name) => {
        if name.to_ascii_uppercase().starts_with("TARGET.") {
          return Value::Undefined;
        }
        ad.evaluate(name)
      }
      Expr::Int(i) => Value::Integer(*i),
      Expr::Real(r) => Value::Real(*r),
      Expr::Str(s) => Value::String(s.clone()),
      Expr::Bool(b) => Value::Boolean(*b),
      Expr::Undefined => Value::Undefined,
      Expr::Error => Value::Error,
      Expr::List(items) => Value::List(
        items.iter().map(|e| e.evaluate(ad)).collect(),
      ),
      Expr::Unary(op, inner) => eval_unary(*op, inner.evaluate(ad)),
      Expr::Binary(op, lhs, rhs) => {
        eval_binary(*op, lhs.evaluate(ad), rhs.evaluate(ad))
      }
      Expr::Function(_, _) => Value::Undefined,
    }
  }

  /// Render this expression in ClassAd "old form" text syntax.
  pub fn to_text(&self) -> String {
    match self {
      Expr::Attribute(name) => name.clone(),
      Expr::Int(i) => i.to_string(),
      Expr::Real(r) => format_real(*r),
      Expr::Str(s) => format!("\"{}\"", escape_string(s)),
      Expr::Bool(b) => b.to_string(),
      Expr::Undefined => "UNDEFINED".to_string(),
      Expr::Error => "ERROR".to_string(),
      Expr::List(items) => format!(
        "{{ {} }}",
        items
          .iter()
          .map(Expr::to_text)
          .collect::<Vec<_>>()
          .join(", ")
      ),
      Expr::Unary(UnaryOp::Neg, inner) => {
        format!("-{}", paren(inner))
      }
      Expr::Unary(UnaryOp::Not, inner) => {
        format!("!{}", paren(inner))
      }
      Expr::Binary(op, lhs, rhs) => {
        format!("{} {} {}", paren(lhs), op.to_text(), paren(rhs))
      }
      Expr::Function(name, args) => format!(
        "{name}({})",
        args
          .iter()
          .map(Expr::to_text)
          .collect::<Vec<_>>()
          .join(", ")
      ),
    }
  }
}

fn paren(e: &Expr) -> String {
  match e {
    Expr::Binary(..) => format!("({})", e.to_text()),
    _ => e.to_text(),
  }
}

impl BinaryOp {
  fn to_text(self) -> &'static str {
    match self {
      BinaryOp::Add => "+",
      BinaryOp::Sub => "-",
      BinaryOp::Mul => "*",
      BinaryOp::Div => "/",
      BinaryOp::And => "&&",
      BinaryOp::Or => "||",
      BinaryOp::Eq => "==",
      BinaryOp::Ne => "!=",
      BinaryOp::Lt => "<",
      BinaryOp::Le => "<=",
      BinaryOp::Gt => ">",
      BinaryOp::Ge => ">=",
      BinaryOp::MetaEq => "=?=",
      BinaryOp::MetaNe => "=!=",
    }
  }
}

pub(super) fn format_real(r: f64) -> String {
  if r == r.trunc() && r.is_finite() {
    format!("{r:.1}")
  } else {
    format!("{r}")
  }
}

pub(super) fn escape_string(s: &str) -> String {
  s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn eval_unary(op: UnaryOp, v: Value) -> Value {
  match (op, v) {
    (UnaryOp::Not, Value::Boolean(b)) => Value::Boolean(!b),
    (UnaryOp::Not, Value::Undefined) => Value::Undefined,
    (UnaryOp::Not, _) => Value::Error,
    (UnaryOp::Neg, Value::Integer(i)) => Value::Integer(-i),
    (UnaryOp::Neg, Value::Real(r)) => Value::Real(-r),
    (UnaryOp::Neg, Value::Undefined) => Value::Undefined,
    (UnaryOp::Neg, _) => Value::Error,
  }
}

fn eval_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Value {
  use BinaryOp::*;
  match op {
    MetaEq => Value::Boolean(lhs == rhs),
    MetaNe => Value::Boolean(lhs != rhs),
    And => eval_logical(true, lhs, rhs),
    Or => eval_logical(false, lhs, rhs),
    Eq | Ne | Lt | Le | Gt | Ge => eval_comparison(op, lhs, rhs),
    Add | Sub | Mul | Div => eval_arith(op, lhs, rhs),
  }
}

fn eval_logical(is_and: bool, lhs: Value, rhs: Value) -> Value {
  let truthy = |v: &Value| match v {
    Value::Boolean(b) => Some(*b),
    Value::Integer(i) => Some(*i != 0),
    Value::Real(r) => Some(*r != 0.0),
    _ => None,
  };
  match (truthy(&lhs), truthy(&rhs)) {
    (Some(l), Some(r)) => {
      Value::Boolean(if is_and { l && r } else { l || r })
    }
    // Short-circuit definedness per ClassAd semantics: `false && X` is
    // `false` even if X is undefined, and symmetrically for `||`.
    (Some(false), _) if is_and => Value::Boolean(false),
    (Some(true), _) if !is_and => Value::Boolean(true),
    (_, Some(false)) if is_and => Value::Boolean(false),
    (_, Some(true)) if !is_and => Value::Boolean(true),
    _ if matches!(lhs, Value::Error) || matches!(rhs, Value::Error) => {
      Value::Error
    }
    _ => Value::Undefined,
  }
}

fn eval_comparison(op: BinaryOp, lhs: Value, rhs: Value) -> Value {
  use BinaryOp::*;
  let ordering = match (numeric(&lhs), numeric(&rhs)) {
    (Some(a), Some(b)) => a.partial_cmp(&b),
    _ => match (&lhs, &rhs) {
      (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
      _ => None,
    },
  };
  let Some(ordering) = ordering else {
    if matches!(lhs, Value::Undefined) || matches!(rhs, Value::Undefined)
    {
      return Value::Undefined;
    }
    return Value::Error;
  };
  use std::cmp::Ordering::*;
  let result = match op {
    Eq => ordering == Equal,
    Ne => ordering != Equal,
    Lt => ordering == Less,
    Le => ordering != Greater,
    Gt => ordering == Greater,
    Ge => ordering != Less,
    _ => unreachable!(),
  };
  Value::Boolean(result)
}

fn eval_arith(op: BinaryOp, lhs: Value, rhs: Value) -> Value {
  use BinaryOp::*;
  match (lhs, rhs) {
    (Value::Integer(a), Value::Integer(b)) => match op {
      Add => Value::Integer(a.wrapping_add(b)),
      Sub => Value::Integer(a.wrapping_sub(b)),
      Mul => Value::Integer(a.wrapping_mul(b)),
      Div if b != 0 => Value::Integer(a / b),
      Div => Value::Error,
      _ => unreachable!(),
    },
    (a, b) => match (numeric(&a), numeric(&b)) {
      (Some(a), Some(b)) => match op {
        Add => Value::Real(a + b),
        Sub => Value::Real(a - b),
        Mul => Value::Real(a * b),
        Div if b != 0.0 => Value::Real(a / b),
        Div => Value::Error,
        _ => unreachable!(),
      },
      _ => {
        if matches!(a, Value::Undefined) || matches!(b, Value::Undefined)
        {
          Value::Undefined
        } else {
          Value::Error
        }
      }
    },
  }
}

fn numeric(v: &Value) -> Option<f64> {
  match v {
    Value::Integer(i) => Some(*i as f64),
    Value::Real(r) => Some(*r),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::classad::ClassAd;

  #[test]
  fn and_short_circuits_on_false() {
    let ad = ClassAd::new();
    let expr = Expr::Bool(false).and(Expr::attr("Missing"));
    assert_eq!(expr.evaluate(&ad), Value::Boolean(false));
  }

  #[test]
  fn meta_equality_never_undefined() {
    let ad = ClassAd::new();
    let expr = Expr::Binary(
      BinaryOp::MetaEq,
      Box::new(Expr::attr("Missing")),
      Box::new(Expr::Undefined),
    );
    assert_eq!(expr.evaluate(&ad), Value::Boolean(true));
  }

  #[test]
  fn render_matches_condor_old_form() {
    let expr = Expr::Binary(
      BinaryOp::And,
      Box::new(Expr::Binary(
        BinaryOp::MetaNe,
        Box::new(Expr::attr("TARGET.Arch")),
        Box::new(Expr::Undefined),
      )),
      Box::new(Expr::Binary(
        BinaryOp::Ge,
        Box::new(Expr::attr("TARGET.Memory")),
        Box::new(Expr::Int(128)),
      )),
    );
    assert_eq!(
      expr.to_text(),
      "TARGET.Arch =!= UNDEFINED && TARGET.Memory >= 128"
    );
  }
}
