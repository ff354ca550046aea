//! # Input Validation Module
//!
//! Small, reusable string validators used across the submit-description
//! compiler and configuration layers to reject malformed input before any
//! wire I/O is attempted.

use std::sync::OnceLock;

use anyhow::{Context, anyhow};
use regex::Regex;

/// Options to validate input strings to have certain properties.
/// This ensures only valid data can enter the system.
///
/// ## Usage
///
/// ```
/// StringValidator::default()
///   .min_length(1)
///   .max_length(100)
///   .matches(StringValidatorMatches::VariableName)
///   .validate("ItemIndex")?
/// ```
#[derive(Default)]
pub struct StringValidator {
  /// Specify the minimum length of string.
  /// Setting `0` will effectively skip this validation.
  pub min_length: usize,
  /// Specify max length of string, or None to allow arbitrary length.
  pub max_length: Option<usize>,
  /// Skip the control character check.
  /// Most values should not contain these by default.
  pub skip_control_check: bool,
  /// Specify a pattern to validate the string contents.
  pub matches: Option<StringValidatorMatches>,
}

impl StringValidator {
  /// Returns Ok if input passes validations, otherwise includes
  /// error with failure reason.
  pub fn validate(&self, input: &str) -> anyhow::Result<()> {
    let len = input.len();

    if len < self.min_length {
      return Err(anyhow!(
        "Input too short. Must be at least {} characters.",
        self.min_length
      ));
    }

    if let Some(max_length) = self.max_length
      && len > max_length
    {
      return Err(anyhow!(
        "Input too long. Must be at most {max_length} characters."
      ));
    }

    if !self.skip_control_check {
      validate_no_control_chars(input)?;
    }

    if let Some(matches) = &self.matches {
      matches.validate(input)?
    }

    Ok(())
  }

  pub fn min_length(mut self, min_length: usize) -> StringValidator {
    self.min_length = min_length;
    self
  }

  pub fn max_length(
    mut self,
    max_length: impl Into<Option<usize>>,
  ) -> StringValidator {
    self.max_length = max_length.into();
    self
  }

  pub fn skip_control_check(mut self) -> StringValidator {
    self.skip_control_check = true;
    self
  }

  pub fn matches(
    mut self,
    matches: impl Into<Option<StringValidatorMatches>>,
  ) -> StringValidator {
    self.matches = matches.into();
    self
  }
}

pub enum StringValidatorMatches {
  /// - ascii alphanumeric characters
  /// - underscores
  /// Used for `queue` iterator bound variable names and macro names.
  VariableName,
  /// - ascii alphanumeric characters
  /// - underscores
  /// - dots (for `MY.` / `TARGET.` qualified names)
  /// Used for ClassAd attribute names.
  AttributeName,
}

impl StringValidatorMatches {
  /// Returns Ok if input passes validations, otherwise includes
  /// error with failure reason.
  fn validate(&self, input: &str) -> anyhow::Result<()> {
    let validate = || match self {
      StringValidatorMatches::VariableName => {
        static VARIABLE_NAME_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = VARIABLE_NAME_REGEX.get_or_init(|| {
          Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$")
            .expect("Failed to initialize variable name regex")
        });
        if regex.is_match(input) {
          Ok(())
        } else {
          Err(anyhow!(
            "Only alphanumeric characters and underscores are allowed"
          ))
        }
      }

      StringValidatorMatches::AttributeName => {
        static ATTRIBUTE_NAME_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = ATTRIBUTE_NAME_REGEX.get_or_init(|| {
          Regex::new(
            r"^[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*$",
          )
          .expect("Failed to initialize attribute name regex")
        });
        if regex.is_match(input) {
          Ok(())
        } else {
          Err(anyhow!(
            "Attribute names must be dot-qualified identifiers"
          ))
        }
      }
    };
    validate().context("Invalid characters in input")
  }
}

fn validate_no_control_chars(input: &str) -> anyhow::Result<()> {
  for (index, char) in input.chars().enumerate() {
    if char.is_control() {
      return Err(anyhow!(
        "Control character at index {index}. Input: \"{input}\""
      ));
    }
  }
  Ok(())
}

/// Cleans a relative path's segments, rejecting traversal outside the
/// sandbox root. Mirrors the containment check required for every
/// file-transfer entry (upload tar members and download file names).
/// Returns `None` for absolute paths or any path with a `..` segment.
pub fn clean_relative_path(input: &str) -> Option<String> {
  if input.starts_with('/') || input.starts_with('\\') {
    return None;
  }
  let mut out = Vec::new();
  for segment in input.split(['/', '\\']) {
    match segment {
      "" | "." => continue,
      ".." => return None,
      other => out.push(other),
    }
  }
  if out.is_empty() {
    return None;
  }
  Some(out.join("/"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_traversal() {
    assert!(clean_relative_path("../etc/passwd").is_none());
    assert!(clean_relative_path("a/../../b").is_none());
    assert!(clean_relative_path("/etc/passwd").is_none());
  }

  #[test]
  fn accepts_clean_relative() {
    assert_eq!(
      clean_relative_path("a/b/c.txt"),
      Some("a/b/c.txt".to_string())
    );
    assert_eq!(
      clean_relative_path("./a.txt"),
      Some("a.txt".to_string())
    );
  }

  #[test]
  fn variable_name_rules() {
    let v = StringValidator::default()
      .matches(StringValidatorMatches::VariableName);
    assert!(v.validate("Item").is_ok());
    assert!(v.validate("2bad").is_err());
    assert!(v.validate("bad-name").is_err());
  }

  #[test]
  fn attribute_name_rules() {
    let v = StringValidator::default()
      .matches(StringValidatorMatches::AttributeName);
    assert!(v.validate("TARGET.Arch").is_ok());
    assert!(v.validate("RequestCpus").is_ok());
    assert!(v.validate("bad name").is_err());
  }
}
