//! Path-traversal containment and output-name filtering (§4.9.5).
//! Rejections are logged and the caller drains the payload from the
//! wire instead of aborting the whole transfer.

use condor_client::error::{ContainmentEvent, ContainmentReason};

/// Cleans `raw_name` and, if an output filter is given, checks it
/// against the filter. Returns the cleaned relative path on success, or
/// the `ContainmentEvent` to log and drain on rejection.
pub fn check(
  raw_name: &str,
  output_filter: Option<&[String]>,
) -> Result<String, ContainmentEvent> {
  let cleaned = validations::clean_relative_path(raw_name).ok_or_else(|| {
    ContainmentEvent {
      raw_name: raw_name.to_string(),
      reason: ContainmentReason::PathTraversal,
    }
  })?;

  if let Some(filter) = output_filter
    && !filter.iter().any(|allowed| allowed == &cleaned)
  {
    return Err(ContainmentEvent {
      raw_name: raw_name.to_string(),
      reason: ContainmentReason::NotInOutputFilter,
    });
  }

  Ok(cleaned)
}

/// Splits a tar entry name of the form `"<cluster>.<proc>/<relpath>"`
/// (multi-job uploads) into its job id token and the relative path
/// (§4.9.5). Single-job uploads pass `multi_job = false` and the whole
/// name is the relative path.
pub fn split_job_prefixed(name: &str, multi_job: bool) -> (Option<&str>, &str) {
  if !multi_job {
    return (None, name);
  }
  match name.split_once('/') {
    Some((prefix, rest)) if prefix.contains('.') => (Some(prefix), rest),
    _ => (None, name),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_traversal_and_absolute() {
    assert!(check("../etc/passwd", None).is_err());
    assert!(check("/etc/passwd", None).is_err());
    assert!(check("ok/name.txt", None).is_ok());
  }

  #[test]
  fn only_input_txt_survives_scenario_five() {
    let names = ["123.0/input.txt", "123.0/../etc/passwd", "123.0/../../secret"];
    let results: Vec<_> = names
      .iter()
      .map(|n| {
        let (_, rel) = split_job_prefixed(n, true);
        check(rel, None)
      })
      .collect();
    assert_eq!(results[0], Ok("input.txt".to_string()));
    assert!(results[1].is_err());
    assert!(results[2].is_err());
  }

  #[test]
  fn output_filter_rejects_names_outside_the_set() {
    let filter = vec!["a.txt".to_string()];
    assert!(check("a.txt", Some(&filter)).is_ok());
    assert!(check("b.txt", Some(&filter)).is_err());
  }
}
