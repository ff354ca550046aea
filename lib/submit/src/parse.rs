//! Parses submit-file text into its statement list plus the single
//! `queue` clause (§4.5). The statement language is exactly the
//! `condor_config` assignment syntax — `KEY = VALUE`, comments led by
//! `#`, blank lines ignored, plus an `include : path` directive and a
//! flat (non-nested) `if / else / endif` block — with `queue` singled
//! out as the iterator descriptor the compiler drives separately.

use condor_client::submit::{QueueSpec, SubmitDescription, Universe};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
  #[error("more than one queue statement")]
  MultipleQueueStatements,
  #[error("missing queue statement")]
  MissingQueueStatement,
  #[error("malformed queue statement: {0:?}")]
  MalformedQueue(String),
  #[error("unterminated if block")]
  UnterminatedIf,
  #[error("failed to read included file {path:?}: {reason}")]
  IncludeFailed { path: String, reason: String },
}

/// Parses the full text of a submit description.
pub fn parse(text: &str) -> Result<SubmitDescription, ParseError> {
  let (statements, queue) = parse_statements(text)?;

  let universe = statements
    .iter()
    .rev()
    .find(|(k, _)| k.eq_ignore_ascii_case("universe"))
    .map(|(_, v)| Universe::parse(v))
    .unwrap_or(Universe::Vanilla);

  Ok(SubmitDescription {
    universe,
    queue: queue.ok_or(ParseError::MissingQueueStatement)?,
    statements,
  })
}

/// Parses the statement list and, if present, the `queue` clause. An
/// included file is allowed to omit `queue` entirely — only the
/// top-level description requires one.
fn parse_statements(
  text: &str,
) -> Result<(Vec<(String, String)>, Option<QueueSpec>), ParseError> {
  let mut statements = Vec::new();
  let mut queue = None;
  let mut if_stack: Vec<bool> = Vec::new();

  for raw_line in text.lines() {
    let line = strip_comment(raw_line).trim();
    if line.is_empty() {
      continue;
    }

    let active = if_stack.iter().all(|&cond| cond);

    if let Some(rest) = line.strip_prefix("if ") {
      if_stack.push(active && eval_condition(rest.trim(), &statements));
      continue;
    }
    if line == "else" {
      if let Some(last) = if_stack.last_mut() {
        *last = !*last;
      }
      continue;
    }
    if line == "endif" {
      if if_stack.pop().is_none() {
        return Err(ParseError::UnterminatedIf);
      }
      continue;
    }
    if !active {
      continue;
    }

    if let Some(rest) = line.strip_prefix("include") {
      let rest = rest.trim_start_matches(':').trim();
      let contents = std::fs::read_to_string(rest).map_err(|e| {
        ParseError::IncludeFailed { path: rest.to_string(), reason: e.to_string() }
      })?;
      let (included_statements, included_queue) = parse_statements(&contents)?;
      statements.extend(included_statements);
      if let Some(included_queue) = included_queue {
        if queue.is_some() {
          return Err(ParseError::MultipleQueueStatements);
        }
        queue = Some(included_queue);
      }
      continue;
    }

    if line.to_ascii_lowercase().starts_with("queue") {
      if queue.is_some() {
        return Err(ParseError::MultipleQueueStatements);
      }
      queue = Some(parse_queue_clause(line)?);
      continue;
    }

    if let Some((key, value)) = line.split_once('=') {
      statements.push((key.trim().to_string(), value.trim().to_string()));
    }
  }

  if !if_stack.is_empty() {
    return Err(ParseError::UnterminatedIf);
  }

  Ok((statements, queue))
}

fn strip_comment(line: &str) -> &str {
  match line.find('#') {
    Some(idx) => &line[..idx],
    None => line,
  }
}

/// A minimal condition language: `defined NAME` or a bare macro/literal
/// truthiness check against statements seen so far.
fn eval_condition(cond: &str, statements: &[(String, String)]) -> bool {
  if let Some(name) = cond.strip_prefix("defined ") {
    let name = name.trim();
    return statements.iter().any(|(k, _)| k.eq_ignore_ascii_case(name));
  }
  matches!(cond.to_ascii_lowercase().as_str(), "true" | "1")
}

/// Parses one of the four `queue` forms (§4.5):
/// - `queue [N]`
/// - `queue [N] var[, var...] in (item1, item2, ...)`
/// - `queue [N] var[, var...] from filename`
/// - `queue [N] var matching pattern`
fn parse_queue_clause(line: &str) -> Result<QueueSpec, ParseError> {
  let rest = line["queue".len()..].trim();
  if rest.is_empty() {
    return Ok(QueueSpec::Simple { count_per_item: 1 });
  }

  let mut tokens = rest.splitn(2, char::is_whitespace);
  let first = tokens.next().unwrap_or("");
  let remainder = tokens.next().unwrap_or("").trim();

  let (count_per_item, remainder) = match first.parse::<u32>() {
    Ok(n) => (n, remainder),
    Err(_) => (1, rest),
  };

  if remainder.is_empty() {
    return Ok(QueueSpec::Simple { count_per_item });
  }

  if let Some(idx) = remainder.find(" matching ") {
    let var = remainder[..idx].trim().trim_end_matches(',').to_string();
    let pattern = remainder[idx + " matching ".len()..].trim().to_string();
    return Ok(QueueSpec::Matching { count_per_item, var, pattern });
  }

  if let Some(idx) = remainder.find(" from ") {
    let vars = split_vars(&remainder[..idx]);
    let filename = remainder[idx + " from ".len()..].trim().to_string();
    return Ok(QueueSpec::FromFile { count_per_item, vars, filename });
  }

  if let Some(idx) = remainder.find(" in ") {
    let vars = split_vars(&remainder[..idx]);
    let list = remainder[idx + " in ".len()..].trim();
    let list = list
      .strip_prefix('(')
      .and_then(|s| s.strip_suffix(')'))
      .unwrap_or(list);
    let items = list
      .split(',')
      .map(|s| s.trim().to_string())
      .filter(|s| !s.is_empty())
      .collect();
    return Ok(QueueSpec::InlineList { count_per_item, vars, items });
  }

  Err(ParseError::MalformedQueue(line.to_string()))
}

fn split_vars(s: &str) -> Vec<String> {
  s.split(',').map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_simple_queue() {
    let desc = parse("universe = vanilla\nexecutable = /bin/true\nqueue\n").unwrap();
    assert_eq!(desc.universe, Universe::Vanilla);
    assert_eq!(desc.queue, QueueSpec::Simple { count_per_item: 1 });
    assert_eq!(
      desc.statements,
      vec![
        ("universe".to_string(), "vanilla".to_string()),
        ("executable".to_string(), "/bin/true".to_string()),
      ]
    );
  }

  #[test]
  fn parses_inline_list_queue() {
    let desc = parse(
      "executable = /bin/echo\narguments = $(name)\nqueue name in (Alice, Bob, Charlie)\n",
    )
    .unwrap();
    assert_eq!(
      desc.queue,
      QueueSpec::InlineList {
        count_per_item: 1,
        vars: vec!["name".to_string()],
        items: vec!["Alice".to_string(), "Bob".to_string(), "Charlie".to_string()],
      }
    );
  }

  #[test]
  fn parses_matching_queue_with_count() {
    let desc = parse("queue 2 file matching *.dat\n").unwrap();
    assert_eq!(
      desc.queue,
      QueueSpec::Matching {
        count_per_item: 2,
        var: "file".to_string(),
        pattern: "*.dat".to_string(),
      }
    );
  }

  #[test]
  fn rejects_second_queue_statement() {
    let err = parse("queue\nqueue\n").unwrap_err();
    assert_eq!(err, ParseError::MultipleQueueStatements);
  }

  #[test]
  fn if_defined_block_is_honored() {
    let desc = parse(
      "custom_var = 1\nif defined custom_var\nextra = yes\nendif\nqueue\n",
    )
    .unwrap();
    assert!(desc.statements.iter().any(|(k, v)| k == "extra" && v == "yes"));
  }

  #[test]
  fn if_else_skips_false_branch() {
    let desc =
      parse("if defined missing\nextra = yes\nelse\nextra = no\nendif\nqueue\n").unwrap();
    assert!(desc.statements.iter().any(|(k, v)| k == "extra" && v == "no"));
  }
}
