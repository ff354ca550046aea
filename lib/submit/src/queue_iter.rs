//! The `queue` iterator capability (§4.5, §9 design note): a single
//! `{Next, Values, Count}` interface backed by one eager resolution per
//! `QueueSpec` kind, so the compiler depends only on the capability and
//! not on which form produced it.

use condor_client::submit::QueueSpec;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
  #[error("failed to read queue source file {path:?}: {reason}")]
  Io { path: String, reason: String },
  #[error("failed to evaluate glob pattern {pattern:?}: {reason}")]
  Glob { pattern: String, reason: String },
}

/// One resolved item from a `queue` clause: its position, the raw item
/// text (whole line / list entry / match path), and the bound variable
/// names for this item (empty for `Simple`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
  pub item_index: u32,
  pub item: String,
  pub vars: Vec<(String, String)>,
}

/// An eagerly-resolved sequence of `QueueItem`s plus the `count_per_item`
/// repeat factor. Every `QueueSpec` kind resolves down to this same
/// shape, which is what lets the compiler stay blind to which of the
/// four forms produced it.
#[derive(Debug, Clone)]
pub struct QueueIterator {
  items: Vec<QueueItem>,
  count_per_item: u32,
  pos: usize,
}

impl QueueIterator {
  /// Total proc count: `count_per_item * items_or_1` (§4.5 invariant).
  pub fn count(&self) -> usize {
    self.items.len() * self.count_per_item.max(1) as usize
  }

  pub fn count_per_item(&self) -> u32 {
    self.count_per_item
  }

  /// Every `(item, step)` pair in order, `step` ranging `0..count_per_item`.
  pub fn values(&self) -> Vec<(&QueueItem, u32)> {
    self
      .items
      .iter()
      .flat_map(|item| (0..self.count_per_item.max(1)).map(move |step| (item, step)))
      .collect()
  }

  /// Advances the cursor and returns the next `(item, step)` pair, or
  /// `None` once exhausted.
  pub fn next(&mut self) -> Option<(&QueueItem, u32)> {
    let steps = self.count_per_item.max(1) as usize;
    if self.pos >= self.items.len() * steps {
      return None;
    }
    let item_idx = self.pos / steps;
    let step = (self.pos % steps) as u32;
    self.pos += 1;
    Some((&self.items[item_idx], step))
  }
}

/// Resolves a `QueueSpec` into a `QueueIterator`, doing any file reads
/// or glob expansion eagerly (§4.5: all four kinds enumerate a finite,
/// known-in-advance set of items).
pub fn build(spec: &QueueSpec) -> Result<QueueIterator, QueueError> {
  let (items, count_per_item) = match spec {
    QueueSpec::Simple { count_per_item } => (
      vec![QueueItem { item_index: 0, item: String::new(), vars: Vec::new() }],
      *count_per_item,
    ),
    QueueSpec::InlineList { count_per_item, vars, items } => {
      (bind_items(vars, items), *count_per_item)
    }
    QueueSpec::FromFile { count_per_item, vars, filename } => {
      let contents = std::fs::read_to_string(filename).map_err(|e| QueueError::Io {
        path: filename.clone(),
        reason: e.to_string(),
      })?;
      let lines: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
      (bind_items(vars, &lines), *count_per_item)
    }
    QueueSpec::Matching { count_per_item, var, pattern } => {
      let paths = glob::glob(pattern).map_err(|e| QueueError::Glob {
        pattern: pattern.clone(),
        reason: e.to_string(),
      })?;
      let mut matches = Vec::new();
      for entry in paths {
        let path = entry.map_err(|e| QueueError::Glob {
          pattern: pattern.clone(),
          reason: e.to_string(),
        })?;
        matches.push(path.display().to_string());
      }
      (bind_items(std::slice::from_ref(var), &matches), *count_per_item)
    }
  };

  Ok(QueueIterator { items, count_per_item, pos: 0 })
}

/// Splits each raw item on `,` if present else whitespace, and zips the
/// fields against `vars` in order (§4.5: inline-list and from-file both
/// bind this way; extra fields beyond `vars.len()` are dropped, missing
/// fields bind to an empty string).
fn bind_items(vars: &[String], raw_items: &[String]) -> Vec<QueueItem> {
  raw_items
    .iter()
    .enumerate()
    .map(|(item_index, raw)| {
      let fields: Vec<&str> = if raw.contains(',') {
        raw.split(',').map(str::trim).collect()
      } else {
        raw.split_whitespace().collect()
      };
      let bound = vars
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), fields.get(i).copied().unwrap_or("").to_string()))
        .collect();
      QueueItem { item_index: item_index as u32, item: raw.clone(), vars: bound }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn simple_queue_counts_by_n_only() {
    let it = build(&QueueSpec::Simple { count_per_item: 3 }).unwrap();
    assert_eq!(it.count(), 3);
    assert_eq!(it.values().len(), 3);
  }

  #[test]
  fn inline_list_binds_vars_in_order() {
    let spec = QueueSpec::InlineList {
      count_per_item: 2,
      vars: vec!["name".to_string()],
      items: vec!["Alice".to_string(), "Bob".to_string()],
    };
    let it = build(&spec).unwrap();
    assert_eq!(it.count(), 4);
    let values = it.values();
    assert_eq!(values[0].0.vars, vec![("name".to_string(), "Alice".to_string())]);
    assert_eq!(values[2].0.vars, vec![("name".to_string(), "Bob".to_string())]);
    assert_eq!(values[0].1, 0);
    assert_eq!(values[1].1, 1);
  }

  #[test]
  fn inline_list_splits_multi_field_items_on_comma() {
    let spec = QueueSpec::InlineList {
      count_per_item: 1,
      vars: vec!["name".to_string(), "size".to_string()],
      items: vec!["Alice,10".to_string(), "Bob 20".to_string()],
    };
    let it = build(&spec).unwrap();
    let values = it.values();
    assert_eq!(
      values[0].0.vars,
      vec![("name".to_string(), "Alice".to_string()), ("size".to_string(), "10".to_string())]
    );
    assert_eq!(
      values[1].0.vars,
      vec![("name".to_string(), "Bob".to_string()), ("size".to_string(), "20".to_string())]
    );
  }

  #[test]
  fn next_walks_item_major_step_minor() {
    let spec = QueueSpec::InlineList {
      count_per_item: 2,
      vars: vec![],
      items: vec!["a".to_string(), "b".to_string()],
    };
    let mut it = build(&spec).unwrap();
    let mut seen = Vec::new();
    while let Some((item, step)) = it.next() {
      seen.push((item.item_index, step));
    }
    assert_eq!(seen, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    assert!(it.next().is_none());
  }

  #[test]
  fn from_file_skips_blank_and_comment_lines() {
    let dir = std::env::temp_dir();
    let path = dir.join(format!("queue_iter_test_{}.txt", std::process::id()));
    std::fs::write(&path, "alpha\n# comment\n\nbeta,1\n").unwrap();
    let spec = QueueSpec::FromFile {
      count_per_item: 1,
      vars: vec!["name".to_string()],
      filename: path.to_string_lossy().to_string(),
    };
    let it = build(&spec).unwrap();
    assert_eq!(it.count(), 2);
    let _ = std::fs::remove_file(&path);
  }
}
