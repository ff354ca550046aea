//! The submit-description data model (C5, §3/§4.5). The parser, macro
//! engine, and compilation rules live in the `submit` crate; this module
//! only holds the shapes they produce and consume.

use crate::classad::ClassAd;

/// One of the ten execution-model selectors a submit description may
/// choose via `universe = ...` (default `Vanilla`, §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Universe {
  Vanilla,
  Standard,
  Scheduler,
  Grid,
  Java,
  Parallel,
  Local,
  Vm,
  Docker,
}

impl Universe {
  /// `JobUniverse` numeric codes as assigned by the daemons (§8 scenario 1:
  /// Vanilla = 5).
  pub fn job_universe_code(self) -> i64 {
    match self {
      Universe::Standard => 1,
      Universe::Scheduler => 7,
      Universe::Grid => 9,
      Universe::Java => 10,
      Universe::Parallel => 11,
      Universe::Local => 12,
      Universe::Vm => 13,
      Universe::Vanilla => 5,
      Universe::Docker => 5,
    }
  }

  pub fn parse(token: &str) -> Universe {
    match token.to_ascii_lowercase().as_str() {
      "standard" => Universe::Standard,
      "scheduler" => Universe::Scheduler,
      "grid" => Universe::Grid,
      "java" => Universe::Java,
      "parallel" => Universe::Parallel,
      "local" => Universe::Local,
      "vm" => Universe::Vm,
      "docker" => Universe::Docker,
      _ => Universe::Vanilla,
    }
  }
}

/// The four `queue` iterator shapes a submit description may declare
/// (§4.5). `count_per_item` is the leading `queue [N]` count, default 1.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueSpec {
  /// `queue [N]`
  Simple { count_per_item: u32 },
  /// `queue [N] var[, var...] in (item1, item2, ...)`
  InlineList {
    count_per_item: u32,
    vars: Vec<String>,
    items: Vec<String>,
  },
  /// `queue [N] var[, var...] from filename`
  FromFile {
    count_per_item: u32,
    vars: Vec<String>,
    filename: String,
  },
  /// `queue [N] var matching pattern`
  Matching {
    count_per_item: u32,
    var: String,
    pattern: String,
  },
}

/// The parsed, pre-compile form of a submit file: the statement-language
/// view plus its single `queue` clause (§3).
#[derive(Debug, Clone)]
pub struct SubmitDescription {
  pub universe: Universe,
  pub queue: QueueSpec,
  /// Raw `key = value` assignments from the statement language, in
  /// source order, before macro expansion or typed translation.
  pub statements: Vec<(String, String)>,
}

/// The result of compiling a `SubmitDescription` against an allocated
/// cluster id (§3).
#[derive(Debug, Clone)]
pub struct SubmitResult {
  pub cluster_id: i32,
  pub num_procs: u32,
  pub cluster_ad: ClassAd,
  pub proc_ads: Vec<ClassAd>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn universe_defaults_and_parses() {
    assert_eq!(Universe::parse("bogus"), Universe::Vanilla);
    assert_eq!(Universe::parse("Grid"), Universe::Grid);
    assert_eq!(Universe::Vanilla.job_universe_code(), 5);
  }
}
