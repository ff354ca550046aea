use std::fmt;

/// A job identifier: `(cluster, proc)`. `proc == -1` denotes the cluster
/// template ad produced by late-materialization submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId {
  pub cluster: i32,
  pub proc: i32,
}

impl JobId {
  pub const CLUSTER_TEMPLATE_PROC: i32 = -1;

  pub fn new(cluster: i32, proc: i32) -> JobId {
    JobId { cluster, proc }
  }

  pub fn is_cluster_template(&self) -> bool {
    self.proc == Self::CLUSTER_TEMPLATE_PROC
  }
}

impl fmt::Display for JobId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.cluster, self.proc)
  }
}

impl std::str::FromStr for JobId {
  type Err = ParseJobIdError;

  /// Parses the `"cluster.proc"` token form used on the wire for
  /// `ActionIds` (§4.7).
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (cluster, proc) = s
      .split_once('.')
      .ok_or_else(|| ParseJobIdError(s.to_string()))?;
    let cluster = cluster
      .parse()
      .map_err(|_| ParseJobIdError(s.to_string()))?;
    let proc = proc.parse().map_err(|_| ParseJobIdError(s.to_string()))?;
    Ok(JobId { cluster, proc })
  }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid job id token: {0:?}, expected \"cluster.proc\"")]
pub struct ParseJobIdError(pub String);

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips_token_form() {
    let id: JobId = "123.4".parse().unwrap();
    assert_eq!(id, JobId::new(123, 4));
    assert_eq!(id.to_string(), "123.4");
  }

  #[test]
  fn rejects_malformed_token() {
    assert!("123".parse::<JobId>().is_err());
    assert!("abc.4".parse::<JobId>().is_err());
  }
}
