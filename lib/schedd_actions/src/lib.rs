//! Schedd actions (C7, §4.7): hold/release/remove/suspend/continue by
//! constraint or by id set.

use condor_client::{
  action::{JobAction, JobActionResult},
  classad::ClassAd,
  context::CallContext,
  error::{Error, ProtocolError, ValidationError},
  job::JobId,
  security::SecurityConfig,
};
use rate_limit::RateLimiter;
use transport::{CedarStream, SinfulString};

/// The CEDAR command for the action sub-protocol (§4.7, §6).
pub const ACT_ON_JOBS: i32 = 425;

/// Whether the result ad should carry per-result totals only, or a
/// per-job breakdown (§4.7 names both kinds; only `Totals` is parsed
/// into `ActionOutcome` here since that's what `result_total_N` feeds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
  Totals,
  Long,
}

impl ResultType {
  fn as_str(self) -> &'static str {
    match self {
      ResultType::Totals => "Totals",
      ResultType::Long => "Long",
    }
  }
}

/// Either a constraint expression or an explicit id set — never both
/// (§7, §8 scenario 6).
#[derive(Debug, Clone)]
pub enum JobSelector {
  Constraint(String),
  Ids(Vec<JobId>),
}

impl JobSelector {
  /// Builds a selector from caller-supplied optional constraint/id-list
  /// pairs, rejecting the case callers of a looser API (e.g. a CLI flag
  /// pair) can actually hit: both given at once (§8 scenario 6) or
  /// neither given at all.
  pub fn from_parts(
    constraint: Option<String>,
    ids: Vec<JobId>,
  ) -> Result<JobSelector, ValidationError> {
    match (constraint, ids.is_empty()) {
      (Some(_), false) => {
        Err(ValidationError::new("cannot specify both constraint and ids"))
      }
      (Some(expr), true) => Ok(JobSelector::Constraint(expr)),
      (None, false) => Ok(JobSelector::Ids(ids)),
      (None, true) => Err(ValidationError::new("must specify constraint or ids")),
    }
  }
}

/// The per-outcome tally plus the peer's own job count, preferred when
/// larger than the sum of the tallies (§4.7).
#[derive(Debug, Clone, Default)]
pub struct ActionOutcome {
  pub success: u64,
  pub not_found: u64,
  pub bad_status: u64,
  pub already_done: u64,
  pub permission_denied: u64,
  pub error: u64,
  pub total_jobs: u64,
}

fn job_action_code(action: JobAction) -> i64 {
  match action {
    JobAction::Error => 0,
    JobAction::Hold => 1,
    JobAction::Release => 2,
    JobAction::Remove => 3,
    JobAction::RemoveForce => 4,
    JobAction::Vacate => 5,
    JobAction::VacateFast => 6,
    JobAction::Suspend => 7,
    JobAction::Continue => 8,
  }
}

fn result_slot(result: JobActionResult) -> usize {
  match result {
    JobActionResult::Error => 0,
    JobActionResult::Success => 1,
    JobActionResult::NotFound => 2,
    JobActionResult::BadStatus => 3,
    JobActionResult::AlreadyDone => 4,
    JobActionResult::PermissionDenied => 5,
  }
}

/// Issues `action` against `selector` and parses the peer's tally
/// (§4.7). Blocks on `limiter` (the schedd limiter, §4.10) before
/// opening the connection.
pub async fn act_on_jobs(
  peer: &SinfulString,
  ctx: &CallContext,
  security: &SecurityConfig,
  limiter: &RateLimiter,
  user: Option<&str>,
  action: JobAction,
  selector: &JobSelector,
  reason: Option<&str>,
) -> Result<ActionOutcome, Error> {
  validate_selector(selector)?;
  limiter.wait(ctx, user).await?;

  let mut stream = CedarStream::connect(peer).await?;
  auth::authenticate(&mut stream, ctx, security).await?;

  let mut command = ClassAd::new();
  command.insert("JobAction", job_action_code(action));
  command.insert("ActionResultType", ResultType::Totals.as_str());
  match selector {
    JobSelector::Constraint(expr) => {
      command.insert("ActionConstraint", expr.as_str());
    }
    JobSelector::Ids(ids) => {
      let joined = ids
        .iter()
        .map(JobId::to_string)
        .collect::<Vec<_>>()
        .join(",");
      command.insert("ActionIds", joined);
    }
  }
  if let Some(reason) = reason {
    command.insert("Reason", reason);
  }

  stream.write_int32(ACT_ON_JOBS);
  stream.write_classad(&command);
  stream.end_message(ctx).await.map_err(ProtocolError::from)?;

  stream.begin_message(ctx).await.map_err(ProtocolError::from)?;
  let result = stream.read_classad().map_err(ProtocolError::from)?;

  let action_result = result.evaluate("ActionResult").as_integer().unwrap_or(0);
  if action_result == 1 {
    stream.write_int32(1);
    stream.end_message(ctx).await.map_err(ProtocolError::from)?;
    stream.begin_message(ctx).await.map_err(ProtocolError::from)?;
    stream.read_int32().map_err(ProtocolError::from)?;
  }

  Ok(parse_outcome(&result))
}

fn validate_selector(selector: &JobSelector) -> Result<(), ValidationError> {
  if let JobSelector::Ids(ids) = selector
    && ids.is_empty()
  {
    return Err(ValidationError::new("id set must not be empty"));
  }
  Ok(())
}

/// Parses `result_total_N` attributes (§8 scenario 4).
fn parse_outcome(result: &ClassAd) -> ActionOutcome {
  let totals: [u64; 6] = std::array::from_fn(|slot| {
    result
      .evaluate(&format!("result_total_{slot}"))
      .as_integer()
      .unwrap_or(0) as u64
  });

  let mut outcome = ActionOutcome {
    error: totals[result_slot(JobActionResult::Error)],
    success: totals[result_slot(JobActionResult::Success)],
    not_found: totals[result_slot(JobActionResult::NotFound)],
    bad_status: totals[result_slot(JobActionResult::BadStatus)],
    already_done: totals[result_slot(JobActionResult::AlreadyDone)],
    permission_denied: totals[result_slot(JobActionResult::PermissionDenied)],
    total_jobs: 0,
  };

  let summed: u64 = totals.iter().sum();
  let reported_total =
    result.evaluate("TotalJobAds").as_integer().unwrap_or(0) as u64;
  outcome.total_jobs = summed.max(reported_total);
  outcome
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_empty_id_selector() {
    let err = validate_selector(&JobSelector::Ids(Vec::new())).unwrap_err();
    assert_eq!(err, ValidationError::new("id set must not be empty"));
  }

  #[test]
  fn accepts_non_empty_selectors() {
    assert!(
      validate_selector(&JobSelector::Constraint("true".into())).is_ok()
    );
    assert!(
      validate_selector(&JobSelector::Ids(vec![JobId::new(1, 0)])).is_ok()
    );
  }

  #[test]
  fn from_parts_rejects_both_constraint_and_ids() {
    let err =
      JobSelector::from_parts(Some("true".into()), vec![JobId::new(1, 0)])
        .unwrap_err();
    assert_eq!(
      err,
      ValidationError::new("cannot specify both constraint and ids")
    );
  }

  #[test]
  fn from_parts_rejects_neither() {
    let err = JobSelector::from_parts(None, Vec::new()).unwrap_err();
    assert_eq!(err, ValidationError::new("must specify constraint or ids"));
  }

  #[test]
  fn parses_tallies_and_prefers_larger_total_job_ads() {
    let mut ad = ClassAd::new();
    ad.insert("result_total_0", 0i64);
    ad.insert("result_total_1", 8i64);
    ad.insert("result_total_2", 1i64);
    ad.insert("result_total_5", 1i64);
    ad.insert("TotalJobAds", 10i64);

    let outcome = parse_outcome(&ad);
    assert_eq!(outcome.success, 8);
    assert_eq!(outcome.not_found, 1);
    assert_eq!(outcome.permission_denied, 1);
    assert_eq!(outcome.total_jobs, 10);
  }

  #[test]
  fn total_jobs_falls_back_to_summed_tallies() {
    let mut ad = ClassAd::new();
    ad.insert("result_total_1", 3i64);
    ad.insert("result_total_2", 2i64);
    let outcome = parse_outcome(&ad);
    assert_eq!(outcome.total_jobs, 5);
  }
}
