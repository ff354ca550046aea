//! Collector queries (C8, §4.8): typed ad queries with optional
//! projection and constraint, streamed as they arrive.

use condor_client::{
  classad::ClassAd, context::CallContext, error::{Error, ProtocolError},
  security::SecurityConfig,
};
use rate_limit::RateLimiter;
use transport::{CedarStream, SinfulString};

/// The ad kinds the collector indexes, and the synonyms accepted for
/// each (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdType {
  Startd,
  Schedd,
  Master,
  Submitter,
  License,
  Collector,
  Negotiator,
}

impl AdType {
  pub fn parse(token: &str) -> Option<AdType> {
    match token.to_ascii_lowercase().as_str() {
      "startd" | "machine" => Some(AdType::Startd),
      "schedd" => Some(AdType::Schedd),
      "master" => Some(AdType::Master),
      "submitter" => Some(AdType::Submitter),
      "license" => Some(AdType::License),
      "collector" => Some(AdType::Collector),
      "negotiator" => Some(AdType::Negotiator),
      _ => None,
    }
  }

  /// The query command code for this ad type (§4.8, §6: `QUERY_*_ADS`).
  pub fn query_command(self) -> i32 {
    match self {
      AdType::Startd => 433,
      AdType::Schedd => 434,
      AdType::Master => 435,
      AdType::Submitter => 436,
      AdType::License => 437,
      AdType::Collector => 438,
      AdType::Negotiator => 439,
    }
  }

  pub fn target_type(self) -> &'static str {
    match self {
      AdType::Startd => "Machine",
      AdType::Schedd => "Scheduler",
      AdType::Master => "Master",
      AdType::Submitter => "Submitter",
      AdType::License => "License",
      AdType::Collector => "Collector",
      AdType::Negotiator => "Negotiator",
    }
  }
}

/// Issues a query for `ad_type`, streaming matching ads into a `Vec` as
/// they arrive. A `constraint` of `""` is equivalent to `true` (§8
/// boundary behavior).
pub async fn query_ads(
  peer: &SinfulString,
  ctx: &CallContext,
  security: &SecurityConfig,
  limiter: &RateLimiter,
  user: Option<&str>,
  ad_type: AdType,
  constraint: &str,
  projection: Option<&[&str]>,
) -> Result<Vec<ClassAd>, Error> {
  limiter.wait(ctx, user).await?;

  let mut stream = CedarStream::connect(peer).await?;
  auth::authenticate(&mut stream, ctx, security).await?;

  let mut query = ClassAd::new();
  query.insert("MyType", "Query");
  query.insert("TargetType", ad_type.target_type());
  query.insert(
    "Requirements",
    if constraint.is_empty() { "true" } else { constraint },
  );
  if let Some(projection) = projection {
    query.insert("ProjectionAttributes", projection.join(","));
  }

  stream.write_int32(ad_type.query_command());
  stream.write_classad(&query);
  stream.end_message(ctx).await.map_err(ProtocolError::from)?;

  let mut results = Vec::new();
  loop {
    stream.begin_message(ctx).await.map_err(ProtocolError::from)?;
    let more = stream.read_int32().map_err(ProtocolError::from)?;
    if more == 0 {
      break;
    }
    stream.begin_message(ctx).await.map_err(ProtocolError::from)?;
    results.push(stream.read_classad().map_err(ProtocolError::from)?);
  }

  Ok(results)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_synonyms() {
    assert_eq!(AdType::parse("Machine"), Some(AdType::Startd));
    assert_eq!(AdType::parse("STARTD"), Some(AdType::Startd));
    assert_eq!(AdType::parse("bogus"), None);
  }

  #[test]
  fn target_type_strings_match_daemon_conventions() {
    assert_eq!(AdType::Startd.target_type(), "Machine");
    assert_eq!(AdType::Schedd.target_type(), "Scheduler");
  }
}
