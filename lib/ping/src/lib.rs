//! Ping (C11, §4.11): runs only the handshake against a daemon and
//! reports the negotiated parameters. Used for readiness/diagnostics.

use auth::Negotiation;
use condor_client::{context::CallContext, error::Error, security::SecurityConfig};
use tracing::instrument;
use transport::{CedarStream, parse_sinful};

#[instrument(level = "info", skip(ctx, security), fields(peer = sinful))]
pub async fn ping(
  ctx: &CallContext,
  sinful: &str,
  security: &SecurityConfig,
) -> Result<Negotiation, Error> {
  let peer = parse_sinful(sinful)
    .map_err(|e| Error::Connect(condor_client::error::ConnectError {
      peer: sinful.to_string(),
      source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
    }))?;

  let mut stream = CedarStream::connect(&peer).await?;
  let negotiation = auth::authenticate(&mut stream, ctx, security).await?;
  tracing::info!(
    peer = sinful,
    method = %negotiation.auth_method,
    user = %negotiation.user,
    "ping succeeded"
  );
  Ok(negotiation)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn malformed_peer_surfaces_connect_error() {
    let ctx = CallContext::new();
    let security = SecurityConfig::defaults_for_peer(60, "peer");
    let result = ping(&ctx, "<no-port-here>", &security).await;
    assert!(matches!(result, Err(Error::Connect(_))));
  }
}
