//! The GoAhead handshake (§4.9.4 step 3): a bidirectional permission
//! exchange that precedes bulk file bytes, run once per job unless a
//! prior round already returned `GoAheadAlways`.

use condor_client::{
  classad::ClassAd, context::CallContext, error::ProtocolError, transfer::GO_AHEAD_ALWAYS,
};
use transport::CedarStream;

/// Nominal keep-alive interval advertised by both sides (§4.9.4).
pub const ALIVE_INTERVAL_SECS: i32 = 300;

/// Runs the sending side of the handshake. Returns whether the peer's
/// `Result` was `GoAheadAlways`, meaning subsequent files in this job
/// skip the handshake entirely.
pub async fn sender_handshake(
  stream: &mut CedarStream,
  ctx: &CallContext,
) -> Result<bool, ProtocolError> {
  stream.write_int32(ALIVE_INTERVAL_SECS);
  stream.end_message(ctx).await?;

  stream.begin_message(ctx).await?;
  let go_ahead = stream.read_classad()?;
  let result = go_ahead.evaluate("Result").as_integer().unwrap_or(0);
  if result <= 0 {
    return Err(ProtocolError::Malformed(format!(
      "peer refused GoAhead: Result={result}"
    )));
  }

  stream.begin_message(ctx).await?;
  let _peer_alive_interval = stream.read_int32()?;

  let mut own_go_ahead = ClassAd::new();
  own_go_ahead.insert("Result", GO_AHEAD_ALWAYS);
  own_go_ahead.insert("Timeout", i64::from(ALIVE_INTERVAL_SECS));
  stream.write_classad(&own_go_ahead);
  stream.end_message(ctx).await?;

  Ok(result == GO_AHEAD_ALWAYS)
}

/// Runs the receiving side of the handshake, the inverse sequence of
/// [`sender_handshake`] (§4.9.4: "Receiver inverts the handshake").
pub async fn receiver_handshake(
  stream: &mut CedarStream,
  ctx: &CallContext,
) -> Result<bool, ProtocolError> {
  stream.begin_message(ctx).await?;
  let _peer_alive_interval = stream.read_int32()?;

  let mut go_ahead = ClassAd::new();
  go_ahead.insert("Result", GO_AHEAD_ALWAYS);
  go_ahead.insert("Timeout", i64::from(ALIVE_INTERVAL_SECS));
  stream.write_classad(&go_ahead);
  stream.end_message(ctx).await?;

  stream.write_int32(ALIVE_INTERVAL_SECS);
  stream.end_message(ctx).await?;

  stream.begin_message(ctx).await?;
  let peer_go_ahead = stream.read_classad()?;
  let result = peer_go_ahead.evaluate("Result").as_integer().unwrap_or(0);
  Ok(result == GO_AHEAD_ALWAYS)
}

#[cfg(test)]
mod tests {
  use condor_client::context::CallContext;
  use tokio::net::TcpListener;
  use transport::SinfulString;

  use super::*;

  async fn loopback_pair() -> (CedarStream, CedarStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peer =
      SinfulString { host: "127.0.0.1".to_string(), port: addr.port(), params: Default::default() };
    let (client, (server, _)) =
      tokio::join!(CedarStream::connect(&peer), async { listener.accept().await.unwrap() });
    (client.unwrap(), CedarStream::from_socket(server, "127.0.0.1:0".to_string()))
  }

  #[tokio::test]
  async fn handshake_round_trip_sets_always_flag() {
    let (mut sender, mut receiver) = loopback_pair().await;
    let ctx = CallContext::new();
    let (sender_result, receiver_result) = tokio::join!(
      sender_handshake(&mut sender, &ctx),
      receiver_handshake(&mut receiver, &ctx),
    );
    assert_eq!(sender_result.unwrap(), true);
    assert_eq!(receiver_result.unwrap(), true);
  }
}
