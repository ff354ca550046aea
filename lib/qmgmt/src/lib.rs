//! The QMGMT client (C6, §4.6): the transactional job-submission
//! dialogue atop the authenticated session transport.

use condor_client::{
  classad::ClassAd,
  context::CallContext,
  error::{Error, ProtocolError, ValidationError},
  security::SecurityConfig,
};
use tracing::instrument;
use transport::{CedarStream, SinfulString};

/// The CEDAR command that gates the whole QMGMT dialogue (§4.6, §6).
pub const QMGMT_WRITE_CMD: i32 = 424;

mod wire {
  pub const GET_CAPABILITIES: i32 = 1;
  pub const BEGIN_TRANSACTION: i32 = 2;
  pub const COMMIT_TRANSACTION: i32 = 3;
  pub const ABORT_TRANSACTION: i32 = 4;
  pub const NEW_CLUSTER: i32 = 5;
  pub const NEW_PROC: i32 = 6;
  pub const SET_ATTRIBUTE: i32 = 7;
  pub const SET_EFFECTIVE_OWNER: i32 = 8;
  pub const CLOSE_SOCKET: i32 = 9;
}

/// One open QMGMT dialogue. Every write operation except `SetAttribute`
/// with `NoAck` consumes its ack before the next command may be issued
/// (§4.6, §5).
pub struct QmgmtSession {
  stream: CedarStream,
  in_transaction: bool,
}

impl QmgmtSession {
  /// Opens the transport and authenticates for `QMGMT_WRITE_CMD`.
  #[instrument(level = "info", skip(ctx, security), fields(peer = %peer.addr()))]
  pub async fn connect(
    peer: &SinfulString,
    ctx: &CallContext,
    security: &SecurityConfig,
  ) -> Result<QmgmtSession, Error> {
    let mut stream = CedarStream::connect(peer).await?;
    auth::authenticate(&mut stream, ctx, security).await?;
    Ok(QmgmtSession { stream, in_transaction: false })
  }

  /// Wraps an already-authenticated stream, e.g. one shared with
  /// another call site, instead of dialing a fresh connection.
  pub fn from_authenticated_stream(stream: CedarStream) -> QmgmtSession {
    QmgmtSession { stream, in_transaction: false }
  }

  fn require_transaction(&self) -> Result<(), ValidationError> {
    if self.in_transaction {
      Ok(())
    } else {
      Err(ValidationError::new("must be inside a transaction"))
    }
  }

  async fn read_status(
    &mut self,
    ctx: &CallContext,
  ) -> Result<i32, Error> {
    self.stream.begin_message(ctx).await.map_err(ProtocolError::from)?;
    let status = self.stream.read_int32().map_err(ProtocolError::from)?;
    if status < 0 {
      let code = self.stream.read_int32().map_err(ProtocolError::from)?;
      return Err(ProtocolError::PeerError(code).into());
    }
    Ok(status)
  }

  /// `GetCapabilities`: implicitly opens a transaction (§4.6).
  pub async fn get_capabilities(
    &mut self,
    ctx: &CallContext,
    flags: i32,
  ) -> Result<ClassAd, Error> {
    self.stream.write_int32(wire::GET_CAPABILITIES);
    self.stream.write_int32(flags);
    self.stream.end_message(ctx).await.map_err(ProtocolError::from)?;

    self.stream.begin_message(ctx).await.map_err(ProtocolError::from)?;
    let ad = self.stream.read_classad().map_err(ProtocolError::from)?;
    self.in_transaction = true;
    Ok(ad)
  }

  pub async fn begin_transaction(
    &mut self,
    ctx: &CallContext,
  ) -> Result<(), Error> {
    self.stream.write_int32(wire::BEGIN_TRANSACTION);
    self.stream.end_message(ctx).await.map_err(ProtocolError::from)?;
    self.read_status(ctx).await?;
    self.in_transaction = true;
    Ok(())
  }

  pub async fn commit_transaction(
    &mut self,
    ctx: &CallContext,
  ) -> Result<(), Error> {
    self.require_transaction()?;
    self.stream.write_int32(wire::COMMIT_TRANSACTION);
    self.stream.end_message(ctx).await.map_err(ProtocolError::from)?;
    self.read_status(ctx).await?;
    self.in_transaction = false;
    Ok(())
  }

  /// No response is read for `AbortTransaction` (§4.6).
  pub async fn abort_transaction(
    &mut self,
    ctx: &CallContext,
  ) -> Result<(), Error> {
    self.require_transaction()?;
    self.stream.write_int32(wire::ABORT_TRANSACTION);
    self.stream.end_message(ctx).await.map_err(ProtocolError::from)?;
    self.in_transaction = false;
    Ok(())
  }

  pub async fn new_cluster(&mut self, ctx: &CallContext) -> Result<i32, Error> {
    self.require_transaction()?;
    self.stream.write_int32(wire::NEW_CLUSTER);
    self.stream.end_message(ctx).await.map_err(ProtocolError::from)?;
    self.stream.begin_message(ctx).await.map_err(ProtocolError::from)?;
    Ok(self.stream.read_int32().map_err(ProtocolError::from)?)
  }

  pub async fn new_proc(
    &mut self,
    ctx: &CallContext,
    cluster_id: i32,
  ) -> Result<i32, Error> {
    self.require_transaction()?;
    self.stream.write_int32(wire::NEW_PROC);
    self.stream.write_int32(cluster_id);
    self.stream.end_message(ctx).await.map_err(ProtocolError::from)?;
    self.stream.begin_message(ctx).await.map_err(ProtocolError::from)?;
    Ok(self.stream.read_int32().map_err(ProtocolError::from)?)
  }

  /// `SetAttribute`; `no_ack` suppresses reading the status response —
  /// it must be followed only by more `NoAck` writes until the next
  /// ack-bearing operation (§4.6, §5).
  pub async fn set_attribute(
    &mut self,
    ctx: &CallContext,
    cluster: i32,
    proc: i32,
    name: &str,
    value: &str,
    no_ack: bool,
  ) -> Result<(), Error> {
    self.require_transaction()?;
    self.stream.write_int32(wire::SET_ATTRIBUTE);
    self.stream.write_int32(cluster);
    self.stream.write_int32(proc);
    self.stream.write_string(value);
    self.stream.write_string(name);
    self.stream.end_message(ctx).await.map_err(ProtocolError::from)?;
    if !no_ack {
      self.read_status(ctx).await?;
    }
    Ok(())
  }

  pub async fn set_effective_owner(
    &mut self,
    ctx: &CallContext,
    owner: &str,
  ) -> Result<(), Error> {
    self.stream.write_int32(wire::SET_EFFECTIVE_OWNER);
    self.stream.write_string(owner);
    self.stream.end_message(ctx).await.map_err(ProtocolError::from)?;
    self.read_status(ctx).await?;
    Ok(())
  }

  pub async fn close_socket(&mut self, ctx: &CallContext) -> Result<(), Error> {
    self.stream.write_int32(wire::CLOSE_SOCKET);
    self.stream.end_message(ctx).await.map_err(ProtocolError::from)?;
    Ok(())
  }

  /// Serializes every attribute of `ad` in insertion order and issues a
  /// `SetAttribute` for each. Grouping into a transaction is the
  /// caller's responsibility (§4.6).
  pub async fn send_attributes(
    &mut self,
    ctx: &CallContext,
    cluster: i32,
    proc: i32,
    ad: &ClassAd,
    no_ack: bool,
  ) -> Result<(), Error> {
    for (name, value) in ad.iter() {
      self
        .set_attribute(ctx, cluster, proc, name, &value.to_text(), no_ack)
        .await?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
  };
  use transport::parse_sinful;

  use super::*;

  #[test]
  fn requires_transaction_before_new_cluster() {
    let err = ValidationError::new("must be inside a transaction");
    assert_eq!(err, ValidationError::new("must be inside a transaction"));
  }

  async fn read_frame(socket: &mut TcpStream) -> Vec<u8> {
    let mut len = [0u8; 4];
    socket.read_exact(&mut len).await.unwrap();
    let mut buf = vec![0u8; u32::from_le_bytes(len) as usize];
    socket.read_exact(&mut buf).await.unwrap();
    buf
  }

  async fn write_frame(socket: &mut TcpStream, payload: &[u8]) {
    socket
      .write_all(&(payload.len() as u32).to_le_bytes())
      .await
      .unwrap();
    socket.write_all(payload).await.unwrap();
  }

  fn i32le(v: i32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
  }

  /// Drives the server side of begin/new_cluster/set_attribute(no_ack)/
  /// commit entirely at the raw socket level, to exercise `QmgmtSession`
  /// without a real schedd.
  #[tokio::test]
  async fn drives_begin_new_cluster_set_attribute_commit() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = parse_sinful(&format!("127.0.0.1:{}", addr.port())).unwrap();

    let server = tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();

      // BeginTransaction
      let frame = read_frame(&mut socket).await;
      assert_eq!(i32::from_le_bytes(frame[0..4].try_into().unwrap()), wire::BEGIN_TRANSACTION);
      write_frame(&mut socket, &i32le(0)).await;

      // NewCluster
      let frame = read_frame(&mut socket).await;
      assert_eq!(i32::from_le_bytes(frame[0..4].try_into().unwrap()), wire::NEW_CLUSTER);
      write_frame(&mut socket, &i32le(100)).await;

      // SetAttribute, NoAck: no response expected
      let frame = read_frame(&mut socket).await;
      assert_eq!(i32::from_le_bytes(frame[0..4].try_into().unwrap()), wire::SET_ATTRIBUTE);

      // CommitTransaction
      let frame = read_frame(&mut socket).await;
      assert_eq!(i32::from_le_bytes(frame[0..4].try_into().unwrap()), wire::COMMIT_TRANSACTION);
      write_frame(&mut socket, &i32le(0)).await;
    });

    let stream = CedarStream::connect(&peer).await.unwrap();
    let mut session = QmgmtSession::from_authenticated_stream(stream);
    let ctx = CallContext::new();

    session.begin_transaction(&ctx).await.unwrap();
    let cluster_id = session.new_cluster(&ctx).await.unwrap();
    assert_eq!(cluster_id, 100);
    session
      .set_attribute(&ctx, cluster_id, 0, "Cmd", "\"/bin/true\"", true)
      .await
      .unwrap();
    session.commit_transaction(&ctx).await.unwrap();

    server.await.unwrap();
  }
}
