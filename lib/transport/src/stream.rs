//! A CEDAR stream: a TCP connection carrying length-framed messages,
//! each holding a sequence of typed primitives (§4.3, §6). One message
//! is buffered client-side and flushed as a single length-prefixed
//! frame on `end_message`; the peer's messages are read the same way.

use condor_client::{
  classad::ClassAd,
  context::CallContext,
  error::{ConnectError, ProtocolError},
};
use tokio::{
  io::{AsyncReadExt, AsyncWriteExt},
  net::TcpStream,
};
use tracing::instrument;

use crate::sinful::SinfulString;

pub struct CedarStream {
  socket: TcpStream,
  peer: String,
  write_buf: Vec<u8>,
  read_buf: Vec<u8>,
  read_pos: usize,
  authenticated: bool,
}

impl CedarStream {
  #[instrument(level = "debug", skip_all, fields(peer = %peer.addr()))]
  pub async fn connect(peer: &SinfulString) -> Result<CedarStream, ConnectError> {
    let addr = peer.addr();
    let socket = TcpStream::connect(&addr).await.map_err(|source| {
      tracing::warn!(peer = %addr, error = %source, "connect failed");
      ConnectError { peer: addr.clone(), source }
    })?;
    Ok(CedarStream {
      socket,
      peer: addr,
      write_buf: Vec::new(),
      read_buf: Vec::new(),
      read_pos: 0,
      authenticated: false,
    })
  }

  /// Wraps an already-connected socket, e.g. the server side of a
  /// loopback test or an accept-loop peer, instead of dialing out.
  pub fn from_socket(socket: TcpStream, peer: String) -> CedarStream {
    CedarStream {
      socket,
      peer,
      write_buf: Vec::new(),
      read_buf: Vec::new(),
      read_pos: 0,
      authenticated: false,
    }
  }

  pub fn peer(&self) -> &str {
    &self.peer
  }

  pub fn mark_authenticated(&mut self) {
    self.authenticated = true;
  }

  pub fn is_authenticated(&self) -> bool {
    self.authenticated
  }

  // --- writers: buffered until end_message ---

  pub fn write_int32(&mut self, value: i32) {
    self.write_buf.extend_from_slice(&value.to_le_bytes());
  }

  pub fn write_int64(&mut self, value: i64) {
    self.write_buf.extend_from_slice(&value.to_le_bytes());
  }

  pub fn write_string(&mut self, value: &str) {
    self.write_bytes(value.as_bytes());
  }

  pub fn write_bytes(&mut self, value: &[u8]) {
    self.write_int32(value.len() as i32);
    self.write_buf.extend_from_slice(value);
  }

  pub fn write_classad(&mut self, ad: &ClassAd) {
    self.write_string(&ad.to_old_form());
  }

  /// Flushes the buffered primitives as one length-prefixed frame,
  /// cancellable at the write boundary (§5).
  #[instrument(level = "debug", skip_all, fields(peer = %self.peer, len = self.write_buf.len()))]
  pub async fn end_message(
    &mut self,
    ctx: &CallContext,
  ) -> Result<(), ProtocolError> {
    let frame_len = self.write_buf.len() as u32;
    let write = async {
      self.socket.write_all(&frame_len.to_le_bytes()).await?;
      self.socket.write_all(&self.write_buf).await?;
      self.socket.flush().await
    };
    ctx
      .run(write)
      .await
      .map_err(|_| ProtocolError::Malformed("canceled mid-write".into()))?
      .map_err(ProtocolError::Io)?;
    self.write_buf.clear();
    Ok(())
  }

  // --- readers: pull from one buffered frame ---

  /// Reads the next complete frame from the peer into the read buffer.
  /// Must be called once before reading the primitives of a new message.
  #[instrument(level = "debug", skip_all, fields(peer = %self.peer))]
  pub async fn begin_message(
    &mut self,
    ctx: &CallContext,
  ) -> Result<(), ProtocolError> {
    let read = async {
      let mut len_buf = [0u8; 4];
      self.socket.read_exact(&mut len_buf).await?;
      let len = u32::from_le_bytes(len_buf) as usize;
      let mut buf = vec![0u8; len];
      self.socket.read_exact(&mut buf).await?;
      Ok::<_, std::io::Error>(buf)
    };
    let buf = ctx
      .run(read)
      .await
      .map_err(|_| ProtocolError::Malformed("canceled mid-read".into()))?
      .map_err(ProtocolError::Io)?;
    self.read_buf = buf;
    self.read_pos = 0;
    Ok(())
  }

  fn take(&mut self, n: usize) -> Result<&[u8], ProtocolError> {
    if self.read_pos + n > self.read_buf.len() {
      return Err(ProtocolError::Malformed(
        "message ended before expected primitive".into(),
      ));
    }
    let slice = &self.read_buf[self.read_pos..self.read_pos + n];
    self.read_pos += n;
    Ok(slice)
  }

  pub fn read_int32(&mut self) -> Result<i32, ProtocolError> {
    let bytes: [u8; 4] = self.take(4)?.try_into().unwrap();
    Ok(i32::from_le_bytes(bytes))
  }

  pub fn read_int64(&mut self) -> Result<i64, ProtocolError> {
    let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
    Ok(i64::from_le_bytes(bytes))
  }

  pub fn read_bytes(&mut self) -> Result<Vec<u8>, ProtocolError> {
    let len = self.read_int32()?;
    if len < 0 {
      return Err(ProtocolError::Malformed("negative length".into()));
    }
    Ok(self.take(len as usize)?.to_vec())
  }

  pub fn read_string(&mut self) -> Result<String, ProtocolError> {
    let bytes = self.read_bytes()?;
    String::from_utf8(bytes)
      .map_err(|e| ProtocolError::Malformed(e.to_string()))
  }

  pub fn read_classad(&mut self) -> Result<ClassAd, ProtocolError> {
    let text = self.read_string()?;
    ClassAd::parse_old_form(&text)
      .map_err(|e| ProtocolError::Malformed(e.to_string()))
  }

  /// True once every primitive in the current frame has been consumed.
  pub fn message_exhausted(&self) -> bool {
    self.read_pos >= self.read_buf.len()
  }
}

#[cfg(test)]
mod tests {
  use tokio::net::TcpListener;

  use super::*;

  async fn loopback_pair() -> (CedarStream, CedarStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = SinfulString {
      host: "127.0.0.1".to_string(),
      port: addr.port(),
      params: Default::default(),
    };
    let (client, (server, _)) = tokio::join!(
      CedarStream::connect(&peer),
      async { listener.accept().await.unwrap() }
    );
    let client = client.unwrap();
    let server = CedarStream {
      socket: server,
      peer: "127.0.0.1:0".to_string(),
      write_buf: Vec::new(),
      read_buf: Vec::new(),
      read_pos: 0,
      authenticated: false,
    };
    (client, server)
  }

  #[tokio::test]
  async fn round_trips_primitives_in_one_message() {
    let (mut client, mut server) = loopback_pair().await;
    let ctx = CallContext::new();

    client.write_int32(42);
    client.write_int64(-7);
    client.write_string("hello");
    client.end_message(&ctx).await.unwrap();

    server.begin_message(&ctx).await.unwrap();
    assert_eq!(server.read_int32().unwrap(), 42);
    assert_eq!(server.read_int64().unwrap(), -7);
    assert_eq!(server.read_string().unwrap(), "hello");
    assert!(server.message_exhausted());
  }

  #[tokio::test]
  async fn reading_past_end_of_message_errors() {
    let (mut client, mut server) = loopback_pair().await;
    let ctx = CallContext::new();

    client.write_int32(1);
    client.end_message(&ctx).await.unwrap();

    server.begin_message(&ctx).await.unwrap();
    assert_eq!(server.read_int32().unwrap(), 1);
    assert!(server.read_int32().is_err());
  }
}
