//! The error taxonomy from §7. Every protocol crate composes these into
//! its own `Error` enum (e.g. `qmgmt::Error`, `transfer::Error`) instead
//! of inventing a parallel one, so callers can match a single vocabulary
//! across the whole client.

use crate::context::CallContextError;

/// Transport could not be opened.
#[derive(Debug, thiserror::Error)]
#[error("failed to connect to {peer}: {source}")]
pub struct ConnectError {
  pub peer: String,
  #[source]
  pub source: std::io::Error,
}

/// Authentication/negotiation failed, or negotiated a method outside
/// the requested set.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
  #[error("authentication failed: {0}")]
  Failed(String),
  #[error(
    "negotiated method {negotiated:?} is not in the requested set {requested:?}"
  )]
  MethodNotOffered {
    negotiated: String,
    requested: Vec<String>,
  },
  #[error("peer closed connection during handshake")]
  PeerClosed,
}

/// Wire-level framing violation or unexpected status code.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
  #[error("unexpected status code {0}")]
  UnexpectedStatus(i32),
  #[error("peer-reported error code {0}")]
  PeerError(i32),
  #[error("malformed message: {0}")]
  Malformed(String),
  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),
}

/// Caller misuse, e.g. both constraint and id list, or an empty id set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
  pub fn new(msg: impl Into<String>) -> ValidationError {
    ValidationError(msg.into())
  }
}

/// A path-traversal or output-filter rejection. Logged, not fatal: the
/// transfer continues after the offending entry's payload is drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainmentEvent {
  pub raw_name: String,
  pub reason: ContainmentReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainmentReason {
  PathTraversal,
  NotInOutputFilter,
}

/// The peer reported a non-zero `Result` in a TransferAck.
#[derive(Debug, Clone, thiserror::Error)]
#[error("transfer failed: {hold_reason:?}")]
pub struct TransferAckError {
  pub result: i64,
  pub hold_reason: Option<String>,
}

/// Rejected by a rate limiter (non-blocking path only).
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("rate limited")]
pub struct RateLimitedError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error(transparent)]
  Connect(#[from] ConnectError),
  #[error(transparent)]
  Handshake(#[from] HandshakeError),
  #[error(transparent)]
  Protocol(#[from] ProtocolError),
  #[error(transparent)]
  Validation(#[from] ValidationError),
  #[error(transparent)]
  TransferAck(#[from] TransferAckError),
  #[error(transparent)]
  RateLimited(#[from] RateLimitedError),
  #[error("canceled")]
  Cancelled,
  #[error("deadline exceeded")]
  DeadlineExceeded,
}

impl From<CallContextError> for Error {
  fn from(e: CallContextError) -> Self {
    match e {
      CallContextError::Cancelled => Error::Cancelled,
      CallContextError::DeadlineExceeded => Error::DeadlineExceeded,
    }
  }
}
