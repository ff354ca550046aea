//! The negotiated-session data model (C4, §3): reused across calls to
//! the same peer to avoid re-handshaking. The cache that keys these by
//! peer address lives in the `auth` crate.

use std::time::Instant;

#[derive(Debug, Clone)]
pub struct Session {
  pub peer_identity: String,
  pub shared_keys: Vec<u8>,
  pub auth_method: String,
  pub expires_at: Instant,
}

impl Session {
  pub fn is_expired(&self) -> bool {
    Instant::now() >= self.expires_at
  }
}
