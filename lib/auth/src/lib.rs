//! The authenticator (C4, §4.4): drives the daemon `DC_AUTHENTICATE`
//! command, negotiates method/keys/identity, and caches the resulting
//! session by peer address so repeat calls skip re-handshaking.

use std::time::{Duration, Instant};

use cache::CloneCache;
use condor_client::{
  classad::ClassAd,
  context::CallContext,
  error::HandshakeError,
  security::SecurityConfig,
  session::Session,
};
use transport::CedarStream;

/// The CEDAR command code for the authentication sub-protocol (§4.11,
/// §6).
pub const DC_AUTHENTICATE: i32 = 60;

/// The outcome of a successful handshake (§4.4).
#[derive(Debug, Clone)]
pub struct Negotiation {
  pub user: String,
  pub session_id: String,
  pub auth_method: String,
  pub valid_commands: Vec<i32>,
  pub encryption: bool,
  pub authentication: bool,
}

/// Default lifetime assigned to a freshly negotiated session before it
/// must be re-authenticated.
const SESSION_TTL: Duration = Duration::from_secs(3600);

/// Runs the handshake against an already-connected stream for
/// `command`, using `security`'s preferred methods and levels. Returns
/// the negotiated parameters, or the negotiated-so-far state folded
/// into a [`HandshakeError`] on failure.
pub async fn authenticate(
  stream: &mut CedarStream,
  ctx: &CallContext,
  security: &SecurityConfig,
) -> Result<Negotiation, HandshakeError> {
  let mut request = ClassAd::new();
  request.insert(
    "AuthMethods",
    security
      .preferred_auth_methods
      .iter()
      .map(|m| m.0.as_str())
      .collect::<Vec<_>>()
      .join(","),
  );
  request.insert(
    "CryptoMethods",
    security
      .preferred_crypto_methods
      .iter()
      .map(|m| m.0.as_str())
      .collect::<Vec<_>>()
      .join(","),
  );
  request.insert("Command", security.command as i64);

  stream.write_int32(DC_AUTHENTICATE);
  stream.write_classad(&request);
  stream
    .end_message(ctx)
    .await
    .map_err(|e| HandshakeError::Failed(e.to_string()))?;

  stream
    .begin_message(ctx)
    .await
    .map_err(|e| HandshakeError::Failed(e.to_string()))?;
  let response = stream
    .read_classad()
    .map_err(|e| HandshakeError::Failed(e.to_string()))?;

  let negotiated_method = response
    .lookup("AuthMethod")
    .map(|v| v.as_str().unwrap_or_default().to_string())
    .ok_or_else(|| HandshakeError::Failed("missing AuthMethod".into()))?;

  if !security
    .preferred_auth_methods
    .iter()
    .any(|m| m.0.eq_ignore_ascii_case(&negotiated_method))
  {
    return Err(HandshakeError::MethodNotOffered {
      negotiated: negotiated_method,
      requested: security
        .preferred_auth_methods
        .iter()
        .map(|m| m.0.clone())
        .collect(),
    });
  }

  let user = response
    .lookup("User")
    .and_then(|v| v.as_str().map(str::to_string))
    .unwrap_or_default();
  let session_id = response
    .lookup("SessionId")
    .and_then(|v| v.as_str().map(str::to_string))
    .unwrap_or_default();
  let valid_commands = response
    .lookup("ValidCommands")
    .and_then(|v| v.as_str().map(str::to_string))
    .unwrap_or_default()
    .split(',')
    .filter(|s| !s.is_empty())
    .filter_map(|s| s.parse().ok())
    .collect();
  let encryption = response
    .lookup("Encrypt")
    .map(|v| v.as_bool().unwrap_or(false))
    .unwrap_or(false);
  let authentication = response
    .lookup("Authenticate")
    .map(|v| v.as_bool().unwrap_or(false))
    .unwrap_or(false);

  stream.mark_authenticated();

  Ok(Negotiation {
    user,
    session_id,
    auth_method: negotiated_method,
    valid_commands,
    encryption,
    authentication,
  })
}

/// Caches negotiated sessions by peer address (§4.4, §9: "keyed cache
/// indexed by peer address; entries are reused if not expired").
#[derive(Default)]
pub struct SessionCache {
  sessions: CloneCache<String, Session>,
}

impl SessionCache {
  pub fn new() -> SessionCache {
    SessionCache::default()
  }

  /// Returns a cached, non-expired session for `peer`, if any.
  pub async fn get(&self, peer: &str) -> Option<Session> {
    match self.sessions.get(&peer.to_string()).await {
      Some(session) if !session.is_expired() => Some(session),
      Some(_) => {
        self.sessions.remove(&peer.to_string()).await;
        None
      }
      None => None,
    }
  }

  pub async fn insert(&self, peer: &str, negotiation: &Negotiation) {
    let session = Session {
      peer_identity: negotiation.user.clone(),
      shared_keys: Vec::new(),
      auth_method: negotiation.auth_method.clone(),
      expires_at: Instant::now() + SESSION_TTL,
    };
    self.sessions.insert(peer.to_string(), session).await;
    tracing::debug!(peer, "session cached");
  }

  pub async fn invalidate(&self, peer: &str) {
    self.sessions.remove(&peer.to_string()).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn session_cache_expires_entries() {
    let cache = SessionCache::new();
    let expired = Session {
      peer_identity: "alice@example.org".to_string(),
      shared_keys: Vec::new(),
      auth_method: "FS".to_string(),
      expires_at: Instant::now() - Duration::from_secs(1),
    };
    cache.sessions.insert("peer:1".to_string(), expired).await;
    assert!(cache.get("peer:1").await.is_none());
  }

  #[tokio::test]
  async fn session_cache_returns_live_entry() {
    let cache = SessionCache::new();
    let negotiation = Negotiation {
      user: "alice@example.org".to_string(),
      session_id: "sess-1".to_string(),
      auth_method: "FS".to_string(),
      valid_commands: vec![1, 2, 3],
      encryption: true,
      authentication: true,
    };
    cache.insert("peer:1", &negotiation).await;
    let session = cache.get("peer:1").await.unwrap();
    assert_eq!(session.peer_identity, "alice@example.org");
  }
}
