//! The security-policy data model (C2, §3/§4.2). Resolution from
//! configuration lives in the `security` crate; this module only holds
//! the resolved record and its building blocks.

use std::path::PathBuf;

/// One of three independent preference levels for Authentication,
/// Encryption, and Integrity (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityLevel {
  Required,
  #[default]
  Preferred,
  Optional,
  Never,
}

impl SecurityLevel {
  pub fn parse(token: &str) -> Option<SecurityLevel> {
    match token.to_ascii_uppercase().as_str() {
      "REQUIRED" => Some(SecurityLevel::Required),
      "PREFERRED" => Some(SecurityLevel::Preferred),
      "OPTIONAL" => Some(SecurityLevel::Optional),
      "NEVER" => Some(SecurityLevel::Never),
      _ => None,
    }
  }
}

/// An authentication method token, e.g. `FS`, `IDTOKENS`, `SSL`, `GSI`,
/// `KERBEROS`, `PASSWORD`, `ANONYMOUS`. Unknown tokens are dropped by
/// the resolver rather than rejected (§4.2).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthMethod(pub String);

/// A crypto (encryption) method token, e.g. `AES`, `BLOWFISH`, `3DES`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CryptoMethod(pub String);

pub const DEFAULT_AUTH_METHODS: &[&str] = &["FS", "IDTOKENS"];
pub const DEFAULT_CRYPTO_METHODS: &[&str] = &["AES"];

/// Tokens the resolver recognizes; anything else in a configured method
/// list is dropped rather than rejected (§4.2).
pub const KNOWN_AUTH_METHODS: &[&str] = &[
  "FS", "IDTOKENS", "SSL", "GSI", "KERBEROS", "PASSWORD", "ANONYMOUS",
  "NTSSPI", "CLAIMTOBE", "SCITOKENS",
];
pub const KNOWN_CRYPTO_METHODS: &[&str] = &["AES", "BLOWFISH", "3DES"];

/// A numeric CEDAR command identifier (e.g. `QMGMT_WRITE_CMD`,
/// `DC_AUTHENTICATE`). Kept opaque here; individual protocol crates own
/// their command-code constants.
pub type CommandId = i32;

/// The resolved security policy for one call (§3, §4.2).
#[derive(Debug, Clone)]
pub struct SecurityConfig {
  pub command: CommandId,
  pub preferred_auth_methods: Vec<AuthMethod>,
  pub preferred_crypto_methods: Vec<CryptoMethod>,
  pub authentication: SecurityLevel,
  pub encryption: SecurityLevel,
  pub integrity: SecurityLevel,
  pub certificate_path: Option<PathBuf>,
  pub key_path: Option<PathBuf>,
  pub ca_path: Option<PathBuf>,
  pub token_directory: Option<PathBuf>,
  /// Opaque peer name used as the session-cache key.
  pub peer_name: String,
}

impl SecurityConfig {
  /// All-defaults record with only `peer_name` set, used by
  /// `ResolveOrDefault` when no configuration context is available.
  pub fn defaults_for_peer(command: CommandId, peer_name: impl Into<String>) -> SecurityConfig {
    SecurityConfig {
      command,
      preferred_auth_methods: DEFAULT_AUTH_METHODS
        .iter()
        .map(|m| AuthMethod(m.to_string()))
        .collect(),
      preferred_crypto_methods: DEFAULT_CRYPTO_METHODS
        .iter()
        .map(|m| CryptoMethod(m.to_string()))
        .collect(),
      authentication: SecurityLevel::Optional,
      encryption: SecurityLevel::Optional,
      integrity: SecurityLevel::Optional,
      certificate_path: None,
      key_path: None,
      ca_path: None,
      token_directory: None,
      peer_name: peer_name.into(),
    }
  }

  /// Whether either the SSL method or a token-family method (IDTOKENS,
  /// SCITOKENS) is among the preferred auth methods — these are the
  /// methods that require credential paths to be populated (§4.2).
  pub fn needs_credential_paths(&self) -> bool {
    self.preferred_auth_methods.iter().any(|m| {
      matches!(
        m.0.to_ascii_uppercase().as_str(),
        "SSL" | "IDTOKENS" | "SCITOKENS"
      )
    })
  }
}
