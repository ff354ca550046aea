//! The security-policy resolver (C2, §4.2): maps layered configuration
//! into a `SecurityConfig` for one outbound call.

use condor_client::{
  config::ConfigSnapshot,
  security::{
    AuthMethod, CommandId, CryptoMethod, DEFAULT_AUTH_METHODS,
    DEFAULT_CRYPTO_METHODS, KNOWN_AUTH_METHODS, KNOWN_CRYPTO_METHODS,
    SecurityConfig, SecurityLevel,
  },
};

/// Reads `SEC_<context>_<feature>`, falling back to `SEC_DEFAULT_<feature>`,
/// falling back to `default`.
fn lookup(
  cfg: &ConfigSnapshot,
  context: &str,
  feature: &str,
  default: &str,
) -> String {
  let scoped = format!("SEC_{}_{}", context.to_ascii_uppercase(), feature);
  let (value, present) = cfg.get(&scoped);
  if present && !value.is_empty() {
    return value;
  }
  let generic = format!("SEC_DEFAULT_{}", feature);
  let (value, present) = cfg.get(&generic);
  if present && !value.is_empty() {
    return value;
  }
  default.to_string()
}

fn parse_level(token: &str, default: SecurityLevel) -> SecurityLevel {
  SecurityLevel::parse(token).unwrap_or(default)
}

fn parse_method_list<T>(
  raw: &str,
  wrap: impl Fn(String) -> T,
  defaults: &[&str],
  known: &[&str],
) -> Vec<T> {
  if raw.is_empty() {
    return defaults.iter().map(|m| wrap(m.to_string())).collect();
  }
  raw
    .split(',')
    .map(str::trim)
    .filter(|tok| !tok.is_empty())
    .map(str::to_ascii_uppercase)
    .filter(|tok| known.contains(&tok.as_str()))
    .map(wrap)
    .collect()
}

/// `Resolve(cfg, command, context) -> SecurityConfig` (§4.2).
pub fn resolve(
  cfg: &ConfigSnapshot,
  command: CommandId,
  context: &str,
  peer_name: impl Into<String>,
) -> SecurityConfig {
  let peer_name = peer_name.into();

  let auth_methods_raw = lookup(cfg, context, "AUTHENTICATION_METHODS", "");
  let crypto_methods_raw = lookup(cfg, context, "CRYPTO_METHODS", "");

  let mut security = SecurityConfig {
    command,
    preferred_auth_methods: parse_method_list(
      &auth_methods_raw,
      AuthMethod,
      DEFAULT_AUTH_METHODS,
      KNOWN_AUTH_METHODS,
    ),
    preferred_crypto_methods: parse_method_list(
      &crypto_methods_raw,
      CryptoMethod,
      DEFAULT_CRYPTO_METHODS,
      KNOWN_CRYPTO_METHODS,
    ),
    authentication: parse_level(
      &lookup(cfg, context, "AUTHENTICATION", ""),
      SecurityLevel::Optional,
    ),
    encryption: parse_level(
      &lookup(cfg, context, "ENCRYPTION", ""),
      SecurityLevel::Optional,
    ),
    integrity: parse_level(
      &lookup(cfg, context, "INTEGRITY", ""),
      SecurityLevel::Optional,
    ),
    certificate_path: None,
    key_path: None,
    ca_path: None,
    token_directory: None,
    peer_name,
  };

  if security.needs_credential_paths() {
    let (cert, _) = cfg.get("SEC_CLIENT_CERTIFICATE_PATH");
    let (key, _) = cfg.get("SEC_CLIENT_KEY_PATH");
    let (ca, _) = cfg.get("SEC_CLIENT_CA_PATH");
    let (tokens, _) = cfg.get("SEC_TOKEN_DIRECTORY");
    security.certificate_path = non_empty_path(cert);
    security.key_path = non_empty_path(key);
    security.ca_path = non_empty_path(ca);
    security.token_directory = non_empty_path(tokens);
  }

  tracing::debug!(
    command,
    context,
    auth = ?security.preferred_auth_methods,
    "resolved security policy"
  );
  security
}

fn non_empty_path(s: String) -> Option<std::path::PathBuf> {
  if s.is_empty() { None } else { Some(std::path::PathBuf::from(s)) }
}

/// `ResolveOrDefault`: prefers a policy already carried by the caller,
/// else resolves from configuration, else returns an all-defaults
/// record with only `peer_name` set (§4.2).
pub fn resolve_or_default(
  carried: Option<SecurityConfig>,
  cfg: Option<&ConfigSnapshot>,
  command: CommandId,
  context: &str,
  peer_name: impl Into<String>,
) -> SecurityConfig {
  let peer_name = peer_name.into();
  if let Some(carried) = carried {
    return carried;
  }
  match cfg {
    Some(cfg) => resolve(cfg, command, context, peer_name),
    None => SecurityConfig::defaults_for_peer(command, peer_name),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn falls_back_to_documented_defaults() {
    let cfg = ConfigSnapshot::new();
    let resolved = resolve(&cfg, 1, "CLIENT", "schedd.example.org");
    assert_eq!(resolved.authentication, SecurityLevel::Optional);
    assert_eq!(
      resolved.preferred_auth_methods,
      vec![AuthMethod("FS".into()), AuthMethod("IDTOKENS".into())]
    );
  }

  #[test]
  fn context_specific_overrides_default() {
    let mut cfg = ConfigSnapshot::new();
    cfg.set("SEC_DEFAULT_AUTHENTICATION", "OPTIONAL");
    cfg.set("SEC_WRITE_AUTHENTICATION", "REQUIRED");
    let resolved = resolve(&cfg, 1, "WRITE", "peer");
    assert_eq!(resolved.authentication, SecurityLevel::Required);
  }

  #[test]
  fn unknown_auth_method_tokens_are_dropped() {
    let mut cfg = ConfigSnapshot::new();
    cfg.set("SEC_DEFAULT_AUTHENTICATION_METHODS", "FS,BOGUS,SSL");
    let resolved = resolve(&cfg, 1, "CLIENT", "peer");
    assert_eq!(
      resolved.preferred_auth_methods,
      vec![AuthMethod("FS".into()), AuthMethod("SSL".into())]
    );
  }

  #[test]
  fn resolve_or_default_prefers_carried_policy() {
    let carried =
      SecurityConfig::defaults_for_peer(1, "carried-peer");
    let resolved =
      resolve_or_default(Some(carried.clone()), None, 1, "CLIENT", "x");
    assert_eq!(resolved.peer_name, "carried-peer");
  }
}
