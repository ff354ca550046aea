//! Parsing of the daemon "sinful string" peer address form
//! `<host:port?key=val&key2=val2>` (§4.3, GLOSSARY).

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinfulString {
  pub host: String,
  pub port: u16,
  pub params: BTreeMap<String, String>,
}

impl SinfulString {
  pub fn addr(&self) -> String {
    format!("{}:{}", self.host, self.port)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed sinful string: {0:?}")]
pub struct SinfulParseError(pub String);

/// Strips the enclosing `<>` and splits `host:port` from the `?`-led
/// query string.
pub fn parse(raw: &str) -> Result<SinfulString, SinfulParseError> {
  let inner = raw
    .strip_prefix('<')
    .and_then(|s| s.strip_suffix('>'))
    .unwrap_or(raw);

  let (host_port, query) = match inner.split_once('?') {
    Some((h, q)) => (h, Some(q)),
    None => (inner, None),
  };

  let (host, port) = host_port
    .rsplit_once(':')
    .ok_or_else(|| SinfulParseError(raw.to_string()))?;
  let port: u16 = port
    .parse()
    .map_err(|_| SinfulParseError(raw.to_string()))?;

  let mut params = BTreeMap::new();
  if let Some(query) = query {
    for pair in query.split('&') {
      if pair.is_empty() {
        continue;
      }
      match pair.split_once('=') {
        Some((k, v)) => {
          params.insert(k.to_string(), v.to_string());
        }
        None => {
          params.insert(pair.to_string(), String::new());
        }
      }
    }
  }

  Ok(SinfulString { host: host.to_string(), port, params })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_host_port_and_query() {
    let s = parse("<schedd.example.org:9618?alias=foo&noUDP=true>").unwrap();
    assert_eq!(s.host, "schedd.example.org");
    assert_eq!(s.port, 9618);
    assert_eq!(s.params.get("alias").map(String::as_str), Some("foo"));
    assert_eq!(s.addr(), "schedd.example.org:9618");
  }

  #[test]
  fn accepts_unbracketed_form() {
    let s = parse("collector.example.org:9618").unwrap();
    assert_eq!(s.port, 9618);
    assert!(s.params.is_empty());
  }

  #[test]
  fn rejects_missing_port() {
    assert!(parse("<no-port-here>").is_err());
  }
}
