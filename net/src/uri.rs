//! Minimal `scheme://authority[:port][/path]` parser.
//!
//! Only handles the shapes this crate ever feeds it (gateway and voice
//! endpoint URLs); it is not a general-purpose URI parser.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUri {
  pub scheme: String,
  pub authority: String,
  pub path: String,
  pub port: i32
}

impl ParsedUri {
  fn invalid() -> Self {
    Self {
      scheme: String::new(),
      authority: String::new(),
      path: String::new(),
      port: -1
    }
  }

  pub fn is_valid(&self) -> bool {
    self.port >= 0 && !self.authority.is_empty()
  }
}

fn default_port(scheme: &str) -> Option<i32> {
  match scheme {
    "http" | "ws" => Some(80),
    "https" | "wss" => Some(443),
    _ => None
  }
}

/// Parse a URI of the form `scheme://authority[:port][/path]`.
///
/// On any malformed input, returns a sentinel [`ParsedUri`] with `port == -1`;
/// callers treat an absent/invalid authority as fatal rather than unwrapping.
pub fn parse(uri: &str) -> ParsedUri {
  let (scheme, rest) = match uri.split_once("://") {
    Some((scheme, rest)) => (scheme.to_owned(), rest),
    None => return ParsedUri::invalid()
  };

  let (authority_and_port, path) = match rest.find('/') {
    Some(index) => (&rest[..index], rest[index..].to_owned()),
    None => (rest, "/".to_owned())
  };

  if authority_and_port.is_empty() {
    return ParsedUri::invalid();
  }

  let (authority, port) = match authority_and_port.rsplit_once(':') {
    Some((authority, port_str)) => match port_str.parse::<i32>() {
      Ok(port) => (authority.to_owned(), port),
      Err(_) => return ParsedUri::invalid()
    },
    None => {
      let authority = authority_and_port.to_owned();
      let port = default_port(&scheme).unwrap_or(-1);
      (authority, port)
    }
  };

  if authority.len() < 2 || port < 0 {
    return ParsedUri::invalid();
  }

  ParsedUri { scheme, authority, path, port }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_scheme_authority_port_and_path() {
    let parsed = parse("wss://gateway.discord.gg:443/?v=6&encoding=json");
    assert_eq!(parsed.scheme, "wss");
    assert_eq!(parsed.authority, "gateway.discord.gg");
    assert_eq!(parsed.port, 443);
    assert_eq!(parsed.path, "/?v=6&encoding=json");
  }

  #[test]
  fn fills_in_default_ports() {
    assert_eq!(parse("ws://example.com").port, 80);
    assert_eq!(parse("wss://example.com").port, 443);
    assert_eq!(parse("http://example.com").port, 80);
    assert_eq!(parse("https://example.com").port, 443);
  }

  #[test]
  fn defaults_path_to_root() {
    assert_eq!(parse("wss://example.com").path, "/");
  }

  #[test]
  fn malformed_input_yields_sentinel_port() {
    assert_eq!(parse("not a uri").port, -1);
    assert_eq!(parse("wss://").port, -1);
    assert!(!parse("not a uri").is_valid());
  }

  #[test]
  fn round_trips_canonical_urls() {
    for (url, scheme, authority, port) in [
      ("wss://gateway.discord.gg/?v=6&encoding=json", "wss", "gateway.discord.gg", 443),
      ("wss://voice-endpoint.example.com:443/?v=3", "wss", "voice-endpoint.example.com", 443)
    ] {
      let parsed = parse(url);
      assert_eq!(parsed.scheme, scheme);
      assert_eq!(parsed.authority, authority);
      assert_eq!(parsed.port, port);
    }
  }
}
