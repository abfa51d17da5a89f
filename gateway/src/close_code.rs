use std::fmt;

use self::GatewayCloseCode::*;

/// Gateway-protocol close codes (distinct from the raw websocket close
/// codes net::WsConnection surfaces).
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum GatewayCloseCode {
  UnknownError,
  UnknownOpcode,
  DecodeError,
  NotAuthenticated,
  AuthenticationFailed,
  AlreadyAuthenticated,
  InvalidSeq,
  RateLimited,
  SessionTimeout,
  InvalidShard,
  ShardingRequired,
  Unknown(u16)
}

impl GatewayCloseCode {
  /// Whether a resume should be attempted rather than a fresh identify.
  /// Per the protocol, only a handful of codes are genuinely unrecoverable.
  pub fn is_resumable(self) -> bool {
    !matches!(self, AuthenticationFailed | InvalidShard | ShardingRequired)
  }
}

impl fmt::Display for GatewayCloseCode {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let code: u16 = (*self).into();
    write!(f, "{code}")
  }
}

impl From<GatewayCloseCode> for u16 {
  fn from(code: GatewayCloseCode) -> u16 {
    match code {
      UnknownError => 4000,
      UnknownOpcode => 4001,
      DecodeError => 4002,
      NotAuthenticated => 4003,
      AuthenticationFailed => 4004,
      AlreadyAuthenticated => 4005,
      InvalidSeq => 4007,
      RateLimited => 4008,
      SessionTimeout => 4009,
      InvalidShard => 4010,
      ShardingRequired => 4011,
      Unknown(code) => code
    }
  }
}

impl From<u16> for GatewayCloseCode {
  fn from(code: u16) -> GatewayCloseCode {
    match code {
      4000 => UnknownError,
      4001 => UnknownOpcode,
      4002 => DecodeError,
      4003 => NotAuthenticated,
      4004 => AuthenticationFailed,
      4005 => AlreadyAuthenticated,
      4007 => InvalidSeq,
      4008 => RateLimited,
      4009 => SessionTimeout,
      4010 => InvalidShard,
      4011 => ShardingRequired,
      _ => Unknown(code)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn authentication_failed_is_not_resumable() {
    assert!(!AuthenticationFailed.is_resumable());
    assert!(UnknownOpcode.is_resumable());
  }

  #[test]
  fn round_trips_through_u16() {
    for code in [
      UnknownError,
      UnknownOpcode,
      DecodeError,
      NotAuthenticated,
      AuthenticationFailed,
      AlreadyAuthenticated,
      InvalidSeq,
      RateLimited,
      SessionTimeout,
      InvalidShard,
      ShardingRequired
    ] {
      let raw: u16 = code.into();
      assert_eq!(GatewayCloseCode::from(raw), code);
    }
  }
}
