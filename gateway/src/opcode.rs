use serde::{Deserialize, Serialize};

use self::GatewayOpcode::*;

/// Control-plane gateway opcodes.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum GatewayOpcode {
  Dispatch,
  Heartbeat,
  Identify,
  StatusUpdate,
  VoiceStateUpdate,
  Resume,
  Reconnect,
  RequestGuildMembers,
  InvalidSession,
  Hello,
  HeartbeatAck,
  Unknown(u8)
}

impl From<GatewayOpcode> for u8 {
  fn from(code: GatewayOpcode) -> u8 {
    match code {
      Dispatch => 0,
      Heartbeat => 1,
      Identify => 2,
      StatusUpdate => 3,
      VoiceStateUpdate => 4,
      Resume => 6,
      Reconnect => 7,
      RequestGuildMembers => 8,
      InvalidSession => 9,
      Hello => 10,
      HeartbeatAck => 11,
      Unknown(code) => code
    }
  }
}

impl From<u8> for GatewayOpcode {
  fn from(code: u8) -> GatewayOpcode {
    match code {
      0 => Dispatch,
      1 => Heartbeat,
      2 => Identify,
      3 => StatusUpdate,
      4 => VoiceStateUpdate,
      6 => Resume,
      7 => Reconnect,
      8 => RequestGuildMembers,
      9 => InvalidSession,
      10 => Hello,
      11 => HeartbeatAck,
      _ => Unknown(code)
    }
  }
}

impl Serialize for GatewayOpcode {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer
  {
    serializer.serialize_u8((*self).into())
  }
}

impl<'de> Deserialize<'de> for GatewayOpcode {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>
  {
    Ok(u8::deserialize(deserializer)?.into())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips_every_named_opcode() {
    for code in [
      Dispatch,
      Heartbeat,
      Identify,
      StatusUpdate,
      VoiceStateUpdate,
      Resume,
      Reconnect,
      RequestGuildMembers,
      InvalidSession,
      Hello,
      HeartbeatAck
    ] {
      let raw: u8 = code.into();
      assert_eq!(GatewayOpcode::from(raw), code);
    }
  }
}
