//! Wire payload shapes: the generic envelope plus the handful of dispatch
//! event bodies the state machines actually consume. Every other event name
//! passes through dispatch as an opaque [`serde_json::Value`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utils::Snowflake;

use crate::opcode::GatewayOpcode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayload {
  #[serde(rename = "op")]
  pub op: GatewayOpcode,
  #[serde(rename = "d")]
  pub data: Value,
  #[serde(rename = "s")]
  pub seq: Option<u64>,
  #[serde(rename = "t")]
  pub event_name: Option<String>
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentifyProperties {
  #[serde(rename = "$os")]
  pub os: String,
  #[serde(rename = "$browser")]
  pub browser: String,
  #[serde(rename = "$device")]
  pub device: String
}

impl Default for IdentifyProperties {
  fn default() -> Self {
    Self {
      os: std::env::consts::OS.to_owned(),
      browser: "worker".to_owned(),
      device: "worker".to_owned()
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct Identify {
  pub token: String,
  pub properties: IdentifyProperties,
  pub compress: bool,
  pub large_threshold: u32
}

#[derive(Debug, Clone, Serialize)]
pub struct Resume {
  pub token: String,
  pub session_id: String,
  pub seq: u64
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hello {
  pub heartbeat_interval: u64
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvalidSession {
  #[serde(default)]
  pub resumable: bool
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadyUser {
  pub id: Snowflake
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ready {
  #[serde(rename = "v")]
  pub version: u8,
  pub session_id: String,
  pub user: ReadyUser
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceStateUpdate {
  pub guild_id: Option<Snowflake>,
  pub channel_id: Option<Snowflake>,
  pub user_id: Snowflake,
  pub session_id: String
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceServerUpdate {
  pub token: String,
  pub guild_id: Snowflake,
  pub endpoint: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageAuthor {
  pub id: Snowflake,
  pub bot: Option<bool>
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageCreate {
  pub id: Snowflake,
  pub channel_id: Snowflake,
  pub guild_id: Option<Snowflake>,
  pub content: String,
  pub author: MessageAuthor
}
