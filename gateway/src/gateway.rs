//! The control-plane state machine: connect, identify, heartbeat with an
//! ACK watchdog, dispatch fan-out, resume/reconnect on loss.
//!
//! ```text
//! disconnected ── connect() ──► connecting
//! connecting ── hello ──► connecting (start heartbeater, send identify)
//! connecting ── READY  ──► connected (record user_id, session_id)
//! connected   ── reconnect(7) ──► disconnected (then resume)
//! connected   ── invalid_session(9, resumable) ──► disconnected (then resume)
//! connected   ── invalid_session(9, !resumable) ──► fatal
//! connected   ── heartbeat(1) ──► connected (reply with a heartbeat)
//! connected   ── heartbeat_ack(11) ──► connected (clear pending-ack)
//! connected   ── dispatch(0) ──► connected (bump seq, fan out)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use net::heartbeater::HeartbeaterEvent;
use net::{Heartbeater, PacedSender, WsConnection, WsEvent};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use utils::Snowflake;

use crate::dispatch::{DispatchContext, Dispatcher, Handler};
use crate::model::{Channel, ChannelType, Guild, GatewayStore};
use crate::opcode::GatewayOpcode;
use crate::payload::{
  GatewayPayload, Hello, Identify, IdentifyProperties, InvalidSession, Ready, Resume, VoiceServerUpdate,
  VoiceStateUpdate
};

const PACED_SEND_MIN_GAP: Duration = Duration::from_millis(500);
const LARGE_THRESHOLD: u32 = 250;
const SUPPORTED_GATEWAY_VERSION: u8 = 6;

#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("websocket error: {0}")]
  Ws(#[from] net::WsError),
  #[error("malformed gateway payload: {0}")]
  Decode(#[from] serde_json::Error),
  #[error("server rejected the session and it is not resumable")]
  Fatal,
  #[error("gateway reported an unsupported protocol version {0}")]
  UnsupportedVersion(u8),
  #[error("the first payload from the gateway was not HELLO")]
  ExpectedHello
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
  /// Host portion of the gateway URL, e.g. `gateway.discord.gg`.
  pub host: String,
  pub token: String
}

#[derive(Clone)]
struct Session {
  session_id: String,
  user_id: Snowflake
}

pub struct Gateway {
  config: GatewayConfig,
  dispatcher: Dispatcher,
  pub store: Arc<RwLock<GatewayStore>>,
  session: tokio::sync::Mutex<Option<Session>>,
  last_seq: AtomicU64,
  /// The paced sender of the currently-live connection, if any. Replaced
  /// every time [`Gateway::run_one_connection`] (re)connects, so callers
  /// outside the receive loop (e.g. a voice director sending
  /// `VOICE_STATE_UPDATE`) never have to track reconnects themselves.
  current_sender: tokio::sync::RwLock<Option<PacedSender>>
}

impl Gateway {
  pub fn new(config: GatewayConfig) -> Self {
    Self {
      config,
      dispatcher: Dispatcher::new(),
      store: Arc::new(RwLock::new(GatewayStore::new())),
      session: tokio::sync::Mutex::new(None),
      last_seq: AtomicU64::new(0),
      current_sender: tokio::sync::RwLock::new(None)
    }
  }

  /// Registers a handler for a specific dispatch event name. Must be called
  /// before [`Gateway::run`] is reached (i.e. before the gateway is shared).
  pub fn on(&mut self, event_name: impl Into<String>, handler: Handler) {
    self.dispatcher.on(event_name, handler);
  }

  pub fn on_all(&mut self, handler: Handler) {
    self.dispatcher.on_all(handler);
  }

  pub fn current_user_id(&self) -> Option<Snowflake> {
    self
      .session
      .try_lock()
      .ok()
      .and_then(|guard| guard.as_ref().map(|session| session.user_id))
  }

  /// Runs the gateway until a fatal, unrecoverable condition is hit.
  /// Transport loss is handled internally via resume/reconnect.
  pub async fn run(self: &Arc<Self>) -> Result<(), GatewayError> {
    loop {
      match self.run_one_connection().await {
        Ok(()) => return Ok(()),
        Err(GatewayError::Fatal) => return Err(GatewayError::Fatal),
        Err(error) => {
          warn!(%error, "gateway connection lost, reconnecting");
          continue;
        }
      }
    }
  }

  async fn connect_url(&self) -> String {
    format!("wss://{}/?v={SUPPORTED_GATEWAY_VERSION}&encoding=json", self.config.host)
  }

  async fn run_one_connection(self: &Arc<Self>) -> Result<(), GatewayError> {
    let url = self.connect_url().await;
    let ws = Arc::new(WsConnection::connect(&url).await?);
    let sender = PacedSender::spawn(ws.clone(), PACED_SEND_MIN_GAP);
    *self.current_sender.write().await = Some(sender.clone());

    let hello_payload = Self::read_payload(&ws).await?;
    if hello_payload.op != GatewayOpcode::Hello {
      return Err(GatewayError::ExpectedHello);
    }
    let hello: Hello = serde_json::from_value(hello_payload.data)?;

    let (heartbeater, mut heartbeat_events) = Heartbeater::spawn();
    heartbeater.hello(Duration::from_millis(hello.heartbeat_interval));

    let existing_session = self.session.lock().await.clone();
    match &existing_session {
      Some(session) => self.send_resume(&sender, session).await?,
      None => self.send_identify(&sender).await?
    }

    loop {
      tokio::select! {
        message = ws.read_next() => {
          match message {
            Some(WsEvent::Text(text)) => {
              let payload: GatewayPayload = match serde_json::from_str(&text) {
                Ok(payload) => payload,
                Err(error) => {
                  warn!(%error, "failed to decode gateway frame");
                  continue;
                }
              };
              if let Some(seq) = payload.seq {
                self.last_seq.store(seq, Ordering::SeqCst);
              }
              match self.handle_payload(payload, &sender, &heartbeater).await? {
                Flow::Continue => {}
                Flow::Resume => {
                  ws.close(1012);
                  return Err(GatewayError::Ws(net::WsError::ConnectionClosed));
                }
                Flow::Fatal => return Err(GatewayError::Fatal)
              }
            }
            Some(WsEvent::Closed(code)) => {
              debug!(code, "gateway transport closed");
              return Err(GatewayError::Ws(net::WsError::ConnectionClosed));
            }
            None => return Err(GatewayError::Ws(net::WsError::ConnectionClosed))
          }
        }

        event = heartbeat_events.recv() => {
          match event {
            Some(HeartbeaterEvent::Tick) => {
              self.send_heartbeat(&sender).await?;
            }
            Some(HeartbeaterEvent::TimedOut) | None => {
              warn!("heartbeat ack missed, reconnecting");
              ws.close(1001);
              return Err(GatewayError::Ws(net::WsError::ConnectionClosed));
            }
          }
        }
      }
    }
  }

  async fn handle_payload(
    self: &Arc<Self>,
    payload: GatewayPayload,
    sender: &PacedSender,
    heartbeater: &Heartbeater
  ) -> Result<Flow, GatewayError> {
    match payload.op {
      GatewayOpcode::Dispatch => {
        let event_name = payload.event_name.unwrap_or_default();
        self.apply_store_event(&event_name, &payload.data).await;
        if event_name == "READY" {
          let ready: Ready = serde_json::from_value(payload.data.clone())?;
          if ready.version != SUPPORTED_GATEWAY_VERSION {
            return Err(GatewayError::UnsupportedVersion(ready.version));
          }
          *self.session.lock().await = Some(Session {
            session_id: ready.session_id,
            user_id: ready.user.id
          });
          info!("gateway ready");
        }
        let ctx = DispatchContext {
          event_name: &event_name,
          seq: payload.seq,
          data: &payload.data
        };
        self.dispatcher.fire(&ctx);
        Ok(Flow::Continue)
      }
      GatewayOpcode::Heartbeat => {
        self.send_heartbeat(sender).await?;
        Ok(Flow::Continue)
      }
      GatewayOpcode::HeartbeatAck => {
        heartbeater.ack();
        Ok(Flow::Continue)
      }
      GatewayOpcode::Reconnect => Ok(Flow::Resume),
      GatewayOpcode::InvalidSession => {
        let invalid: InvalidSession = serde_json::from_value(payload.data)?;
        if invalid.resumable {
          Ok(Flow::Resume)
        } else {
          *self.session.lock().await = None;
          Ok(Flow::Fatal)
        }
      }
      _ => Ok(Flow::Continue)
    }
  }

  async fn apply_store_event(&self, event_name: &str, data: &serde_json::Value) {
    let mut store = self.store.write().await;
    match event_name {
      "GUILD_CREATE" => {
        if let Some((guild, channels)) = parse_guild_create(data) {
          store.insert_guild(guild, channels);
        }
      }
      "CHANNEL_CREATE" => {
        if let Some(channel) = parse_channel(data) {
          store.insert_channel(channel);
        }
      }
      "CHANNEL_UPDATE" => {
        if let Some(channel) = parse_channel(data) {
          store.update_channel(channel);
        }
      }
      "CHANNEL_DELETE" => {
        if let Some(id) = data.get("id").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()) {
          store.remove_channel(Snowflake(id));
        }
      }
      _ => {}
    }
  }

  async fn send_identify(&self, sender: &PacedSender) -> Result<(), GatewayError> {
    let payload = GatewayPayload {
      op: GatewayOpcode::Identify,
      data: serde_json::to_value(Identify {
        token: self.config.token.clone(),
        properties: IdentifyProperties::default(),
        compress: false,
        large_threshold: LARGE_THRESHOLD
      })?,
      seq: None,
      event_name: None
    };
    self.send_payload(sender, payload).await
  }

  async fn send_resume(&self, sender: &PacedSender, session: &Session) -> Result<(), GatewayError> {
    let payload = GatewayPayload {
      op: GatewayOpcode::Resume,
      data: serde_json::to_value(Resume {
        token: self.config.token.clone(),
        session_id: session.session_id.clone(),
        seq: self.last_seq.load(Ordering::SeqCst)
      })?,
      seq: None,
      event_name: None
    };
    self.send_payload(sender, payload).await
  }

  async fn send_heartbeat(&self, sender: &PacedSender) -> Result<(), GatewayError> {
    let seq = self.last_seq.load(Ordering::SeqCst);
    let payload = GatewayPayload {
      op: GatewayOpcode::Heartbeat,
      data: serde_json::to_value(seq)?,
      seq: None,
      event_name: None
    };
    self.send_payload(sender, payload).await
  }

  /// Sends a `VOICE_STATE_UPDATE` (op 4) to join/move/leave a voice channel.
  ///
  /// Safe to call from outside the receive loop (e.g. a voice director
  /// reacting to a chat command) at any time after the first successful
  /// connect; always targets whichever connection is currently live.
  pub async fn update_voice_state(
    &self,
    guild_id: Snowflake,
    channel_id: Option<Snowflake>,
    self_mute: bool,
    self_deaf: bool
  ) -> Result<(), GatewayError> {
    let payload = GatewayPayload {
      op: GatewayOpcode::VoiceStateUpdate,
      data: serde_json::json!({
        "guild_id": guild_id.to_string(),
        "channel_id": channel_id.map(|id| id.to_string()),
        "self_mute": self_mute,
        "self_deaf": self_deaf
      }),
      seq: None,
      event_name: None
    };
    let sender = self.current_sender.read().await.clone().ok_or(GatewayError::Ws(net::WsError::ConnectionClosed))?;
    self.send_payload(&sender, payload).await
  }

  async fn send_payload(&self, sender: &PacedSender, payload: GatewayPayload) -> Result<(), GatewayError> {
    let text = serde_json::to_string(&payload)?;
    sender
      .enqueue(text)
      .await
      .map_err(|_| GatewayError::Ws(net::WsError::ConnectionClosed))?
      .map_err(GatewayError::Ws)
  }

  async fn read_payload(ws: &WsConnection) -> Result<GatewayPayload, GatewayError> {
    match ws.read_next().await {
      Some(WsEvent::Text(text)) => Ok(serde_json::from_str(&text)?),
      Some(WsEvent::Closed(_)) | None => Err(GatewayError::Ws(net::WsError::ConnectionClosed))
    }
  }
}

enum Flow {
  Continue,
  Resume,
  Fatal
}

fn parse_channel(data: &serde_json::Value) -> Option<Channel> {
  Some(Channel {
    id: data.get("id")?.as_str()?.parse().ok()?,
    guild_id: data.get("guild_id").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()),
    kind: parse_channel_type(data.get("type")?.as_u64()?),
    name: data.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_owned(),
    bitrate: data.get("bitrate").and_then(|v| v.as_u64()).map(|v| v as u32),
    user_limit: data.get("user_limit").and_then(|v| v.as_u64()).map(|v| v as u32)
  })
}

fn parse_channel_type(raw: u64) -> ChannelType {
  match raw {
    0 => ChannelType::GuildText,
    1 => ChannelType::Dm,
    2 => ChannelType::GuildVoice,
    3 => ChannelType::GuildDm,
    4 => ChannelType::GuildCategory,
    _ => ChannelType::GuildText
  }
}

fn parse_guild_create(data: &serde_json::Value) -> Option<(Guild, Vec<Channel>)> {
  let id: Snowflake = data.get("id")?.as_str()?.parse().ok()?;
  let guild = Guild {
    id,
    owner_id: data.get("owner_id").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or(Snowflake(0)),
    name: data.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_owned(),
    region: data.get("region").and_then(|v| v.as_str()).unwrap_or_default().to_owned(),
    unavailable: data.get("unavailable").and_then(|v| v.as_bool()).unwrap_or(false),
    channels: Default::default(),
    members: Default::default()
  };
  let channels = data
    .get("channels")
    .and_then(|v| v.as_array())
    .map(|array| array.iter().filter_map(parse_channel).map(|mut channel| {
      channel.guild_id = Some(id);
      channel
    }).collect())
    .unwrap_or_default();
  Some((guild, channels))
}

/// Parses a `VOICE_STATE_UPDATE` dispatch body.
pub fn parse_voice_state_update(data: &serde_json::Value) -> Result<VoiceStateUpdate, serde_json::Error> {
  serde_json::from_value(data.clone())
}

/// Parses a `VOICE_SERVER_UPDATE` dispatch body.
pub fn parse_voice_server_update(data: &serde_json::Value) -> Result<VoiceServerUpdate, serde_json::Error> {
  serde_json::from_value(data.clone())
}
