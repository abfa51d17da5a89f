//! The voice gateway's WebSocket transport: a thin layer over
//! [`net::WsConnection`] that speaks this protocol's `{op, d}` envelope and
//! paces outgoing frames (unthrottled — voice traffic is paced by the RTP
//! send loop, not by this layer).

use std::sync::Arc;
use std::time::Duration;

use net::{PacedSender, WsConnection, WsError, WsEvent};
use thiserror::Error;
use tracing::warn;

use crate::event::{GatewayEvent, Identify, Resume, Speaking};
use crate::GatewayPacket;

#[derive(Debug, Error)]
pub enum VoiceWsError {
  #[error(transparent)]
  Ws(#[from] WsError),
  #[error("malformed voice gateway payload: {0}")]
  Json(#[from] serde_json::Error),
  #[error("failed to encode outgoing voice gateway event: {0}")]
  Encode(#[source] anyhow::Error)
}

pub struct VoiceWs {
  ws: Arc<WsConnection>,
  sender: PacedSender
}

/// Outcome of one [`VoiceWs::read_event`] call.
pub enum ReadOutcome {
  Event(GatewayEvent),
  /// The transport closed, carrying the close code (or the abrupt-EOF
  /// sentinel if the remote end vanished without a close frame).
  Closed(u16)
}

impl VoiceWs {
  pub async fn connect(endpoint: &str) -> Result<Self, VoiceWsError> {
    let ws = Arc::new(WsConnection::connect(&format!("wss://{endpoint}/?v={}", crate::constants::VOICE_GATEWAY_VERSION)).await?);
    let sender = PacedSender::spawn(ws.clone(), Duration::ZERO);
    Ok(Self { ws, sender })
  }

  pub async fn send(&self, event: GatewayEvent) -> Result<(), VoiceWsError> {
    let packet: GatewayPacket = event.try_into().map_err(VoiceWsError::Encode)?;
    let text = serde_json::to_string(&packet)?;
    let receiver = self.sender.enqueue(text);
    receiver.await.map_err(|_| WsError::ConnectionClosed)??;
    Ok(())
  }

  pub async fn send_identify(&self, guild_id: u64, user_id: u64, session_id: &str, token: &str) -> Result<(), VoiceWsError> {
    self
      .send(GatewayEvent::Identify(Identify {
        server_id: guild_id,
        user_id,
        session_id: session_id.to_owned(),
        token: token.to_owned()
      }))
      .await
  }

  pub async fn send_resume(&self, guild_id: u64, session_id: &str, token: &str) -> Result<(), VoiceWsError> {
    self
      .send(GatewayEvent::Resume(Resume {
        server_id: guild_id,
        session_id: session_id.to_owned(),
        token: token.to_owned()
      }))
      .await
  }

  pub async fn send_heartbeat(&self, nonce: u64) -> Result<(), VoiceWsError> {
    self.send(GatewayEvent::Heartbeat(nonce)).await
  }

  pub async fn send_speaking(&self, ssrc: u32, speaking: bool) -> Result<(), VoiceWsError> {
    self
      .send(GatewayEvent::Speaking(Speaking {
        speaking: if speaking { 1 } else { 0 },
        delay: 0,
        ssrc
      }))
      .await
  }

  /// Reads one event, skipping frames whose opcode this protocol does not
  /// define (observed in the wild as undocumented opcode 18) rather than
  /// treating them as fatal decode errors.
  pub async fn read_event(&self) -> Result<ReadOutcome, VoiceWsError> {
    loop {
      return match self.ws.read_next().await {
        Some(WsEvent::Text(text)) => {
          let packet: GatewayPacket = match serde_json::from_str(&text) {
            Ok(packet) => packet,
            Err(error) => {
              warn!(%error, "failed to decode voice gateway frame");
              continue;
            }
          };
          match packet.try_into() {
            Ok(event) => Ok(ReadOutcome::Event(event)),
            Err(_) => continue
          }
        }
        Some(WsEvent::Closed(code)) => {
          warn!(code, "voice gateway closed");
          Ok(ReadOutcome::Closed(code))
        }
        None => Ok(ReadOutcome::Closed(net::ws::ABRUPT_EOF_CODE))
      };
    }
  }

  pub fn close(&self, code: u16) {
    self.ws.close(code);
  }
}
