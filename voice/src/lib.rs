//! Per-guild voice gateway: connect, identify/resume, heartbeat-with-ACK,
//! UDP external-address discovery, protocol selection, and the RTP send
//! path. One [`VoiceGateway`] owns exactly one guild's voice session.
//!
//! ```text
//! disconnected ──► ws_connecting ──► identified ──► awaiting_ready
//! awaiting_ready ── ready(2) ──► udp_discovery
//! udp_discovery  ── external ip/port known ──► selecting
//! selecting      ── session_description(4) ──► streaming
//! streaming      ── close (resumable) ──► resuming ──► streaming
//! streaming      ── close (fatal) ──► disconnected
//! ```

pub mod close_code;
pub mod constants;
pub mod event;
pub mod opcode;
pub mod udp;
pub mod ws;

pub use event::*;
pub use opcode::*;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use net::heartbeater::HeartbeaterEvent;
use net::Heartbeater;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::close_code::GatewayCloseCode;
use crate::constants::{ENCRYPTION_MODE, HEARTBEAT_INTERVAL_FACTOR, UDP_KEEPALIVE_INTERVAL};
use crate::udp::{RtpError, RtpSession};
use crate::ws::{ReadOutcome, VoiceWs, VoiceWsError};

#[derive(Debug, Serialize, Deserialize)]
pub struct GatewayPacket {
  #[serde(rename = "op")]
  opcode: GatewayOpcode,
  #[serde(rename = "d")]
  data: Option<Value>
}

impl GatewayPacket {
  pub fn new<T>(opcode: GatewayOpcode, data: T) -> Self
  where
    T: Into<Option<Value>>
  {
    Self { opcode, data: data.into() }
  }
}

#[derive(Debug, Error)]
pub enum VoiceError {
  #[error(transparent)]
  Ws(#[from] VoiceWsError),
  #[error(transparent)]
  Rtp(#[from] RtpError),
  #[error("the voice session could not be established and is not resumable")]
  Fatal,
  #[error("session_description used an unsupported encryption mode: {0}")]
  UnsupportedMode(String),
  #[error("this voice gateway is not in the streaming state")]
  NotStreaming
}

#[derive(Debug, Clone)]
pub struct VoiceConnectOptions {
  pub user_id: u64,
  pub guild_id: u64,
  pub endpoint: String,
  pub token: String,
  pub session_id: String
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceConnectionState {
  Disconnected,
  WsConnecting,
  Identified,
  AwaitingReady,
  UdpDiscovery,
  Selecting,
  Streaming,
  Resuming
}

struct MediaSession {
  ready: Ready,
  rtp: Arc<Mutex<RtpSession>>
}

/// Owns one guild's voice gateway WebSocket plus its RTP media session.
/// `send_frame`/`set_speaking` are safe to call from the director's pacing
/// loop concurrently with [`VoiceGateway::run`] driving the control plane.
pub struct VoiceGateway {
  options: VoiceConnectOptions,
  state: Mutex<VoiceConnectionState>,
  media: Mutex<Option<MediaSession>>,
  is_speaking: AtomicBool,
  /// The control-plane websocket of the currently-live connection, if any.
  /// Lets `set_speaking`/`close` be called from a director's pacing task
  /// without that task having to track gateway reconnects itself (mirrors
  /// `gateway::Gateway::current_sender`).
  current_ws: Mutex<Option<Arc<VoiceWs>>>
}

impl VoiceGateway {
  pub fn new(options: VoiceConnectOptions) -> Self {
    Self {
      options,
      state: Mutex::new(VoiceConnectionState::Disconnected),
      media: Mutex::new(None),
      is_speaking: AtomicBool::new(false),
      current_ws: Mutex::new(None)
    }
  }

  pub async fn state(&self) -> VoiceConnectionState {
    *self.state.lock().await
  }

  /// Runs the voice gateway's control plane until a fatal condition is hit.
  /// Transport loss with a resumable close code reconnects the WebSocket
  /// and resumes in place, keeping the already-negotiated RTP session.
  pub async fn run(self: &Arc<Self>) -> Result<(), VoiceError> {
    let mut resume = false;
    loop {
      match self.run_one_connection(resume).await {
        Ok(()) => {
          *self.current_ws.lock().await = None;
          return Ok(());
        }
        Err(VoiceError::Fatal) => {
          *self.state.lock().await = VoiceConnectionState::Disconnected;
          *self.current_ws.lock().await = None;
          return Err(VoiceError::Fatal);
        }
        Err(error) => {
          warn!(%error, "voice gateway connection lost");
          resume = self.media.lock().await.is_some();
        }
      }
    }
  }

  async fn run_one_connection(self: &Arc<Self>, resume: bool) -> Result<(), VoiceError> {
    *self.state.lock().await = VoiceConnectionState::WsConnecting;
    let ws = Arc::new(VoiceWs::connect(&self.options.endpoint).await?);
    *self.current_ws.lock().await = Some(ws.clone());

    if resume {
      *self.state.lock().await = VoiceConnectionState::Resuming;
      ws.send_resume(self.options.guild_id, &self.options.session_id, &self.options.token).await?;
    } else {
      *self.state.lock().await = VoiceConnectionState::Identified;
      ws
        .send_identify(self.options.guild_id, self.options.user_id, &self.options.session_id, &self.options.token)
        .await?;
    }

    let (heartbeater, mut heartbeat_events) = Heartbeater::spawn();
    *self.state.lock().await = VoiceConnectionState::AwaitingReady;

    loop {
      tokio::select! {
        event = ws.read_event() => {
          let event = match event? {
            ReadOutcome::Event(event) => event,
            ReadOutcome::Closed(code) => {
              debug!(code, "voice gateway closed");
              return if GatewayCloseCode::from(code).is_resumable() {
                Err(VoiceError::Ws(net::WsError::ConnectionClosed.into()))
              } else {
                Err(VoiceError::Fatal)
              };
            }
          };

          match self.handle_event(&ws, event, &heartbeater, resume).await? {
            Flow::Continue => {}
            Flow::StreamingEstablished => {
              *self.state.lock().await = VoiceConnectionState::Streaming;
            }
            Flow::Done => return Ok(())
          }
        }

        event = heartbeat_events.recv() => {
          match event {
            Some(HeartbeaterEvent::Tick) => {
              let nonce = u64::try_from(
                std::time::SystemTime::now()
                  .duration_since(std::time::SystemTime::UNIX_EPOCH)
                  .unwrap_or_default()
                  .as_millis()
              )
              .unwrap_or_default();
              ws.send_heartbeat(nonce).await?;
            }
            Some(HeartbeaterEvent::TimedOut) | None => {
              warn!("voice heartbeat ack missed, reconnecting");
              ws.close(4000);
              return Err(VoiceError::Ws(net::WsError::ConnectionClosed.into()));
            }
          }
        }
      }
    }
  }

  async fn handle_event(
    self: &Arc<Self>,
    ws: &VoiceWs,
    event: GatewayEvent,
    heartbeater: &Heartbeater,
    resuming: bool
  ) -> Result<Flow, VoiceError> {
    match event {
      GatewayEvent::Hello(hello) => {
        heartbeater.hello(Duration::from_secs_f64(hello.heartbeat_interval as f64 * HEARTBEAT_INTERVAL_FACTOR / 1000.0));
        Ok(Flow::Continue)
      }
      GatewayEvent::Ready(ready) if !resuming => {
        debug!(ssrc = ready.ssrc, "voice ready, starting udp discovery");
        *self.state.lock().await = VoiceConnectionState::UdpDiscovery;

        let rtp = RtpSession::connect(&ready.ip, ready.port, ready.ssrc).await?;
        let external = rtp.discover_external_address().await?;

        *self.state.lock().await = VoiceConnectionState::Selecting;
        ws
          .send(GatewayEvent::SelectProtocol(SelectProtocol {
            protocol: "udp".to_owned(),
            data: SelectProtocolData {
              address: external.address,
              port: external.port,
              mode: ENCRYPTION_MODE.to_owned()
            }
          }))
          .await?;

        *self.media.lock().await = Some(MediaSession { ready, rtp: Arc::new(Mutex::new(rtp)) });
        Ok(Flow::Continue)
      }
      GatewayEvent::Resumed => {
        info!("voice gateway resumed");
        Ok(Flow::StreamingEstablished)
      }
      GatewayEvent::SessionDescription(description) => {
        if description.mode != ENCRYPTION_MODE {
          return Err(VoiceError::UnsupportedMode(description.mode));
        }

        let media_guard = self.media.lock().await;
        let media = media_guard.as_ref().expect("session_description only arrives after ready");
        media.rtp.lock().await.install_secret_key(&description.secret_key);
        drop(media_guard);

        Ok(Flow::StreamingEstablished)
      }
      GatewayEvent::HeartbeatAck(_) => {
        heartbeater.ack();
        Ok(Flow::Continue)
      }
      _ => Ok(Flow::Continue)
    }
  }

  /// Sends one speaking-state transition. Call with `true` before the first
  /// frame of a burst and `false` once the source goes idle.
  pub async fn set_speaking(&self, speaking: bool) -> Result<(), VoiceError> {
    if self.is_speaking.swap(speaking, Ordering::SeqCst) == speaking {
      return Ok(());
    }
    let ws = self.current_ws.lock().await.clone().ok_or(VoiceError::NotStreaming)?;
    let ssrc = self.media.lock().await.as_ref().map(|media| media.ready.ssrc).unwrap_or(0);
    ws.send_speaking(ssrc, speaking).await?;
    Ok(())
  }

  /// Closes the currently-live websocket with `code`, if connected. A
  /// no-op (not an error) when already disconnected.
  pub async fn close(&self, code: u16) {
    if let Some(ws) = self.current_ws.lock().await.as_ref() {
      ws.close(code);
    }
  }

  /// Encrypts and sends one Opus frame over the established RTP session,
  /// advancing the RTP timestamp by `sample_count` (not a fixed 20ms
  /// constant, so a padded tail frame with fewer real samples still keeps
  /// the timestamp in sync with the next queued track). Returns
  /// [`VoiceError::NotStreaming`] before `session_description`.
  pub async fn send_frame(&self, opus_payload: &[u8], sample_count: usize) -> Result<(), VoiceError> {
    let media_guard = self.media.lock().await;
    let media = media_guard.as_ref().ok_or(VoiceError::NotStreaming)?;
    media.rtp.lock().await.send_frame(opus_payload, sample_count).await?;
    Ok(())
  }

  /// Sends a UDP keepalive if the last one is older than
  /// [`UDP_KEEPALIVE_INTERVAL`]. Driven by the director's pacing loop so the
  /// NAT mapping for the media socket survives idle gaps between tracks.
  pub async fn send_keepalive_if_due(&self) -> Result<(), VoiceError> {
    let media_guard = self.media.lock().await;
    let Some(media) = media_guard.as_ref() else { return Ok(()) };
    let mut rtp = media.rtp.lock().await;
    if rtp.heartbeat_time().elapsed() >= UDP_KEEPALIVE_INTERVAL {
      rtp.send_keepalive().await?;
    }
    Ok(())
  }
}

enum Flow {
  Continue,
  StreamingEstablished,
  Done
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn close_codes_mark_only_recoverable_ones_resumable() {
    assert!(GatewayCloseCode::SessionTimeout.is_resumable());
    assert!(GatewayCloseCode::VoiceServerCrashed.is_resumable());
    assert!(!GatewayCloseCode::AuthenticationFailed.is_resumable());
    assert!(!GatewayCloseCode::Disconnected.is_resumable());
  }

  #[tokio::test]
  async fn fresh_gateway_reports_disconnected() {
    let gateway = VoiceGateway::new(VoiceConnectOptions {
      user_id: 1,
      guild_id: 2,
      endpoint: "voice.example.com".to_owned(),
      token: "token".to_owned(),
      session_id: "session".to_owned()
    });
    assert_eq!(gateway.state().await, VoiceConnectionState::Disconnected);
  }

  #[tokio::test]
  async fn send_frame_before_session_description_is_rejected() {
    let gateway = VoiceGateway::new(VoiceConnectOptions {
      user_id: 1,
      guild_id: 2,
      endpoint: "voice.example.com".to_owned(),
      token: "token".to_owned(),
      session_id: "session".to_owned()
    });
    assert!(matches!(gateway.send_frame(&[0, 1, 2], 960).await, Err(VoiceError::NotStreaming)));
  }
}
