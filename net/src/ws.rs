//! A thin connection wrapper over `tokio-tungstenite` exposing exactly the
//! contract this project's gateways need: connect, read one reassembled
//! message at a time, send a text frame, close once.
//!
//! Handshake, masking, fragmentation reassembly and ping/pong bookkeeping are
//! all handled by `tungstenite` itself; this module only classifies results
//! into the error/event shape the gateway state machines expect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Error as TungsteniteError;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Sentinel close code surfaced when the transport ends without a close frame.
pub const ABRUPT_EOF_CODE: u16 = 1;

#[derive(Debug, Error)]
pub enum WsError {
  #[error("failed to resolve host")]
  Resolve,
  #[error("failed to establish a tcp connection")]
  Connect,
  #[error("tls handshake failed")]
  TlsHandshake,
  #[error("websocket upgrade handshake failed")]
  UpgradeFailed,
  #[error("server returned an invalid Sec-WebSocket-Accept value")]
  BadUpgradeKey,
  #[error("server did not return a Sec-WebSocket-Accept header")]
  NoUpgradeKey,
  #[error("the websocket connection is closed")]
  ConnectionClosed
}

impl From<TungsteniteError> for WsError {
  fn from(error: TungsteniteError) -> Self {
    use TungsteniteError::*;
    match error {
      ConnectionClosed | AlreadyClosed => WsError::ConnectionClosed,
      Io(_) => WsError::Connect,
      Tls(_) => WsError::TlsHandshake,
      Http(_) | HttpFormat(_) | Url(_) => WsError::UpgradeFailed,
      _ => WsError::UpgradeFailed
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
  Text(String),
  Closed(u16)
}

enum Outbound {
  Text(String),
  Close(u16)
}

/// A connected, framed WebSocket channel.
///
/// Reads and writes are driven from a single background task so the socket
/// is never touched from more than one place at a time; `read_next` takes
/// `&self` (guarded by an internal mutex) so callers can share one
/// `WsConnection` behind an `Arc` with a [`crate::PacedSender`] for writes.
pub struct WsConnection {
  read_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<WsEvent>>,
  write_tx: mpsc::UnboundedSender<Outbound>,
  closed: Arc<AtomicBool>
}

impl WsConnection {
  pub async fn connect(url: &str) -> Result<Self, WsError> {
    let (socket, response) = tokio_tungstenite::connect_async(url).await.map_err(WsError::from)?;

    if response.status().as_u16() != 101 {
      return Err(WsError::UpgradeFailed);
    }
    match response.headers().get("sec-websocket-accept") {
      Some(_) => {}
      None => return Err(WsError::NoUpgradeKey)
    }

    let (mut sink, mut stream) = socket.split();
    let (read_tx, read_rx) = mpsc::unbounded_channel();
    let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Outbound>();
    let closed = Arc::new(AtomicBool::new(false));

    tokio::spawn(async move {
      loop {
        tokio::select! {
          message = stream.next() => {
            match message {
              Some(Ok(Message::Text(text))) => {
                if read_tx.send(WsEvent::Text(text)).is_err() {
                  break;
                }
              }
              Some(Ok(Message::Close(frame))) => {
                // A close frame with no body (or a malformed code) has no
                // code to echo; reply with `normal` per the close policy.
                let code = frame.as_ref().map(|f| u16::from(f.code)).unwrap_or(1000);
                let _ = sink
                  .send(Message::Close(Some(CloseFrame {
                    code: code.into(),
                    reason: "".into()
                  })))
                  .await;
                let _ = read_tx.send(WsEvent::Closed(code));
                break;
              }
              Some(Ok(_)) => {
                // Ping/pong/binary frames are handled transparently by tungstenite
                // or are not part of this protocol's contract.
              }
              Some(Err(error)) => {
                debug!("websocket read error: {:?}", error);
                let _ = read_tx.send(WsEvent::Closed(ABRUPT_EOF_CODE));
                break;
              }
              None => {
                let _ = read_tx.send(WsEvent::Closed(ABRUPT_EOF_CODE));
                break;
              }
            }
          }

          outbound = write_rx.recv() => {
            match outbound {
              Some(Outbound::Text(text)) => {
                if let Err(error) = sink.send(Message::Text(text)).await {
                  warn!("websocket send error: {:?}", error);
                  break;
                }
              }
              Some(Outbound::Close(code)) => {
                let _ = sink
                  .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::from(code),
                    reason: "".into()
                  })))
                  .await;
                break;
              }
              None => break
            }
          }
        }
      }
    });

    Ok(Self {
      read_rx: tokio::sync::Mutex::new(read_rx),
      write_tx,
      closed
    })
  }

  /// Returns one fully-reassembled text message, or `Closed(code)` once the
  /// remote end closes (or the transport ends abruptly).
  pub async fn read_next(&self) -> Option<WsEvent> {
    self.read_rx.lock().await.recv().await
  }

  pub fn send(&self, text: String) -> Result<(), WsError> {
    self.write_tx.send(Outbound::Text(text)).map_err(|_| WsError::ConnectionClosed)
  }

  /// Sends a close frame carrying `code` exactly once; a duplicate call no-ops.
  pub fn close(&self, code: u16) {
    if self.closed.swap(true, Ordering::SeqCst) {
      return;
    }
    let _ = self.write_tx.send(Outbound::Close(code));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tungstenite_errors_classify_into_our_taxonomy() {
    assert!(matches!(
      WsError::from(TungsteniteError::ConnectionClosed),
      WsError::ConnectionClosed
    ));
    assert!(matches!(WsError::from(TungsteniteError::AlreadyClosed), WsError::ConnectionClosed));
  }
}
