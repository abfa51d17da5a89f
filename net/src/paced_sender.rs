//! A single-writer, rate-limited outbound queue.
//!
//! One Tokio task (the "strand") owns the pending queue, the per-item
//! callback and the inter-send timer; nothing else is allowed to touch
//! `WsConnection::send` for a gateway that routes its sends through here.
//! Every enqueued item's callback fires exactly once, including when the
//! sender is torn down with items still queued.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

use crate::ws::{WsConnection, WsError};

struct Job {
  text: String,
  done: oneshot::Sender<Result<(), WsError>>
}

/// Handle to a running paced sender. Cloning shares the same queue.
#[derive(Clone)]
pub struct PacedSender {
  tx: mpsc::UnboundedSender<Job>
}

impl PacedSender {
  /// Spawns the strand task. `min_gap` is the minimum delay between two
  /// consecutive sends on the underlying connection (0 disables pacing).
  pub fn spawn(ws: Arc<WsConnection>, min_gap: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(Self::run(ws, min_gap, rx));
    Self { tx }
  }

  /// Enqueues `text`; the returned receiver resolves once the item has been
  /// sent (or has failed to send) in FIFO order relative to every other
  /// enqueue on this sender.
  pub fn enqueue(&self, text: String) -> oneshot::Receiver<Result<(), WsError>> {
    let (done, done_rx) = oneshot::channel();
    if self.tx.send(Job { text, done }).is_err() {
      // Strand already gone; synthesize the one required callback invocation.
      let (immediate, immediate_rx) = oneshot::channel();
      let _ = immediate.send(Err(WsError::ConnectionClosed));
      return immediate_rx;
    }
    done_rx
  }

  async fn run(ws: Arc<WsConnection>, min_gap: Duration, mut rx: mpsc::UnboundedReceiver<Job>) {
    let mut last_sent: Option<Instant> = None;

    while let Some(job) = rx.recv().await {
      if min_gap > Duration::ZERO {
        if let Some(last) = last_sent {
          let elapsed = last.elapsed();
          if elapsed < min_gap {
            tokio::time::sleep(min_gap - elapsed).await;
          }
        }
      }

      let result = ws.send(job.text);
      last_sent = Some(Instant::now());
      let _ = job.done.send(result);
    }
    // `rx.recv()` only returns `None` once every sender is dropped and the
    // queue is drained, so every job enqueued above has already had its
    // callback invoked by the time we get here.
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn dropped_strand_still_completes_the_callback() {
    let (tx, rx) = mpsc::unbounded_channel::<Job>();
    drop(rx);
    let sender = PacedSender { tx };
    let result = sender.enqueue("hi".to_owned()).await.unwrap();
    assert!(matches!(result, Err(WsError::ConnectionClosed)));
  }
}
