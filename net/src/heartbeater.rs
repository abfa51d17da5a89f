//! Periodic heartbeat with an ACK watchdog, shared by the control gateway
//! and every voice gateway.
//!
//! ```text
//! idle ── hello(I) ──► waiting ── timer(I) ──► fired ── ack ──► waiting
//!                                      │
//!                                      └─ !ack ──► transport_failure
//! ```
//!
//! The owner supplies the interval via [`Heartbeater::hello`], acknowledges
//! inbound ACKs via [`Heartbeater::ack`], and reacts to [`HeartbeaterEvent`]s
//! on the channel returned by [`Heartbeater::spawn`]: send the opcode-specific
//! payload on `Tick`, tear down and reconnect on `TimedOut`.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, Interval};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeaterEvent {
  /// The interval elapsed with the previous beat acked; send another one.
  Tick,
  /// The interval elapsed without an ACK for the previous beat.
  TimedOut
}

pub struct Heartbeater {
  hello_tx: mpsc::UnboundedSender<Duration>,
  ack_tx: mpsc::UnboundedSender<()>
}

impl Heartbeater {
  pub fn spawn() -> (Self, mpsc::UnboundedReceiver<HeartbeaterEvent>) {
    let (hello_tx, mut hello_rx) = mpsc::unbounded_channel::<Duration>();
    let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<()>();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
      let mut acked = true;
      let mut timer: Option<Interval> = None;

      loop {
        tokio::select! {
          hello = hello_rx.recv() => {
            match hello {
              Some(period) => {
                let mut next = interval(period);
                next.tick().await; // first tick is immediate; consume it
                timer = Some(next);
                acked = true;
              }
              None => break
            }
          }

          ack = ack_rx.recv() => {
            match ack {
              Some(()) => acked = true,
              None => break
            }
          }

          _ = tick(&mut timer), if timer.is_some() => {
            if !acked {
              let _ = event_tx.send(HeartbeaterEvent::TimedOut);
              break;
            }
            acked = false;
            if event_tx.send(HeartbeaterEvent::Tick).is_err() {
              break;
            }
          }
        }
      }
    });

    (Self { hello_tx, ack_tx }, event_rx)
  }

  /// (Re)starts the watchdog on interval `period`, as if a fresh HELLO had
  /// just arrived: cancels any prior timer and clears the pending-ack flag.
  pub fn hello(&self, period: Duration) {
    let _ = self.hello_tx.send(period);
  }

  /// Clears the pending-ack flag for the current interval.
  pub fn ack(&self) {
    let _ = self.ack_tx.send(());
  }
}

async fn tick(timer: &mut Option<Interval>) {
  match timer {
    Some(timer) => {
      timer.tick().await;
    }
    None => std::future::pending().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[tokio::test(start_paused = true)]
  async fn fires_once_per_interval_then_times_out_without_ack() {
    let (heartbeater, mut events) = Heartbeater::spawn();
    heartbeater.hello(Duration::from_millis(50));

    tokio::time::advance(Duration::from_millis(60)).await;
    assert_eq!(events.recv().await, Some(HeartbeaterEvent::Tick));

    heartbeater.ack();
    tokio::time::advance(Duration::from_millis(60)).await;
    assert_eq!(events.recv().await, Some(HeartbeaterEvent::Tick));

    // No ack this time: the next interval should time out instead of ticking.
    tokio::time::advance(Duration::from_millis(60)).await;
    assert_eq!(events.recv().await, Some(HeartbeaterEvent::TimedOut));
  }
}
