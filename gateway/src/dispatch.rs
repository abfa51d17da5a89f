//! Dispatch fan-out: `event_name -> Vec<Handler>` plus an `ALL` wildcard
//! bucket. Handlers run synchronously on the receive task; a handler that
//! returns an error is logged and does not tear down the connection.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

/// Context passed to every dispatch handler.
pub struct DispatchContext<'a> {
  pub event_name: &'a str,
  pub seq: Option<u64>,
  pub data: &'a Value
}

pub type Handler = Arc<dyn Fn(&DispatchContext) -> anyhow::Result<()> + Send + Sync>;

const WILDCARD: &str = "ALL";

#[derive(Default)]
pub struct Dispatcher {
  handlers: HashMap<String, Vec<Handler>>
}

impl Dispatcher {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a handler for a specific event name (e.g. `"MESSAGE_CREATE"`).
  pub fn on(&mut self, event_name: impl Into<String>, handler: Handler) {
    self.handlers.entry(event_name.into()).or_default().push(handler);
  }

  /// Registers a handler invoked for every dispatched event, regardless of
  /// name, in addition to that event's own handlers.
  pub fn on_all(&mut self, handler: Handler) {
    self.handlers.entry(WILDCARD.to_owned()).or_default().push(handler);
  }

  /// Runs every handler registered for `event_name`, then every wildcard
  /// handler. Errors are logged, not propagated.
  pub fn fire(&self, ctx: &DispatchContext) {
    if let Some(handlers) = self.handlers.get(ctx.event_name) {
      for handler in handlers {
        if let Err(error) = handler(ctx) {
          warn!(event = ctx.event_name, %error, "dispatch handler failed");
        }
      }
    }
    if let Some(handlers) = self.handlers.get(WILDCARD) {
      for handler in handlers {
        if let Err(error) = handler(ctx) {
          warn!(event = ctx.event_name, %error, "wildcard dispatch handler failed");
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  #[test]
  fn fires_named_then_wildcard_handlers_without_propagating_errors() {
    let mut dispatcher = Dispatcher::new();
    let named_calls = Arc::new(AtomicUsize::new(0));
    let wildcard_calls = Arc::new(AtomicUsize::new(0));

    {
      let named_calls = named_calls.clone();
      dispatcher.on(
        "READY",
        Arc::new(move |_| {
          named_calls.fetch_add(1, Ordering::SeqCst);
          Err(anyhow::anyhow!("boom"))
        })
      );
    }
    {
      let wildcard_calls = wildcard_calls.clone();
      dispatcher.on_all(Arc::new(move |_| {
        wildcard_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
      }));
    }

    let data = Value::Null;
    dispatcher.fire(&DispatchContext {
      event_name: "READY",
      seq: Some(1),
      data: &data
    });
    dispatcher.fire(&DispatchContext {
      event_name: "UNKNOWN_EVENT",
      seq: Some(2),
      data: &data
    });

    assert_eq!(named_calls.load(Ordering::SeqCst), 1);
    assert_eq!(wildcard_calls.load(Ordering::SeqCst), 2);
  }
}
