//! Transport-layer building blocks shared by the control gateway and the
//! per-guild voice gateways: URI parsing, the websocket handshake digest, a
//! thin connection wrapper, a paced outbound queue and a heartbeat watchdog.

pub mod handshake;
pub mod heartbeater;
pub mod paced_sender;
pub mod uri;
pub mod ws;

pub use heartbeater::Heartbeater;
pub use paced_sender::PacedSender;
pub use ws::{WsConnection, WsError, WsEvent};
