//! The control-plane gateway: connect, identify, heartbeat-with-ACK,
//! dispatch, resume/reconnect, plus the in-memory guild/channel store and a
//! minimal literal-prefix command recognizer.

pub mod close_code;
pub mod command;
pub mod dispatch;
pub mod gateway;
pub mod model;
pub mod opcode;
pub mod payload;

pub use close_code::GatewayCloseCode;
pub use dispatch::{DispatchContext, Dispatcher, Handler};
pub use gateway::{parse_voice_server_update, parse_voice_state_update, Gateway, GatewayConfig, GatewayError};
pub use model::{Channel, ChannelType, Guild, GatewayStore, Member, User};
pub use opcode::GatewayOpcode;
