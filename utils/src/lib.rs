pub mod snowflake;
pub mod state_flow;

pub use snowflake::Snowflake;
