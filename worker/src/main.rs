//! Process entry point: parses the bot token, wires the control gateway to
//! per-guild playback directors via dispatch handlers, and runs until the
//! gateway hits a fatal condition or the process receives SIGINT.

mod config;
mod director;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use gateway::command::{self, Command};
use gateway::payload::MessageCreate;
use gateway::{parse_voice_server_update, parse_voice_state_update, Gateway, GatewayConfig};
use tokio::sync::RwLock;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use utils::Snowflake;

use crate::config::Config;
use crate::director::{DirectorCommand, DirectorHandle};

const COMMAND_PREFIX: &str = "~";
const GATEWAY_HOST: &str = "gateway.discord.gg";

type DirectorRegistry = RwLock<HashMap<Snowflake, DirectorHandle>>;
/// Per-guild, per-user last-known voice channel, kept only to resolve a bare
/// `~join` to the author's current channel.
type MemberVoiceChannels = RwLock<HashMap<(Snowflake, Snowflake), Snowflake>>;

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

  let config = Config::from_args(std::env::args()).context("invalid arguments")?;
  let mut gateway = Gateway::new(GatewayConfig { host: GATEWAY_HOST.to_owned(), token: config.token });

  let directors: Arc<DirectorRegistry> = Arc::new(RwLock::new(HashMap::new()));
  let member_voice_channels: Arc<MemberVoiceChannels> = Arc::new(RwLock::new(HashMap::new()));
  let gateway_cell: Arc<OnceLock<Arc<Gateway>>> = Arc::new(OnceLock::new());

  register_voice_state_handler(&mut gateway, directors.clone(), member_voice_channels.clone(), gateway_cell.clone());
  register_voice_server_handler(&mut gateway, directors.clone());
  register_message_handler(&mut gateway, directors.clone(), member_voice_channels.clone(), gateway_cell.clone());

  let gateway = Arc::new(gateway);
  gateway_cell.set(gateway.clone()).ok();

  let run_task = {
    let gateway = gateway.clone();
    tokio::spawn(async move { gateway.run().await })
  };

  tokio::select! {
    result = run_task => {
      match result {
        Ok(Ok(())) => info!("gateway closed cleanly"),
        Ok(Err(error)) => warn!(%error, "gateway terminated with an error"),
        Err(error) => warn!(%error, "gateway task panicked")
      }
    }
    _ = tokio::signal::ctrl_c() => {
      info!("received ctrl-c, shutting down");
    }
  }

  Ok(())
}

/// Tracks every member's current voice channel (not just the bot's own) so
/// a bare `~join` can be resolved to the author's channel, and forwards the
/// bot's own session id to its guild's director once one exists.
fn register_voice_state_handler(
  gateway: &mut Gateway,
  directors: Arc<DirectorRegistry>,
  member_voice_channels: Arc<MemberVoiceChannels>,
  gateway_cell: Arc<OnceLock<Arc<Gateway>>>
) {
  gateway.on(
    "VOICE_STATE_UPDATE",
    Arc::new(move |ctx| {
      let update = parse_voice_state_update(ctx.data)?;
      let Some(guild_id) = update.guild_id else { return Ok(()) };

      let directors = directors.clone();
      let member_voice_channels = member_voice_channels.clone();
      let gateway_cell = gateway_cell.clone();
      tokio::spawn(async move {
        match update.channel_id {
          Some(channel_id) => {
            member_voice_channels.write().await.insert((guild_id, update.user_id), channel_id);
          }
          None => {
            member_voice_channels.write().await.remove(&(guild_id, update.user_id));
          }
        }

        let is_self = gateway_cell.get().and_then(|gateway| gateway.current_user_id()) == Some(update.user_id);
        if !is_self {
          return;
        }
        if let Some(handle) = directors.read().await.get(&guild_id) {
          handle.send(DirectorCommand::VoiceSessionId { session_id: update.session_id });
        }
      });

      Ok(())
    })
  );
}

/// Forwards the guild's voice-server token/endpoint to its director, if one
/// exists. An absent endpoint means the voice server is unavailable; there
/// is nothing useful to forward in that case.
fn register_voice_server_handler(gateway: &mut Gateway, directors: Arc<DirectorRegistry>) {
  gateway.on(
    "VOICE_SERVER_UPDATE",
    Arc::new(move |ctx| {
      let update = parse_voice_server_update(ctx.data)?;
      let Some(endpoint) = update.endpoint else { return Ok(()) };

      let directors = directors.clone();
      tokio::spawn(async move {
        if let Some(handle) = directors.read().await.get(&update.guild_id) {
          handle.send(DirectorCommand::VoiceServer { token: update.token, endpoint });
        }
      });

      Ok(())
    })
  );
}

/// Recognizes `~join`/`~leave`/`~play <source>`/`~skip` and forwards them to
/// the issuing guild's director, spawning one on first use.
fn register_message_handler(
  gateway: &mut Gateway,
  directors: Arc<DirectorRegistry>,
  member_voice_channels: Arc<MemberVoiceChannels>,
  gateway_cell: Arc<OnceLock<Arc<Gateway>>>
) {
  gateway.on(
    "MESSAGE_CREATE",
    Arc::new(move |ctx| {
      let message: MessageCreate = serde_json::from_value(ctx.data.clone())?;
      if message.author.bot.unwrap_or(false) {
        return Ok(());
      }
      let Some(guild_id) = message.guild_id else { return Ok(()) };
      let Some(command) = command::parse(&message.content, COMMAND_PREFIX) else { return Ok(()) };

      let directors = directors.clone();
      let member_voice_channels = member_voice_channels.clone();
      let gateway_cell = gateway_cell.clone();
      let author_id = message.author.id;
      tokio::spawn(async move {
        let Some(gateway) = gateway_cell.get().cloned() else { return };
        let Some(user_id) = gateway.current_user_id() else { return };

        let handle = {
          let mut guard = directors.write().await;
          guard.entry(guild_id).or_insert_with(|| director::spawn(guild_id, user_id, gateway)).clone()
        };

        match command {
          Command::Join => match member_voice_channels.read().await.get(&(guild_id, author_id)).copied() {
            Some(channel_id) => handle.send(DirectorCommand::Join { channel_id }),
            None => warn!(%author_id, %guild_id, "join requested but author's voice channel is unknown")
          },
          Command::Leave => handle.send(DirectorCommand::Leave),
          Command::Play(source) => handle.send(DirectorCommand::Play { source }),
          Command::Skip => handle.send(DirectorCommand::Skip)
        }
      });

      Ok(())
    })
  );
}
