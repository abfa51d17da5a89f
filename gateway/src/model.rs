//! The in-memory data model the gateway maintains: guilds, channels,
//! members, users, and the store that indexes them.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use utils::Snowflake;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
  GuildText,
  Dm,
  GuildVoice,
  GuildDm,
  GuildCategory
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
  pub id: Snowflake,
  pub username: String,
  pub discriminator: String
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
  pub user: User,
  pub nickname: Option<String>,
  pub joined_at: String
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
  pub id: Snowflake,
  pub guild_id: Option<Snowflake>,
  pub kind: ChannelType,
  pub name: String,
  pub bitrate: Option<u32>,
  pub user_limit: Option<u32>
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guild {
  pub id: Snowflake,
  pub owner_id: Snowflake,
  pub name: String,
  pub region: String,
  pub unavailable: bool,
  pub channels: HashSet<Snowflake>,
  pub members: HashMap<Snowflake, Member>
}

impl Guild {
  /// Looks up a guild channel by exact name match; used by the minimal
  /// command recognizer to resolve `~join <channel>`-style input.
  pub fn channel_named<'a>(&self, store: &'a GatewayStore, name: &str) -> Option<&'a Channel> {
    self
      .channels
      .iter()
      .filter_map(|id| store.channels.get(id))
      .find(|channel| channel.name == name)
  }
}

/// Authoritative mapping from channel id to guild id, and guild id to guild.
/// Mutated only by the gateway's dispatch handlers for
/// `GUILD_CREATE`/`CHANNEL_CREATE`/`CHANNEL_UPDATE`/`CHANNEL_DELETE`; read
/// by the director and command layer for channel-name lookup.
#[derive(Debug, Default)]
pub struct GatewayStore {
  pub guilds: HashMap<Snowflake, Guild>,
  pub channels: HashMap<Snowflake, Channel>,
  channel_to_guild: HashMap<Snowflake, Snowflake>
}

impl GatewayStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn lookup_channel_guild(&self, channel_id: Snowflake) -> Option<Snowflake> {
    self.channel_to_guild.get(&channel_id).copied()
  }

  pub fn guild(&self, guild_id: Snowflake) -> Option<&Guild> {
    self.guilds.get(&guild_id)
  }

  /// Applies a `GUILD_CREATE`: inserts the guild and indexes its channels.
  pub fn insert_guild(&mut self, guild: Guild, channels: Vec<Channel>) {
    let guild_id = guild.id;
    self.guilds.insert(guild_id, guild);
    for channel in channels {
      self.insert_channel_for(guild_id, channel);
    }
  }

  /// Applies a `CHANNEL_CREATE`.
  pub fn insert_channel(&mut self, channel: Channel) {
    let Some(guild_id) = channel.guild_id else { return };
    self.insert_channel_for(guild_id, channel);
  }

  fn insert_channel_for(&mut self, guild_id: Snowflake, channel: Channel) {
    let channel_id = channel.id;
    self.channel_to_guild.insert(channel_id, guild_id);
    if let Some(guild) = self.guilds.get_mut(&guild_id) {
      guild.channels.insert(channel_id);
    }
    self.channels.insert(channel_id, channel);
  }

  /// Applies a `CHANNEL_UPDATE`: fields change, guild membership does not.
  pub fn update_channel(&mut self, channel: Channel) {
    if let Some(existing) = self.channels.get_mut(&channel.id) {
      *existing = channel;
    } else {
      self.insert_channel(channel);
    }
  }

  /// Applies a `CHANNEL_DELETE`.
  pub fn remove_channel(&mut self, channel_id: Snowflake) {
    if let Some(guild_id) = self.channel_to_guild.remove(&channel_id) {
      if let Some(guild) = self.guilds.get_mut(&guild_id) {
        guild.channels.remove(&channel_id);
      }
    }
    self.channels.remove(&channel_id);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn guild(id: u64) -> Guild {
    Guild {
      id: Snowflake(id),
      owner_id: Snowflake(1),
      name: "g".to_owned(),
      region: "us".to_owned(),
      unavailable: false,
      channels: HashSet::new(),
      members: HashMap::new()
    }
  }

  fn channel(id: u64, guild_id: u64) -> Channel {
    Channel {
      id: Snowflake(id),
      guild_id: Some(Snowflake(guild_id)),
      kind: ChannelType::GuildText,
      name: format!("chan-{id}"),
      bitrate: None,
      user_limit: None
    }
  }

  #[test]
  fn channel_to_guild_is_consistent_after_create_update_delete() {
    let mut store = GatewayStore::new();
    store.insert_guild(guild(1), vec![channel(10, 1), channel(11, 1)]);
    store.insert_channel(channel(12, 1));

    for channel_id in [10, 11, 12] {
      assert_eq!(store.lookup_channel_guild(Snowflake(channel_id)), Some(Snowflake(1)));
      assert!(store.guild(Snowflake(1)).unwrap().channels.contains(&Snowflake(channel_id)));
    }

    store.update_channel(Channel { name: "renamed".to_owned(), ..channel(10, 1) });
    assert_eq!(store.channels[&Snowflake(10)].name, "renamed");
    assert_eq!(store.lookup_channel_guild(Snowflake(10)), Some(Snowflake(1)));

    store.remove_channel(Snowflake(11));
    assert_eq!(store.lookup_channel_guild(Snowflake(11)), None);
    assert!(!store.guild(Snowflake(1)).unwrap().channels.contains(&Snowflake(11)));
  }
}
