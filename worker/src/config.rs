//! Process-entry configuration: a single positional bot token argument.
//! No config file, no other flags.

use thiserror::Error;

/// Bot tokens observed in the wild are always exactly this many characters.
const TOKEN_LEN: usize = 59;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("usage: worker <bot-token>")]
  MissingToken,
  #[error("bot token must be {TOKEN_LEN} characters, got {0}")]
  MalformedToken(usize)
}

pub struct Config {
  pub token: String
}

impl Config {
  pub fn from_args(args: impl Iterator<Item = String>) -> Result<Self, ConfigError> {
    let token = args.skip(1).next().ok_or(ConfigError::MissingToken)?;
    if token.len() != TOKEN_LEN {
      return Err(ConfigError::MalformedToken(token.len()));
    }
    Ok(Self { token })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_missing_token() {
    assert!(matches!(Config::from_args(["worker".to_owned()].into_iter()), Err(ConfigError::MissingToken)));
  }

  #[test]
  fn rejects_wrong_length_token() {
    let args = ["worker".to_owned(), "short".to_owned()].into_iter();
    assert!(matches!(Config::from_args(args), Err(ConfigError::MalformedToken(5))));
  }

  #[test]
  fn accepts_59_char_token() {
    let token = "a".repeat(59);
    let args = ["worker".to_owned(), token.clone()].into_iter();
    assert_eq!(Config::from_args(args).unwrap().token, token);
  }
}
