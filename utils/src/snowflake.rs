use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A 64-bit identifier carried on the wire as a decimal string.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Snowflake(pub u64);

impl fmt::Display for Snowflake {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<u64> for Snowflake {
  fn from(value: u64) -> Self {
    Snowflake(value)
  }
}

impl FromStr for Snowflake {
  type Err = std::num::ParseIntError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(Snowflake(s.parse()?))
  }
}

impl Serialize for Snowflake {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.collect_str(&self.0)
  }
}

impl<'de> Deserialize<'de> for Snowflake {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>
  {
    struct SnowflakeVisitor;

    impl<'de> Visitor<'de> for SnowflakeVisitor {
      type Value = Snowflake;

      fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a snowflake encoded as a decimal string or integer")
      }

      fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
      where
        E: de::Error
      {
        v.parse().map(Snowflake).map_err(de::Error::custom)
      }

      fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
      where
        E: de::Error
      {
        Ok(Snowflake(v))
      }
    }

    deserializer.deserialize_any(SnowflakeVisitor)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips_through_json_string() {
    let id = Snowflake(175_928_847_299_117_063);
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"175928847299117063\"");

    let back: Snowflake = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
  }

  #[test]
  fn accepts_bare_integer() {
    let back: Snowflake = serde_json::from_str("42").unwrap();
    assert_eq!(back, Snowflake(42));
  }
}
