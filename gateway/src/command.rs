//! A deliberately minimal literal-prefix command recognizer: enough to
//! exercise join/leave/play/skip end to end. Not a parser framework — the
//! full chat-command surface is out of this crate's scope.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  Join,
  Leave,
  Play(String),
  Skip
}

/// Recognizes `<prefix>join`, `<prefix>leave`, `<prefix>play <source>` and
/// `<prefix>skip` in `content`. Anything else (including a bare prefix with
/// an unrecognized word) yields `None`.
pub fn parse(content: &str, prefix: &str) -> Option<Command> {
  let rest = content.strip_prefix(prefix)?;
  let mut words = rest.split_whitespace();
  let keyword = words.next()?;

  match keyword {
    "join" => Some(Command::Join),
    "leave" => Some(Command::Leave),
    "skip" => Some(Command::Skip),
    "play" => {
      let source: String = words.collect::<Vec<_>>().join(" ");
      if source.is_empty() {
        None
      } else {
        Some(Command::Play(source))
      }
    }
    _ => None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn recognizes_each_command() {
    assert_eq!(parse("~join", "~"), Some(Command::Join));
    assert_eq!(parse("~leave", "~"), Some(Command::Leave));
    assert_eq!(parse("~skip", "~"), Some(Command::Skip));
    assert_eq!(
      parse("~play https://example.com/track.opus", "~"),
      Some(Command::Play("https://example.com/track.opus".to_owned()))
    );
  }

  #[test]
  fn ignores_non_matching_input() {
    assert_eq!(parse("hello there", "~"), None);
    assert_eq!(parse("~unknown", "~"), None);
    assert_eq!(parse("~play", "~"), None);
  }
}
