//! Pipes the stdout of a `yt-dlp`-style subprocess into the decoder, so a
//! stream URL never has to be downloaded to disk first.

use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

use super::AudioSource;

#[derive(Debug, Error)]
pub enum SubprocessError {
  #[error("failed to spawn subprocess: {0}")]
  Spawn(#[source] std::io::Error),
  #[error("subprocess did not expose a stdout pipe")]
  NoStdout
}

pub struct SubprocessSource {
  child: Child,
  stdout: ChildStdout
}

/// Format selector tried in order: webm opus, then the AAC/lower-quality
/// fallbacks, matching what the target service actually serves.
const FORMAT_SELECTOR: &str = "250/251/249/171/172";

impl SubprocessSource {
  /// Spawns `youtube-dl -f 250/251/249/171/172 -o - <url>` and streams its stdout.
  pub fn spawn(url: &str) -> Result<Self, SubprocessError> {
    Self::spawn_with("youtube-dl", url)
  }

  pub fn spawn_with(program: &str, url: &str) -> Result<Self, SubprocessError> {
    let mut child = Command::new(program)
      .args(["-f", FORMAT_SELECTOR, "-o", "-", url])
      .stdout(Stdio::piped())
      .stderr(Stdio::null())
      .stdin(Stdio::null())
      .spawn()
      .map_err(SubprocessError::Spawn)?;

    let stdout = child.stdout.take().ok_or(SubprocessError::NoStdout)?;
    debug!(program, url, "spawned audio source subprocess");

    Ok(Self { child, stdout })
  }
}

#[async_trait]
impl AudioSource for SubprocessSource {
  async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
    self.stdout.read(buf).await
  }
}

impl Drop for SubprocessSource {
  fn drop(&mut self) {
    let _ = self.child.start_kill();
  }
}
