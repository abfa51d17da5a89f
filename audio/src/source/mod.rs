//! Audio sources: where the encoded container bytes fed into
//! [`crate::decode::AudioDecoder`] come from. Kept to the two cases this
//! crate actually needs — a local file and a `youtube-dl` subprocess piping
//! its stdout — rather than a wider provider zoo (HTTP/playlist lookups),
//! which belongs one layer up in a full bot, not in this media pipeline.

pub mod file;
pub mod subprocess;

use async_trait::async_trait;

pub use file::FileSource;
pub use subprocess::SubprocessSource;

/// A byte-chunk producer feeding an [`crate::decode::AudioDecoder`].
///
/// `read_chunk` returns `Ok(0)` exactly once, at end of stream; it must
/// never be called again afterwards.
#[async_trait]
pub trait AudioSource: Send {
  async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}
