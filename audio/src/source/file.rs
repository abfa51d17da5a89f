//! Plays a local file straight off disk, read into memory once at open time.

use async_trait::async_trait;

use super::AudioSource;

pub struct FileSource {
  bytes: Vec<u8>,
  pos: usize
}

impl FileSource {
  pub async fn open(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
    let bytes = tokio::fs::read(path).await?;
    Ok(Self { bytes, pos: 0 })
  }
}

#[async_trait]
impl AudioSource for FileSource {
  async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
    let available = self.bytes.len() - self.pos;
    let take = available.min(buf.len());
    buf[..take].copy_from_slice(&self.bytes[self.pos..self.pos + take]);
    self.pos += take;
    Ok(take)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn drains_the_whole_file_then_reports_eof() {
    let dir = std::env::temp_dir().join(format!("audio-file-source-test-{}", std::process::id()));
    tokio::fs::write(&dir, b"some encoded bytes").await.unwrap();

    let mut source = FileSource::open(&dir).await.unwrap();
    let mut buf = [0u8; 8];
    let mut total = Vec::new();
    loop {
      let read = source.read_chunk(&mut buf).await.unwrap();
      if read == 0 {
        break;
      }
      total.extend_from_slice(&buf[..read]);
    }
    assert_eq!(total, b"some encoded bytes");

    tokio::fs::remove_file(&dir).await.unwrap();
  }
}
