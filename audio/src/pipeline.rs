//! Glues a source, the decoder and the Opus encoder into the single call a
//! voice director actually wants every 20ms: "give me the next frame".

use thiserror::Error;

use crate::decode::AudioDecoder;
use crate::encode::{EncodeError, OpusFrameEncoder};
use crate::frame::{pad_to_frame, OpusFrame, PCM_FRAME_LEN};
use crate::source::AudioSource;

const READ_CHUNK: usize = 16 * 1024;

/// Cap on bytes fed into the decoder but not yet consumed. Once crossed,
/// the source pull loop pauses (stops issuing `read_chunk`) until the
/// decoder has drained enough of the backlog, bounding the decoder's
/// memory use regardless of how far ahead of real time the source runs.
const MAX_BUFFERED_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("i/o error reading from source: {0}")]
  Io(#[from] std::io::Error),
  #[error(transparent)]
  Encode(#[from] EncodeError)
}

/// Demuxes, decodes, resamples and Opus-encodes one source end to end,
/// producing fixed 20ms stereo frames with the zero-padded tail the RTP
/// send path expects for the last, usually-shorter, frame.
pub struct AudioPipeline {
  source: Box<dyn AudioSource>,
  decoder: AudioDecoder,
  encoder: OpusFrameEncoder,
  source_eof: bool,
  finished: bool
}

impl AudioPipeline {
  pub fn new(source: Box<dyn AudioSource>, bitrate_bps: i32) -> Result<Self, PipelineError> {
    Ok(Self {
      source,
      decoder: AudioDecoder::new(),
      encoder: OpusFrameEncoder::new(bitrate_bps)?,
      source_eof: false,
      finished: false
    })
  }

  /// Returns the next encoded 20ms Opus frame, or `None` once the source is
  /// fully drained and decoded.
  pub async fn next_frame(&mut self) -> Result<Option<OpusFrame>, PipelineError> {
    if self.finished {
      return Ok(None);
    }

    let mut pcm = vec![0f32; PCM_FRAME_LEN];
    let mut filled = 0;

    let mut paused = false;
    while filled < PCM_FRAME_LEN {
      let read = self.decoder.read(&mut pcm[filled..]);
      filled += read;
      if filled == PCM_FRAME_LEN {
        break;
      }

      if self.decoder.done() {
        break;
      }

      if self.source_eof {
        if read == 0 {
          break;
        }
        continue;
      }

      if self.decoder.unconsumed_bytes() >= MAX_BUFFERED_BYTES {
        paused = true;
        break;
      }

      let mut chunk = vec![0u8; READ_CHUNK];
      let read_bytes = self.source.read_chunk(&mut chunk).await?;
      if read_bytes == 0 {
        self.source_eof = true;
        self.decoder.signal_eof();
      } else {
        self.decoder.feed(&chunk[..read_bytes]);
      }
    }

    let real_eof = self.decoder.done() && !paused;
    if filled == 0 && !real_eof {
      // Paused on the input-buffer cap with nothing decoded yet this tick:
      // emit silence rather than blocking the pacing loop.
      let silence = vec![0f32; PCM_FRAME_LEN];
      let bytes = self.encoder.encode(&silence)?;
      return Ok(Some(OpusFrame { bytes, sample_count: 0, end_of_source: false }));
    }
    if filled == 0 {
      self.finished = true;
      return Ok(None);
    }

    let sample_count = filled / crate::frame::CHANNELS;
    let end_of_source = real_eof && filled < PCM_FRAME_LEN;
    if filled < PCM_FRAME_LEN {
      pcm.truncate(filled);
      pad_to_frame(&mut pcm);
    }
    if end_of_source {
      self.finished = true;
    }

    let bytes = self.encoder.encode(&pcm)?;
    Ok(Some(OpusFrame { bytes, sample_count, end_of_source }))
  }
}
