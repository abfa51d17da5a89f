//! Opus encoding: wraps `opus::Encoder` fixed to 48 kHz stereo, the only
//! format the rest of the pipeline ever produces.

use opus::{Application, Bitrate, Channels, Encoder, Signal};
use thiserror::Error;
use tracing::warn;

use crate::frame::{CHANNELS, PCM_FRAME_LEN, SAMPLES_PER_CHANNEL};

const MIN_BITRATE_BPS: i32 = 8000;
const MAX_BITRATE_BPS: i32 = 128_000;

#[derive(Debug, Error)]
pub enum EncodeError {
  #[error("opus encoder error: {0}")]
  Opus(#[from] opus::Error),
  #[error("expected a {PCM_FRAME_LEN}-sample interleaved stereo frame, got {0}")]
  WrongFrameSize(usize)
}

pub struct OpusFrameEncoder {
  encoder: Encoder
}

impl OpusFrameEncoder {
  pub fn new(bitrate_bps: i32) -> Result<Self, EncodeError> {
    let mut encoder = Encoder::new(48_000, Channels::Stereo, Application::Audio)?;
    encoder.set_signal(Signal::Music)?;
    encoder.set_bitrate(Bitrate::Bits(bitrate_bps.clamp(MIN_BITRATE_BPS, MAX_BITRATE_BPS)))?;
    Ok(Self { encoder })
  }

  pub fn set_bitrate(&mut self, bitrate_bps: i32) -> Result<(), EncodeError> {
    self.encoder.set_bitrate(Bitrate::Bits(bitrate_bps.clamp(MIN_BITRATE_BPS, MAX_BITRATE_BPS)))?;
    Ok(())
  }

  /// Encodes one 20ms interleaved stereo PCM frame ([`PCM_FRAME_LEN`] samples
  /// exactly) into an Opus packet.
  pub fn encode(&mut self, pcm: &[f32]) -> Result<Vec<u8>, EncodeError> {
    if pcm.len() != PCM_FRAME_LEN {
      return Err(EncodeError::WrongFrameSize(pcm.len()));
    }
    let mut out = vec![0u8; 4000];
    let written = self.encoder.encode_float(pcm, &mut out)?;
    out.truncate(written);
    Ok(out)
  }

  pub fn reset(&mut self) -> Result<(), EncodeError> {
    self.encoder.reset_state()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_wrong_sized_frames() {
    let mut encoder = OpusFrameEncoder::new(64_000).unwrap();
    let short = vec![0f32; SAMPLES_PER_CHANNEL * CHANNELS - 2];
    assert!(matches!(encoder.encode(&short), Err(EncodeError::WrongFrameSize(_))));
  }
}
