//! Frame sizing shared by the decoder, resampler and Opus encoder.
//!
//! Every frame handed to the voice gateway's RTP send path is 20ms of
//! 48 kHz stereo audio: 960 samples per channel, 1920 interleaved floats.

pub const FRAME_DURATION_MS: u32 = 20;
pub const SAMPLES_PER_CHANNEL: usize = 960;
pub const CHANNELS: usize = 2;
pub const PCM_FRAME_LEN: usize = SAMPLES_PER_CHANNEL * CHANNELS;

/// Zero-pads `pcm` up to [`PCM_FRAME_LEN`] in place; used for the tail frame
/// of a source, which is usually shorter than a full 20ms slice.
pub fn pad_to_frame(pcm: &mut Vec<f32>) {
  pcm.resize(PCM_FRAME_LEN, 0f32);
}

/// One encoded 20ms unit handed to the RTP send path: the Opus packet
/// bytes, the real (pre-padding) sample count, and whether this is the
/// last frame of the source.
#[derive(Debug, Clone)]
pub struct OpusFrame {
  pub bytes: Vec<u8>,
  pub sample_count: usize,
  pub end_of_source: bool
}
