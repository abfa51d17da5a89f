//! Container demux + decode + resample, realized with the pure-Rust
//! `symphonia` (probe/demux/decode) and `rubato` (resample) crates.
//!
//! The pull contract is `feed`/`read`/`ready`/`done` over a progression:
//!
//! ```text
//! start → opened_input → found_stream_info → found_best_stream → opened_decoder → ready → eof
//! ```
//!
//! Each arrow only advances when the underlying `symphonia` call succeeds;
//! on failure the attempt is simply retried the next time more bytes are
//! fed, so a short prefix never aborts a long stream.

use std::collections::VecDeque;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use rubato::{FftFixedIn, Resampler};
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, warn};

pub const TARGET_SAMPLE_RATE: u32 = 48_000;
pub const TARGET_CHANNELS: usize = 2;

/// How far behind the read cursor a fed byte can fall before it's reclaimed.
/// Large enough to cover the backward seeks container probing/metadata
/// parsing does; anything older than this is gone for good, bounding the
/// feed buffer's memory at roughly this many bytes regardless of stream
/// length.
const RETENTION_WINDOW: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum AudioError {
  #[error("audio source is empty or unreadable")]
  IoError,
  #[error("decoder is not ready to produce samples yet")]
  DecoderNotReady
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
  Start,
  FoundBestStream,
  OpenedDecoder,
  Ready,
  Eof
}

/// Byte buffer fed incrementally, exposed to `symphonia` as a seekable
/// in-memory source. Reads past the currently-fed tail return `WouldBlock`
/// (not a terminal EOF) unless [`FeedBuffer::close`] was called.
///
/// Bytes more than [`RETENTION_WINDOW`] behind the read cursor are dropped
/// from `bytes` and accounted for in `trimmed`, so a long-running stream's
/// memory use stays bounded instead of growing with total stream length;
/// `pos` and seek targets stay in absolute (never-trimmed) stream offsets.
#[derive(Default)]
struct FeedBuffer {
  bytes: Vec<u8>,
  trimmed: usize,
  pos: usize,
  closed: bool
}

impl FeedBuffer {
  fn total_len(&self) -> usize {
    self.trimmed + self.bytes.len()
  }

  /// Drops bytes more than [`RETENTION_WINDOW`] behind `pos`.
  fn reclaim(&mut self) {
    let local_pos = self.pos - self.trimmed;
    let drainable = local_pos.saturating_sub(RETENTION_WINDOW);
    if drainable > 0 {
      self.bytes.drain(..drainable);
      self.trimmed += drainable;
    }
  }
}

#[derive(Clone)]
struct SharedFeedBuffer(Arc<Mutex<FeedBuffer>>);

impl SharedFeedBuffer {
  fn new() -> Self {
    Self(Arc::new(Mutex::new(FeedBuffer::default())))
  }

  fn push(&self, bytes: &[u8]) {
    self.0.lock().unwrap().bytes.extend_from_slice(bytes);
  }

  fn close(&self) {
    self.0.lock().unwrap().closed = true;
  }

  fn len(&self) -> usize {
    self.0.lock().unwrap().total_len()
  }

  /// Bytes that have been fed but not yet read by the decoder; the
  /// pipeline's source pull loop pauses feeding once this crosses the
  /// configured cap.
  fn unconsumed_len(&self) -> usize {
    let inner = self.0.lock().unwrap();
    inner.total_len() - inner.pos
  }
}

impl Read for SharedFeedBuffer {
  fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
    let mut inner = self.0.lock().unwrap();
    let available = inner.total_len().saturating_sub(inner.pos);
    if available == 0 {
      return if inner.closed {
        Ok(0)
      } else {
        Err(io::Error::new(io::ErrorKind::WouldBlock, "no more fed bytes yet"))
      };
    }
    let local_pos = inner.pos - inner.trimmed;
    let take = available.min(out.len());
    out[..take].copy_from_slice(&inner.bytes[local_pos..local_pos + take]);
    inner.pos += take;
    inner.reclaim();
    Ok(take)
  }
}

impl Seek for SharedFeedBuffer {
  fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
    let mut inner = self.0.lock().unwrap();
    let len = inner.total_len() as i64;
    let target = match pos {
      SeekFrom::Start(offset) => offset as i64,
      SeekFrom::End(offset) => len + offset,
      SeekFrom::Current(offset) => inner.pos as i64 + offset
    };
    if target < 0 || target > len || target < inner.trimmed as i64 {
      return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek out of fed range"));
    }
    inner.pos = target as usize;
    Ok(inner.pos as u64)
  }
}

impl MediaSource for SharedFeedBuffer {
  fn is_seekable(&self) -> bool {
    true
  }

  fn byte_len(&self) -> Option<u64> {
    None
  }
}

fn interleave_to_planar(input: &[f32], channels: usize) -> Vec<Vec<f32>> {
  let frames = input.len() / channels;
  let mut output = vec![vec![0f32; frames]; channels];
  for frame in 0..frames {
    for channel in 0..channels {
      output[channel][frame] = input[frame * channels + channel];
    }
  }
  output
}

fn planar_to_interleave_stereo(input: &[Vec<f32>]) -> Vec<f32> {
  let frames = input[0].len();
  let mut output = vec![0f32; frames * TARGET_CHANNELS];
  match input.len() {
    1 => {
      for frame in 0..frames {
        output[frame * 2] = input[0][frame];
        output[frame * 2 + 1] = input[0][frame];
      }
    }
    _ => {
      for frame in 0..frames {
        output[frame * 2] = input[0][frame];
        output[frame * 2 + 1] = input[1][frame];
      }
    }
  }
  output
}

/// Container demux/decode/resample pipeline with a `feed`/`read` pull
/// interface. Output is always interleaved stereo float PCM at 48 kHz.
pub struct AudioDecoder {
  source: SharedFeedBuffer,
  state: DecodeState,
  format: Option<Box<dyn FormatReader>>,
  track_id: u32,
  decoder: Option<Box<dyn Decoder>>,
  resampler: Option<FftFixedIn<f32>>,
  spec: Option<SignalSpec>,
  sample_buf: Option<SampleBuffer<f32>>,
  output: VecDeque<f32>
}

impl AudioDecoder {
  pub fn new() -> Self {
    Self {
      source: SharedFeedBuffer::new(),
      state: DecodeState::Start,
      format: None,
      track_id: 0,
      decoder: None,
      resampler: None,
      spec: None,
      sample_buf: None,
      output: VecDeque::new()
    }
  }

  /// Accumulates more encoded container bytes and opportunistically
  /// advances the probe/decode state machine as far as it will go.
  pub fn feed(&mut self, bytes: &[u8]) {
    self.source.push(bytes);
    self.advance();
  }

  /// Marks the upstream source exhausted; subsequent reads past the fed
  /// tail are a true EOF rather than "wait for more bytes".
  pub fn signal_eof(&mut self) {
    self.source.close();
    self.advance();
    if matches!(self.state, DecodeState::OpenedDecoder | DecodeState::Ready) && self.output.is_empty() {
      self.state = DecodeState::Eof;
    }
  }

  pub fn ready(&self) -> bool {
    matches!(self.state, DecodeState::Ready | DecodeState::Eof)
  }

  /// Bytes fed but not yet consumed by the demuxer/decoder. Callers feeding
  /// this decoder from a pull source should pause once this crosses their
  /// input-buffer cap.
  pub fn unconsumed_bytes(&self) -> usize {
    self.source.unconsumed_len()
  }

  pub fn done(&self) -> bool {
    self.state == DecodeState::Eof && self.output.is_empty()
  }

  /// Drains up to `out.len()` interleaved stereo float samples, returning
  /// the number actually written. Never blocks; call again after `feed`-ing
  /// more bytes if it returns fewer than requested and `done()` is false.
  pub fn read(&mut self, out: &mut [f32]) -> usize {
    self.advance();
    let count = out.len().min(self.output.len());
    for slot in out.iter_mut().take(count) {
      *slot = self.output.pop_front().unwrap();
    }
    count
  }

  fn advance(&mut self) {
    if self.state == DecodeState::Start {
      self.try_open_input();
    }
    if self.state == DecodeState::FoundBestStream {
      self.try_open_decoder();
    }
    if matches!(self.state, DecodeState::OpenedDecoder | DecodeState::Ready) {
      self.drain_packets();
    }
  }

  fn try_open_input(&mut self) {
    if self.source.len() == 0 {
      return;
    }
    let stream = MediaSourceStream::new(Box::new(self.source.clone()), Default::default());
    match symphonia::default::get_probe().format(
      &Hint::new(),
      stream,
      &FormatOptions::default(),
      &MetadataOptions::default()
    ) {
      Ok(probed) => {
        let track = probed
          .format
          .tracks()
          .iter()
          .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
          .map(|track| track.id);
        match track {
          Some(track_id) => {
            self.track_id = track_id;
            self.format = Some(probed.format);
            self.state = DecodeState::FoundBestStream;
          }
          None => debug!("probed container has no decodeable track yet, waiting for more data")
        }
      }
      Err(error) => debug!(%error, "probe not ready yet, will retry on next feed")
    }
  }

  fn try_open_decoder(&mut self) {
    let Some(format) = self.format.as_ref() else { return };
    let Some(track) = format.tracks().iter().find(|track| track.id == self.track_id) else {
      return;
    };
    match symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default()) {
      Ok(decoder) => {
        self.decoder = Some(decoder);
        self.state = DecodeState::OpenedDecoder;
      }
      Err(error) => warn!(%error, "unsupported codec")
    }
  }

  fn drain_packets(&mut self) {
    loop {
      let Some(format) = self.format.as_mut() else { return };
      let packet = match format.next_packet() {
        Ok(packet) => packet,
        Err(SymphoniaError::IoError(io_error)) if io_error.kind() == io::ErrorKind::WouldBlock => return,
        Err(SymphoniaError::IoError(_)) => {
          self.state = DecodeState::Eof;
          return;
        }
        Err(error) => {
          warn!(%error, "format reader stopped producing packets");
          self.state = DecodeState::Eof;
          return;
        }
      };

      if packet.track_id() != self.track_id {
        continue;
      }

      let Some(decoder) = self.decoder.as_mut() else { return };
      match decoder.decode(&packet) {
        Ok(buffer) => {
          if self.sample_buf.is_none() {
            let spec = *buffer.spec();
            let duration = buffer.capacity() as u64;
            self.sample_buf = Some(SampleBuffer::<f32>::new(duration, spec));
            if spec.rate != TARGET_SAMPLE_RATE {
              self.resampler = Some(
                FftFixedIn::<f32>::new(spec.rate as usize, TARGET_SAMPLE_RATE as usize, buffer.capacity(), 2, spec.channels.count())
                  .expect("valid resampler parameters")
              );
            }
            self.spec = Some(spec);
          }

          let sample_buf = self.sample_buf.as_mut().unwrap();
          sample_buf.copy_interleaved_ref(buffer);

          let spec = self.spec.unwrap();
          let interleaved = self.resample(sample_buf.samples(), spec);
          self.output.extend(interleaved);
          self.state = DecodeState::Ready;
        }
        Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::DecodeError(_)) => continue,
        Err(error) => {
          warn!(%error, "unrecoverable decode error");
          self.state = DecodeState::Eof;
          return;
        }
      }
    }
  }

  fn resample(&mut self, input: &[f32], spec: SignalSpec) -> Vec<f32> {
    let channels = spec.channels.count().max(1);
    if spec.rate == TARGET_SAMPLE_RATE {
      return if channels == TARGET_CHANNELS {
        input.to_vec()
      } else {
        planar_to_interleave_stereo(&interleave_to_planar(input, channels))
      };
    }

    let resampler = self.resampler.as_mut().expect("resampler set alongside sample_buf");
    let frames_in = interleave_to_planar(input, channels);
    let frames_out = resampler.process(&frames_in, None).expect("resample input sized to resampler chunk");
    planar_to_interleave_stereo(&frames_out)
  }
}

impl Default for AudioDecoder {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn one_byte_prefix_does_not_reach_ready() {
    let mut decoder = AudioDecoder::new();
    decoder.feed(&[0u8]);
    assert!(!decoder.ready());
  }

  #[test]
  fn empty_decoder_reports_not_done() {
    let decoder = AudioDecoder::new();
    assert!(!decoder.done());
  }

  #[test]
  fn consumed_bytes_beyond_the_retention_window_are_reclaimed() {
    let source = SharedFeedBuffer::new();
    source.push(&vec![0u8; RETENTION_WINDOW * 3]);

    let mut out = vec![0u8; RETENTION_WINDOW * 2];
    let mut reader = source.clone();
    reader.read_exact(&mut out).unwrap();

    let inner = source.0.lock().unwrap();
    assert!(inner.bytes.len() < RETENTION_WINDOW * 3, "consumed prefix should have been drained");
    assert!(inner.trimmed > 0);
  }

  #[test]
  fn unconsumed_len_reflects_fed_but_unread_bytes() {
    let decoder = AudioDecoder::new();
    decoder.source.push(&[0u8; 10]);
    assert_eq!(decoder.unconsumed_bytes(), 10);
  }
}
