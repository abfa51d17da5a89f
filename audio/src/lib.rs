//! Container demux, decode, resample and Opus-encode: turns an arbitrary
//! compressed audio source into the 20ms 48kHz stereo Opus frames the voice
//! gateway's RTP send path consumes.

pub mod decode;
pub mod encode;
pub mod frame;
pub mod pipeline;
pub mod source;

pub use decode::{AudioDecoder, AudioError};
pub use encode::{EncodeError, OpusFrameEncoder};
pub use frame::{OpusFrame, CHANNELS, PCM_FRAME_LEN, SAMPLES_PER_CHANNEL, FRAME_DURATION_MS};
pub use pipeline::{AudioPipeline, PipelineError};
pub use source::{AudioSource, FileSource, SubprocessSource};

/// Initial Opus bitrate before any adaptive adjustment.
pub const DEFAULT_BITRATE_BPS: i32 = 64_000;
