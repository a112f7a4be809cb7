// SPDX-License-Identifier: MPL-2.0
//! Streaming decode-and-buffer pipeline.
//!
//! This module provides the decode driver and its two consumers: a
//! bounded audio ring buffer fed by a background decode thread, and a
//! synchronous video frame sink for preview rendering.

pub mod audio_buffer;
mod backend;
pub mod gain;
mod probe;
mod session;
pub mod time_units;
pub mod video_sink;

pub use audio_buffer::{AudioBuffer, BufferConfig, ReadStatus};
pub use gain::{db_to_linear, linear_to_db, ReplayGain};
pub use probe::{probe, MediaInfo};
pub use session::{AudioCallback, DecodeStep, MediaSession, SessionOptions, AUDIO_CHANNELS};
pub use video_sink::{Bitmap, FrameCallback, VideoSink};
