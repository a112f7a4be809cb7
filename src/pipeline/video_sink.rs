// SPDX-License-Identifier: MPL-2.0
//! Synchronous video frame delivery.
//!
//! Video is only needed for preview rendering, so there is no buffering
//! here: at most one frame is ever "current". Each decoded frame is
//! converted from the codec's native pixel format to a single RGB bitmap
//! and handed to a caller-supplied callback on the caller's thread. The
//! colorspace conversion context is owned by the sink and re-created
//! only when the incoming frame's format changes between calls.

use crate::error::{Error, Result};
use crate::pipeline::session::{DecodeStep, MediaSession};
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::{decoder, frame};
use std::path::Path;

/// Bytes per pixel of the delivered RGB24 bitmaps.
const RGB_BYTES_PER_PIXEL: usize = 3;

/// Sink for decoded video frames.
pub type FrameCallback = Box<dyn FnMut(Bitmap) + Send>;

/// One decoded video frame as tightly packed RGB24.
#[derive(Debug, Clone)]
pub struct Bitmap {
    /// RGB pixel data (width × height × 3 bytes).
    pub data: Vec<u8>,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Presentation timestamp in seconds.
    pub timestamp_secs: f64,
}

impl Bitmap {
    /// Returns the total size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Scaler plus the source description it was built for.
struct ScalerState {
    context: scaling::Context,
    input: (Pixel, u32, u32),
}

/// Conversion stage between the decoder and the frame callback.
pub(crate) struct VideoStage {
    pub(crate) decoder: decoder::Video,
    scaler: Option<ScalerState>,
    sink: FrameCallback,
}

impl VideoStage {
    pub(crate) fn new(decoder: decoder::Video, sink: FrameCallback) -> Self {
        Self {
            decoder,
            scaler: None,
            sink,
        }
    }

    /// Converts one decoded frame to RGB and invokes the sink callback.
    pub(crate) fn process_frame(&mut self, frame: &frame::Video, position: f64) -> Result<()> {
        let input = (frame.format(), frame.width(), frame.height());
        if !matches!(&self.scaler, Some(state) if state.input == input) {
            let context = scaling::Context::get(
                input.0,
                input.1,
                input.2,
                Pixel::RGB24,
                input.1,
                input.2,
                scaling::Flags::BILINEAR,
            )
            .map_err(|e| Error::decode("sws_getContext", e))?;
            self.scaler = Some(ScalerState { context, input });
        }
        let Some(state) = self.scaler.as_mut() else {
            return Ok(());
        };

        let mut rgb = frame::Video::empty();
        state
            .context
            .run(frame, &mut rgb)
            .map_err(|e| Error::decode("sws_scale", e))?;

        (self.sink)(Bitmap {
            data: extract_rgb(&rgb),
            width: input.1,
            height: input.2,
            timestamp_secs: position,
        });
        Ok(())
    }
}

/// Extracts tightly packed RGB data from a scaled frame, handling the
/// backend's row stride.
fn extract_rgb(frame: &frame::Video) -> Vec<u8> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let data = frame.data(0);
    let stride = frame.stride(0);

    let row_bytes = width * RGB_BYTES_PER_PIXEL;
    let mut rgb = Vec::with_capacity(row_bytes * height);
    for y in 0..height {
        let row_start = y * stride;
        rgb.extend_from_slice(&data[row_start..row_start + row_bytes]);
    }

    rgb
}

/// Callback-driven consumer of decoded video frames.
///
/// Owns a [`MediaSession`] bound to the best video stream of one file.
/// Decoding is synchronous: frames reach the callback from inside
/// [`VideoSink::decode_next`] on the caller's thread.
pub struct VideoSink {
    session: MediaSession,
}

impl VideoSink {
    /// Opens a video sink delivering frames to `callback`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] if the file cannot be opened or holds no
    /// video stream.
    pub fn open<P: AsRef<Path>>(path: P, callback: FrameCallback) -> Result<Self> {
        Ok(Self {
            session: MediaSession::video(path, callback)?,
        })
    }

    /// Decodes one unit, pushing any completed frames to the callback.
    ///
    /// # Errors
    ///
    /// Conversion and decode failures are fatal to this attempt and
    /// propagate as [`Error::Decode`].
    pub fn decode_next(&mut self) -> Result<DecodeStep> {
        self.session.decode_one_frame()
    }

    /// Seeks; in-flight state is discarded and the next decoded frame
    /// reflects the new position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the backend rejects the seek.
    pub fn seek(&mut self, time_secs: f64) -> Result<()> {
        self.session.seek(time_secs)
    }

    /// Stream duration in seconds.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.session.duration()
    }

    /// Current decode position in seconds.
    #[must_use]
    pub fn position(&self) -> f64 {
        self.session.position()
    }
}
