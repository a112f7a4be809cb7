// SPDX-License-Identifier: MPL-2.0
//! One open media resource and its incremental decode state.
//!
//! [`MediaSession`] encapsulates the demuxer and decoder for exactly one
//! file and exposes a uniform "decode one unit, hand it to a sink"
//! primitive. The sink is a tagged decode target (a no-op duration
//! probe, an audio resampling stage feeding an injected callback, or a
//! video conversion stage feeding a bitmap callback), so one decode loop
//! serves all three without virtual dispatch.
//!
//! A session is exclusively owned by its pipeline wrapper and is never
//! shared between threads; the audio pipeline drives it from a single
//! dedicated decode thread.

use crate::error::{Error, Result};
use crate::pipeline::backend;
use crate::pipeline::gain::ReplayGain;
use crate::pipeline::time_units;
use crate::pipeline::video_sink::{FrameCallback, VideoStage};
use ffmpeg_next::{codec, decoder, ffi, format, frame, media, ChannelLayout, Packet};
use std::path::Path;

/// Decoded audio is always delivered as interleaved stereo.
pub const AUDIO_CHANNELS: u16 = 2;

/// Outcome of a single decode step.
///
/// End of stream is a normal control signal, not an error: it means no
/// more frames are available at the current position. A later
/// [`MediaSession::seek`] makes decoding resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStep {
    /// One packet was consumed; zero or more frames reached the sink.
    Continue,
    /// The underlying stream is exhausted at the current position.
    EndOfStream,
}

/// Sink for decoded audio: interleaved i16 samples at the target rate,
/// tagged with the interleaved sample position of the first sample.
pub type AudioCallback = Box<dyn FnMut(&[i16], i64) + Send>;

/// Options applied when opening a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Whether replay-gain tags are read from the stream. When disabled
    /// the session reports unity gain regardless of tags.
    pub normalize_loudness: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            normalize_loudness: crate::config::DEFAULT_NORMALIZE_LOUDNESS,
        }
    }
}

/// Selected stream coordinates, fixed at open.
struct StreamDesc {
    index: usize,
    /// Stream time base in seconds per tick.
    time_base: f64,
    /// Stream start time in seconds; 0 when the container does not say.
    start_secs: f64,
}

/// Everything derived from the chosen stream before a decoder exists.
struct OpenParts {
    desc: StreamDesc,
    gain: ReplayGain,
    params: codec::Parameters,
}

/// The decode target: where frames go after the shared decode loop.
enum DecodeTarget {
    /// Frames are decoded and discarded; only metadata matters.
    Probe(ProbeStage),
    /// Frames are resampled to interleaved i16 and pushed to a callback.
    Audio(AudioStage),
    /// Frames are converted to RGB bitmaps and pushed to a callback.
    Video(VideoStage),
}

enum ProbeStage {
    Audio(decoder::Audio),
    Video(decoder::Video),
}

/// Audio resampling stage: codec-native frames in, interleaved i16
/// stereo at the target rate out.
struct AudioStage {
    decoder: decoder::Audio,
    resampler: ffmpeg_next::software::resampling::Context,
    target_rate: u32,
    /// Position of the next output sample in target-rate frames; cleared
    /// on seek and re-derived from the first decoded timestamp.
    frame_pos: Option<i64>,
    sink: AudioCallback,
}

impl AudioStage {
    fn new(decoder: decoder::Audio, target_rate: u32, sink: AudioCallback) -> Result<Self> {
        let resampler = ffmpeg_next::software::resampling::Context::get(
            decoder.format(),
            decoder.channel_layout(),
            decoder.rate(),
            format::Sample::I16(format::sample::Type::Packed),
            ChannelLayout::STEREO,
            target_rate,
        )
        .map_err(|e| Error::Open(format!("failed to create resampler: {e}")))?;

        Ok(Self {
            decoder,
            resampler,
            target_rate,
            frame_pos: None,
            sink,
        })
    }

    fn process_frame(&mut self, frame: &frame::Audio, position: f64) -> Result<()> {
        let mut resampled = frame::Audio::empty();
        self.resampler
            .run(frame, &mut resampled)
            .map_err(|e| Error::decode("swr_convert", e))?;

        let samples = extract_samples(&resampled);
        if samples.is_empty() {
            return Ok(());
        }

        let base = *self
            .frame_pos
            .get_or_insert((position * f64::from(self.target_rate) + 0.5) as i64);
        (self.sink)(&samples, base * i64::from(AUDIO_CHANNELS));
        self.frame_pos = Some(base + (samples.len() / usize::from(AUDIO_CHANNELS)) as i64);
        Ok(())
    }
}

/// Extracts interleaved i16 samples from a resampled audio frame.
fn extract_samples(frame: &frame::Audio) -> Vec<i16> {
    let data = frame.data(0);
    let sample_count = frame.samples() * usize::from(frame.channels());

    let mut samples = Vec::with_capacity(sample_count);
    for i in 0..sample_count {
        let offset = i * 2; // i16 = 2 bytes
        if offset + 2 <= data.len() {
            samples.push(i16::from_ne_bytes([data[offset], data[offset + 1]]));
        }
    }

    samples
}

/// One open media resource bound to a single decode target.
///
/// Lifecycle: `Closed → Open → {Decoding ⇄ Seeking} → Exhausted`, where
/// `Exhausted` is terminal for forward decode but a seek returns the
/// session to `Decoding`. Dropping the session releases all backend
/// resources; no decode call is possible afterward.
pub struct MediaSession {
    input: format::context::Input,
    stream: StreamDesc,
    /// Current decode timestamp in seconds, maintained from frame pts.
    position: f64,
    /// Stream duration in seconds, from container metadata.
    duration: f64,
    gain: ReplayGain,
    target: DecodeTarget,
}

impl MediaSession {
    /// Opens a session for duration/gain probing: frames decode to a
    /// no-op sink. Prefers an audio stream, falling back to video.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] if the container cannot be parsed or
    /// holds no decodable stream.
    pub fn probe<P: AsRef<Path>>(path: P, options: &SessionOptions) -> Result<Self> {
        let input = open_input(path.as_ref())?;
        let (desc, gain, stage) =
            match stream_parts(&input, media::Type::Audio, options.normalize_loudness) {
                Ok(OpenParts { desc, gain, params }) => {
                    (desc, gain, ProbeStage::Audio(audio_decoder(params)?))
                }
                Err(_) => {
                    let OpenParts { desc, gain, params } =
                        stream_parts(&input, media::Type::Video, options.normalize_loudness)?;
                    (desc, gain, ProbeStage::Video(video_decoder(params)?))
                }
            };

        Ok(Self::assemble(input, desc, gain, DecodeTarget::Probe(stage)))
    }

    /// Opens a session decoding the best audio stream, resampled to
    /// interleaved i16 stereo at `target_rate` and delivered to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] if the container cannot be parsed, holds
    /// no audio stream, or the codec/resampler cannot be set up.
    pub fn audio<P: AsRef<Path>>(
        path: P,
        target_rate: u32,
        options: &SessionOptions,
        sink: AudioCallback,
    ) -> Result<Self> {
        let input = open_input(path.as_ref())?;
        let OpenParts { desc, gain, params } =
            stream_parts(&input, media::Type::Audio, options.normalize_loudness)?;
        let decoder = audio_decoder(params)?;
        let stage = AudioStage::new(decoder, target_rate, sink)?;

        Ok(Self::assemble(input, desc, gain, DecodeTarget::Audio(stage)))
    }

    /// Opens a session decoding the best video stream, converted to RGB
    /// bitmaps and delivered to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] if the container cannot be parsed, holds
    /// no video stream, or the codec cannot be set up.
    pub fn video<P: AsRef<Path>>(path: P, sink: FrameCallback) -> Result<Self> {
        let input = open_input(path.as_ref())?;
        let options = SessionOptions::default();
        let OpenParts { desc, gain, params } =
            stream_parts(&input, media::Type::Video, options.normalize_loudness)?;
        let decoder = video_decoder(params)?;
        let stage = VideoStage::new(decoder, sink);

        Ok(Self::assemble(input, desc, gain, DecodeTarget::Video(stage)))
    }

    fn assemble(
        input: format::context::Input,
        stream: StreamDesc,
        gain: ReplayGain,
        target: DecodeTarget,
    ) -> Self {
        let raw_duration = input.duration();
        let duration = if raw_duration > 0 {
            time_units::micros_to_secs(raw_duration)
        } else {
            0.0
        };

        Self {
            input,
            stream,
            position: 0.0,
            duration,
            gain,
            target,
        }
    }

    /// Advances decode state by one compressed packet, forwarding zero
    /// or more decoded frames to the target sink. Packets belonging to
    /// other streams are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for any backend failure other than end
    /// of stream.
    pub fn decode_one_frame(&mut self) -> Result<DecodeStep> {
        loop {
            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => return Ok(DecodeStep::EndOfStream),
                Err(e) => return Err(Error::decode("av_read_frame", e)),
            }

            if packet.stream() != self.stream.index {
                continue;
            }

            match self.target.send_packet(&packet) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => return Ok(DecodeStep::EndOfStream),
                Err(ffmpeg_next::Error::Other { errno })
                    if errno == ffmpeg_next::error::EAGAIN =>
                {
                    // Decoder is full; drain frames below before feeding
                    // more input.
                }
                Err(e) => return Err(Error::decode("avcodec_send_packet", e)),
            }

            return self.drain_frames();
        }
    }

    /// Receives every frame the decoder currently has, updating the
    /// session position from frame timestamps as they appear.
    fn drain_frames(&mut self) -> Result<DecodeStep> {
        let time_base = self.stream.time_base;
        let start_secs = self.stream.start_secs;

        match &mut self.target {
            DecodeTarget::Probe(ProbeStage::Audio(decoder)) => loop {
                let mut frame = frame::Audio::empty();
                match decoder.receive_frame(&mut frame) {
                    Ok(()) => {
                        if let Some(ts) = frame.timestamp() {
                            self.position = ts as f64 * time_base - start_secs;
                        }
                    }
                    Err(ffmpeg_next::Error::Eof) => return Ok(DecodeStep::EndOfStream),
                    Err(ffmpeg_next::Error::Other { errno })
                        if errno == ffmpeg_next::error::EAGAIN =>
                    {
                        return Ok(DecodeStep::Continue)
                    }
                    Err(e) => return Err(Error::decode("avcodec_receive_frame", e)),
                }
            },
            DecodeTarget::Probe(ProbeStage::Video(decoder)) => loop {
                let mut frame = frame::Video::empty();
                match decoder.receive_frame(&mut frame) {
                    Ok(()) => {
                        if let Some(ts) = frame.timestamp() {
                            self.position = ts as f64 * time_base - start_secs;
                        }
                    }
                    Err(ffmpeg_next::Error::Eof) => return Ok(DecodeStep::EndOfStream),
                    Err(ffmpeg_next::Error::Other { errno })
                        if errno == ffmpeg_next::error::EAGAIN =>
                    {
                        return Ok(DecodeStep::Continue)
                    }
                    Err(e) => return Err(Error::decode("avcodec_receive_frame", e)),
                }
            },
            DecodeTarget::Audio(stage) => loop {
                let mut frame = frame::Audio::empty();
                match stage.decoder.receive_frame(&mut frame) {
                    Ok(()) => {
                        if let Some(ts) = frame.timestamp() {
                            self.position = ts as f64 * time_base - start_secs;
                        }
                        stage.process_frame(&frame, self.position)?;
                    }
                    Err(ffmpeg_next::Error::Eof) => return Ok(DecodeStep::EndOfStream),
                    Err(ffmpeg_next::Error::Other { errno })
                        if errno == ffmpeg_next::error::EAGAIN =>
                    {
                        return Ok(DecodeStep::Continue)
                    }
                    Err(e) => return Err(Error::decode("avcodec_receive_frame", e)),
                }
            },
            DecodeTarget::Video(stage) => loop {
                let mut frame = frame::Video::empty();
                match stage.decoder.receive_frame(&mut frame) {
                    Ok(()) => {
                        if let Some(ts) = frame.timestamp() {
                            self.position = ts as f64 * time_base - start_secs;
                        }
                        stage.process_frame(&frame, self.position)?;
                    }
                    Err(ffmpeg_next::Error::Eof) => return Ok(DecodeStep::EndOfStream),
                    Err(ffmpeg_next::Error::Other { errno })
                        if errno == ffmpeg_next::error::EAGAIN =>
                    {
                        return Ok(DecodeStep::Continue)
                    }
                    Err(e) => return Err(Error::decode("avcodec_receive_frame", e)),
                }
            },
        }
    }

    /// Repositions the demuxer to the nearest keyframe at or before
    /// `time_secs` and flushes decode state. The first frames decoded
    /// afterwards may predate the target; the consumer trims them.
    /// Seeking past end of stream is not an error; the next decode call
    /// reports [`DecodeStep::EndOfStream`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the backend rejects the seek.
    pub fn seek(&mut self, time_secs: f64) -> Result<()> {
        let target = time_secs.max(0.0);
        let ts = time_units::secs_to_micros(target);
        // The RangeTo bound requests a keyframe at or before the target.
        self.input
            .seek(ts, ..ts)
            .map_err(|e| Error::decode("avformat_seek_file", e))?;
        self.target.flush();
        self.position = target;
        Ok(())
    }

    /// Current decode timestamp in seconds.
    #[must_use]
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Stream duration in seconds from container metadata; stable once
    /// the session is open.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Replay gain read from the stream at open.
    #[must_use]
    pub fn replay_gain(&self) -> ReplayGain {
        self.gain
    }
}

impl DecodeTarget {
    fn send_packet(&mut self, packet: &Packet) -> std::result::Result<(), ffmpeg_next::Error> {
        match self {
            DecodeTarget::Probe(ProbeStage::Audio(decoder)) => decoder.send_packet(packet),
            DecodeTarget::Probe(ProbeStage::Video(decoder)) => decoder.send_packet(packet),
            DecodeTarget::Audio(stage) => stage.decoder.send_packet(packet),
            DecodeTarget::Video(stage) => stage.decoder.send_packet(packet),
        }
    }

    fn flush(&mut self) {
        match self {
            DecodeTarget::Probe(ProbeStage::Audio(decoder)) => decoder.flush(),
            DecodeTarget::Probe(ProbeStage::Video(decoder)) => decoder.flush(),
            DecodeTarget::Audio(stage) => {
                stage.decoder.flush();
                stage.frame_pos = None;
            }
            DecodeTarget::Video(stage) => stage.decoder.flush(),
        }
    }
}

fn open_input(path: &Path) -> Result<format::context::Input> {
    backend::init()?;
    let mut input = format::input(&path)
        .map_err(|e| Error::Open(format!("failed to open {}: {e}", path.display())))?;
    // Some containers omit packet timestamps; have the demuxer derive
    // them so position tracking stays monotonic.
    // SAFETY: the context pointer is valid and flags is a plain field.
    unsafe {
        (*input.as_mut_ptr()).flags |= ffi::AVFMT_FLAG_GENPTS;
    }
    Ok(input)
}

fn stream_parts(
    input: &format::context::Input,
    kind: media::Type,
    normalize_loudness: bool,
) -> Result<OpenParts> {
    let label = match kind {
        media::Type::Audio => "audio",
        media::Type::Video => "video",
        _ => "media",
    };
    let stream = input
        .streams()
        .best(kind)
        .ok_or_else(|| Error::Open(format!("no {label} stream found")))?;

    let time_base = stream.time_base();
    let time_base = f64::from(time_base.numerator()) / f64::from(time_base.denominator());
    let start = stream.start_time();
    let start_secs = if start == ffi::AV_NOPTS_VALUE {
        0.0
    } else {
        start as f64 * time_base
    };

    let gain = if normalize_loudness {
        ReplayGain::from_stream(&stream)
    } else {
        ReplayGain::none()
    };

    Ok(OpenParts {
        desc: StreamDesc {
            index: stream.index(),
            time_base,
            start_secs,
        },
        gain,
        params: stream.parameters(),
    })
}

fn audio_decoder(params: codec::Parameters) -> Result<decoder::Audio> {
    let context = codec::context::Context::from_parameters(params)
        .map_err(|e| Error::Open(format!("failed to create codec context: {e}")))?;
    let _open_guard = backend::codec_open_lock();
    context
        .decoder()
        .audio()
        .map_err(|e| Error::Open(format!("failed to create audio decoder: {e}")))
}

fn video_decoder(params: codec::Parameters) -> Result<decoder::Video> {
    let context = codec::context::Context::from_parameters(params)
        .map_err(|e| Error::Open(format!("failed to create codec context: {e}")))?;
    let _open_guard = backend::codec_open_lock();
    context
        .decoder()
        .video()
        .map_err(|e| Error::Open(format!("failed to create video decoder: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_fails_for_nonexistent_file() {
        let result = MediaSession::probe("/nonexistent/audio.ogg", &SessionOptions::default());
        assert!(matches!(result, Err(Error::Open(_))));
    }

    #[test]
    fn probe_fails_for_garbage_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("garbage.wav");
        std::fs::write(&path, b"definitely not a media container").unwrap();

        let result = MediaSession::probe(&path, &SessionOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn audio_open_fails_for_nonexistent_file() {
        let result = MediaSession::audio(
            "/nonexistent/audio.ogg",
            48_000,
            &SessionOptions::default(),
            Box::new(|_, _| {}),
        );
        assert!(matches!(result, Err(Error::Open(_))));
    }

    #[test]
    fn session_options_default_follows_config() {
        let options = SessionOptions::default();
        assert_eq!(
            options.normalize_loudness,
            crate::config::DEFAULT_NORMALIZE_LOUDNESS
        );
    }

    #[test]
    fn decode_step_signals_are_distinct() {
        assert_ne!(DecodeStep::Continue, DecodeStep::EndOfStream);
    }
}
