// SPDX-License-Identifier: MPL-2.0
//! Bounded look-ahead buffer of decoded audio samples.
//!
//! [`AudioBuffer`] decouples a real-time, latency-sensitive consumer from
//! decode latency and jitter. A dedicated background thread drives a
//! [`MediaSession`] in audio mode and keeps a fixed-capacity ring of
//! interleaved i16 samples full; the consumer pulls samples through a
//! blocking positional [`AudioBuffer::read`].
//!
//! All shared state lives behind one mutex with one condition variable
//! and two cooperating wait predicates: the producer waits while the
//! ring is full (or a seek is pending), the consumer waits while the
//! requested range is unfilled and end of stream has not been reached.
//! Every mutation that can change either predicate signals the condition
//! variable before the lock is released, and both sides re-check their
//! predicate after every wake.

use crate::config::{self, Config};
use crate::error::{Error, Result};
use crate::pipeline::gain::ReplayGain;
use crate::pipeline::session::{DecodeStep, MediaSession, SessionOptions, AUDIO_CHANNELS};
use crate::pipeline::time_units;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Consecutive decode failures tolerated before production stops for the
/// current fill run.
const MAX_CONSECUTIVE_DECODE_ERRORS: u32 = 3;

/// `prepare` reports ready once this fraction of the ring is buffered
/// ahead of the read cursor.
const PREBUFFER_FRACTION: i64 = 16;

/// Conversion factor between i16 sample magnitude and f32 in [-1, 1).
const I16_SCALE: f32 = 32_768.0;

/// Construction parameters for an [`AudioBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct BufferConfig {
    /// Sample rate the decoded stream is resampled to, in Hz.
    pub target_rate: u32,
    /// Ring capacity in interleaved samples.
    pub capacity_samples: usize,
    /// Whether replay-gain tags are honored.
    pub normalize_loudness: bool,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            target_rate: config::DEFAULT_SAMPLE_RATE,
            capacity_samples: config::DEFAULT_BUFFER_SAMPLES,
            normalize_loudness: config::DEFAULT_NORMALIZE_LOUDNESS,
        }
    }
}

impl BufferConfig {
    /// Builds a buffer configuration from persisted settings, clamping
    /// out-of-range values to their documented bounds.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            target_rate: config
                .sample_rate
                .unwrap_or(defaults.target_rate)
                .clamp(config::MIN_SAMPLE_RATE, config::MAX_SAMPLE_RATE),
            capacity_samples: config
                .buffer_samples
                .unwrap_or(defaults.capacity_samples)
                .max(config::MIN_BUFFER_SAMPLES),
            normalize_loudness: config
                .normalize_loudness
                .unwrap_or(defaults.normalize_loudness),
        }
    }
}

/// Outcome of one positional read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadStatus {
    /// Samples delivered into the destination, including lead-in
    /// silence for negative positions and repositioning zeros.
    pub written: usize,
    /// True once the requested range lies at or beyond the end of the
    /// stream; no further data will arrive for it.
    pub end_of_stream: bool,
}

/// Ring state: a fixed-capacity sample store with two monotonically
/// increasing logical cursors. Cursors never wrap; the physical storage
/// index is the logical position modulo capacity.
struct SampleQueue {
    data: Vec<i16>,
    write_pos: i64,
    read_pos: i64,
    /// Logical write position at which the producer observed end of
    /// stream; `None` until then, cleared again on seek.
    eof_pos: Option<i64>,
    seek_asked: bool,
    quit: bool,
    /// Stream duration in seconds; positions past it read as ended.
    duration_secs: f64,
}

impl SampleQueue {
    fn capacity(&self) -> i64 {
        self.data.len() as i64
    }

    /// Whether `pos` lies at or beyond the end of the stream.
    fn at_end(&self, pos: i64, samples_per_second: u32) -> bool {
        self.eof_pos.is_some_and(|eof| pos >= eof)
            || time_units::samples_to_secs(pos, samples_per_second) >= self.duration_secs
    }

    /// Copies samples into the ring at logical position `pos`, wrapping
    /// across the physical end when needed. The caller guarantees the
    /// range fits between the cursors.
    fn copy_in(&mut self, pos: i64, samples: &[i16]) {
        let capacity = self.data.len();
        let start = (pos.rem_euclid(capacity as i64)) as usize;
        let first = samples.len().min(capacity - start);
        self.data[start..start + first].copy_from_slice(&samples[..first]);
        self.data[..samples.len() - first].copy_from_slice(&samples[first..]);
    }
}

/// The shared state object both threads coordinate through.
struct Shared {
    state: Mutex<SampleQueue>,
    cond: Condvar,
    /// Interleaved samples per second (target rate × channels).
    samples_per_second: u32,
}

impl Shared {
    fn new(capacity: usize, samples_per_second: u32) -> Self {
        Self {
            state: Mutex::new(SampleQueue {
                data: vec![0; capacity],
                write_pos: 0,
                read_pos: 0,
                eof_pos: None,
                seek_asked: false,
                quit: false,
                duration_secs: f64::INFINITY,
            }),
            cond: Condvar::new(),
            samples_per_second,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SampleQueue> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, SampleQueue>) -> MutexGuard<'a, SampleQueue> {
        self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    /// Producer side: appends decoded samples at their stream position,
    /// blocking while the ring is full. Frames behind the read cursor
    /// are dropped; a pending seek or quit abandons the frame.
    fn push(&self, samples: &[i16], sample_position: i64) {
        if sample_position < 0 {
            tracing::warn!(sample_position, "negative audio position, frame ignored");
            return;
        }

        let mut q = self.lock();
        if sample_position < q.read_pos {
            // Arrived too late, or mid-seek; the consumer moved past it.
            return;
        }
        if q.write_pos != sample_position {
            tracing::debug!(
                expected = q.write_pos,
                received = sample_position,
                "audio position gap"
            );
        }

        let capacity = q.capacity();
        if sample_position >= q.read_pos + capacity {
            // A pts discontinuity placed the frame beyond the buffered
            // window. Jump the write cursor instead of stalling
            // production; the skipped range reads as ring content.
            let count = samples.len().min(capacity as usize);
            q.copy_in(sample_position, &samples[..count]);
            q.write_pos = sample_position + count as i64;
            self.cond.notify_all();
            return;
        }

        let mut pos = sample_position;
        let mut index = 0;
        while index < samples.len() {
            // Backpressure: never let write_pos - read_pos exceed the
            // capacity, writing in chunks as the consumer frees room.
            while !(q.quit || q.seek_asked || pos < q.read_pos + capacity) {
                q = self.wait(q);
            }
            if q.quit || q.seek_asked {
                return;
            }

            let room = (q.read_pos + capacity - pos) as usize;
            let count = room.min(samples.len() - index);
            q.copy_in(pos, &samples[index..index + count]);
            pos += count as i64;
            index += count;
            q.write_pos = pos;
            self.cond.notify_all();
        }
    }

    /// Consumer side: mixes samples for `[position, position + out.len())`
    /// into `out`, scaled by `scale`, blocking until the range is
    /// buffered or known to be past the end of the stream.
    fn read(&self, out: &mut [f32], position: i64, scale: f32) -> ReadStatus {
        let mut pos = position;
        let mut offset = 0;

        // The caller may request lead-in before the stream start; that
        // region is silence.
        if pos < 0 {
            let lead = out.len().min(usize::try_from(-pos).unwrap_or(usize::MAX));
            for sample in &mut out[..lead] {
                *sample = 0.0;
            }
            if lead == out.len() {
                return ReadStatus {
                    written: lead,
                    end_of_stream: false,
                };
            }
            offset = lead;
            pos = 0;
        }

        let mut q = self.lock();
        let capacity = q.capacity();
        // One cannot read more than the ring holds.
        let want = (out.len() - offset).min(capacity as usize);
        if want == 0 {
            let end_of_stream = q.quit || q.at_end(pos, self.samples_per_second);
            return ReadStatus {
                written: offset,
                end_of_stream,
            };
        }

        loop {
            if q.quit || q.at_end(pos + want as i64, self.samples_per_second) {
                for sample in &mut out[offset..] {
                    *sample = 0.0;
                }
                return ReadStatus {
                    written: offset,
                    end_of_stream: true,
                };
            }

            if pos < q.read_pos || pos > q.read_pos + capacity - want as i64 {
                // The consumer jumped outside the buffered window:
                // discard and reposition rather than serve stale data.
                for sample in &mut out[offset..] {
                    *sample = 0.0;
                }
                q.read_pos = pos + want as i64;
                q.seek_asked = true;
                q.eof_pos = None;
                q.data.fill(0);
                self.cond.notify_all();
                return ReadStatus {
                    written: offset + want,
                    end_of_stream: false,
                };
            }

            if q.write_pos >= pos + want as i64 {
                for i in 0..want {
                    let raw = q.data[(pos + i as i64).rem_euclid(capacity) as usize];
                    out[offset + i] += scale * f32::from(raw) / I16_SCALE;
                }
                q.read_pos = pos + want as i64;
                self.cond.notify_all();
                return ReadStatus {
                    written: offset + want,
                    end_of_stream: false,
                };
            }

            q = self.wait(q);
        }
    }

    /// Advisory pre-roll: repositions towards `position` when it is
    /// outside the buffered window and reports whether enough look-ahead
    /// is buffered to start reading.
    fn prepare(&self, position: i64) -> bool {
        let pos = position.max(0);
        let mut q = self.lock();
        if q.quit || q.at_end(pos, self.samples_per_second) {
            // Nothing further will arrive for this position.
            return true;
        }

        let capacity = q.capacity();
        if pos < q.read_pos || pos >= q.read_pos + capacity {
            q.read_pos = pos;
            q.seek_asked = true;
            q.eof_pos = None;
            q.data.fill(0);
            self.cond.notify_all();
            return false;
        }

        q.write_pos > q.read_pos + capacity / PREBUFFER_FRACTION
            && q.write_pos <= q.read_pos + capacity
    }

    fn buffered_samples(&self) -> i64 {
        let q = self.lock();
        q.write_pos - q.read_pos
    }

    fn terminating(&self) -> bool {
        self.lock().quit
    }
}

/// Stream facts captured by the decode thread right after open.
struct StreamMeta {
    duration: f64,
    gain: ReplayGain,
}

/// Bounded sample store fed by a dedicated decode thread.
pub struct AudioBuffer {
    shared: Arc<Shared>,
    duration: f64,
    gain: ReplayGain,
    reader: Option<JoinHandle<()>>,
}

impl AudioBuffer {
    /// Opens the audio stream of `path` and starts the production
    /// thread. Returns once the stream metadata is known; decoding
    /// proceeds in the background until the ring is full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] if the file cannot be opened, holds no
    /// audio stream, or the decode thread fails during setup.
    pub fn open<P: AsRef<Path>>(path: P, config: &BufferConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let samples_per_second = config.target_rate * u32::from(AUDIO_CHANNELS);
        let capacity = config.capacity_samples.max(config::MIN_BUFFER_SAMPLES);
        let shared = Arc::new(Shared::new(capacity, samples_per_second));

        let (meta_tx, meta_rx) = mpsc::channel();
        let thread_shared = Arc::clone(&shared);
        let options = SessionOptions {
            normalize_loudness: config.normalize_loudness,
        };
        let target_rate = config.target_rate;
        let reader = thread::Builder::new()
            .name("media-spool-decode".into())
            .spawn(move || production_loop(path, target_rate, options, thread_shared, meta_tx))
            .map_err(|e| Error::Io(format!("failed to spawn decode thread: {e}")))?;

        let meta = match meta_rx.recv() {
            Ok(Ok(meta)) => meta,
            Ok(Err(e)) => {
                let _ = reader.join();
                return Err(e);
            }
            Err(_) => {
                let _ = reader.join();
                return Err(Error::Open(
                    "decode thread terminated before reporting stream metadata".into(),
                ));
            }
        };

        Ok(Self {
            shared,
            duration: meta.duration,
            gain: meta.gain,
            reader: Some(reader),
        })
    }

    /// Mixes samples for `[position, position + out.len())` into `out`,
    /// scaled by `volume` times the stream's replay-gain factor.
    ///
    /// Blocks until the range is buffered or known to be past the end of
    /// the stream. A position outside the buffered window triggers an
    /// internal reposition and yields silence for this call; stale
    /// samples are never served for a newly requested earlier position.
    pub fn read(&self, out: &mut [f32], position: i64, volume: f32) -> ReadStatus {
        let scale = volume * self.gain.factor() as f32;
        self.shared.read(out, position, scale)
    }

    /// Advisory pre-roll towards `position`; see
    /// [`BufferConfig::capacity_samples`] for the window it considers.
    /// Returns true when enough is buffered to start reading there.
    pub fn prepare(&self, position: i64) -> bool {
        self.shared.prepare(position)
    }

    /// Stream duration in seconds; stable once the buffer is open.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Replay gain of the stream in decibels; 0 when untagged.
    #[must_use]
    pub fn replay_gain_decibels(&self) -> f64 {
        self.gain.decibels()
    }

    /// Linear replay-gain factor applied by [`AudioBuffer::read`].
    #[must_use]
    pub fn replay_gain_factor(&self) -> f64 {
        self.gain.factor()
    }

    /// Whether production has permanently stopped because teardown was
    /// requested.
    #[must_use]
    pub fn terminating(&self) -> bool {
        self.shared.terminating()
    }

    /// Current look-ahead between the cursors, in interleaved samples.
    /// Primarily an instrumentation hook for tests and diagnostics.
    #[must_use]
    pub fn buffered_samples(&self) -> i64 {
        self.shared.buffered_samples()
    }

    /// Snapshot of the ring downmixed to mono for preview rendering.
    /// `preview_volume` rescales the snapshot the way the preview layer
    /// will play it back; values at or below zero are treated as unity.
    #[must_use]
    pub fn preview_samples(&self, preview_volume: f32) -> Vec<f32> {
        let volume = if preview_volume > 0.0 {
            preview_volume
        } else {
            1.0
        };
        let q = self.shared.lock();
        let mut preview = Vec::with_capacity(q.data.len() / usize::from(AUDIO_CHANNELS));
        for pair in q.data.chunks_exact(usize::from(AUDIO_CHANNELS)) {
            let mixed = (f32::from(pair[0]) + f32::from(pair[1])) / 2.0 / I16_SCALE;
            preview.push(mixed / volume);
        }
        preview
    }
}

impl Drop for AudioBuffer {
    fn drop(&mut self) {
        {
            let mut q = self.shared.lock();
            q.quit = true;
        }
        self.shared.cond.notify_all();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

/// Body of the decode thread: open the session, report metadata, then
/// fill the ring until quit. Decode errors never cross into the
/// consumer thread; they degrade to end of stream.
fn production_loop(
    path: PathBuf,
    target_rate: u32,
    options: SessionOptions,
    shared: Arc<Shared>,
    meta_tx: mpsc::Sender<Result<StreamMeta>>,
) {
    let sink = {
        let shared = Arc::clone(&shared);
        Box::new(move |samples: &[i16], sample_position: i64| {
            shared.push(samples, sample_position);
        })
    };

    let mut session = match MediaSession::audio(&path, target_rate, &options, sink) {
        Ok(session) => session,
        Err(e) => {
            let _ = meta_tx.send(Err(e));
            return;
        }
    };

    {
        let mut q = shared.lock();
        q.duration_secs = session.duration();
    }
    let _ = meta_tx.send(Ok(StreamMeta {
        duration: session.duration(),
        gain: session.replay_gain(),
    }));
    drop(meta_tx);

    enum Step {
        Quit,
        Seek(f64),
        Decode,
    }

    let mut consecutive_errors = 0u32;
    loop {
        let step = {
            let mut q = shared.lock();
            if q.quit {
                Step::Quit
            } else if q.seek_asked {
                q.seek_asked = false;
                q.write_pos = q.read_pos;
                q.eof_pos = None;
                Step::Seek(time_units::samples_to_secs(
                    q.read_pos,
                    shared.samples_per_second,
                ))
            } else {
                Step::Decode
            }
        };

        match step {
            Step::Quit => break,
            Step::Seek(target_secs) => {
                if let Err(e) = session.seek(target_secs) {
                    tracing::error!(error = %e, target_secs, "seek failed, resuming decode in place");
                }
            }
            Step::Decode => match session.decode_one_frame() {
                Ok(DecodeStep::Continue) => {
                    consecutive_errors = 0;
                }
                Ok(DecodeStep::EndOfStream) => {
                    park_at_end(&shared);
                }
                Err(e) => {
                    tracing::error!(error = %e, path = %path.display(), "decode error");
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_CONSECUTIVE_DECODE_ERRORS {
                        tracing::error!(
                            path = %path.display(),
                            "stopping production after repeated decode errors"
                        );
                        // Buffered samples stay readable; reads past them
                        // then report end of stream.
                        park_at_end(&shared);
                        consecutive_errors = 0;
                    }
                }
            },
        }
    }
}

/// Records the end-of-stream position and idles until a seek re-arms
/// decoding or teardown is requested.
fn park_at_end(shared: &Shared) {
    let mut q = shared.lock();
    if q.eof_pos.is_none() {
        q.eof_pos = Some(q.write_pos);
    }
    shared.cond.notify_all();
    while !(q.quit || q.seek_asked) {
        q = shared.wait(q);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_abs_diff_eq;
    use std::time::Duration;

    fn shared_with(capacity: usize, samples_per_second: u32, duration_secs: f64) -> Arc<Shared> {
        let shared = Arc::new(Shared::new(capacity, samples_per_second));
        shared.lock().duration_secs = duration_secs;
        shared
    }

    #[test]
    fn read_blocks_until_samples_arrive() {
        let shared = shared_with(4096, 96_000, 60.0);
        let producer = Arc::clone(&shared);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            producer.push(&[8192; 256], 0);
        });

        let mut out = [0.0f32; 256];
        let status = shared.read(&mut out, 0, 1.0);
        handle.join().unwrap();

        assert_eq!(status.written, 256);
        assert!(!status.end_of_stream);
        assert_abs_diff_eq!(out[0], 0.25, epsilon = 1e-4);
        assert_abs_diff_eq!(out[255], 0.25, epsilon = 1e-4);
    }

    #[test]
    fn read_mixes_additively_and_applies_scale() {
        let shared = shared_with(4096, 96_000, 60.0);
        shared.push(&[16384; 128], 0);

        let mut out = [0.5f32; 128];
        let status = shared.read(&mut out, 0, 0.5);

        assert_eq!(status.written, 128);
        // 0.5 existing + 0.5 scale * 0.5 sample
        assert_abs_diff_eq!(out[0], 0.75, epsilon = 1e-4);
    }

    #[test]
    fn producer_blocks_at_capacity() {
        let capacity = 1024;
        let shared = shared_with(capacity, 96_000, 600.0);
        let producer = Arc::clone(&shared);
        let handle = std::thread::spawn(move || {
            // Twice the capacity; the second half must wait for reads.
            producer.push(&[1000; 2048], 0);
        });

        // Occupancy converges to capacity and never exceeds it.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while shared.buffered_samples() < capacity as i64 {
            assert!(std::time::Instant::now() < deadline, "producer never filled");
            std::thread::sleep(Duration::from_millis(1));
        }
        for _ in 0..50 {
            assert!(shared.buffered_samples() <= capacity as i64);
            std::thread::sleep(Duration::from_millis(1));
        }

        // Draining the first half lets the producer finish.
        let mut out = vec![0.0f32; 1024];
        let status = shared.read(&mut out, 0, 1.0);
        assert_eq!(status.written, 1024);
        handle.join().unwrap();
        assert_eq!(shared.buffered_samples(), 1024);
    }

    #[test]
    fn stress_never_overflows_capacity() {
        let capacity = 512;
        let shared = shared_with(capacity, 96_000, 600.0);
        let producer = Arc::clone(&shared);
        let handle = std::thread::spawn(move || {
            let mut pos = 0i64;
            for _ in 0..200 {
                let chunk = [42i16; 96];
                producer.push(&chunk, pos);
                pos += 96;
            }
        });

        let mut served = 0i64;
        let mut out = vec![0.0f32; 64];
        while served < 200 * 96 - 512 {
            for sample in &mut out {
                *sample = 0.0;
            }
            let status = shared.read(&mut out, served, 1.0);
            assert_eq!(status.written, 64);
            served += 64;
            let buffered = shared.buffered_samples();
            assert!(buffered <= capacity as i64, "overflow: {buffered}");
        }
        handle.join().unwrap();
    }

    #[test]
    fn read_past_eof_reports_end_of_stream_without_blocking() {
        let shared = shared_with(4096, 96_000, 60.0);
        shared.push(&[100; 512], 0);
        {
            let mut q = shared.lock();
            q.eof_pos = Some(512);
        }

        let mut out = [1.0f32; 128];
        let status = shared.read(&mut out, 512, 1.0);
        assert_eq!(status.written, 0);
        assert!(status.end_of_stream);
        // The destination is silenced, not left with stale content.
        assert_abs_diff_eq!(out[0], 0.0);
    }

    #[test]
    fn read_straddling_eof_reports_end_of_stream() {
        let shared = shared_with(4096, 96_000, 60.0);
        shared.push(&[100; 512], 0);
        {
            let mut q = shared.lock();
            q.eof_pos = Some(512);
        }

        let mut out = [0.0f32; 128];
        let status = shared.read(&mut out, 448, 1.0);
        assert!(status.end_of_stream);
    }

    #[test]
    fn read_beyond_duration_reports_end_of_stream() {
        // 96_000 interleaved samples per second, 1 second long stream.
        let shared = shared_with(4096, 96_000, 1.0);

        let mut out = [0.0f32; 128];
        let status = shared.read(&mut out, 96_000, 1.0);
        assert_eq!(status.written, 0);
        assert!(status.end_of_stream);
    }

    #[test]
    fn jump_outside_window_triggers_reposition() {
        let shared = shared_with(1024, 96_000, 600.0);
        shared.push(&[5000; 512], 0);

        let mut out = [0.0f32; 128];
        let status = shared.read(&mut out, 50_000, 1.0);

        // Zeros delivered, never stale samples.
        assert_eq!(status.written, 128);
        assert!(!status.end_of_stream);
        assert_abs_diff_eq!(out[0], 0.0);

        let q = shared.lock();
        assert!(q.seek_asked);
        assert_eq!(q.read_pos, 50_000 + 128);
        assert!(q.data.iter().all(|&s| s == 0));
    }

    #[test]
    fn backwards_read_triggers_reposition() {
        let shared = shared_with(1024, 96_000, 600.0);
        shared.push(&[5000; 1024], 0);

        let mut out = [0.0f32; 128];
        let first = shared.read(&mut out, 0, 1.0);
        assert_eq!(first.written, 128);

        // Re-reading an already-consumed position is a jump, not stale data.
        let again = shared.read(&mut out, 0, 1.0);
        assert_eq!(again.written, 128);
        assert!(shared.lock().seek_asked);
    }

    #[test]
    fn negative_positions_read_as_silence() {
        let shared = shared_with(1024, 96_000, 600.0);

        let mut out = [1.0f32; 64];
        let status = shared.read(&mut out, -64, 1.0);
        assert_eq!(status.written, 64);
        assert!(!status.end_of_stream);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn push_ignores_negative_and_stale_positions() {
        let shared = shared_with(1024, 96_000, 600.0);
        shared.push(&[7; 64], -10);
        assert_eq!(shared.buffered_samples(), 0);

        {
            let mut q = shared.lock();
            q.read_pos = 256;
            q.write_pos = 256;
        }
        shared.push(&[7; 64], 128);
        assert_eq!(shared.buffered_samples(), 0);
    }

    #[test]
    fn quit_makes_read_return_end_of_stream() {
        let shared = shared_with(1024, 96_000, 600.0);
        shared.lock().quit = true;

        let mut out = [0.0f32; 64];
        let status = shared.read(&mut out, 0, 1.0);
        assert_eq!(status.written, 0);
        assert!(status.end_of_stream);
        assert!(shared.terminating());
    }

    #[test]
    fn prepare_reports_readiness_and_requests_seeks() {
        let shared = shared_with(1024, 96_000, 600.0);

        // Far outside the window: requests a reposition.
        assert!(!shared.prepare(10_000));
        assert!(shared.lock().seek_asked);
        {
            let mut q = shared.lock();
            q.seek_asked = false;
            q.write_pos = q.read_pos;
        }

        // In window but nothing buffered yet.
        assert!(!shared.prepare(10_000));

        // Enough look-ahead buffered.
        shared.push(&[1; 512], 10_000);
        assert!(shared.prepare(10_000));
    }

    #[test]
    fn prepare_past_duration_reports_ready() {
        let shared = shared_with(1024, 96_000, 1.0);
        assert!(shared.prepare(200_000));
        assert!(!shared.lock().seek_asked);
    }

    #[test]
    fn buffer_config_clamps_persisted_values() {
        let persisted = Config {
            sample_rate: Some(1),
            buffer_samples: Some(16),
            normalize_loudness: None,
            preview_volume: None,
        };
        let config = BufferConfig::from_config(&persisted);
        assert_eq!(config.target_rate, config::MIN_SAMPLE_RATE);
        assert_eq!(config.capacity_samples, config::MIN_BUFFER_SAMPLES);
        assert_eq!(config.normalize_loudness, config::DEFAULT_NORMALIZE_LOUDNESS);
    }

    #[test]
    fn open_fails_for_nonexistent_file() {
        let config = BufferConfig {
            capacity_samples: 4096,
            ..BufferConfig::default()
        };
        let result = AudioBuffer::open("/nonexistent/audio.ogg", &config);
        assert!(result.is_err());
    }
}
