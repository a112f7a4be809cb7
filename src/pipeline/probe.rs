// SPDX-License-Identifier: MPL-2.0
//! Synchronous metadata probing.
//!
//! Short-lived queries ("how long is this file, and how loud is it
//! tagged?") run on the caller's thread through the same decode driver
//! the playback pipelines use, with a no-op frame sink.

use crate::error::Result;
use crate::pipeline::session::{MediaSession, SessionOptions};
use std::path::Path;

/// Metadata gathered from one media file without decoding it through.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    /// Stream duration in seconds from container metadata.
    pub duration_secs: f64,
    /// Tagged replay gain in decibels; 0 when untagged.
    pub replay_gain_decibels: f64,
    /// Linear replay-gain factor, 10^(dB/20).
    pub replay_gain_factor: f64,
}

/// Probes a media file for duration and replay gain.
///
/// A corrupt or unsupported file fails visibly here so the caller can
/// skip it; this path never degrades silently.
///
/// # Errors
///
/// Returns [`Error::Open`](crate::Error::Open) if the container cannot
/// be parsed or holds no decodable stream.
pub fn probe<P: AsRef<Path>>(path: P) -> Result<MediaInfo> {
    let session = MediaSession::probe(path, &SessionOptions::default())?;
    let gain = session.replay_gain();
    Ok(MediaInfo {
        duration_secs: session.duration(),
        replay_gain_decibels: gain.decibels(),
        replay_gain_factor: gain.factor(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_fails_visibly_for_unreadable_input() {
        assert!(probe("/nonexistent/track.flac").is_err());
    }
}
