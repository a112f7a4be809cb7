// SPDX-License-Identifier: MPL-2.0
//! Replay-gain loudness normalization.
//!
//! Replay gain is a decibel "loudness" tag stored in or alongside a media
//! file, used to normalize the perceived loudness of recordings mastered
//! at different volumes. The backend surfaces it either as per-stream
//! side data (track gain in microbels) or as a `REPLAYGAIN_TRACK_GAIN`
//! metadata tag; this module reads both and converts the decibel value
//! into the linear multiplier applied to decoded samples.

use ffmpeg_next::ffi;
use ffmpeg_next::format::stream::Stream;

/// Replay-gain side data stores gain in units of 1/100000 dB.
const MICROBELS_PER_DECIBEL: f64 = 100_000.0;

/// Loudness correction attached to one open stream.
///
/// A decibel value of 0.0 means "not defined for this track"; the linear
/// factor is 1.0 in that case so callers may apply it unconditionally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayGain {
    decibels: f64,
    factor: f64,
}

impl Default for ReplayGain {
    fn default() -> Self {
        Self::none()
    }
}

impl ReplayGain {
    /// Gain for a stream with no replay-gain information.
    #[must_use]
    pub fn none() -> Self {
        Self {
            decibels: 0.0,
            factor: 1.0,
        }
    }

    /// Builds a gain from a decibel value.
    #[must_use]
    pub fn from_decibels(decibels: f64) -> Self {
        Self {
            decibels,
            factor: db_to_linear(decibels),
        }
    }

    /// The tagged gain in decibels; 0.0 when the track carries no tag.
    #[must_use]
    pub fn decibels(self) -> f64 {
        self.decibels
    }

    /// The linear scale factor 10^(dB/20); 1.0 when no tag is present.
    ///
    /// The value is not clamped: amplifying gains come out above 1.0 and
    /// any clipping policy is the caller's.
    #[must_use]
    pub fn factor(self) -> f64 {
        self.factor
    }

    /// Reads the replay gain for a stream, or [`ReplayGain::none`] when
    /// the track carries no usable tag. Absence is not an error.
    pub(crate) fn from_stream(stream: &Stream) -> Self {
        if let Some(db) = side_data_track_gain(stream) {
            tracing::debug!(decibels = db, "replay gain from stream side data");
            return Self::from_decibels(db);
        }
        if let Some(db) = stream
            .metadata()
            .get("REPLAYGAIN_TRACK_GAIN")
            .and_then(parse_gain_tag)
        {
            tracing::debug!(decibels = db, "replay gain from metadata tag");
            return Self::from_decibels(db);
        }
        tracing::debug!("no replay gain tag in stream");
        Self::none()
    }
}

/// Converts gain in dB to a linear multiplier.
///
/// The formula is: linear = 10^(dB/20). A gain of exactly 0 dB yields
/// 1.0 without going through the transcendental path.
#[must_use]
pub fn db_to_linear(gain_db: f64) -> f64 {
    if gain_db == 0.0 {
        1.0
    } else {
        10.0_f64.powf(gain_db / 20.0)
    }
}

/// Converts a linear multiplier to gain in dB.
///
/// The formula is: dB = 20 * log10(linear).
#[must_use]
pub fn linear_to_db(linear: f64) -> f64 {
    if linear <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Parses a `REPLAYGAIN_TRACK_GAIN` tag value such as `"-6.50 dB"`.
fn parse_gain_tag(value: &str) -> Option<f64> {
    value
        .trim()
        .split_whitespace()
        .next()
        .and_then(|s| s.parse::<f64>().ok())
}

/// Reads the track gain from the stream's replay-gain side data block.
///
/// The block begins with the track gain as a native-endian i32 in
/// microbels; `i32::MIN` marks an unset gain.
fn side_data_track_gain(stream: &Stream) -> Option<f64> {
    // SAFETY: the stream pointer is valid for the lifetime of the borrow
    // and the side-data list is read without being modified.
    unsafe {
        let par = (*stream.as_ptr()).codecpar;
        if par.is_null() {
            return None;
        }
        let list = (*par).coded_side_data;
        if list.is_null() {
            return None;
        }
        for i in 0..(*par).nb_coded_side_data as isize {
            let entry = list.offset(i);
            if (*entry).type_ != ffi::AVPacketSideDataType::AV_PKT_DATA_REPLAYGAIN {
                continue;
            }
            if (*entry).size < std::mem::size_of::<i32>() || (*entry).data.is_null() {
                return None;
            }
            let track_gain = std::ptr::read_unaligned((*entry).data as *const i32);
            if track_gain == i32::MIN {
                return None;
            }
            return Some(f64::from(track_gain) / MICROBELS_PER_DECIBEL);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_abs_diff_eq;

    #[test]
    fn no_gain_is_unity() {
        let gain = ReplayGain::none();
        assert_abs_diff_eq!(gain.decibels(), 0.0);
        assert_abs_diff_eq!(gain.factor(), 1.0);
    }

    #[test]
    fn minus_six_db_roughly_halves_amplitude() {
        let gain = ReplayGain::from_decibels(-6.0);
        assert_abs_diff_eq!(gain.factor(), 0.501, epsilon = 0.001);
    }

    #[test]
    fn db_to_linear_conversions() {
        // 0 dB = 1.0 linear
        assert_abs_diff_eq!(db_to_linear(0.0), 1.0);

        // +6 dB roughly doubles, -6 dB roughly halves
        assert_abs_diff_eq!(db_to_linear(6.0), 2.0, epsilon = 0.01);
        assert_abs_diff_eq!(db_to_linear(-6.0), 0.5, epsilon = 0.01);

        // +20 dB = 10.0 linear
        assert_abs_diff_eq!(db_to_linear(20.0), 10.0, epsilon = 0.01);
    }

    #[test]
    fn linear_to_db_zero_returns_neg_infinity() {
        assert!(linear_to_db(0.0).is_infinite());
        assert!(linear_to_db(0.0).is_sign_negative());
    }

    #[test]
    fn db_linear_round_trip() {
        let original = -8.5;
        let back = linear_to_db(db_to_linear(original));
        assert_abs_diff_eq!(original, back, epsilon = 0.001);
    }

    #[test]
    fn gain_tag_parses_decibel_suffix() {
        assert_eq!(parse_gain_tag("-6.50 dB"), Some(-6.5));
        assert_eq!(parse_gain_tag(" +2.10 dB "), Some(2.1));
        assert_eq!(parse_gain_tag("0 dB"), Some(0.0));
    }

    #[test]
    fn gain_tag_rejects_garbage() {
        assert_eq!(parse_gain_tag(""), None);
        assert_eq!(parse_gain_tag("loud"), None);
    }
}
