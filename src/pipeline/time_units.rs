// SPDX-License-Identifier: MPL-2.0
//! Time unit conversion utilities for the decode pipeline.
//!
//! Provides conversion functions between seconds, microseconds (the
//! backend's `AV_TIME_BASE` domain used for seeking) and interleaved
//! sample positions (the ring buffer's cursor domain).

/// Microseconds per second as f64 for calculations.
pub const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Converts seconds to microseconds (i64, the backend seek domain).
///
/// # Examples
///
/// ```
/// use media_spool::pipeline::time_units::secs_to_micros;
///
/// assert_eq!(secs_to_micros(1.0), 1_000_000);
/// assert_eq!(secs_to_micros(0.5), 500_000);
/// ```
#[inline]
pub fn secs_to_micros(secs: f64) -> i64 {
    (secs * MICROS_PER_SECOND) as i64
}

/// Converts microseconds to seconds (f64).
///
/// # Examples
///
/// ```
/// use media_spool::pipeline::time_units::micros_to_secs;
///
/// assert_eq!(micros_to_secs(1_000_000), 1.0);
/// assert_eq!(micros_to_secs(500_000), 0.5);
/// ```
#[inline]
pub fn micros_to_secs(micros: i64) -> f64 {
    micros as f64 / MICROS_PER_SECOND
}

/// Converts an interleaved sample position to seconds for a stream
/// delivering `samples_per_second` interleaved samples (rate × channels).
#[inline]
pub fn samples_to_secs(samples: i64, samples_per_second: u32) -> f64 {
    samples as f64 / f64::from(samples_per_second)
}
