// SPDX-License-Identifier: MPL-2.0
//! One-time FFmpeg backend setup.

use crate::error::{Error, Result};
use std::sync::{Mutex, MutexGuard, Once, PoisonError};

/// Static flag to ensure FFmpeg is initialized only once.
static FFMPEG_INIT: Once = Once::new();

/// Serializes codec opens across sessions; `avcodec_open2` is not
/// thread safe.
static CODEC_OPEN_LOCK: Mutex<()> = Mutex::new(());

/// Initialize FFmpeg with appropriate log level.
///
/// This function is safe to call multiple times - initialization will only
/// happen once thanks to `std::sync::Once`. It sets the FFmpeg log level
/// to ERROR to suppress noisy per-file warnings, and reports the linked
/// library versions once at debug level.
pub fn init() -> Result<()> {
    let mut init_result: Result<()> = Ok(());

    FFMPEG_INIT.call_once(|| {
        if let Err(e) = ffmpeg_next::init() {
            init_result = Err(Error::Open(format!("FFmpeg initialization failed: {e}")));
            return;
        }

        // SAFETY: av_log_set_level is thread-safe and only affects logging
        unsafe {
            ffmpeg_next::ffi::av_log_set_level(ffmpeg_next::ffi::AV_LOG_ERROR);
        }

        tracing::debug!(
            avutil = %version_triple(ffmpeg_next::util::version()),
            avformat = %version_triple(ffmpeg_next::format::version()),
            avcodec = %version_triple(ffmpeg_next::codec::version()),
            "FFmpeg backend initialized"
        );
    });

    init_result
}

/// Takes the process-wide codec-open lock.
pub(crate) fn codec_open_lock() -> MutexGuard<'static, ()> {
    CODEC_OPEN_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Renders an FFmpeg packed version number as `major.minor.micro`.
fn version_triple(version: u32) -> String {
    format!(
        "{}.{}.{}",
        version >> 16,
        (version >> 8) & 0xFF,
        version & 0xFF
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_triple_unpacks_fields() {
        // 59.16.100 packed as (59 << 16) | (16 << 8) | 100
        let packed = (59 << 16) | (16 << 8) | 100;
        assert_eq!(version_triple(packed), "59.16.100");
    }

    #[test]
    fn init_is_idempotent() {
        assert!(init().is_ok());
        assert!(init().is_ok());
    }

    #[test]
    fn codec_open_lock_is_reentrant_across_calls() {
        drop(codec_open_lock());
        drop(codec_open_lock());
    }
}
