// SPDX-License-Identifier: MPL-2.0
//! Error types for the decode pipeline.

use std::fmt;

/// Crate-wide error type.
///
/// End of stream is deliberately *not* represented here: it is a normal
/// control signal reported through
/// [`DecodeStep`](crate::pipeline::DecodeStep), not a failure.
#[derive(Debug, Clone)]
pub enum Error {
    /// A media resource could not be opened: unreadable container, or no
    /// usable stream/codec of the requested kind.
    Open(String),

    /// A decode-time failure reported by the FFmpeg backend.
    ///
    /// Carries the name of the failing backend operation and the
    /// negative status code it returned.
    Decode {
        /// Backend function that failed (e.g. `"avcodec_send_packet"`).
        op: &'static str,
        /// Negative AVERROR status code.
        code: i32,
        /// Human-readable description of the failure.
        detail: String,
    },

    /// Configuration file could not be parsed or written.
    Config(String),

    /// Filesystem-level failure outside the decode backend.
    Io(String),
}

impl Error {
    /// Wraps a backend error into [`Error::Decode`], recording the
    /// failing operation's name alongside the raw status code.
    pub(crate) fn decode(op: &'static str, err: ffmpeg_next::Error) -> Self {
        let detail = err.to_string();
        Error::Decode {
            op,
            code: err.into(),
            detail,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Open(e) => write!(f, "Open Error: {}", e),
            Error::Decode { op, code, detail } => {
                write!(f, "Decode Error: {} failed with {} ({})", op, code, detail)
            }
            Error::Config(e) => write!(f, "Config Error: {}", e),
            Error::Io(e) => write!(f, "I/O Error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_open_error() {
        let err = Error::Open("no audio stream".to_string());
        assert_eq!(format!("{}", err), "Open Error: no audio stream");
    }

    #[test]
    fn display_formats_decode_error_with_op_and_code() {
        let err = Error::Decode {
            op: "avcodec_send_packet",
            code: -22,
            detail: "Invalid argument".to_string(),
        };
        let message = format!("{}", err);
        assert!(message.contains("avcodec_send_packet"));
        assert!(message.contains("-22"));
        assert!(message.contains("Invalid argument"));
    }

    #[test]
    fn from_io_error_produces_io_variant() {
        let io_error = std::io::Error::other("boom");
        let err: Error = io_error.into();
        match err {
            Error::Io(message) => assert!(message.contains("boom")),
            _ => panic!("expected Io variant"),
        }
    }

    #[test]
    fn decode_wrapper_preserves_negative_code() {
        let err = Error::decode("av_read_frame", ffmpeg_next::Error::Eof);
        match err {
            Error::Decode { op, code, .. } => {
                assert_eq!(op, "av_read_frame");
                assert!(code < 0);
            }
            _ => panic!("expected Decode variant"),
        }
    }
}
