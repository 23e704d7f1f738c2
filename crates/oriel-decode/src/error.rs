//! Error types for bitstream parsing and hardware decode
//!
//! Provides typed errors that callers can match and handle specifically.

use thiserror::Error;

/// Errors that can occur while parsing or decoding a video stream
///
/// All fallible operations in this crate return `Result<T, DecodeError>`.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// A bit read ran past the end of the current NAL unit
    ///
    /// Raised from inside the bit reader and caught at NAL-unit
    /// granularity; the stream is then treated as unsupported.
    #[error("Bitstream exhausted at bit offset {offset}")]
    BitstreamExhausted {
        /// Bit offset at which the read was attempted
        offset: usize,
    },

    /// The stream uses a feature outside the supported subset
    ///
    /// Covers malformed NAL units as well as syntax elements whose fixed
    /// expected value did not match (e.g. a profile other than Main, a
    /// chroma format other than 4:2:0, tiles, weighted prediction).
    #[error("Unsupported stream: {0}")]
    UnsupportedStream(String),

    /// The VA-API runtime could not be loaded
    ///
    /// libva is loaded dynamically; this occurs when `libva.so.2` or
    /// `libva-drm.so.2` is missing or lacks a required symbol.
    #[error("Failed to load VA-API runtime: {0}")]
    RuntimeUnavailable(String),

    /// A VA-API call failed
    ///
    /// Carries the name of the failing entry point and the raw `VAStatus`.
    #[error("VA-API call {call} failed ({status})")]
    Accelerator {
        /// Entry point that reported the failure
        call: &'static str,
        /// Raw `VAStatus` value
        status: i32,
    },

    /// Opening or duplicating a DRM / dmabuf file descriptor failed
    #[error("DRM device error: {0}")]
    Drm(#[from] std::io::Error),

    /// A picture was submitted before SPS and PPS were seen
    #[error("Decoder received slice data before stream headers")]
    MissingHeaders,

    /// The decoder is in the terminal failed state
    #[error("Decoder session has failed and cannot accept more data")]
    SessionFailed,
}

/// Result type for decode operations
pub type Result<T> = std::result::Result<T, DecodeError>;

impl DecodeError {
    /// Create an unsupported-stream error
    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedStream(msg.into())
    }

    /// Create an accelerator error from a call name and status
    pub(crate) fn va(call: &'static str, status: i32) -> Self {
        Self::Accelerator { call, status }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DecodeError::BitstreamExhausted { offset: 17 };
        assert_eq!(err.to_string(), "Bitstream exhausted at bit offset 17");

        let err = DecodeError::unsupported("tiles enabled");
        assert_eq!(err.to_string(), "Unsupported stream: tiles enabled");

        let err = DecodeError::va("vaEndPicture", -1);
        assert!(err.to_string().contains("vaEndPicture"));
    }
}
