//! Error types for audio configuration and playback

use thiserror::Error;

/// Errors that can occur while configuring or playing the audio stream
#[derive(Error, Debug)]
pub enum AudioError {
    /// The configuration record was not valid ASCII `<rate>:<ch>,<ch>,…`
    #[error("Invalid audio configuration: {0}")]
    InvalidConfig(String),

    /// The declared sample rate is outside the supported set
    #[error("Unsupported sample rate {0} (expected 44100 or 48000)")]
    UnsupportedRate(u32),

    /// A channel name has no position in the engine's channel enumeration
    #[error("Unknown channel name \"{0}\"")]
    UnknownChannel(String),

    /// No output device is available
    #[cfg(feature = "playback")]
    #[error("No audio output device available")]
    NoDevice,

    /// Building or starting the output stream failed
    #[cfg(feature = "playback")]
    #[error("Failed to start playback: {0}")]
    Playback(String),
}

/// Result type for audio operations
pub type Result<T> = std::result::Result<T, AudioError>;
