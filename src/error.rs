//! Error types for the client core

use thiserror::Error;

/// Errors that terminate the client loop
///
/// Everything here is fatal: the loop tears down in reverse acquisition
/// order and the process exits non-zero. A clean shutdown (signal or peer
/// close) is not an error.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport, presenter or device I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Polling, timer or another OS primitive failed
    #[error("OS error: {0}")]
    Os(#[from] nix::errno::Errno),

    /// The video stream could not be parsed or decoded
    #[error(transparent)]
    Decode(#[from] oriel_decode::DecodeError),

    /// The audio stream could not be configured or played
    #[error(transparent)]
    Audio(#[from] oriel_audio::AudioError),

    /// Registering or driving the virtual HID device failed
    #[error(transparent)]
    Input(#[from] oriel_input::InputError),

    /// Input forwarding failed inside event dispatch
    ///
    /// Raised through the shutdown flag rather than a return path, since
    /// it happens inside the presenter's event callbacks.
    #[error("Input forwarding failed")]
    Forwarding,
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
