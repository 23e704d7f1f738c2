//! Error type for input forwarding

use thiserror::Error;

/// Errors that can occur while forwarding input
///
/// A forwarding failure is fatal for the session: the event loop observes
/// it and shuts the client down.
#[derive(Error, Debug)]
pub enum InputError {
    /// Writing to the virtual HID device failed
    #[error("Failed to write HID event: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for input operations
pub type Result<T> = std::result::Result<T, InputError>;
