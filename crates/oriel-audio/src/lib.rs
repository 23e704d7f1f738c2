//! # oriel-audio
//!
//! Audio receive path for the oriel streaming client.
//!
//! - **[`ring`]** - lock-free single-producer/single-consumer byte ring
//!   with a single atomic size word
//! - **[`format`]** - stream-configuration parsing and the engine's
//!   channel-position enumeration
//! - **[`stream`]** - demuxer-side producer and realtime-side feed with
//!   underflow padding and cumulative latency accounting
//! - **[`playback`]** - cpal output engine (requires the `playback`
//!   feature)
//!
//! # Data flow
//!
//! ```text
//! audio records ─> AudioStream::push ─> ring ─> AudioFeed::fill ─> engine
//!                        (main thread)            (callback thread)
//! ```
//!
//! The first audio record of a session declares `"<rate>:<ch>,<ch>,…"`;
//! every later record is raw S16LE interleaved PCM. See
//! [`format::AudioConfig::parse`].

pub mod error;
pub mod format;
pub mod ring;
pub mod stream;

/// Realtime playback engine
///
/// Requires the `playback` feature.
#[cfg(feature = "playback")]
pub mod playback;

pub use error::{AudioError, Result};
pub use format::{AudioConfig, ChannelPosition, BYTES_PER_SAMPLE, SUPPORTED_RATES};
pub use ring::{ring, Consumer, Producer};
pub use stream::{stream, AudioFeed, AudioStream};

#[cfg(feature = "playback")]
pub use playback::Playback;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
