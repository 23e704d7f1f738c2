//! Realtime playback engine
//!
//! Requires the `playback` feature.
//!
//! Opens the default output device at the negotiated rate and channel
//! count and services the engine's callback thread from an [`AudioFeed`]:
//! every buffer is filled from the ring, zero-padded on underflow, with no
//! allocation in the callback path.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{info, warn};

use crate::error::{AudioError, Result};
use crate::stream::AudioFeed;

/// A running playback stream
///
/// Playback stops when this is dropped.
pub struct Playback {
    _stream: cpal::Stream,
}

impl Playback {
    /// Start playback on the default output device
    ///
    /// The feed's format decides sample rate and channel count; samples
    /// are interleaved S16.
    pub fn start(mut feed: AudioFeed) -> Result<Playback> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let config = cpal::StreamConfig {
            channels: feed.config().channels.len() as u16,
            sample_rate: cpal::SampleRate(feed.config().rate),
            buffer_size: cpal::BufferSize::Default,
        };
        info!(
            rate = config.sample_rate.0,
            channels = config.channels,
            "Starting audio playback"
        );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    feed.fill_samples(data);
                },
                |err| warn!(%err, "Audio output stream error"),
                None,
            )
            .map_err(|e| AudioError::Playback(e.to_string()))?;
        stream
            .play()
            .map_err(|e| AudioError::Playback(e.to_string()))?;

        Ok(Playback { _stream: stream })
    }
}
