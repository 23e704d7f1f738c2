//! Stream plumbing between the protocol demuxer and the realtime engine
//!
//! [`AudioStream`] is the main-thread half: the demuxer pushes raw PCM
//! records into it and reads the cumulative latency for the statistics
//! overlay. [`AudioFeed`] is the callback half: the engine's realtime
//! thread fills its buffers from the ring, zero-padding on underflow and
//! accounting the padded duration. Neither half allocates after creation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::format::AudioConfig;
use crate::ring::{self, Consumer, Producer};

/// Create the stream pair for a negotiated format
///
/// `ring_samples` sizes the ring in interleaved frames; the byte capacity
/// is `ring_samples * frame_size`.
#[must_use]
pub fn stream(config: AudioConfig, ring_samples: usize) -> (AudioStream, AudioFeed) {
    let capacity = ring_samples.max(1) * config.frame_size();
    let (producer, consumer) = ring::ring(capacity);
    let latency = Arc::new(AtomicU64::new(0));

    (
        AudioStream {
            config: config.clone(),
            producer,
            latency: Arc::clone(&latency),
        },
        AudioFeed { config, consumer, latency },
    )
}

/// Producer half owned by the protocol demuxer
pub struct AudioStream {
    config: AudioConfig,
    producer: Producer,
    latency: Arc<AtomicU64>,
}

impl AudioStream {
    /// Negotiated format
    #[must_use]
    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Queue one record of raw PCM
    ///
    /// Overflow is not fatal: the excess is dropped and logged, playback
    /// continues from whatever fits.
    pub fn push(&mut self, pcm: &[u8]) {
        let written = self.producer.write(pcm);
        if written < pcm.len() {
            warn!(
                dropped = pcm.len() - written,
                queued = self.producer.len(),
                "Audio ring overflow"
            );
        }
    }

    /// Cumulative playback latency in microseconds
    ///
    /// Grows by the duration of every zero-padded underflow since the
    /// stream started; never resets.
    #[must_use]
    pub fn latency_micros(&self) -> u64 {
        self.latency.load(Ordering::Relaxed)
    }
}

/// Consumer half owned by the engine's realtime callback thread
pub struct AudioFeed {
    config: AudioConfig,
    consumer: Consumer,
    latency: Arc<AtomicU64>,
}

impl AudioFeed {
    /// Negotiated format
    #[must_use]
    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Fill an engine-provided buffer from the ring
    ///
    /// On underflow the tail is zero-padded (silence in S16LE) and the
    /// cumulative latency counter advances by the padded duration.
    pub fn fill(&mut self, buffer: &mut [u8]) {
        let got = self.consumer.read(buffer);
        if got < buffer.len() {
            buffer[got..].fill(0);
            let padded = self.config.bytes_to_micros(buffer.len() - got);
            self.latency.fetch_add(padded, Ordering::Relaxed);
        }
    }

    /// Fill an interleaved S16 buffer from the ring
    ///
    /// Same semantics as [`fill`](Self::fill), viewed as native-endian
    /// 16-bit samples (the wire format is little-endian).
    pub fn fill_samples(&mut self, samples: &mut [i16]) {
        // SAFETY: i16 has no invalid bit patterns and the length in bytes
        // is exactly twice the sample count.
        let bytes = unsafe {
            std::slice::from_raw_parts_mut(samples.as_mut_ptr() as *mut u8, samples.len() * 2)
        };
        self.fill(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_48k() -> AudioConfig {
        AudioConfig::parse(b"48000:FL,FR").unwrap()
    }

    #[test]
    fn test_push_then_fill() {
        let (mut stream, mut feed) = stream(stereo_48k(), 1024);
        stream.push(&[1, 2, 3, 4, 5, 6, 7, 8]);

        let mut out = [0u8; 8];
        feed.fill(&mut out);
        assert_eq!(out, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(stream.latency_micros(), 0);
    }

    #[test]
    fn test_underflow_pads_and_accounts_latency() {
        let (mut stream, mut feed) = stream(stereo_48k(), 1024);
        stream.push(&[0xaa; 200]);

        // Consumer wants 960 bytes with only 200 queued
        let mut out = [0x55u8; 960];
        feed.fill(&mut out);
        assert!(out[..200].iter().all(|&b| b == 0xaa));
        assert!(out[200..].iter().all(|&b| b == 0));

        // 760 bytes = 190 stereo frames at 48 kHz
        assert_eq!(stream.latency_micros(), 760 * 1_000_000 / 4 / 48_000);
        assert_eq!(feed.consumer.len(), 0);
    }

    #[test]
    fn test_latency_accumulates() {
        let (stream, mut feed) = stream(stereo_48k(), 16);
        let mut out = [0u8; 64];
        feed.fill(&mut out);
        feed.fill(&mut out);
        let one = AudioConfig::parse(b"48000:FL,FR").unwrap().bytes_to_micros(64);
        assert_eq!(stream.latency_micros(), 2 * one);
    }

    #[test]
    fn test_fill_samples_matches_bytes() {
        let (mut stream, mut feed) = stream(stereo_48k(), 1024);
        stream.push(&[0x01, 0x02, 0x03, 0x04]);

        let mut samples = [0i16; 4];
        feed.fill_samples(&mut samples);
        assert_eq!(samples[0], i16::from_le_bytes([0x01, 0x02]));
        assert_eq!(samples[1], i16::from_le_bytes([0x03, 0x04]));
        assert_eq!(samples[2], 0);
        assert_eq!(samples[3], 0);
    }
}
