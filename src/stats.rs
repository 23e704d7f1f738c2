//! Per-keyframe statistics windows
//!
//! The demuxer accumulates ping echoes, stream bytes and server-side
//! latencies between keyframes; each keyframe closes the window into a
//! snapshot and starts the next one. The latency estimates are
//! deliberately pessimistic: one missed vsync for capture, one for
//! rendering, and a 100 Mbit reference link for transmission.

/// One fully missed vsync, in microseconds
pub const VSYNC_BUDGET_US: u64 = 16_666;

/// Reference link bandwidth for the latency estimate
pub const REFERENCE_LINK_BPS: u64 = 100_000_000;

/// Accumulators for the current inter-keyframe window
#[derive(Debug, Default)]
pub struct StatsWindow {
    window_started_us: u64,
    video_bytes: u64,
    audio_bytes: u64,
    ping_sum_us: u64,
    ping_count: u64,
    video_latency_sum_us: u64,
    video_latency_count: u64,
    audio_latency_sum_us: u64,
    audio_latency_count: u64,
}

/// Snapshot published at a keyframe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Average round trip over the window
    pub ping_us: u64,
    /// Video bitrate over the window, kilobits per second
    pub video_kbps: u64,
    /// Audio bitrate over the window, kilobits per second
    pub audio_kbps: u64,
    /// Estimated end-to-end video latency
    pub video_latency_us: u64,
    /// Estimated end-to-end audio latency, when audio is playing
    pub audio_latency_us: Option<u64>,
}

impl StatsWindow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one heartbeat echo's measured round trip
    pub fn record_ping(&mut self, rtt_us: u64) {
        self.ping_sum_us += rtt_us;
        self.ping_count += 1;
    }

    /// Record one video record; opens the window on first use
    ///
    /// Returns false when the record only opened the window and was not
    /// accumulated.
    pub fn record_video(&mut self, now_us: u64, bytes: usize, latency_us: u64) -> bool {
        if !self.open(now_us) {
            return false;
        }
        self.video_bytes += bytes as u64;
        self.video_latency_sum_us += latency_us;
        self.video_latency_count += 1;
        true
    }

    /// Record one audio record; opens the window on first use
    pub fn record_audio(&mut self, now_us: u64, bytes: usize, latency_us: u64) {
        if !self.open(now_us) {
            return;
        }
        self.audio_bytes += bytes as u64;
        self.audio_latency_sum_us += latency_us;
        self.audio_latency_count += 1;
    }

    fn open(&mut self, now_us: u64) -> bool {
        if self.window_started_us == 0 {
            self.window_started_us = now_us;
            return false;
        }
        true
    }

    /// Average round trip so far
    #[must_use]
    pub fn average_ping_us(&self) -> u64 {
        if self.ping_count == 0 {
            0
        } else {
            self.ping_sum_us / self.ping_count
        }
    }

    /// Close the window at a keyframe and start the next one
    ///
    /// `engine_latency_us` is the audio engine's cumulative underflow
    /// latency, when audio is playing. Returns `None` until the window
    /// has been opened.
    pub fn finish(&mut self, now_us: u64, engine_latency_us: Option<u64>) -> Option<StatsSnapshot> {
        if self.window_started_us == 0 {
            return None;
        }
        let clock_delta = now_us.saturating_sub(self.window_started_us).max(1);
        let ping = self.average_ping_us();

        // Kbps = bytes * 1 s * 8 bit / delta / 1024
        let video_kbps = self.video_bytes * 1_000_000 * 8 / clock_delta / 1024;
        let audio_kbps = self.audio_bytes * 1_000_000 * 8 / clock_delta / 1024;

        let video_latency_us = if self.video_latency_count == 0 {
            0
        } else {
            self.video_latency_sum_us / self.video_latency_count
                + ping
                + 2 * VSYNC_BUDGET_US
                + video_kbps * 1_000_000 / REFERENCE_LINK_BPS
        };

        let audio_latency_us = engine_latency_us.map(|engine| {
            if self.audio_latency_count == 0 {
                0
            } else {
                self.audio_latency_sum_us / self.audio_latency_count
                    + ping
                    + audio_kbps * 1_000_000 / REFERENCE_LINK_BPS
                    + engine
            }
        });

        *self = Self { window_started_us: now_us, ..Self::default() };
        Some(StatsSnapshot {
            ping_us: ping,
            video_kbps,
            audio_kbps,
            video_latency_us,
            audio_latency_us,
        })
    }
}
