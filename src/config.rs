//! Client configuration
//!
//! Provides configuration options for the streaming client with a builder
//! pattern for ergonomic construction.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the streaming client
///
/// Use [`ClientConfig::builder()`] or struct literal syntax with
/// [`Default::default()`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Forward local input to the server as a virtual HID device
    /// (default: true)
    pub forward_input: bool,

    /// Collect per-keyframe stream statistics (default: false)
    pub collect_stats: bool,

    /// Audio ring capacity in interleaved frames; 0 disables audio
    /// (default: 0)
    pub audio_ring_samples: usize,

    /// Heartbeat period (default: 1/3 s)
    pub ping_period: Duration,

    /// Decoder surface pool depth (default: 3)
    pub pool_size: usize,

    /// DRM render node backing the decoder (default: /dev/dri/renderD128)
    pub render_node: PathBuf,

    /// Virtual HID device node (default: /dev/uhid)
    pub uhid_node: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            forward_input: true,
            collect_stats: false,
            audio_ring_samples: 0,
            ping_period: Duration::from_nanos(1_000_000_000 / 3),
            pool_size: oriel_decode::DEFAULT_POOL_SIZE,
            render_node: PathBuf::from("/dev/dri/renderD128"),
            uhid_node: PathBuf::from("/dev/uhid"),
        }
    }
}

impl ClientConfig {
    /// Create a configuration builder
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();
        if self.pool_size < 2 {
            issues.push("pool_size must be at least 2 (one current, one reference)".into());
        }
        if self.ping_period.is_zero() {
            issues.push("ping_period must be non-zero".into());
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Builder for [`ClientConfig`]
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    forward_input: Option<bool>,
    collect_stats: Option<bool>,
    audio_ring_samples: Option<usize>,
    ping_period: Option<Duration>,
    pool_size: Option<usize>,
    render_node: Option<PathBuf>,
    uhid_node: Option<PathBuf>,
}

impl ClientConfigBuilder {
    /// Enable or disable input forwarding
    #[must_use]
    pub fn forward_input(mut self, enabled: bool) -> Self {
        self.forward_input = Some(enabled);
        self
    }

    /// Enable or disable statistics collection
    #[must_use]
    pub fn collect_stats(mut self, enabled: bool) -> Self {
        self.collect_stats = Some(enabled);
        self
    }

    /// Set the audio ring size in interleaved frames (0 disables audio)
    #[must_use]
    pub fn audio_ring_samples(mut self, samples: usize) -> Self {
        self.audio_ring_samples = Some(samples);
        self
    }

    /// Set the heartbeat period
    #[must_use]
    pub fn ping_period(mut self, period: Duration) -> Self {
        self.ping_period = Some(period);
        self
    }

    /// Set the decoder surface pool depth
    #[must_use]
    pub fn pool_size(mut self, surfaces: usize) -> Self {
        self.pool_size = Some(surfaces);
        self
    }

    /// Set the DRM render node path
    #[must_use]
    pub fn render_node(mut self, path: impl Into<PathBuf>) -> Self {
        self.render_node = Some(path.into());
        self
    }

    /// Set the UHID device node path
    #[must_use]
    pub fn uhid_node(mut self, path: impl Into<PathBuf>) -> Self {
        self.uhid_node = Some(path.into());
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            forward_input: self.forward_input.unwrap_or(defaults.forward_input),
            collect_stats: self.collect_stats.unwrap_or(defaults.collect_stats),
            audio_ring_samples: self.audio_ring_samples.unwrap_or(defaults.audio_ring_samples),
            ping_period: self.ping_period.unwrap_or(defaults.ping_period),
            pool_size: self.pool_size.unwrap_or(defaults.pool_size),
            render_node: self.render_node.unwrap_or(defaults.render_node),
            uhid_node: self.uhid_node.unwrap_or(defaults.uhid_node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(config.forward_input);
        assert!(!config.collect_stats);
        assert_eq!(config.audio_ring_samples, 0);
        assert_eq!(config.pool_size, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::builder()
            .forward_input(false)
            .collect_stats(true)
            .audio_ring_samples(4800)
            .pool_size(4)
            .render_node("/dev/dri/renderD129")
            .build();

        assert!(!config.forward_input);
        assert!(config.collect_stats);
        assert_eq!(config.audio_ring_samples, 4800);
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.render_node, PathBuf::from("/dev/dri/renderD129"));
    }

    #[test]
    fn test_validation_rejects_tiny_pool() {
        let config = ClientConfig { pool_size: 1, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
