//! # Feed Configuration
//!
//! Settings for one `vfeed` process. Parsed from the command line (and
//! `VFEED_*` environment variables) in `main`, validated here, then split
//! into the pieces each component needs.
//!
//! ## Parameters
//!
//! | Parameter | Type | Range | Default | Description |
//! |-----------|------|-------|---------|-------------|
//! | `source` | `String` | non-empty | none | File path, `rtsp://` URL, camera index or `/dev/video*` |
//! | `host` | `String` | IP address | `0.0.0.0` | Interface the HTTP server binds |
//! | `port` | `u16` | 1-65535 | `5000` | HTTP port |
//! | `width` × `height` | `u32` | 16-7680 × 16-4320 | `640×480` | Size frames are scaled to |
//! | `jpeg_quality` | `u8` | 1-100 | `95` | JPEG quality |
//! | `stream_interval_ms` | `u64` | 1-1000 | `33` | Pause between two parts sent to a viewer |
//! | `max_encode_fps` | `Option<u32>` | 1-240 | none | Cap on frames encoded per second |
//! | `exit_on_eos` | `bool` | | `true` | Exit the process when the source ends |
//!
//! ## Examples
//!
//! ```rust
//! use video_feed::config::config::FeedConfig;
//!
//! let mut config = FeedConfig::new("/videos/clip.mp4");
//! config.port = 8080;
//! assert!(config.validate().is_ok());
//! assert_eq!(config.bind_addr().unwrap().port(), 8080);
//! ```

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::capture::engine::OutputFormat;
use crate::error::{FeedError, FeedResult};
use crate::processing::encoder::{DEFAULT_JPEG_QUALITY, FrameEncoder};
use crate::processing::multiplexer::{DEFAULT_BOUNDARY, StreamSettings};
use crate::processing::publisher::EncodePolicy;
use crate::session::PipelineOptions;

/// Runtime settings for the feed server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Raw source string, classified by `SourceDescriptor::parse`.
    pub source: String,

    pub host: String,

    pub port: u16,

    /// Width every frame is scaled to before encoding.
    pub width: u32,

    /// Height every frame is scaled to before encoding.
    pub height: u32,

    /// JPEG quality. Higher values mean larger parts on the wire.
    pub jpeg_quality: u8,

    /// Milliseconds between two reads of the frame slot per viewer.
    ///
    /// Independent of the decode rate; at the default 33 ms a viewer receives
    /// about 30 parts per second whether the source runs at 10 or 60 fps.
    pub stream_interval_ms: u64,

    /// Upper bound on encodes per second. `None` encodes every decoded frame.
    pub max_encode_fps: Option<u32>,

    /// Whether end-of-stream terminates the process.
    pub exit_on_eos: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            host: "0.0.0.0".to_string(),
            port: 5000,
            width: 640,
            height: 480,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            stream_interval_ms: 33,
            max_encode_fps: None,
            exit_on_eos: true,
        }
    }
}

impl FeedConfig {
    /// Defaults for everything but the source.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.source.trim().is_empty() {
            return Err("Source must not be empty".to_string());
        }
        if self.host.parse::<IpAddr>().is_err() {
            return Err(format!("Host '{}' is not an IP address", self.host));
        }
        if self.port == 0 {
            return Err("Port must be greater than 0".to_string());
        }
        if !(16..=7680).contains(&self.width) || !(16..=4320).contains(&self.height) {
            return Err(format!(
                "Output size {}x{} is outside 16x16..7680x4320",
                self.width, self.height
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }
        if !(1..=1000).contains(&self.stream_interval_ms) {
            return Err("Stream interval must be between 1 and 1000 ms".to_string());
        }
        if let Some(fps) = self.max_encode_fps {
            if !(1..=240).contains(&fps) {
                return Err("Maximum encode rate must be between 1 and 240 fps".to_string());
            }
        }
        Ok(())
    }

    /// Address the HTTP server binds to.
    pub fn bind_addr(&self) -> FeedResult<SocketAddr> {
        let ip = self.host.parse::<IpAddr>().map_err(|e| {
            FeedError::config("host", &self.host, e.to_string())
                .with_recovery_suggestion("use an address such as 0.0.0.0 or 127.0.0.1")
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Decode and encode settings shared by every session.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            output: OutputFormat {
                width: self.width,
                height: self.height,
            },
            encoder: FrameEncoder::new(self.jpeg_quality),
            policy: self
                .max_encode_fps
                .map(EncodePolicy::max_fps)
                .unwrap_or_default(),
        }
    }

    /// Pacing of viewer streams.
    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            boundary: DEFAULT_BOUNDARY.to_string(),
            interval: Duration::from_millis(self.stream_interval_ms),
        }
    }
}
