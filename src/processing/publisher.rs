//! # Frame Publisher
//!
//! Runs on the engine's streaming thread for every decoded frame: decide
//! whether to encode, encode, and hand the result to the session's slot.
//! Encode failures stay local to the frame; the slot keeps the previous one.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{error, trace, warn};

use crate::capture::engine::RawFrame;
use crate::core::frame_slot::FrameSlot;
use crate::error::{FeedError, classify};
use crate::processing::encoder::FrameEncoder;

/// When to spend CPU on encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodePolicy {
    /// Skip frames arriving sooner than this after the last encode.
    pub min_interval: Option<Duration>,
}

impl EncodePolicy {
    /// Encode every frame.
    pub fn every_frame() -> Self {
        Self::default()
    }

    /// Cap encoding at `fps` frames per second; 0 means uncapped.
    pub fn max_fps(fps: u32) -> Self {
        Self {
            min_interval: (fps > 0).then(|| Duration::from_secs(1) / fps),
        }
    }
}

/// What happened to a frame handed to [`FramePublisher::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Written to the slot with this sequence number.
    Published(u64),
    /// Skipped by the encode policy.
    Throttled,
    /// Encoding failed; the slot is unchanged.
    Dropped,
}

pub struct FramePublisher {
    encoder: FrameEncoder,
    policy: EncodePolicy,
    slot: Arc<FrameSlot>,
    last_encode: Mutex<Option<Instant>>,
}

impl FramePublisher {
    pub fn new(encoder: FrameEncoder, policy: EncodePolicy, slot: Arc<FrameSlot>) -> Self {
        Self {
            encoder,
            policy,
            slot,
            last_encode: Mutex::new(None),
        }
    }

    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    pub fn publish(&self, frame: RawFrame<'_>) -> PublishOutcome {
        if !self.due(Instant::now()) {
            return PublishOutcome::Throttled;
        }

        match self.encoder.encode(&frame) {
            Ok(encoded) => {
                let sequence = self.slot.write(encoded);
                trace!(sequence, width = frame.width, height = frame.height, "frame published");
                PublishOutcome::Published(sequence)
            }
            Err(error) => {
                let error = FeedError::from(error);
                if classify::is_frame_local(&error) {
                    warn!(%error, width = frame.width, height = frame.height, "dropping frame");
                } else {
                    error!(%error, width = frame.width, height = frame.height, "dropping frame");
                }
                PublishOutcome::Dropped
            }
        }
    }

    fn due(&self, now: Instant) -> bool {
        let Some(min_interval) = self.policy.min_interval else {
            return true;
        };
        let mut last = self
            .last_encode
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match *last {
            Some(previous) if now.duration_since(previous) < min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
