//! # Processing Module
//!
//! Everything between a decoded frame and bytes on a viewer's socket:
//! JPEG encoding, the per-frame publish policy, and multipart fan-out.

pub mod encoder;
pub mod multiplexer;
pub mod publisher;

pub use encoder::{EncodeError, FrameEncoder};
pub use multiplexer::{StreamMultiplexer, StreamSettings};
pub use publisher::{EncodePolicy, FramePublisher, PublishOutcome};
