//! # Core Infrastructure Module
//!
//! The pieces every session shares regardless of source: the lifecycle
//! transition table and the latest-frame slot that connects the decode thread
//! to viewer streams.

pub mod frame_slot;
pub mod lifecycle;

pub use frame_slot::{EncodedFrame, FrameSlot};
pub use lifecycle::{Command, LifecycleState};
