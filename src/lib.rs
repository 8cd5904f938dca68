//! # Video Feed
//!
//! Decode one video source and re-serve it to any number of browsers as a
//! `multipart/x-mixed-replace` JPEG stream, with play and pause control over
//! HTTP.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `capture`: source descriptors and the decode engine interface
//! - `core`: the lifecycle state machine and the shared frame slot
//! - `processing`: JPEG encoding, publish policy and viewer stream fan-out
//! - `session`: the pipeline controller and its per-session run loop
//! - `server`: the axum routes
//! - `config`: configuration and validation
//!
//! ## Data Flow
//!
//! ```text
//! source → DecodeEngine → FramePublisher → FrameSlot → StreamMultiplexer → viewers
//!                  └── events ──▶ session run loop ──▶ LifecycleState
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use video_feed::capture::{EngineFactory, SourceDescriptor};
//! use video_feed::processing::StreamMultiplexer;
//! use video_feed::server::{self, AppState};
//! use video_feed::session::{PipelineController, PipelineOptions};
//!
//! # async fn example(factory: Arc<dyn EngineFactory>) -> Result<(), Box<dyn std::error::Error>> {
//! let controller = Arc::new(PipelineController::new(factory, PipelineOptions::default()));
//! controller.create(SourceDescriptor::parse("rtsp://camera.local/stream")?)?;
//! controller.play()?;
//!
//! let state = AppState::new(controller, Arc::new(StreamMultiplexer::default()));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:5000").await?;
//! server::serve(listener, state, std::future::pending()).await?;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod core;
pub mod error;
pub mod processing;
pub mod server;
pub mod session;

/// Re-export error types for convenience
pub use error::{ErrorSeverity, FeedError, FeedResult};

pub use crate::capture::SourceDescriptor;
pub use crate::core::{EncodedFrame, FrameSlot, LifecycleState};
pub use crate::session::{PipelineController, PipelineOptions};
