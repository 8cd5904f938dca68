// # Capture Module
//
// Source classification and the decode engine seam. The GStreamer-backed
// engine is compiled only with the `gstreamer` feature.

pub mod engine;
#[cfg(feature = "gstreamer")]
pub mod gstreamer;
pub mod source;

pub use engine::{
    DecodeEngine, EngineEvent, EngineFactory, EngineSinks, EngineState, OutputFormat, PixelFormat,
    RawFrame,
};
pub use source::{CameraDevice, SourceDescriptor};
