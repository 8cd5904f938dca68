// # Decode Engine Interface
//
// The capture/decode engine is an external collaborator. The core never
// demuxes or decodes; it builds an engine for a source through an
// `EngineFactory`, receives frames and events through two push callbacks, and
// drives the engine with three state calls issued from the session run loop.
//
// ```text
//  EngineFactory::build(source, output, sinks)
//        │
//        ▼
//  ┌──────────────┐  on_frame(RawFrame)   ┌────────────────┐
//  │ DecodeEngine │──────────────────────▶│ FramePublisher │──▶ FrameSlot
//  │              │  on_event(EngineEvent)└────────────────┘
//  │              │──────────────────────▶ session run loop
//  └──────────────┘◀── set_playing / set_paused / teardown (run loop only)
// ```

use std::fmt;
use std::sync::Arc;

use crate::capture::source::SourceDescriptor;
use crate::error::FeedResult;

/// Pixel layout of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb,
    Bgr,
    Rgba,
    Bgra,
    Gray8,
}

impl PixelFormat {
    /// Bytes used by one pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Rgba | PixelFormat::Bgra => 4,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// A decoded image borrowed from the engine.
///
/// Valid only for the duration of the frame callback.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Bytes between the starts of consecutive rows.
    pub stride: usize,
    pub format: PixelFormat,
}

impl<'a> RawFrame<'a> {
    /// A frame whose rows are tightly packed.
    pub fn packed(data: &'a [u8], width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            stride: width as usize * format.bytes_per_pixel(),
            format,
        }
    }
}

/// Engine-side state of the decode graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Null,
    Ready,
    Paused,
    Playing,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Null => "null",
            EngineState::Ready => "ready",
            EngineState::Paused => "paused",
            EngineState::Playing => "playing",
        };
        f.write_str(name)
    }
}

/// Lifecycle and error notifications emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The source is exhausted.
    EndOfStream,
    /// The engine failed and cannot continue.
    Error {
        code: i32,
        message: String,
        debug: Option<String>,
    },
    /// A non-fatal problem worth logging.
    Warning { message: String },
    /// A state change inside the engine. `from_graph` is true only when the
    /// change concerns the session's top-level graph rather than one of its
    /// sub-elements.
    StateChanged {
        from_graph: bool,
        old: EngineState,
        new: EngineState,
    },
}

/// Target geometry every decoded frame is scaled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub width: u32,
    pub height: u32,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// Callback receiving each decoded frame on the engine's streaming thread.
pub type FrameCallback = Arc<dyn Fn(RawFrame<'_>) + Send + Sync>;

/// Callback receiving engine events on whichever thread posts them.
pub type EventCallback = Arc<dyn Fn(EngineEvent) + Send + Sync>;

/// The two push interfaces handed to an engine at construction.
#[derive(Clone)]
pub struct EngineSinks {
    pub on_frame: FrameCallback,
    pub on_event: EventCallback,
}

/// A constructed decode graph.
///
/// Implementations are owned by exactly one session run loop, which is the
/// only caller of these methods. Calls must not block for longer than the
/// underlying state change takes to be requested.
pub trait DecodeEngine: Send {
    /// Start or resume delivering frames.
    fn set_playing(&mut self) -> FeedResult<()>;

    /// Stop delivering frames without releasing the graph. No frame callback
    /// may run after this returns.
    fn set_paused(&mut self) -> FeedResult<()>;

    /// Release the graph. Further calls are no-ops.
    fn teardown(&mut self) -> FeedResult<()>;
}

/// Builds a decode graph for a source descriptor kind.
pub trait EngineFactory: Send + Sync {
    /// Construct the graph in a stopped state.
    ///
    /// # Errors
    ///
    /// `FeedError::GraphConstruction` when the graph cannot be built, for
    /// example because no decoder exists for the source's codec.
    fn build(
        &self,
        source: &SourceDescriptor,
        output: OutputFormat,
        sinks: EngineSinks,
    ) -> FeedResult<Box<dyn DecodeEngine>>;
}
