// # GStreamer Engine
//
// `EngineFactory` backed by `vfeed-gst`. Each source kind gets its own graph
// head; the tail (convert, scale to the output size, RGB appsink) is shared.

use tracing::{debug, warn};
use vfeed_gst::{BusEvent, DecodeGraph, GraphState, RawSample, SampleFormat};

use crate::capture::engine::{
    DecodeEngine, EngineEvent, EngineFactory, EngineSinks, EngineState, OutputFormat, PixelFormat,
    RawFrame,
};
use crate::capture::source::SourceDescriptor;
use crate::error::{FeedError, FeedResult};

/// Builds GStreamer decode graphs.
#[derive(Debug, Default, Clone, Copy)]
pub struct GstEngineFactory;

impl GstEngineFactory {
    pub fn new() -> Self {
        Self
    }

    /// The launch line used for `source` at the given output size.
    pub fn describe(source: &SourceDescriptor, output: OutputFormat) -> FeedResult<String> {
        let head = match source {
            SourceDescriptor::LocalFile(path) => {
                let uri = vfeed_gst::file_uri(path)
                    .map_err(|e| FeedError::graph_construction(source.kind(), e.to_string()))?;
                vfeed_gst::uri_head(&uri)
            }
            SourceDescriptor::RtspUrl(url) => vfeed_gst::rtsp_head(url),
            SourceDescriptor::CameraDevice(device) => {
                vfeed_gst::v4l2_head(&device.device_path().to_string_lossy())
            }
        };
        Ok(vfeed_gst::launch_description(&head, output.width, output.height))
    }
}

impl EngineFactory for GstEngineFactory {
    fn build(
        &self,
        source: &SourceDescriptor,
        output: OutputFormat,
        sinks: EngineSinks,
    ) -> FeedResult<Box<dyn DecodeEngine>> {
        let description = Self::describe(source, output)?;
        debug!(%description, "launching decode graph");

        let EngineSinks { on_frame, on_event } = sinks;
        let graph = DecodeGraph::launch(
            &description,
            move |sample| {
                if let Some(frame) = raw_frame(&sample) {
                    on_frame(frame);
                }
            },
            move |event| on_event(engine_event(event)),
        )
        .map_err(|e| {
            FeedError::graph_construction(source.kind(), format!("{e:#}"))
                .with_context(description.clone())
                .with_recovery_suggestion("check that the required GStreamer plugins are installed")
        })?;

        Ok(Box::new(GstEngine { graph: Some(graph) }))
    }
}

/// A launched graph. Dropping the inner `DecodeGraph` detaches its callbacks.
pub struct GstEngine {
    graph: Option<DecodeGraph>,
}

impl DecodeEngine for GstEngine {
    fn set_playing(&mut self) -> FeedResult<()> {
        match &self.graph {
            Some(graph) => graph
                .play()
                .map_err(|e| FeedError::decode(-1, format!("{e:#}"), None)),
            None => Err(FeedError::state("torn down", "play")),
        }
    }

    fn set_paused(&mut self) -> FeedResult<()> {
        match &self.graph {
            Some(graph) => graph
                .pause()
                .map_err(|e| FeedError::decode(-1, format!("{e:#}"), None)),
            None => Err(FeedError::state("torn down", "pause")),
        }
    }

    fn teardown(&mut self) -> FeedResult<()> {
        if let Some(graph) = self.graph.take() {
            graph
                .shutdown()
                .map_err(|e| FeedError::decode(-1, format!("{e:#}"), None))?;
        }
        Ok(())
    }
}

fn raw_frame<'a>(sample: &RawSample<'a>) -> Option<RawFrame<'a>> {
    let format = match sample.format {
        SampleFormat::Rgb => PixelFormat::Rgb,
        SampleFormat::Bgr => PixelFormat::Bgr,
        SampleFormat::Rgba | SampleFormat::Rgbx => PixelFormat::Rgba,
        SampleFormat::Bgra | SampleFormat::Bgrx => PixelFormat::Bgra,
        SampleFormat::Gray8 => PixelFormat::Gray8,
        SampleFormat::Other => {
            warn!("dropping sample with unsupported pixel layout");
            return None;
        }
    };
    Some(RawFrame {
        data: sample.data,
        width: sample.width,
        height: sample.height,
        stride: sample.stride,
        format,
    })
}

fn engine_state(state: GraphState) -> EngineState {
    match state {
        GraphState::Playing => EngineState::Playing,
        GraphState::Paused => EngineState::Paused,
        GraphState::Ready => EngineState::Ready,
        GraphState::Null | GraphState::VoidPending => EngineState::Null,
    }
}

fn engine_event(event: BusEvent) -> EngineEvent {
    match event {
        BusEvent::Eos => EngineEvent::EndOfStream,
        BusEvent::Error {
            domain,
            code,
            message,
            debug,
            element,
        } => {
            let debug = match (element, debug) {
                (Some(element), Some(debug)) => Some(format!("{element} ({domain}): {debug}")),
                (Some(element), None) => Some(format!("{element} ({domain})")),
                (None, debug) => debug,
            };
            EngineEvent::Error {
                code,
                message,
                debug,
            }
        }
        BusEvent::Warning { message, debug } => EngineEvent::Warning {
            message: match debug {
                Some(debug) => format!("{message} ({debug})"),
                None => message,
            },
        },
        BusEvent::StateChanged {
            from_pipeline,
            old,
            current,
            ..
        } => EngineEvent::StateChanged {
            from_graph: from_pipeline,
            old: engine_state(old),
            new: engine_state(current),
        },
    }
}
