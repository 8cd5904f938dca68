// SPDX-License-Identifier: MIT
//! # GStreamer Decode Graph for vfeed
//!
//! This crate turns a video source into a stream of raw RGB frames using a
//! GStreamer launch line terminated by a named `appsink`. It exposes exactly
//! two push interfaces to the caller:
//!
//! - a **sample callback**, invoked on the GStreamer streaming thread with a
//!   borrowed view of every decoded buffer;
//! - an **event callback**, invoked from the bus sync handler with end-of-stream,
//!   error, warning and state-change notifications.
//!
//! ## Graph Layout
//!
//! ```text
//! <head> → videoconvert → videoscale → video/x-raw,WxH → videoconvert → RGB → appsink
//! ```
//!
//! The head depends on the kind of source:
//! - **file**: `uridecodebin uri=file:///…`
//! - **RTSP**: `rtspsrc location=… latency=0 ! rtph264depay ! avdec_h264`
//! - **camera**: `v4l2src device=/dev/videoN`
//!
//! ## Threading Model
//!
//! - **Streaming thread** (owned by GStreamer): runs the sample callback. Keep
//!   work there short; it paces the whole graph.
//! - **Posting thread** (whichever element posts a bus message): runs the
//!   event callback through `Bus::set_sync_handler`. No GLib main loop is
//!   needed, the caller decides where events are processed.
//! - **Caller thread**: `play`, `pause` and `shutdown` change the pipeline
//!   state. The caller is expected to issue these from a single thread.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use vfeed_gst::{DecodeGraph, launch_description, v4l2_head};
//!
//! let description = launch_description(&v4l2_head("/dev/video0"), 640, 480);
//! let graph = DecodeGraph::launch(
//!     &description,
//!     |sample| println!("{}x{} frame, {} bytes", sample.width, sample.height, sample.data.len()),
//!     |event| println!("bus: {event:?}"),
//! )?;
//! graph.play()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Context, Result};
use gstreamer as gst;
use gstreamer::glib::error::ErrorDomain;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use once_cell::sync::OnceCell;
use std::path::Path;

/// Name given to the terminal appsink in every launch line.
pub const SINK_NAME: &str = "sink";

/// Buffers queued in the appsink before the oldest is dropped.
const APPSINK_MAX_BUFFERS: u32 = 2;

/// Result of the one-time `gst::init()`; stored as text so it can be cloned.
static GST_INIT: OnceCell<std::result::Result<(), String>> = OnceCell::new();

/// Initialize GStreamer once per process.
pub fn init() -> Result<()> {
    GST_INIT
        .get_or_init(|| gst::init().map_err(|e| e.to_string()))
        .clone()
        .map_err(|e| anyhow!("failed to initialize GStreamer: {e}"))
}

/// Pipeline state as reported on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    VoidPending,
    Null,
    Ready,
    Paused,
    Playing,
}

impl From<gst::State> for GraphState {
    fn from(state: gst::State) -> Self {
        match state {
            gst::State::Null => GraphState::Null,
            gst::State::Ready => GraphState::Ready,
            gst::State::Paused => GraphState::Paused,
            gst::State::Playing => GraphState::Playing,
            _ => GraphState::VoidPending,
        }
    }
}

/// Pixel layout of a sample pulled from the appsink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Rgb,
    Bgr,
    Rgba,
    Bgra,
    Rgbx,
    Bgrx,
    Gray8,
    /// Any layout the graph was not configured to produce.
    Other,
}

impl From<gst_video::VideoFormat> for SampleFormat {
    fn from(format: gst_video::VideoFormat) -> Self {
        match format {
            gst_video::VideoFormat::Rgb => SampleFormat::Rgb,
            gst_video::VideoFormat::Bgr => SampleFormat::Bgr,
            gst_video::VideoFormat::Rgba => SampleFormat::Rgba,
            gst_video::VideoFormat::Bgra => SampleFormat::Bgra,
            gst_video::VideoFormat::Rgbx => SampleFormat::Rgbx,
            gst_video::VideoFormat::Bgrx => SampleFormat::Bgrx,
            gst_video::VideoFormat::Gray8 => SampleFormat::Gray8,
            _ => SampleFormat::Other,
        }
    }
}

/// A decoded frame borrowed from a mapped GStreamer buffer.
///
/// Only valid for the duration of the sample callback; copy `data` to keep it.
pub struct RawSample<'a> {
    /// Mapped buffer memory. Rows are `stride` bytes apart.
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Bytes per row of the first plane (may exceed `width * bpp`).
    pub stride: usize,
    pub format: SampleFormat,
}

/// Notification forwarded from the pipeline bus.
#[derive(Debug, Clone)]
pub enum BusEvent {
    /// The source has no more data.
    Eos,
    /// An element failed; the pipeline cannot continue.
    Error {
        /// GError domain, e.g. `gst-resource-error-quark`.
        domain: String,
        /// Code within the domain, or `-1` when the domain is unknown.
        code: i32,
        message: String,
        debug: Option<String>,
        /// Path of the element that posted the error.
        element: Option<String>,
    },
    Warning {
        message: String,
        debug: Option<String>,
    },
    /// A state change. `from_pipeline` is true only when the message was
    /// posted by the top-level pipeline, not one of its children.
    StateChanged {
        from_pipeline: bool,
        old: GraphState,
        current: GraphState,
        pending: GraphState,
    },
}

/// Build a complete launch line from a source head.
pub fn launch_description(head: &str, width: u32, height: u32) -> String {
    format!(
        "{head} ! videoconvert ! videoscale ! video/x-raw,width={width},height={height} \
         ! videoconvert ! video/x-raw,format=RGB ! appsink name={SINK_NAME}"
    )
}

/// Head for a local media file given as a `file://` URI.
pub fn uri_head(uri: &str) -> String {
    format!("uridecodebin uri=\"{uri}\"")
}

/// Head for an H.264 RTSP stream.
pub fn rtsp_head(location: &str) -> String {
    format!("rtspsrc location=\"{location}\" latency=0 ! rtph264depay ! avdec_h264")
}

/// Head for a V4L2 capture device.
pub fn v4l2_head(device: &str) -> String {
    format!("v4l2src device=\"{device}\"")
}

/// Convert an absolute path into a `file://` URI.
pub fn file_uri(path: &Path) -> Result<String> {
    gst::glib::filename_to_uri(path, None)
        .map(|uri| uri.to_string())
        .map_err(|e| anyhow!("cannot build URI for {}: {e}", path.display()))
}

/// A parsed, linked pipeline feeding an appsink.
///
/// Dropping the graph sets the pipeline to `Null` and detaches the bus
/// handler, so no callback fires afterwards.
pub struct DecodeGraph {
    pipeline: gst::Pipeline,
}

impl DecodeGraph {
    /// Parse `description`, wire the appsink and bus callbacks, and leave the
    /// pipeline in `Null`.
    ///
    /// Fails when an element is missing (e.g. no decoder plugin for the
    /// codec), the description does not parse, or it lacks an appsink named
    /// [`SINK_NAME`].
    pub fn launch<S, E>(description: &str, on_sample: S, on_event: E) -> Result<Self>
    where
        S: Fn(RawSample<'_>) + Send + Sync + 'static,
        E: Fn(BusEvent) + Send + Sync + 'static,
    {
        init()?;

        let pipeline = gst::parse::launch(description)
            .map_err(|e| anyhow!("failed to parse pipeline: {e}"))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| anyhow!("launch line did not produce a pipeline"))?;

        let appsink = pipeline
            .by_name(SINK_NAME)
            .and_then(|element| element.downcast::<gst_app::AppSink>().ok())
            .ok_or_else(|| anyhow!("pipeline has no appsink named '{SINK_NAME}'"))?;

        appsink.set_max_buffers(APPSINK_MAX_BUFFERS);
        appsink.set_drop(true);
        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                    let caps = sample.caps().ok_or(gst::FlowError::NotNegotiated)?;
                    let info = gst_video::VideoInfo::from_caps(caps)
                        .map_err(|_| gst::FlowError::NotNegotiated)?;
                    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;

                    on_sample(RawSample {
                        data: map.as_slice(),
                        width: info.width(),
                        height: info.height(),
                        stride: info.stride()[0].max(0) as usize,
                        format: SampleFormat::from(info.format()),
                    });
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        let bus = pipeline
            .bus()
            .ok_or_else(|| anyhow!("pipeline has no bus"))?;
        let weak = pipeline.downgrade();
        bus.set_sync_handler(move |_, msg| {
            if let Some(event) = translate(msg, &weak) {
                on_event(event);
            }
            gst::BusSyncReply::Drop
        });

        Ok(Self { pipeline })
    }

    /// Start or resume data flow.
    pub fn play(&self) -> Result<()> {
        self.pipeline
            .set_state(gst::State::Playing)
            .context("failed to set pipeline to Playing")?;
        Ok(())
    }

    /// Hold data flow; the appsink stops receiving samples.
    pub fn pause(&self) -> Result<()> {
        self.pipeline
            .set_state(gst::State::Paused)
            .context("failed to set pipeline to Paused")?;
        Ok(())
    }

    /// Release every element's resources.
    pub fn shutdown(&self) -> Result<()> {
        self.pipeline
            .set_state(gst::State::Null)
            .context("failed to set pipeline to Null")?;
        Ok(())
    }

    /// Name GStreamer assigned to the pipeline (e.g. `pipeline0`).
    pub fn name(&self) -> String {
        self.pipeline.name().to_string()
    }
}

impl Drop for DecodeGraph {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
        if let Some(bus) = self.pipeline.bus() {
            bus.unset_sync_handler();
        }
    }
}

/// Map a bus message to a [`BusEvent`], ignoring the kinds callers do not need.
fn translate(msg: &gst::Message, pipeline: &gst::glib::WeakRef<gst::Pipeline>) -> Option<BusEvent> {
    use gst::MessageView;

    match msg.view() {
        MessageView::Eos(_) => Some(BusEvent::Eos),
        MessageView::Error(err) => {
            let error = err.error();
            Some(BusEvent::Error {
                domain: error.domain().as_str().to_string(),
                code: error_code(&error),
                message: error.message().to_string(),
                debug: err.debug().map(|d| d.to_string()),
                element: err.src().map(|s| s.path_string().to_string()),
            })
        }
        MessageView::Warning(warn) => Some(BusEvent::Warning {
            message: warn.error().message().to_string(),
            debug: warn.debug().map(|d| d.to_string()),
        }),
        MessageView::StateChanged(change) => {
            let from_pipeline = match (msg.src(), pipeline.upgrade()) {
                (Some(src), Some(pipeline)) => src == pipeline.upcast_ref::<gst::Object>(),
                _ => false,
            };
            Some(BusEvent::StateChanged {
                from_pipeline,
                old: change.old().into(),
                current: change.current().into(),
                pending: change.pending().into(),
            })
        }
        _ => None,
    }
}

/// Extract the numeric code of a GStreamer core error domain.
fn error_code(error: &gst::glib::Error) -> i32 {
    if let Some(kind) = error.kind::<gst::ResourceError>() {
        kind.code()
    } else if let Some(kind) = error.kind::<gst::StreamError>() {
        kind.code()
    } else if let Some(kind) = error.kind::<gst::CoreError>() {
        kind.code()
    } else if let Some(kind) = error.kind::<gst::LibraryError>() {
        kind.code()
    } else {
        -1
    }
}
