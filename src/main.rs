use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use video_feed::capture::{EngineFactory, SourceDescriptor};
use video_feed::config::FeedConfig;
use video_feed::core::LifecycleState;
use video_feed::error::FeedError;
use video_feed::processing::StreamMultiplexer;
use video_feed::server::{self, AppState};
use video_feed::session::PipelineController;

/// Serve a video file, RTSP stream or camera as an MJPEG stream over HTTP.
#[derive(Parser, Debug)]
#[command(name = "vfeed")]
#[command(about = "📹 Re-stream a video source to the browser as MJPEG")]
#[command(long_about = "Decode a local file, an RTSP stream or a V4L2 camera and serve it as a
multipart/x-mixed-replace JPEG stream at /video_feed, with play and pause control routes.")]
struct Args {
    /// Video source
    #[arg(short, long, env = "VFEED_SOURCE",
          help = "File path, file:// URI, rtsp:// URL, camera index (0) or device (/dev/video0)")]
    source: String,

    #[arg(long, env = "VFEED_HOST", default_value = "0.0.0.0", help = "Address to bind")]
    host: String,

    #[arg(short, long, env = "VFEED_PORT", default_value_t = 5000, help = "HTTP port")]
    port: u16,

    #[arg(long, env = "VFEED_WIDTH", default_value_t = 640, help = "Output frame width")]
    width: u32,

    #[arg(long, env = "VFEED_HEIGHT", default_value_t = 480, help = "Output frame height")]
    height: u32,

    /// JPEG quality (number or preset)
    #[arg(short, long, env = "VFEED_QUALITY", default_value = "95",
          help = "JPEG quality 1-100, or a preset: low, medium, high, ultra")]
    quality: String,

    #[arg(long, env = "VFEED_STREAM_INTERVAL_MS", default_value_t = 33,
          help = "Milliseconds between parts sent to each viewer")]
    stream_interval_ms: u64,

    #[arg(long, env = "VFEED_MAX_ENCODE_FPS",
          help = "Encode at most this many frames per second (default: every frame)")]
    max_encode_fps: Option<u32>,

    #[arg(long, env = "VFEED_STAY_ON_EOS",
          help = "Keep serving the last frame after the source ends instead of exiting")]
    stay_on_eos: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "video_feed=info,vfeed=info,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();
    let config = FeedConfig {
        source: args.source,
        host: args.host,
        port: args.port,
        width: args.width,
        height: args.height,
        jpeg_quality: parse_quality(&args.quality)?,
        stream_interval_ms: args.stream_interval_ms,
        max_encode_fps: args.max_encode_fps,
        exit_on_eos: !args.stay_on_eos,
    };
    config.validate().map_err(anyhow::Error::msg)?;

    // Everything that can fail about the source fails here, before the port is bound.
    let source = SourceDescriptor::parse(&config.source)?;
    let controller = Arc::new(PipelineController::new(
        engine_factory()?,
        config.pipeline_options(),
    ));
    let session = controller.create(source)?;

    let multiplexer = Arc::new(StreamMultiplexer::new(config.stream_settings()));
    let listener = TcpListener::bind(config.bind_addr()?)
        .await
        .map_err(|e| FeedError::io("bind HTTP listener", e))?;

    let stop_serving = CancellationToken::new();
    let server = tokio::spawn(server::serve(
        listener,
        AppState::new(Arc::clone(&controller), Arc::clone(&multiplexer)),
        stop_serving.clone().cancelled_owned(),
    ));

    info!(session, "starting playback");
    controller.play()?;

    let mut lifecycle = controller.subscribe();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            info!("received Ctrl-C, shutting down");
        }
        _ = lifecycle.wait_for(|state| *state == LifecycleState::Stopped), if config.exit_on_eos => {
            info!("source finished, shutting down");
        }
    }

    let session_controller = Arc::clone(&controller);
    tokio::task::spawn_blocking(move || session_controller.shutdown())
        .await
        .context("session shutdown task failed")?;
    multiplexer.close();
    stop_serving.cancel();
    server.await.context("HTTP server task failed")??;

    info!("shutdown complete");
    Ok(())
}

#[cfg(feature = "gstreamer")]
fn engine_factory() -> Result<Arc<dyn EngineFactory>> {
    Ok(Arc::new(video_feed::capture::gstreamer::GstEngineFactory::new()))
}

#[cfg(not(feature = "gstreamer"))]
fn engine_factory() -> Result<Arc<dyn EngineFactory>> {
    anyhow::bail!("vfeed was built without a decode engine; rebuild with the `gstreamer` feature enabled")
}

/// Parse a JPEG quality given as a number or a preset name
fn parse_quality(quality: &str) -> Result<u8> {
    if let Ok(value) = quality.parse::<u8>() {
        return Ok(value);
    }
    match quality.to_lowercase().as_str() {
        "low" => Ok(60),
        "medium" => Ok(80),
        "high" => Ok(90),
        "ultra" => Ok(95),
        _ => Err(anyhow::anyhow!(
            "Invalid quality: {}. Use a number from 1 to 100 or: low, medium, high, ultra",
            quality
        )),
    }
}
