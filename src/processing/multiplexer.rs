//! # Streaming Multiplexer
//!
//! Fans the session's latest frame out to any number of HTTP viewers as
//! `multipart/x-mixed-replace` parts.
//!
//! ## Viewer Streams
//!
//! Each viewer gets its own lazy, infinite stream. On every tick it reads the
//! slot once:
//!
//! - a frame is present: one multipart part carrying the JPEG;
//! - the slot is empty: a single space byte, which keeps the connection open
//!   without producing a part.
//!
//! Ticks run at a fixed interval regardless of the decode rate, so the same
//! frame may be sent several times. A stream never waits for a new frame.
//!
//! ## Shutdown
//!
//! Dropping a stream (client went away) releases its viewer guard. [`close`]
//! ends every open stream so a graceful HTTP shutdown does not hang on
//! infinite bodies.
//!
//! [`close`]: StreamMultiplexer::close

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_stream::stream;
use bytes::{BufMut, Bytes, BytesMut};
use futures_util::Stream;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::frame_slot::{EncodedFrame, FrameSlot};

/// Chunk written when no frame is available.
pub const KEEP_ALIVE: &[u8] = b" ";

/// Boundary token separating multipart parts.
pub const DEFAULT_BOUNDARY: &str = "frame";

/// Default pause between two reads of the slot (~30 per second).
pub const DEFAULT_STREAM_INTERVAL: Duration = Duration::from_millis(33);

/// Body stream handed to the HTTP layer.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, Infallible>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    pub boundary: String,
    pub interval: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            boundary: DEFAULT_BOUNDARY.to_string(),
            interval: DEFAULT_STREAM_INTERVAL,
        }
    }
}

pub struct StreamMultiplexer {
    settings: StreamSettings,
    viewers: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl StreamMultiplexer {
    pub fn new(settings: StreamSettings) -> Self {
        Self {
            settings,
            viewers: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    /// Value of the `Content-Type` header for viewer responses.
    pub fn content_type(&self) -> String {
        format!("multipart/x-mixed-replace; boundary={}", self.settings.boundary)
    }

    /// Streams currently being served.
    pub fn active_viewers(&self) -> usize {
        self.viewers.load(Ordering::Acquire)
    }

    /// End every open viewer stream and refuse new ones.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// One multipart part for `frame`.
    pub fn multipart_chunk(&self, frame: &EncodedFrame) -> Bytes {
        let boundary = &self.settings.boundary;
        let payload = frame.payload();
        let mut part = BytesMut::with_capacity(boundary.len() + payload.len() + 48);
        part.put_slice(b"--");
        part.put_slice(boundary.as_bytes());
        part.put_slice(b"\r\nContent-Type: ");
        part.put_slice(frame.content_type().as_bytes());
        part.put_slice(b"\r\n\r\n");
        part.put_slice(payload);
        part.put_slice(b"\r\n");
        part.freeze()
    }

    /// A new viewer stream reading from `slot`.
    ///
    /// The stream holds its own reference to the slot, so replacing the
    /// session does not disturb viewers already attached to the old one.
    pub fn viewer_stream(self: &Arc<Self>, slot: Arc<FrameSlot>) -> ChunkStream {
        let guard = ViewerGuard::register(&self.viewers);
        let token = self.shutdown.clone();
        let this = Arc::clone(self);
        let period = self.settings.interval;

        Box::pin(stream! {
            let _guard = guard;
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let chunk = match slot.read() {
                    Some(frame) => this.multipart_chunk(&frame),
                    None => Bytes::from_static(KEEP_ALIVE),
                };
                yield Ok::<_, Infallible>(chunk);
            }
        })
    }
}

impl Default for StreamMultiplexer {
    fn default() -> Self {
        Self::new(StreamSettings::default())
    }
}

/// Counts a viewer for as long as its stream is alive.
struct ViewerGuard {
    viewers: Arc<AtomicUsize>,
}

impl ViewerGuard {
    fn register(viewers: &Arc<AtomicUsize>) -> Self {
        let active = viewers.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(active, "viewer attached");
        Self {
            viewers: Arc::clone(viewers),
        }
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        let active = self.viewers.fetch_sub(1, Ordering::AcqRel) - 1;
        debug!(active, "viewer detached");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn multiplexer() -> Arc<StreamMultiplexer> {
        Arc::new(StreamMultiplexer::new(StreamSettings {
            interval: Duration::from_millis(5),
            ..StreamSettings::default()
        }))
    }

    #[test]
    fn chunk_layout() {
        let mux = StreamMultiplexer::default();
        let frame = EncodedFrame::jpeg(&b"JPEG"[..], 1, 1).unwrap();
        assert_eq!(
            &mux.multipart_chunk(&frame)[..],
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n"
        );
        assert_eq!(mux.content_type(), "multipart/x-mixed-replace; boundary=frame");
    }

    #[tokio::test]
    async fn empty_slot_yields_keep_alive_then_frames() {
        let mux = multiplexer();
        let slot = Arc::new(FrameSlot::new());
        let mut stream = mux.viewer_stream(Arc::clone(&slot));

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(&first[..], KEEP_ALIVE);

        slot.write(EncodedFrame::jpeg(&b"abc"[..], 1, 1).unwrap());
        let next = stream.next().await.unwrap().unwrap();
        assert!(next.starts_with(b"--frame\r\n"));
        assert!(next.ends_with(b"abc\r\n"));
    }

    #[tokio::test]
    async fn dropping_a_stream_releases_only_its_viewer() {
        let mux = multiplexer();
        let slot = Arc::new(FrameSlot::new());
        let mut a = mux.viewer_stream(Arc::clone(&slot));
        let b = mux.viewer_stream(Arc::clone(&slot));
        assert_eq!(mux.active_viewers(), 2);

        drop(b);
        assert_eq!(mux.active_viewers(), 1);
        assert!(a.next().await.is_some());
    }

    #[tokio::test]
    async fn close_ends_open_streams() {
        let mux = multiplexer();
        let mut stream = mux.viewer_stream(Arc::new(FrameSlot::new()));
        assert!(stream.next().await.is_some());

        mux.close();
        assert!(stream.next().await.is_none());
        drop(stream);
        assert_eq!(mux.active_viewers(), 0);
    }
}
