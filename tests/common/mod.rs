//! Common test utilities and helpers for the video_feed tests
//!
//! This module provides a scripted decode engine so sessions can be driven
//! end to end without GStreamer.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use video_feed::capture::{
    DecodeEngine, EngineEvent, EngineFactory, EngineSinks, EngineState, OutputFormat, PixelFormat,
    RawFrame, SourceDescriptor,
};
use video_feed::error::{FeedError, FeedResult};

/// Mock decode engine for testing without an actual media pipeline
pub mod mock_engine {
    use super::*;

    /// Side of every frame the mock produces.
    pub const FRAME_SIDE: u32 = 16;

    #[derive(Default)]
    struct Shared {
        sinks: Mutex<Option<EngineSinks>>,
        builds: AtomicUsize,
        teardowns: AtomicUsize,
        corrupt: AtomicBool,
        reject_play: Mutex<Option<fn() -> FeedError>>,
    }

    /// Factory handing out [`MockEngine`]s and keeping the latest sinks so a
    /// test can inject events as if the engine posted them.
    pub struct MockEngineFactory {
        shared: Arc<Shared>,
        fail_build: Option<String>,
        frame_interval: Duration,
    }

    impl MockEngineFactory {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                shared: Arc::default(),
                fail_build: None,
                frame_interval: Duration::from_millis(5),
            })
        }

        /// A factory whose every build fails with `GraphConstruction`.
        pub fn failing(reason: &str) -> Arc<Self> {
            Arc::new(Self {
                shared: Arc::default(),
                fail_build: Some(reason.to_string()),
                frame_interval: Duration::from_millis(5),
            })
        }

        /// Deliver `event` through the latest engine's event sink.
        pub fn emit(&self, event: EngineEvent) {
            let sinks = self.shared.sinks.lock().unwrap().clone();
            let sinks = sinks.expect("no engine has been built");
            (sinks.on_event)(event);
        }

        /// From now on, produce frames the encoder must reject.
        pub fn corrupt_frames(&self, corrupt: bool) {
            self.shared.corrupt.store(corrupt, Ordering::SeqCst);
        }

        /// Make `set_playing` fail with the error `reject` builds; `None`
        /// restores normal behaviour.
        pub fn reject_play(&self, reject: Option<fn() -> FeedError>) {
            *self.shared.reject_play.lock().unwrap() = reject;
        }

        pub fn builds(&self) -> usize {
            self.shared.builds.load(Ordering::SeqCst)
        }

        pub fn teardowns(&self) -> usize {
            self.shared.teardowns.load(Ordering::SeqCst)
        }
    }

    impl EngineFactory for MockEngineFactory {
        fn build(
            &self,
            source: &SourceDescriptor,
            output: OutputFormat,
            sinks: EngineSinks,
        ) -> FeedResult<Box<dyn DecodeEngine>> {
            if let Some(reason) = &self.fail_build {
                return Err(FeedError::graph_construction(source.kind(), reason.clone()));
            }
            self.shared.builds.fetch_add(1, Ordering::SeqCst);
            *self.shared.sinks.lock().unwrap() = Some(sinks.clone());
            Ok(Box::new(MockEngine::start(
                Arc::clone(&self.shared),
                sinks,
                output,
                self.frame_interval,
            )))
        }
    }

    /// Engine producing solid-color RGB frames on its own thread while
    /// playing. Frames are emitted under the gate lock, so once `set_paused`
    /// returns no further frame callback runs.
    pub struct MockEngine {
        shared: Arc<Shared>,
        sinks: EngineSinks,
        gate: Arc<Mutex<bool>>,
        alive: Arc<AtomicBool>,
        producer: Option<JoinHandle<()>>,
    }

    impl MockEngine {
        fn start(
            shared: Arc<Shared>,
            sinks: EngineSinks,
            _output: OutputFormat,
            interval: Duration,
        ) -> Self {
            let gate = Arc::new(Mutex::new(false));
            let alive = Arc::new(AtomicBool::new(true));

            let producer = {
                let gate = Arc::clone(&gate);
                let alive = Arc::clone(&alive);
                let shared = Arc::clone(&shared);
                let on_frame = Arc::clone(&sinks.on_frame);
                thread::spawn(move || {
                    let mut count: u32 = 0;
                    while alive.load(Ordering::SeqCst) {
                        {
                            let playing = gate.lock().unwrap();
                            if *playing {
                                count += 1;
                                let fill = (count % 200) as u8 + 20;
                                let side = FRAME_SIDE;
                                let data = vec![fill; (side * side * 3) as usize];
                                let data = if shared.corrupt.load(Ordering::SeqCst) {
                                    &data[..7]
                                } else {
                                    &data[..]
                                };
                                on_frame(RawFrame::packed(data, side, side, PixelFormat::Rgb));
                            }
                        }
                        thread::sleep(interval);
                    }
                })
            };

            Self {
                shared,
                sinks,
                gate,
                alive,
                producer: Some(producer),
            }
        }

        fn top_level(&self, old: EngineState, new: EngineState) {
            (self.sinks.on_event)(EngineEvent::StateChanged {
                from_graph: true,
                old,
                new,
            });
        }
    }

    impl DecodeEngine for MockEngine {
        fn set_playing(&mut self) -> FeedResult<()> {
            if let Some(reject) = *self.shared.reject_play.lock().unwrap() {
                return Err(reject());
            }
            *self.gate.lock().unwrap() = true;
            self.top_level(EngineState::Paused, EngineState::Playing);
            Ok(())
        }

        fn set_paused(&mut self) -> FeedResult<()> {
            *self.gate.lock().unwrap() = false;
            self.top_level(EngineState::Playing, EngineState::Paused);
            Ok(())
        }

        fn teardown(&mut self) -> FeedResult<()> {
            *self.gate.lock().unwrap() = false;
            self.alive.store(false, Ordering::SeqCst);
            if let Some(producer) = self.producer.take() {
                let _ = producer.join();
                self.shared.teardowns.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    impl Drop for MockEngine {
        fn drop(&mut self) {
            let _ = self.teardown();
        }
    }
}

/// Polling helpers
pub mod wait {
    use super::*;

    /// Poll `condition` until it holds or `timeout` elapses.
    pub fn until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    /// Async flavour of [`until`].
    pub async fn until_async(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        condition()
    }
}
