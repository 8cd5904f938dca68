//! Pipeline controller behaviour against a scripted engine.

mod common;

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::mock_engine::MockEngineFactory;
use common::wait;
use video_feed::capture::{EngineEvent, EngineState, SourceDescriptor};
use video_feed::core::LifecycleState;
use video_feed::error::{FeedError, classify};
use video_feed::session::{PipelineController, PipelineOptions};

const TIMEOUT: Duration = Duration::from_secs(5);

fn controller(factory: &Arc<MockEngineFactory>) -> PipelineController {
    PipelineController::new(factory.clone(), PipelineOptions::default())
}

fn camera() -> SourceDescriptor {
    SourceDescriptor::parse("0").unwrap()
}

fn reaches(controller: &PipelineController, state: LifecycleState) -> bool {
    wait::until(TIMEOUT, || controller.state() == state)
}

#[test]
fn new_session_starts_idle_and_plays() {
    let factory = MockEngineFactory::new();
    let controller = controller(&factory);

    let id = controller.create(camera()).unwrap();
    assert_eq!(id, 1);
    assert_eq!(controller.session_id(), Some(1));
    assert_eq!(controller.state(), LifecycleState::Idle);
    assert!(controller.frame_slot().is_empty());

    controller.play().unwrap();
    assert!(reaches(&controller, LifecycleState::Playing));
    let slot = controller.frame_slot();
    assert!(wait::until(TIMEOUT, || slot.sequence() >= 3));

    let frame = slot.read().unwrap();
    assert_eq!(frame.content_type(), "image/jpeg");
    assert!(!frame.payload().is_empty());
}

#[test]
fn pause_holds_frames_until_play() {
    let factory = MockEngineFactory::new();
    let controller = controller(&factory);
    controller.create(camera()).unwrap();
    let slot = controller.frame_slot();

    controller.play().unwrap();
    assert!(wait::until(TIMEOUT, || slot.sequence() >= 2));

    controller.pause().unwrap();
    assert!(reaches(&controller, LifecycleState::Paused));
    let held = slot.sequence();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(slot.sequence(), held);
    assert!(slot.read().is_some());

    controller.play().unwrap();
    assert!(reaches(&controller, LifecycleState::Playing));
    assert!(wait::until(TIMEOUT, || slot.sequence() > held));
}

#[test]
fn commands_that_do_not_apply_are_ignored() {
    let factory = MockEngineFactory::new();
    let controller = controller(&factory);
    controller.create(camera()).unwrap();

    // Pause while idle has no effect.
    controller.pause().unwrap();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(controller.state(), LifecycleState::Idle);

    controller.play().unwrap();
    controller.play().unwrap();
    assert!(reaches(&controller, LifecycleState::Playing));
    thread::sleep(Duration::from_millis(30));
    assert_eq!(controller.state(), LifecycleState::Playing);
}

#[test]
fn sub_element_state_changes_do_not_move_the_session() {
    let factory = MockEngineFactory::new();
    let controller = controller(&factory);
    controller.create(camera()).unwrap();

    factory.emit(EngineEvent::StateChanged {
        from_graph: false,
        old: EngineState::Paused,
        new: EngineState::Playing,
    });
    thread::sleep(Duration::from_millis(50));
    assert_eq!(controller.state(), LifecycleState::Idle);

    factory.emit(EngineEvent::StateChanged {
        from_graph: true,
        old: EngineState::Paused,
        new: EngineState::Playing,
    });
    assert!(reaches(&controller, LifecycleState::Playing));
}

#[test]
fn end_of_stream_stops_and_keeps_last_frame() {
    let factory = MockEngineFactory::new();
    let controller = controller(&factory);
    controller.create(camera()).unwrap();
    let slot = controller.frame_slot();

    controller.play().unwrap();
    assert!(wait::until(TIMEOUT, || slot.sequence() >= 1));

    factory.emit(EngineEvent::EndOfStream);
    assert!(reaches(&controller, LifecycleState::Stopped));
    assert!(wait::until(TIMEOUT, || factory.teardowns() == 1));
    assert!(slot.read().is_some());

    // Terminal: once the run loop has exited, play is refused and nothing changes.
    assert!(wait::until(TIMEOUT, || controller
        .play()
        .is_err_and(|err| err.category() == "state")));
    assert_eq!(controller.state(), LifecycleState::Stopped);
}

#[test]
fn decode_error_moves_to_errored_and_blanks_the_slot() {
    let factory = MockEngineFactory::new();
    let controller = controller(&factory);
    controller.create(camera()).unwrap();
    let slot = controller.frame_slot();

    controller.play().unwrap();
    assert!(wait::until(TIMEOUT, || slot.sequence() >= 1));

    factory.emit(EngineEvent::Error {
        code: 3,
        message: "Could not read from resource.".into(),
        debug: Some("v4l2src0".into()),
    });
    assert!(reaches(&controller, LifecycleState::Errored));
    assert!(slot.is_empty());
    assert_eq!(factory.teardowns(), 1);

    controller.play().unwrap();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(controller.state(), LifecycleState::Errored);

    controller.stop().unwrap();
    assert!(reaches(&controller, LifecycleState::Stopped));
}

#[test]
fn encode_failure_keeps_the_previous_frame() {
    let factory = MockEngineFactory::new();
    let controller = controller(&factory);
    controller.create(camera()).unwrap();
    let slot = controller.frame_slot();

    controller.play().unwrap();
    assert!(wait::until(TIMEOUT, || slot.sequence() >= 2));

    factory.corrupt_frames(true);
    // Let any frame already in flight land, then take the reference.
    thread::sleep(Duration::from_millis(30));
    let last_good = slot.read().unwrap();
    thread::sleep(Duration::from_millis(60));

    assert_eq!(slot.read().unwrap(), last_good);
    assert_eq!(controller.state(), LifecycleState::Playing);

    factory.corrupt_frames(false);
    assert!(wait::until(TIMEOUT, || slot.sequence() > last_good.sequence()));
}

#[test]
fn engine_failure_on_play_errors_the_session() {
    let factory = MockEngineFactory::new();
    let controller = controller(&factory);
    controller.create(camera()).unwrap();

    factory.reject_play(Some(|| {
        FeedError::decode(-1, "failed to set pipeline to Playing", None)
    }));
    controller.play().unwrap();
    assert!(reaches(&controller, LifecycleState::Errored));
    assert_eq!(factory.teardowns(), 1);
    assert!(controller.frame_slot().is_empty());
}

#[test]
fn refused_command_that_is_not_session_fatal_keeps_state() {
    let factory = MockEngineFactory::new();
    let controller = controller(&factory);
    controller.create(camera()).unwrap();

    factory.reject_play(Some(|| FeedError::state("idle", "play")));
    controller.play().unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(controller.state(), LifecycleState::Idle);
    assert_eq!(factory.teardowns(), 0);

    factory.reject_play(None);
    controller.play().unwrap();
    assert!(reaches(&controller, LifecycleState::Playing));
}

#[test]
fn missing_file_fails_before_any_graph_is_built() {
    let factory = MockEngineFactory::new();
    let controller = controller(&factory);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"frames").unwrap();
    let source = SourceDescriptor::local_file(file.path()).unwrap();
    drop(file);

    let err = controller.create(source).unwrap_err();
    assert_eq!(err.category(), "source_unavailable");
    assert!(classify::is_startup_fatal(&err));
    assert_eq!(factory.builds(), 0);
    assert_eq!(controller.session_id(), None);
    assert_eq!(controller.state(), LifecycleState::Stopped);
}

#[test]
fn graph_construction_failure_is_reported() {
    let factory = MockEngineFactory::failing("no element \"avdec_h264\"");
    let controller = controller(&factory);

    let source = SourceDescriptor::parse("rtsp://camera.local/stream").unwrap();
    let err = controller.create(source).unwrap_err();
    assert_eq!(err.category(), "graph_construction");
    assert_eq!(err.context().operation.as_deref(), Some("create session"));
    assert_eq!(controller.session_id(), None);
}

#[test]
fn create_replaces_and_stops_the_previous_session() {
    let factory = MockEngineFactory::new();
    let controller = controller(&factory);

    controller.create(camera()).unwrap();
    controller.play().unwrap();
    assert!(reaches(&controller, LifecycleState::Playing));
    let old_slot = controller.frame_slot();

    let id = controller.create(camera()).unwrap();
    assert_eq!(id, 2);
    assert_eq!(factory.teardowns(), 1);
    assert_eq!(controller.state(), LifecycleState::Idle);
    assert!(!Arc::ptr_eq(&old_slot, &controller.frame_slot()));
}

#[test]
fn stop_is_idempotent_and_shutdown_joins() {
    let factory = MockEngineFactory::new();
    let controller = controller(&factory);
    controller.create(camera()).unwrap();
    let mut lifecycle = controller.subscribe();

    controller.stop().unwrap();
    assert!(reaches(&controller, LifecycleState::Stopped));
    controller.stop().unwrap();

    controller.shutdown();
    assert_eq!(controller.session_id(), None);
    assert_eq!(factory.teardowns(), 1);
    assert_eq!(*lifecycle.borrow_and_update(), LifecycleState::Stopped);
}
