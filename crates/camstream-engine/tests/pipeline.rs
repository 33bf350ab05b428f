//! End-to-end pipeline behavior against a synthetic camera and a mock
//! endpoint.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::Receiver;
use tokio::sync::{mpsc, watch};

use camstream_capture::{CaptureTimestamp, FrameSample, LiveFeed, TestPatternDriver};
use camstream_encoder::{EncoderError, EncoderResult, FrameCodec};
use camstream_engine::{Engine, EngineConfig, FrameScheduler};
use camstream_ipc::{
    ChannelState, EngineCommand, EngineEvent, EngineState, ErrorKind, Resolution, Settings,
    StatsSnapshot, StopReason,
};
use camstream_transport::testing::MockConnector;
use camstream_transport::ChannelConfig;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    commands: mpsc::Sender<EngineCommand>,
    events: Receiver<EngineEvent>,
    mock: MockConnector,
    engine: tokio::task::JoinHandle<()>,
}

impl Harness {
    fn start(mock: MockConnector, settings: Settings, channel: ChannelConfig) -> Self {
        Self::start_with(mock, settings, channel, fast_driver(), None)
    }

    fn start_with(
        mock: MockConnector,
        settings: Settings,
        channel: ChannelConfig,
        driver: TestPatternDriver,
        codec: Option<Arc<dyn FrameCodec>>,
    ) -> Self {
        let (commands, command_rx) = camstream_ipc::command_channel();
        let (event_tx, events) = camstream_ipc::event_channel();

        let mut engine = Engine::new(
            command_rx,
            event_tx,
            Arc::new(driver),
            Arc::new(mock.clone()),
            EngineConfig { settings, channel },
        );
        if let Some(codec) = codec {
            engine = engine.with_codec(codec);
        }

        Self {
            commands,
            events,
            mock,
            engine: tokio::spawn(engine.run()),
        }
    }

    async fn send(&self, command: EngineCommand) {
        self.commands.send(command).await.unwrap();
    }

    /// Wait for the first event matching `pred`, discarding others.
    async fn expect(&self, pred: impl Fn(&EngineEvent) -> bool) -> EngineEvent {
        let deadline = Instant::now() + WAIT;
        loop {
            while let Ok(event) = self.events.try_recv() {
                if pred(&event) {
                    return event;
                }
            }
            assert!(Instant::now() < deadline, "timed out waiting for event");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Every event up to and including the first one matching `pred`.
    async fn collect_until(&self, pred: impl Fn(&EngineEvent) -> bool) -> Vec<EngineEvent> {
        let deadline = Instant::now() + WAIT;
        let mut seen = Vec::new();
        loop {
            while let Ok(event) = self.events.try_recv() {
                let done = pred(&event);
                seen.push(event);
                if done {
                    return seen;
                }
            }
            assert!(Instant::now() < deadline, "timed out waiting for event");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Latest stats as reported by the engine.
    async fn stats(&self) -> StatsSnapshot {
        // Drain so the answer to this request is the newest one.
        while self.events.try_recv().is_ok() {}
        self.send(EngineCommand::GetStats).await;
        match self.expect(|e| matches!(e, EngineEvent::Stats(_))).await {
            EngineEvent::Stats(stats) => stats,
            _ => unreachable!(),
        }
    }

    async fn shutdown(self) {
        self.send(EngineCommand::Shutdown).await;
        self.engine.await.unwrap();
    }
}

fn fast_driver() -> TestPatternDriver {
    TestPatternDriver::new()
        .with_actual_size(64, 48)
        .with_frame_interval(Duration::from_millis(5))
}

fn channel_states(events: &[EngineEvent]) -> Vec<ChannelState> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::ChannelStateChanged(state) => Some(state.clone()),
            _ => None,
        })
        .collect()
}

fn streaming_settings(rate: u32) -> Settings {
    Settings {
        rate,
        quality: 0.8,
        resolution: Resolution::Hd,
        ..Settings::default()
    }
}

fn is_state(event: &EngineEvent, check: fn(&EngineState) -> bool) -> bool {
    matches!(event, EngineEvent::StateChanged { current, .. } if check(current))
}

#[tokio::test]
async fn test_stream_sends_jpeg_frames_then_stops_cleanly() {
    let harness = Harness::start(
        MockConnector::accepting(),
        streaming_settings(10),
        ChannelConfig::default(),
    );

    harness.send(EngineCommand::StartCapture).await;
    let event = harness
        .expect(|e| is_state(e, EngineState::is_capturing))
        .await;
    match event {
        EngineEvent::StateChanged { current, .. } => assert_eq!(
            *current,
            EngineState::Previewing {
                resolution: Resolution::Hd,
                width: 64,
                height: 48,
            }
        ),
        _ => unreachable!(),
    }

    harness.send(EngineCommand::StartStream).await;
    harness
        .expect(|e| matches!(e, EngineEvent::ChannelStateChanged(ChannelState::Open)))
        .await;

    tokio::time::sleep(Duration::from_millis(1050)).await;

    let writes = harness.mock.writes();
    assert!(
        (5..=11).contains(&writes.len()),
        "expected about one frame per 100 ms, got {}",
        writes.len()
    );
    for frame in &writes {
        assert_eq!(&frame[..2], &[0xFF, 0xD8]);
    }

    let stats = harness.stats().await;
    assert!(stats.is_connected);
    assert_eq!(stats.fps, 10);
    assert!(stats.frames_sent >= writes.len() as u64);

    harness.send(EngineCommand::StopStream).await;
    harness
        .expect(|e| matches!(e, EngineEvent::StreamStopped { .. }))
        .await;
    let after_stop = harness.mock.write_count();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(harness.mock.write_count() <= after_stop + 1);
    let settled = harness.mock.write_count();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(harness.mock.write_count(), settled);
    assert!(harness.mock.was_closed());

    let stats = harness.stats().await;
    assert_eq!(stats.frames_sent, 0);
    assert!(!stats.is_connected);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_unresponsive_endpoint_parks_in_connecting() {
    let harness = Harness::start(
        MockConnector::hanging(),
        streaming_settings(30),
        ChannelConfig::unbounded(),
    );

    harness.send(EngineCommand::StartCapture).await;
    harness
        .expect(|e| is_state(e, EngineState::is_capturing))
        .await;
    harness.send(EngineCommand::StartStream).await;
    harness
        .expect(|e| is_state(e, EngineState::is_streaming))
        .await;

    tokio::time::sleep(Duration::from_millis(600)).await;

    let stats = harness.stats().await;
    assert!(!stats.is_connected);
    assert_eq!(stats.frames_sent, 0);
    assert!(stats.channel_drops > 0, "ticks should have fired");
    assert_eq!(harness.mock.write_count(), 0);

    harness.send(EngineCommand::GetState).await;
    harness
        .expect(|e| is_state(e, EngineState::is_streaming))
        .await;

    harness.shutdown().await;
}

#[tokio::test]
async fn test_connect_timeout_reports_connection_error() {
    let harness = Harness::start(
        MockConnector::hanging(),
        streaming_settings(10),
        ChannelConfig::default().with_connect_timeout(Some(Duration::from_millis(200))),
    );

    harness.send(EngineCommand::StartCapture).await;
    harness
        .expect(|e| is_state(e, EngineState::is_capturing))
        .await;
    harness.send(EngineCommand::StartStream).await;

    let events = harness
        .collect_until(|e| matches!(e, EngineEvent::StreamStopped { .. }))
        .await;
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::Error {
            kind: ErrorKind::Connection,
            ..
        }
    )));
    assert!(matches!(
        events.last(),
        Some(EngineEvent::StreamStopped {
            reason: StopReason::ConnectionFailed { .. }
        })
    ));

    // The channel is reported failed and never as closed afterwards.
    let states = channel_states(&events);
    assert_eq!(states.len(), 2, "{states:?}");
    assert_eq!(states[0], ChannelState::Connecting);
    assert!(states[1].is_failed());

    // Camera stays live; only the stream ended.
    harness.send(EngineCommand::GetState).await;
    harness
        .expect(|e| matches!(e, EngineEvent::StateChanged { current, .. } if matches!(**current, EngineState::Previewing { .. })))
        .await;

    harness.shutdown().await;
}

#[tokio::test]
async fn test_stream_without_capture_is_precondition_error() {
    let harness = Harness::start(
        MockConnector::accepting(),
        Settings::default(),
        ChannelConfig::default(),
    );

    harness.send(EngineCommand::StartStream).await;
    let error = harness
        .expect(|e| matches!(e, EngineEvent::Error { .. }))
        .await;
    assert!(matches!(
        error,
        EngineEvent::Error {
            kind: ErrorKind::Precondition,
            ..
        }
    ));
    assert_eq!(harness.mock.connect_attempts(), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_invalid_settings_rejected_at_boundary() {
    let harness = Harness::start(
        MockConnector::accepting(),
        Settings::default(),
        ChannelConfig::default(),
    );

    for settings in [
        Settings { quality: 0.0, ..Settings::default() },
        Settings { quality: 1.5, ..Settings::default() },
        Settings { rate: 0, ..Settings::default() },
        Settings { rate: 31, ..Settings::default() },
    ] {
        harness.send(EngineCommand::UpdateSettings(settings)).await;
        let error = harness
            .expect(|e| matches!(e, EngineEvent::Error { .. }))
            .await;
        assert!(matches!(
            error,
            EngineEvent::Error {
                kind: ErrorKind::Validation,
                ..
            }
        ));
    }

    let accepted = Settings {
        rate: 30,
        quality: 0.1,
        ..Settings::default()
    };
    harness
        .send(EngineCommand::UpdateSettings(accepted.clone()))
        .await;
    let event = harness
        .expect(|e| matches!(e, EngineEvent::Settings(_)))
        .await;
    assert!(matches!(event, EngineEvent::Settings(s) if s == accepted));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_stop_capture_also_stops_stream() {
    let harness = Harness::start(
        MockConnector::accepting(),
        streaming_settings(10),
        ChannelConfig::default(),
    );

    harness.send(EngineCommand::StartCapture).await;
    harness
        .expect(|e| is_state(e, EngineState::is_capturing))
        .await;
    harness.send(EngineCommand::StartStream).await;
    harness
        .expect(|e| matches!(e, EngineEvent::ChannelStateChanged(ChannelState::Open)))
        .await;

    harness.send(EngineCommand::StopCapture).await;
    let stopped = harness
        .expect(|e| matches!(e, EngineEvent::StreamStopped { .. }))
        .await;
    assert!(matches!(
        stopped,
        EngineEvent::StreamStopped {
            reason: StopReason::CaptureStopped
        }
    ));
    harness.expect(|e| is_state(e, EngineState::is_idle)).await;
    assert!(harness.mock.was_closed());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_server_notifications_surface_as_events() {
    let harness = Harness::start(
        MockConnector::accepting(),
        streaming_settings(5),
        ChannelConfig::default(),
    );

    harness.send(EngineCommand::StartCapture).await;
    harness
        .expect(|e| is_state(e, EngineState::is_capturing))
        .await;
    harness.send(EngineCommand::StartStream).await;
    harness
        .expect(|e| matches!(e, EngineEvent::ChannelStateChanged(ChannelState::Open)))
        .await;

    assert!(harness
        .mock
        .push_text(r#"{"type":"mood_detected","mood":"happy"}"#));
    let event = harness
        .expect(|e| matches!(e, EngineEvent::ServerMessage { .. }))
        .await;
    assert!(matches!(event, EngineEvent::ServerMessage { text } if text.contains("mood_detected")));

    harness.shutdown().await;
}

/// Codec that blocks long enough for a stop to overtake it.
struct SlowCodec {
    entered: Arc<AtomicUsize>,
}

impl FrameCodec for SlowCodec {
    fn encode(&self, _sample: &FrameSample, _quality: f32) -> EncoderResult<Bytes> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(300));
        Ok(Bytes::from_static(b"\xFF\xD8slow\xFF\xD9"))
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

#[tokio::test]
async fn test_late_encode_after_stop_is_dropped_silently() {
    let mock = MockConnector::accepting();
    let stats_tx = Arc::new(watch::channel(StatsSnapshot::default()).0);
    let entered = Arc::new(AtomicUsize::new(0));

    let mut scheduler = FrameScheduler::new(
        Arc::new(mock.clone()),
        ChannelConfig::default(),
        Arc::clone(&stats_tx),
    )
    .with_codec(Arc::new(SlowCodec {
        entered: Arc::clone(&entered),
    }));

    let feed = LiveFeed::new();
    feed.bind();
    feed.publish(FrameSample::new(
        Bytes::from(vec![0u8; 8 * 8 * 3]),
        8,
        8,
        CaptureTimestamp::now(std::time::Instant::now()),
        0,
    ));

    let started = scheduler.start(&feed, &streaming_settings(10)).unwrap();
    let mut states = started.channel_states;
    states.wait_for(|s| s.is_open()).await.unwrap();

    // Stop right after a tick fired, while its encode is still running.
    let deadline = Instant::now() + WAIT;
    while entered.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < deadline, "no tick fired");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(scheduler.stop().await, Some(ChannelState::Closed));

    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(mock.write_count(), 0);
    assert_eq!(entered.load(Ordering::SeqCst), 1);
    let stats = stats_tx.borrow().clone();
    assert_eq!(stats.frames_sent, 0);
    assert!(!stats.is_connected);
}

#[tokio::test]
async fn test_refused_connection_stays_failed() {
    let harness = Harness::start(
        MockConnector::refusing("nope"),
        streaming_settings(10),
        ChannelConfig::default(),
    );

    harness.send(EngineCommand::StartCapture).await;
    harness
        .expect(|e| is_state(e, EngineState::is_capturing))
        .await;
    harness.send(EngineCommand::StartStream).await;

    let events = harness
        .collect_until(|e| matches!(e, EngineEvent::StreamStopped { .. }))
        .await;
    assert_eq!(
        channel_states(&events),
        vec![
            ChannelState::Connecting,
            ChannelState::Failed {
                reason: "Connection failed: nope".to_string()
            },
        ]
    );

    harness.shutdown().await;
}

/// Codec that always fails.
struct BrokenCodec;

impl FrameCodec for BrokenCodec {
    fn encode(&self, _sample: &FrameSample, _quality: f32) -> EncoderResult<Bytes> {
        Err(EncoderError::Encoding("encoder unavailable".to_string()))
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

#[tokio::test]
async fn test_encode_failures_are_counted_silently() {
    let harness = Harness::start_with(
        MockConnector::accepting(),
        streaming_settings(20),
        ChannelConfig::default(),
        fast_driver(),
        Some(Arc::new(BrokenCodec)),
    );

    harness.send(EngineCommand::StartCapture).await;
    harness
        .expect(|e| is_state(e, EngineState::is_capturing))
        .await;
    harness.send(EngineCommand::StartStream).await;

    let events = harness
        .collect_until(|e| matches!(e, EngineEvent::Stats(s) if s.encode_drops >= 3))
        .await;
    assert!(
        !events.iter().any(|e| matches!(e, EngineEvent::Error { .. })),
        "encode failures must not surface as errors"
    );

    let stats = harness.stats().await;
    assert!(stats.encode_drops >= 3);
    assert_eq!(stats.frames_sent, 0);
    assert_eq!(harness.mock.write_count(), 0);

    harness.send(EngineCommand::GetState).await;
    harness
        .expect(|e| is_state(e, EngineState::is_streaming))
        .await;

    harness.shutdown().await;
}

#[tokio::test]
async fn test_lost_camera_is_released() {
    let harness = Harness::start_with(
        MockConnector::accepting(),
        streaming_settings(10),
        ChannelConfig::default(),
        fast_driver().with_failure_after(40),
        None,
    );

    harness.send(EngineCommand::StartCapture).await;
    harness
        .expect(|e| is_state(e, EngineState::is_capturing))
        .await;
    harness.send(EngineCommand::StartStream).await;
    harness
        .expect(|e| matches!(e, EngineEvent::ChannelStateChanged(ChannelState::Open)))
        .await;

    let events = harness
        .collect_until(|e| is_state(e, EngineState::is_idle))
        .await;
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::StreamStopped {
            reason: StopReason::CaptureStopped
        }
    )));
    assert!(harness.mock.was_closed());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_preview_reported_while_capturing() {
    let harness = Harness::start(
        MockConnector::accepting(),
        Settings::default(),
        ChannelConfig::default(),
    );

    harness.send(EngineCommand::StartCapture).await;
    let event = harness
        .expect(|e| matches!(e, EngineEvent::PreviewFrame { .. }))
        .await;
    assert!(matches!(
        event,
        EngineEvent::PreviewFrame {
            width: 64,
            height: 48,
            ..
        }
    ));

    harness.send(EngineCommand::StopCapture).await;
    harness.expect(|e| is_state(e, EngineState::is_idle)).await;

    harness.shutdown().await;
}
