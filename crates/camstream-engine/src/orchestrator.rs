//! Main engine orchestrator.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

use camstream_capture::{CameraDriver, FrameSample};
use camstream_encoder::FrameCodec;
use camstream_ipc::{
    ChannelState, EngineCommand, EngineEvent, EngineState, ErrorKind, Settings, StatsSnapshot,
    StopReason,
};
use camstream_transport::{ChannelConfig, Connector, InboundMessage};

use crate::controller::StreamController;
use crate::error::StreamerError;
use crate::settings::SettingsStore;
use crate::HEALTH_CHECK_INTERVAL;

/// Engine construction parameters.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub settings: Settings,
    pub channel: ChannelConfig,
}

/// The streaming engine.
///
/// Consumes [`EngineCommand`]s and reports [`EngineEvent`]s. All pipeline
/// state changes happen on the task driving [`Engine::run`].
pub struct Engine {
    command_rx: mpsc::Receiver<EngineCommand>,
    event_tx: Sender<EngineEvent>,
    state: EngineState,
    controller: StreamController,
    stats_rx: watch::Receiver<StatsSnapshot>,
    channel_rx: Option<watch::Receiver<ChannelState>>,
    channel_state: ChannelState,
    inbound_rx: Option<mpsc::Receiver<InboundMessage>>,
    preview_rx: Option<Receiver<FrameSample>>,
}

impl Engine {
    /// Create a new engine.
    ///
    /// Invalid initial settings fall back to the defaults with a warning.
    pub fn new(
        command_rx: mpsc::Receiver<EngineCommand>,
        event_tx: Sender<EngineEvent>,
        driver: Arc<dyn CameraDriver>,
        connector: Arc<dyn Connector>,
        config: EngineConfig,
    ) -> Self {
        let settings = SettingsStore::new(config.settings).unwrap_or_else(|e| {
            warn!("Initial settings rejected, using defaults: {}", e);
            SettingsStore::default()
        });

        let (stats_tx, stats_rx) = watch::channel(StatsSnapshot::default());

        Self {
            command_rx,
            event_tx,
            state: EngineState::Idle,
            controller: StreamController::new(
                driver,
                connector,
                config.channel,
                settings,
                Arc::new(stats_tx),
            ),
            stats_rx,
            channel_rx: None,
            channel_state: ChannelState::Idle,
            inbound_rx: None,
            preview_rx: None,
        }
    }

    /// Encode stream frames with `codec` instead of JPEG.
    pub fn with_codec(mut self, codec: Arc<dyn FrameCodec>) -> Self {
        self.controller = self.controller.with_codec(codec);
        self
    }

    /// Run until shutdown or until every command sender is gone.
    #[instrument(name = "engine_run", skip(self))]
    pub async fn run(mut self) {
        info!("Engine starting");
        self.send_event(EngineEvent::Ready);

        let mut health = tokio::time::interval(HEALTH_CHECK_INTERVAL);
        health.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        info!("Command channel disconnected, shutting down");
                        self.release_all(StopReason::Shutdown).await;
                        break;
                    }
                },
                Some(state) = next_channel_state(&mut self.channel_rx) => {
                    self.on_channel_state(state).await;
                }
                Some(message) = next_inbound(&mut self.inbound_rx) => {
                    debug!(kind = ?message.kind(), "Endpoint notification");
                    self.send_event(EngineEvent::ServerMessage { text: message.text });
                }
                Ok(()) = self.stats_rx.changed() => {
                    let stats = self.stats_rx.borrow_and_update().clone();
                    self.send_event(EngineEvent::Stats(stats));
                }
                _ = health.tick() => {
                    if self.controller.capture_lost() {
                        warn!("Camera stopped delivering, releasing it");
                        self.stop_capture(StopReason::CaptureStopped).await;
                    }
                    self.report_preview();
                }
            }
        }

        info!("Engine stopped");
    }

    /// Handle a command. Returns false if the engine should stop.
    async fn handle_command(&mut self, command: EngineCommand) -> bool {
        debug!(?command, "Handling command");

        match command {
            EngineCommand::StartCapture => self.start_capture().await,
            EngineCommand::StopCapture => self.stop_capture(StopReason::UserRequested).await,
            EngineCommand::StartStream => self.start_stream(),
            EngineCommand::StopStream => self.stop_stream(StopReason::UserRequested).await,
            EngineCommand::UpdateSettings(settings) => self.update_settings(settings),
            EngineCommand::GetSettings => {
                self.send_event(EngineEvent::Settings(self.controller.settings().clone()))
            }
            EngineCommand::GetState => self.send_state(),
            EngineCommand::GetStats => {
                let stats = self.stats_rx.borrow().clone();
                self.send_event(EngineEvent::Stats(stats));
            }
            EngineCommand::Shutdown => {
                self.release_all(StopReason::Shutdown).await;
                return false;
            }
        }

        true
    }

    #[instrument(name = "start_capture", skip(self))]
    async fn start_capture(&mut self) {
        match self.controller.start_capture().await {
            Ok(info) => {
                info!(
                    resolution = %info.requested,
                    width = info.width,
                    height = info.height,
                    "Camera live"
                );
                self.preview_rx = self.controller.preview();
                self.transition_to(EngineState::Previewing {
                    resolution: info.requested,
                    width: info.width,
                    height: info.height,
                });
            }
            Err(e) => self.report_error(e),
        }
    }

    #[instrument(name = "stop_capture", skip(self))]
    async fn stop_capture(&mut self, reason: StopReason) {
        if !self.controller.is_capturing() {
            debug!("No camera active, ignoring stop");
            return;
        }

        let reason = match reason {
            StopReason::UserRequested => StopReason::CaptureStopped,
            other => other,
        };
        self.stop_stream(reason).await;
        self.preview_rx = None;
        self.controller.stop_capture().await;
        self.transition_to(EngineState::Idle);
    }

    #[instrument(name = "start_stream", skip(self))]
    fn start_stream(&mut self) {
        match self.controller.start_stream() {
            Ok(started) => {
                let settings = self.controller.settings().clone();
                let (width, height) = self
                    .controller
                    .capture_info()
                    .map(|i| (i.width, i.height))
                    .unwrap_or_default();

                info!(
                    endpoint = %settings.endpoint,
                    rate = settings.rate,
                    quality = settings.quality,
                    "Streaming"
                );

                self.channel_rx = Some(started.channel_states);
                self.inbound_rx = started.inbound;
                self.report_channel_state(ChannelState::Connecting);
                self.transition_to(EngineState::Streaming {
                    settings,
                    width,
                    height,
                });
            }
            Err(e) => self.report_error(e),
        }
    }

    #[instrument(name = "stop_stream", skip(self))]
    async fn stop_stream(&mut self, reason: StopReason) {
        let Some(final_state) = self.controller.stop_stream().await else {
            debug!("Not streaming, ignoring stop");
            return;
        };

        info!(reason = %reason.message(), channel = final_state.name(), "Stream stopped");

        self.channel_rx = None;
        self.inbound_rx = None;
        self.report_channel_state(final_state);
        self.send_event(EngineEvent::StreamStopped { reason });

        if let EngineState::Streaming { settings, width, height } = &self.state {
            let next = EngineState::Previewing {
                resolution: settings.resolution,
                width: *width,
                height: *height,
            };
            self.transition_to(next);
        }
    }

    async fn release_all(&mut self, reason: StopReason) {
        self.stop_stream(reason.clone()).await;
        self.stop_capture(reason).await;
        self.send_event(EngineEvent::Shutdown);
    }

    async fn on_channel_state(&mut self, state: ChannelState) {
        debug!(state = state.name(), "Channel state");
        self.report_channel_state(state.clone());

        match state {
            ChannelState::Failed { reason } => {
                self.send_event(EngineEvent::Error {
                    kind: ErrorKind::Connection,
                    message: format!("Connection error: {reason}"),
                });
                self.stop_stream(StopReason::ConnectionFailed { message: reason })
                    .await;
            }
            ChannelState::Closed => {
                // Ticks keep firing and dropping until the operator stops.
                warn!("Endpoint closed the connection");
                self.channel_rx = None;
            }
            _ => {}
        }
    }

    /// Report the newest preview frame and discard the older ones.
    fn report_preview(&self) {
        let Some(frame) = self.preview_rx.as_ref().and_then(|rx| rx.try_iter().last()) else {
            return;
        };

        self.send_event(EngineEvent::PreviewFrame {
            sequence: frame.sequence,
            width: frame.width,
            height: frame.height,
            offset_ms: frame.timestamp.offset_ms(),
        });
    }

    /// Publish a channel state unless it is the one last published.
    fn report_channel_state(&mut self, state: ChannelState) {
        if self.channel_state == state {
            return;
        }
        self.channel_state = state.clone();
        self.send_event(EngineEvent::ChannelStateChanged(state));
    }

    fn update_settings(&mut self, settings: Settings) {
        match self.controller.update_settings(settings) {
            Ok(()) => self.send_event(EngineEvent::Settings(self.controller.settings().clone())),
            Err(e) => self.report_error(e),
        }
    }

    fn send_state(&self) {
        let state = self.state.clone();
        self.send_event(EngineEvent::StateChanged {
            previous: Box::new(state.clone()),
            current: Box::new(state),
        });
    }

    fn report_error(&self, err: StreamerError) {
        warn!("{}", err);
        self.send_event(EngineEvent::Error {
            kind: err.kind(),
            message: err.to_string(),
        });
    }

    fn transition_to(&mut self, new_state: EngineState) {
        let previous = std::mem::replace(&mut self.state, new_state.clone());

        debug!(
            previous = %previous.name(),
            current = %new_state.name(),
            "State transition"
        );

        self.send_event(EngineEvent::StateChanged {
            previous: Box::new(previous),
            current: Box::new(new_state),
        });
    }

    fn send_event(&self, event: EngineEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("Failed to send event: {}", e);
        }
    }
}

async fn next_channel_state(slot: &mut Option<watch::Receiver<ChannelState>>) -> Option<ChannelState> {
    let Some(rx) = slot else {
        return std::future::pending().await;
    };

    match rx.changed().await {
        Ok(()) => Some(rx.borrow_and_update().clone()),
        Err(_) => {
            *slot = None;
            std::future::pending().await
        }
    }
}

async fn next_inbound(slot: &mut Option<mpsc::Receiver<InboundMessage>>) -> Option<InboundMessage> {
    let Some(rx) = slot else {
        return std::future::pending().await;
    };

    match rx.recv().await {
        Some(message) => Some(message),
        None => {
            *slot = None;
            std::future::pending().await
        }
    }
}

/// Handle to an engine running on its own thread.
pub struct EngineHandle {
    thread: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Wait for the engine thread to exit.
    pub fn join(mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("Engine thread panicked");
            }
        }
    }
}

/// Start an engine on a dedicated thread with a single-threaded runtime.
pub fn spawn_engine(
    command_rx: mpsc::Receiver<EngineCommand>,
    event_tx: Sender<EngineEvent>,
    driver: Arc<dyn CameraDriver>,
    connector: Arc<dyn Connector>,
    config: EngineConfig,
) -> std::io::Result<EngineHandle> {
    let thread = thread::Builder::new()
        .name("camstream-engine".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Failed to build engine runtime: {}", e);
                    let _ = event_tx.try_send(EngineEvent::Shutdown);
                    return;
                }
            };

            let engine = Engine::new(command_rx, event_tx, driver, connector, config);
            runtime.block_on(engine.run());

            // Let in-flight encodes finish before the pool goes away.
            runtime.shutdown_timeout(Duration::from_secs(1));
        })?;

    Ok(EngineHandle {
        thread: Some(thread),
    })
}
