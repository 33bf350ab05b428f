//! camstream operator console.
//!
//! ```text
//! camstream                          Console with default settings
//! camstream --synthetic --autostart  Stream a test pattern right away
//! camstream --endpoint ws://host/in  Send frames somewhere else
//! ```
//!
//! Events are printed to stdout as JSON lines. Logs go to stderr.

mod console;
mod output;

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use tokio::sync::mpsc::Sender;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use camstream_capture::{CameraDriver, TestPatternDriver};
use camstream_engine::{spawn_engine, EngineConfig};
use camstream_ipc::{command_channel, event_channel, EngineCommand, Resolution, Settings};
use camstream_transport::{ChannelConfig, WebSocketConnector};

use console::ConsoleCommand;
use output::EventPrinter;

#[derive(Parser, Debug)]
#[command(
    name = "camstream",
    version,
    about = "Stream a camera to a WebSocket endpoint as JPEG frames"
)]
struct Cli {
    /// Endpoint that receives the frames.
    #[arg(
        long,
        env = "CAMSTREAM_ENDPOINT",
        default_value = "ws://localhost:8000/stream"
    )]
    endpoint: String,

    /// Frames per second, 1 to 30.
    #[arg(long, default_value_t = 10)]
    rate: u32,

    /// JPEG quality, above 0 and at most 1.
    #[arg(long, default_value_t = 0.8)]
    quality: f32,

    /// Requested capture size: 640x480, 1280x720 or 1920x1080.
    #[arg(long, default_value_t = Resolution::Hd)]
    resolution: Resolution,

    /// Seconds to wait for the connection to open. 0 waits forever.
    #[arg(long, default_value_t = 10)]
    connect_timeout_secs: u64,

    /// Use a generated test pattern instead of a camera.
    #[arg(long)]
    synthetic: bool,

    /// Camera to open when built with camera support.
    #[arg(long, default_value_t = 0)]
    camera_index: u32,

    /// Start capture and stream without waiting for console input.
    #[arg(long)]
    autostart: bool,

    /// Print a line for the newest camera frame twice a second.
    #[arg(long)]
    preview: bool,
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        let settings = Settings {
            rate: self.rate,
            quality: self.quality,
            resolution: self.resolution,
            endpoint: self.endpoint.clone(),
        };
        settings.validate().context("invalid startup settings")?;
        Ok(settings)
    }

    fn channel_config(&self) -> ChannelConfig {
        let timeout = match self.connect_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        ChannelConfig::default().with_connect_timeout(timeout)
    }

    fn driver(&self) -> Arc<dyn CameraDriver> {
        if self.synthetic {
            return Arc::new(TestPatternDriver::new());
        }

        #[cfg(feature = "camera")]
        {
            Arc::new(camstream_capture::NokhwaDriver::new(self.camera_index))
        }

        #[cfg(not(feature = "camera"))]
        {
            warn!(
                camera_index = self.camera_index,
                "Built without camera support, using the test pattern"
            );
            Arc::new(TestPatternDriver::new())
        }
    }
}

/// Initialize logging.
fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "camstream=info,camstream_engine=info,camstream_capture=info,camstream_encoder=info,camstream_transport=info".into()
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let settings = cli.settings()?;
    info!(
        endpoint = %settings.endpoint,
        rate = settings.rate,
        resolution = %settings.resolution,
        "camstream starting"
    );

    let (command_tx, command_rx) = command_channel();
    let (event_tx, event_rx) = event_channel();

    let engine = spawn_engine(
        command_rx,
        event_tx,
        cli.driver(),
        Arc::new(WebSocketConnector),
        EngineConfig {
            settings: settings.clone(),
            channel: cli.channel_config(),
        },
    )
    .context("failed to start engine thread")?;

    let current = Arc::new(Mutex::new(settings));
    let stats_requested = Arc::new(AtomicBool::new(false));

    let printer = EventPrinter::new(Arc::clone(&current), Arc::clone(&stats_requested))
        .with_preview(cli.preview);
    let printer = thread::Builder::new()
        .name("camstream-events".to_string())
        .spawn(move || printer.run(event_rx))
        .context("failed to start event printer")?;

    if cli.autostart {
        send(&command_tx, EngineCommand::StartCapture)?;
        send(&command_tx, EngineCommand::StartStream)?;
    }

    let console_result = run_console(&command_tx, &current, &stats_requested);

    // Shutdown may fail if the engine already exited; joining still applies.
    let _ = command_tx.blocking_send(EngineCommand::Shutdown);
    drop(command_tx);

    engine.join();
    if printer.join().is_err() {
        warn!("Event printer panicked");
    }

    info!("camstream stopped");
    console_result
}

fn run_console(
    command_tx: &Sender<EngineCommand>,
    current: &Mutex<Settings>,
    stats_requested: &AtomicBool,
) -> Result<()> {
    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line.context("failed to read console input")?;

        let command = match console::parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        match command {
            ConsoleCommand::Engine(command) => {
                if matches!(command, EngineCommand::GetStats) {
                    stats_requested.store(true, Ordering::Release);
                }
                send(command_tx, command)?;
            }
            ConsoleCommand::Set(assignments) => {
                let next = match console::apply(&current.lock(), &assignments) {
                    Ok(next) => next,
                    Err(e) => {
                        eprintln!("{e}");
                        continue;
                    }
                };

                // Later `set` lines build on this even before the engine echoes it.
                *current.lock() = next.clone();
                send(command_tx, EngineCommand::UpdateSettings(next))?;
            }
            ConsoleCommand::Help => println!("{}", console::HELP),
            ConsoleCommand::Quit => return Ok(()),
        }
    }

    info!("Console input closed");
    Ok(())
}

fn send(command_tx: &Sender<EngineCommand>, command: EngineCommand) -> Result<()> {
    command_tx
        .blocking_send(command)
        .map_err(|e| anyhow::anyhow!("Failed to send command: {}", e))
}
