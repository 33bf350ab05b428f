//! Engine event printing.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{debug, info};

use camstream_ipc::{EngineEvent, Settings};

/// Minimum spacing between unrequested stats lines.
pub const STATS_PRINT_INTERVAL: Duration = Duration::from_secs(1);

/// Prints engine events to stdout as JSON lines.
///
/// Stats updates arrive on every frame, so unrequested ones are thinned
/// out to one per [`STATS_PRINT_INTERVAL`]. Preview reports are printed
/// only when asked for.
pub struct EventPrinter {
    settings: Arc<Mutex<Settings>>,
    stats_requested: Arc<AtomicBool>,
    show_preview: bool,
    last_stats: Option<Instant>,
}

impl EventPrinter {
    pub fn new(settings: Arc<Mutex<Settings>>, stats_requested: Arc<AtomicBool>) -> Self {
        Self {
            settings,
            stats_requested,
            show_preview: false,
            last_stats: None,
        }
    }

    pub fn with_preview(mut self, show: bool) -> Self {
        self.show_preview = show;
        self
    }

    /// Print events until the engine shuts down or goes away.
    pub fn run(mut self, events: Receiver<EngineEvent>) {
        for event in events.iter() {
            let shutdown = matches!(event, EngineEvent::Shutdown);

            if let EngineEvent::Settings(settings) = &event {
                self.settings.lock().clone_from(settings);
            }

            if self.should_print(&event, Instant::now()) {
                print_event(&event);
            }

            if shutdown {
                break;
            }
        }

        info!("Event printer stopped");
    }

    fn should_print(&mut self, event: &EngineEvent, now: Instant) -> bool {
        match event {
            EngineEvent::Stats(_) => {}
            EngineEvent::PreviewFrame { .. } => return self.show_preview,
            _ => return true,
        }

        let requested = self.stats_requested.swap(false, Ordering::AcqRel);
        let due = self
            .last_stats
            .map_or(true, |last| now.duration_since(last) >= STATS_PRINT_INTERVAL);

        if requested || due {
            self.last_stats = Some(now);
            true
        } else {
            false
        }
    }
}

fn print_event(event: &EngineEvent) {
    let line = match serde_json::to_string(event) {
        Ok(line) => line,
        Err(e) => {
            debug!("Failed to serialize event: {}", e);
            return;
        }
    };

    let mut stdout = io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{line}").and_then(|()| stdout.flush()) {
        debug!("Failed to write event: {}", e);
    }
}
