//! Acquisition engine: the controller and its background loops.
//!
//! Three OS threads run next to the rendering thread:
//! - poll: keeps the telemetry snapshot fresh and switches device mode
//!   when the capture state changes
//! - countdown: counts down the initial delay and starts capture
//! - capture: slices windows out of large reads and persists them
//!
//! They share nothing but the [`TelemetryStore`](crate::telemetry::TelemetryStore),
//! the device session and one cancellation flag, checked at the top of
//! every iteration and during every sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::capture::{ScenarioLabel, WallClock};
use crate::config::AppConfig;
use crate::cue::CuePlayer;
use crate::device::DeviceSession;
use crate::telemetry::TelemetryStore;

mod capture_loop;
mod controller;
mod countdown;
pub mod display;
mod poll;

pub use capture_loop::spawn_capture_thread;
pub use controller::{CaptureController, CaptureOutcome};
pub use countdown::{spawn_countdown_thread, tick_countdown, CountdownTick};
pub use display::{intent_for_key, Display, KeyPress, UserIntent, ViewFrame};
pub use poll::{spawn_poll_thread, target_mode};

const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// State shared by the background loops of one session
pub struct LoopContext {
    pub config: AppConfig,
    pub label: ScenarioLabel,
    pub store: Arc<TelemetryStore>,
    pub session: Arc<DeviceSession>,
    pub cancel: Arc<AtomicBool>,
    pub cue: Arc<dyn CuePlayer>,
    pub clock: Arc<dyn WallClock>,
}

impl LoopContext {
    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Sleep in short slices; returns `true` if cancelled meanwhile
    pub fn sleep(&self, duration: Duration) -> bool {
        sleep_unless_cancelled(&self.cancel, duration)
    }
}

pub fn sleep_unless_cancelled(cancel: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
