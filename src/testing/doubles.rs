// Cue, display and clock doubles

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Local, TimeZone};

use crate::capture::{CaptureState, WallClock};
use crate::cue::{Cue, CuePlayer};
use crate::engine::{Display, UserIntent, ViewFrame};
use crate::error::CaptureError;
use crate::telemetry::TelemetrySnapshot;

/// Remembers every cue instead of playing it
#[derive(Debug, Default)]
pub struct RecordingCue {
    played: Mutex<Vec<Cue>>,
}

impl RecordingCue {
    pub fn played(&self) -> Vec<Cue> {
        self.played
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, cue: Cue) -> usize {
        self.played().into_iter().filter(|c| *c == cue).count()
    }
}

impl CuePlayer for RecordingCue {
    fn play(&self, cue: Cue) {
        self.played
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cue);
    }
}

/// When a [`ScriptedDisplay`] asks to cancel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelTrigger {
    /// First frame rendered in this state
    InState(CaptureState),
    /// First frame showing at least this many saved windows
    AfterSaved(usize),
}

/// Display that replays a fixed interaction and records what it saw
#[derive(Debug, Default)]
pub struct ScriptedDisplay {
    advance_when_ready: bool,
    cancel: Option<CancelTrigger>,
    fail_at_frame: Option<usize>,
    frames: usize,
    states: Vec<CaptureState>,
    last: Option<TelemetrySnapshot>,
}

impl ScriptedDisplay {
    /// Display that never asks for anything
    pub fn new() -> Self {
        Self::default()
    }

    /// Press ENTER on every setup frame that shows good contact
    pub fn advance_when_ready(mut self) -> Self {
        self.advance_when_ready = true;
        self
    }

    pub fn cancel_on(mut self, trigger: CancelTrigger) -> Self {
        self.cancel = Some(trigger);
        self
    }

    /// Fail rendering of the `n`-th frame (1-based)
    pub fn fail_at_frame(mut self, n: usize) -> Self {
        self.fail_at_frame = Some(n);
        self
    }

    pub fn frames_rendered(&self) -> usize {
        self.frames
    }

    /// Distinct states seen, in order
    pub fn states_seen(&self) -> &[CaptureState] {
        &self.states
    }

    pub fn last_snapshot(&self) -> Option<&TelemetrySnapshot> {
        self.last.as_ref()
    }
}

impl Display for ScriptedDisplay {
    fn render(&mut self, frame: &ViewFrame<'_>) -> Result<UserIntent, CaptureError> {
        self.frames += 1;
        let snapshot = frame.snapshot;
        if self.states.last() != Some(&snapshot.state) {
            self.states.push(snapshot.state);
        }
        self.last = Some(snapshot.clone());

        if self.fail_at_frame == Some(self.frames) {
            return Err(CaptureError::DisplayFailed {
                reason: format!("scripted failure at frame {}", self.frames),
            });
        }

        let cancel = match self.cancel {
            Some(CancelTrigger::InState(state)) => snapshot.state == state,
            Some(CancelTrigger::AfterSaved(n)) => snapshot.progress.saved >= n,
            None => false,
        };
        if cancel {
            return Ok(UserIntent::Cancel);
        }

        if self.advance_when_ready && snapshot.state == CaptureState::Setup && frame.contact_ok {
            return Ok(UserIntent::Advance);
        }
        Ok(UserIntent::None)
    }
}

fn local_time(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(year, month, day, hour, min, sec)
        .earliest()
        .unwrap_or_else(Local::now)
}

/// Always reports the same instant
#[derive(Debug, Clone)]
pub struct FixedClock {
    at: DateTime<Local>,
}

impl FixedClock {
    pub fn at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Self {
            at: local_time(year, month, day, hour, min, sec),
        }
    }
}

impl WallClock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.at
    }
}

/// Advances by one second on every reading
#[derive(Debug)]
pub struct SteppingClock {
    start: DateTime<Local>,
    ticks: AtomicI64,
}

impl SteppingClock {
    pub fn starting_at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Self {
            start: local_time(year, month, day, hour, min, sec),
            ticks: AtomicI64::new(0),
        }
    }
}

impl WallClock for SteppingClock {
    fn now(&self) -> DateTime<Local> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        self.start + Duration::seconds(tick)
    }
}
