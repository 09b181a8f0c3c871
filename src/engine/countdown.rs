// Countdown loop
//
// The start instant is stamped once when the session enters Countdown.
// Each tick publishes the whole seconds left; at zero the session moves
// to Capture. The cue fires only for the tick that performed the
// transition, so repeated zero readings stay silent.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{error, info};

use super::LoopContext;
use crate::capture::CaptureState;
use crate::cue::{Cue, CuePlayer};
use crate::error::CaptureError;
use crate::telemetry::TelemetryStore;

pub const CAPTURE_STARTED_MESSAGE: &str = "Capture started. Maintain the indicated position.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
    /// Not counting down (yet, or any more)
    Idle,
    /// Whole seconds left
    Remaining(u64),
    /// This tick moved the session into Capture
    Started,
}

/// Evaluate the countdown once at `now`
pub fn tick_countdown(
    store: &TelemetryStore,
    cue: &dyn CuePlayer,
    delay: Duration,
    now: Instant,
) -> Result<CountdownTick, CaptureError> {
    if store.state() != CaptureState::Countdown {
        return Ok(CountdownTick::Idle);
    }
    let Some(started) = store.countdown_started() else {
        return Ok(CountdownTick::Idle);
    };

    let elapsed = now.saturating_duration_since(started).as_secs();
    let remaining = delay.as_secs().saturating_sub(elapsed);
    store.set_countdown_remaining(remaining);

    if remaining > 0 {
        return Ok(CountdownTick::Remaining(remaining));
    }

    if store.transition(
        CaptureState::Countdown,
        CaptureState::Capture,
        CAPTURE_STARTED_MESSAGE,
    )? {
        cue.play(Cue::CaptureBegins);
        Ok(CountdownTick::Started)
    } else {
        Ok(CountdownTick::Idle)
    }
}

pub fn spawn_countdown_thread(ctx: Arc<LoopContext>) -> JoinHandle<()> {
    thread::spawn(move || run_countdown(&ctx))
}

fn run_countdown(ctx: &LoopContext) {
    info!("[Countdown] Started");
    let delay = ctx.config.capture.initial_delay();
    let tick = ctx.config.timing.countdown_tick();

    while !ctx.cancelled() {
        match ctx.store.state() {
            CaptureState::Setup | CaptureState::Countdown => {}
            _ => break,
        }

        match tick_countdown(&ctx.store, ctx.cue.as_ref(), delay, Instant::now()) {
            Ok(CountdownTick::Started) => {
                info!("[Countdown] Capture begins");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                error!("[Countdown] {}", err);
                break;
            }
        }

        ctx.sleep(tick);
    }

    info!("[Countdown] Exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingCue;

    #[test]
    fn test_counts_whole_seconds() {
        let store = TelemetryStore::new(1, 4000.0);
        let cue = RecordingCue::default();
        let start = Instant::now();
        store.begin_countdown(start, 30, "wait");

        let tick = tick_countdown(
            &store,
            &cue,
            Duration::from_secs(30),
            start + Duration::from_millis(2_900),
        )
        .unwrap();

        assert_eq!(tick, CountdownTick::Remaining(28));
        assert_eq!(store.snapshot().countdown_remaining, Some(28));
        assert!(cue.played().is_empty());
    }

    #[test]
    fn test_expiry_fires_cue_exactly_once() {
        let store = TelemetryStore::new(1, 4000.0);
        let cue = RecordingCue::default();
        let start = Instant::now();
        store.begin_countdown(start, 1, "wait");
        let later = start + Duration::from_secs(2);

        let first = tick_countdown(&store, &cue, Duration::from_secs(1), later).unwrap();
        let second = tick_countdown(&store, &cue, Duration::from_secs(1), later).unwrap();
        let third = tick_countdown(&store, &cue, Duration::from_secs(1), later).unwrap();

        assert_eq!(first, CountdownTick::Started);
        assert_eq!(second, CountdownTick::Idle);
        assert_eq!(third, CountdownTick::Idle);
        assert_eq!(cue.played(), vec![Cue::CaptureBegins]);
        assert_eq!(store.state(), CaptureState::Capture);
        assert_eq!(store.snapshot().message, CAPTURE_STARTED_MESSAGE);
    }

    #[test]
    fn test_idle_outside_countdown() {
        let store = TelemetryStore::new(1, 4000.0);
        let cue = RecordingCue::default();
        let tick = tick_countdown(&store, &cue, Duration::ZERO, Instant::now()).unwrap();
        assert_eq!(tick, CountdownTick::Idle);
        assert_eq!(store.state(), CaptureState::Setup);
    }
}
