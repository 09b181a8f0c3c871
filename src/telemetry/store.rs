// TelemetryStore: the one lock guarding cross-thread session state
//
// Readings, capture state, status message, countdown and progress live
// behind a single mutex. Writers hold it only for the assignment; readers
// take a full copy. State and message always change together.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::events::{CaptureEvent, EventBus};
use super::{ElectrodeReadings, ReadingKind};
use crate::capture::{CaptureProgress, CaptureState};
use crate::device::DeviceMode;
use crate::error::CaptureError;

/// Consistent copy of everything the UI renders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub impedance: ElectrodeReadings,
    pub eeg: ElectrodeReadings,
    pub state: CaptureState,
    pub message: String,
    pub device_mode: DeviceMode,
    /// Whole seconds left while counting down
    pub countdown_remaining: Option<u64>,
    pub progress: CaptureProgress,
}

struct SharedState {
    snapshot: TelemetrySnapshot,
    countdown_started: Option<Instant>,
}

pub struct TelemetryStore {
    inner: Mutex<SharedState>,
    events: EventBus,
}

impl TelemetryStore {
    /// Fresh store in `Setup`, with bad-contact impedance and zero signal
    pub fn new(target_windows: usize, impedance_fallback: f64) -> Self {
        Self::with_events(target_windows, impedance_fallback, EventBus::default())
    }

    pub fn with_events(target_windows: usize, impedance_fallback: f64, events: EventBus) -> Self {
        Self {
            inner: Mutex::new(SharedState {
                snapshot: TelemetrySnapshot {
                    impedance: ElectrodeReadings::uniform(impedance_fallback),
                    eeg: ElectrodeReadings::uniform(0.0),
                    state: CaptureState::Setup,
                    message: "Initializing...".to_string(),
                    device_mode: DeviceMode::None,
                    countdown_remaining: None,
                    progress: CaptureProgress::new(target_windows),
                },
                countdown_started: None,
            }),
            events,
        }
    }

    // A panicking writer never leaves a half-assigned field, so the data
    // behind a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.lock().snapshot.clone()
    }

    pub fn state(&self) -> CaptureState {
        self.lock().snapshot.state
    }

    pub fn progress(&self) -> CaptureProgress {
        self.lock().snapshot.progress
    }

    /// Device mode last announced by the poll loop
    pub fn device_mode(&self) -> DeviceMode {
        self.lock().snapshot.device_mode
    }

    pub fn countdown_started(&self) -> Option<Instant> {
        self.lock().countdown_started
    }

    /// Replace the latest reading set of one kind
    pub fn publish_readings(&self, kind: ReadingKind, readings: ElectrodeReadings) {
        let mut inner = self.lock();
        match kind {
            ReadingKind::Impedance => inner.snapshot.impedance = readings,
            ReadingKind::Signal => inner.snapshot.eeg = readings,
        }
    }

    pub fn set_device_mode(&self, mode: DeviceMode) {
        let changed = {
            let mut inner = self.lock();
            let changed = inner.snapshot.device_mode != mode;
            inner.snapshot.device_mode = mode;
            changed
        };
        if changed {
            self.events.publish(CaptureEvent::DeviceModeChanged { mode });
        }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.lock().snapshot.message = message.into();
    }

    /// Publish the countdown; ignored once the session left `Countdown`
    pub fn set_countdown_remaining(&self, seconds: u64) {
        let mut inner = self.lock();
        if inner.snapshot.state == CaptureState::Countdown {
            inner.snapshot.countdown_remaining = Some(seconds);
        }
    }

    /// Move `from -> to` together with the status message.
    ///
    /// Returns `Ok(false)` when the session is no longer in `from` (another
    /// thread got there first), which makes repeated calls harmless.
    pub fn transition(
        &self,
        from: CaptureState,
        to: CaptureState,
        message: impl Into<String>,
    ) -> Result<bool, CaptureError> {
        if !from.can_transition_to(to) {
            return Err(CaptureError::InvalidTransition { from, to });
        }

        let message = message.into();
        {
            let mut inner = self.lock();
            if inner.snapshot.state != from {
                debug!(
                    "[TelemetryStore] Skipping {} -> {}, state is {}",
                    from.label(),
                    to.label(),
                    inner.snapshot.state.label()
                );
                return Ok(false);
            }
            inner.snapshot.state = to;
            inner.snapshot.message = message.clone();
            if to != CaptureState::Countdown {
                inner.snapshot.countdown_remaining = None;
            }
        }

        info!("[TelemetryStore] {} -> {}", from.label(), to.label());
        self.events.publish(CaptureEvent::StateChanged { from, to, message });
        Ok(true)
    }

    /// Enter `Countdown` from `Setup` and stamp its start time atomically
    pub fn begin_countdown(
        &self,
        now: Instant,
        delay_secs: u64,
        message: impl Into<String>,
    ) -> bool {
        let message = message.into();
        {
            let mut inner = self.lock();
            if inner.snapshot.state != CaptureState::Setup {
                return false;
            }
            inner.snapshot.state = CaptureState::Countdown;
            inner.snapshot.message = message.clone();
            inner.snapshot.countdown_remaining = Some(delay_secs);
            inner.countdown_started = Some(now);
        }

        info!("[TelemetryStore] setup -> countdown ({}s)", delay_secs);
        self.events.publish(CaptureEvent::StateChanged {
            from: CaptureState::Setup,
            to: CaptureState::Countdown,
            message,
        });
        true
    }

    /// Move to a terminal escape state (`Error` or `Cancelled`) from any
    /// active state. Returns the state that was left, if any.
    pub fn terminate(&self, to: CaptureState, message: impl Into<String>) -> Option<CaptureState> {
        let message = message.into();
        let from = {
            let mut inner = self.lock();
            let from = inner.snapshot.state;
            if !from.can_transition_to(to) {
                return None;
            }
            inner.snapshot.state = to;
            inner.snapshot.message = message.clone();
            inner.snapshot.countdown_remaining = None;
            from
        };

        info!("[TelemetryStore] {} -> {}", from.label(), to.label());
        self.events.publish(CaptureEvent::StateChanged { from, to, message });
        Some(from)
    }

    /// Record the saved-window count and its status line together
    pub fn record_saved(&self, saved: usize) -> CaptureProgress {
        let mut inner = self.lock();
        inner.snapshot.progress.saved = saved;
        inner.snapshot.message = inner.snapshot.progress.status_message();
        inner.snapshot.progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> TelemetryStore {
        TelemetryStore::new(3, 4000.0)
    }

    #[test]
    fn test_initial_snapshot_has_every_electrode() {
        let snapshot = store().snapshot();
        assert_eq!(snapshot.state, CaptureState::Setup);
        assert_eq!(snapshot.impedance, ElectrodeReadings::uniform(4000.0));
        assert_eq!(snapshot.eeg.len(), 4);
        assert_eq!(snapshot.progress, CaptureProgress::new(3));
    }

    #[test]
    fn test_transition_is_idempotent() {
        let store = store();
        assert!(store.begin_countdown(Instant::now(), 30, "wait"));
        assert!(store
            .transition(CaptureState::Countdown, CaptureState::Capture, "go")
            .unwrap());
        assert!(!store
            .transition(CaptureState::Countdown, CaptureState::Capture, "go")
            .unwrap());

        let snapshot = store.snapshot();
        assert_eq!(snapshot.state, CaptureState::Capture);
        assert_eq!(snapshot.message, "go");
        assert_eq!(snapshot.countdown_remaining, None);
    }

    #[test]
    fn test_transition_rejects_skipping_countdown() {
        let store = store();
        assert_eq!(
            store.transition(CaptureState::Setup, CaptureState::Capture, "nope"),
            Err(CaptureError::InvalidTransition {
                from: CaptureState::Setup,
                to: CaptureState::Capture
            })
        );
        assert_eq!(store.state(), CaptureState::Setup);
    }

    #[test]
    fn test_begin_countdown_only_from_setup() {
        let store = store();
        let now = Instant::now();
        assert!(store.begin_countdown(now, 5, "wait"));
        assert!(!store.begin_countdown(now, 5, "wait"));
        assert_eq!(store.countdown_started(), Some(now));
        assert_eq!(store.snapshot().countdown_remaining, Some(5));
    }

    #[test]
    fn test_terminate_is_final() {
        let store = store();
        assert_eq!(
            store.terminate(CaptureState::Cancelled, "Cancelled"),
            Some(CaptureState::Setup)
        );
        assert_eq!(store.terminate(CaptureState::Error, "late"), None);
        assert_eq!(store.snapshot().message, "Cancelled");
    }

    #[test]
    fn test_state_changes_are_broadcast() {
        let store = store();
        store.set_device_mode(DeviceMode::Impedance);
        store.set_device_mode(DeviceMode::Impedance);
        store.terminate(CaptureState::Cancelled, "bye");

        let recent = store.events().snapshot().recent;
        assert_eq!(recent.len(), 2);
        assert!(matches!(
            recent[1],
            CaptureEvent::StateChanged {
                to: CaptureState::Cancelled,
                ..
            }
        ));
    }

    #[test]
    fn test_record_saved_updates_message() {
        let store = store();
        let progress = store.record_saved(2);
        assert_eq!(progress.saved, 2);
        assert_eq!(store.snapshot().message, "Sample 2/3 captured");
    }
}
