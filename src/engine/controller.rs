// CaptureController: owns one capture session from bring-up to teardown
//
// The calling thread runs the render loop; poll, countdown and capture run
// on their own threads. Whatever ends the session (completion, error,
// cancellation, a display failure) the background threads are stopped and
// joined before the hardware is torn down.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{error, info, warn};

use super::capture_loop::spawn_capture_thread;
use super::countdown::spawn_countdown_thread;
use super::display::{Display, UserIntent, ViewFrame};
use super::poll::spawn_poll_thread;
use super::LoopContext;
use crate::analysis::contact_ok;
use crate::capture::{CaptureProgress, CaptureState, ScenarioLabel, SystemClock, WallClock};
use crate::config::AppConfig;
use crate::cue::{Cue, CuePlayer};
use crate::device::{DeviceConnector, DeviceSession};
use crate::error::{log_capture_error, CaptureError, ErrorCode};
use crate::telemetry::{trend_feed, EventSnapshot, History, TelemetryStore, TrendConsumer};

pub const CANCELLED_MESSAGE: &str = "Operation canceled";

/// How a finished session ended
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub state: CaptureState,
    pub message: String,
    pub progress: CaptureProgress,
    /// Directory the windows were written to
    pub output_dir: PathBuf,
    pub events: EventSnapshot,
}

impl CaptureOutcome {
    pub fn is_complete(&self) -> bool {
        self.state == CaptureState::Complete
    }
}

pub struct CaptureController {
    config: AppConfig,
    label: ScenarioLabel,
    address: String,
    connector: Arc<dyn DeviceConnector>,
    cue: Arc<dyn CuePlayer>,
    clock: Arc<dyn WallClock>,
    store: Arc<TelemetryStore>,
    cancel: Arc<AtomicBool>,
    started: AtomicBool,
}

impl CaptureController {
    /// Validate the configuration and prepare a session in `Setup`
    pub fn new(
        config: AppConfig,
        label: ScenarioLabel,
        connector: Arc<dyn DeviceConnector>,
        cue: Arc<dyn CuePlayer>,
    ) -> Result<Self, CaptureError> {
        config.validate()?;

        let store = Arc::new(TelemetryStore::new(
            config.capture.target_windows,
            config.impedance.fallback,
        ));
        Ok(Self {
            address: config.device.mac_address.clone(),
            config,
            label,
            connector,
            cue,
            clock: Arc::new(SystemClock),
            store,
            cancel: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
        })
    }

    /// Override the headset address from the configuration
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn WallClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> Arc<TelemetryStore> {
        Arc::clone(&self.store)
    }

    /// Shared cancellation flag, e.g. for a signal handler
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.config.capture.output_dir.join(self.label.as_str())
    }

    /// Leave `Setup` for `Countdown`, if every electrode has acceptable contact
    pub fn advance(&self) -> Result<(), CaptureError> {
        let snapshot = self.store.snapshot();
        if snapshot.state != CaptureState::Setup {
            return Err(CaptureError::InvalidTransition {
                from: snapshot.state,
                to: CaptureState::Countdown,
            });
        }
        if !contact_ok(&snapshot.impedance, &self.config.impedance) {
            self.cue.play(Cue::ContactNotReady);
            return Err(CaptureError::ContactNotReady);
        }

        let delay = self.config.capture.initial_delay_secs;
        let message = format!(
            "Preparing capture. Acquisition will start in {} seconds.",
            delay
        );
        if !self.store.begin_countdown(Instant::now(), delay, message) {
            return Err(CaptureError::InvalidTransition {
                from: self.store.state(),
                to: CaptureState::Countdown,
            });
        }

        self.cue.play(Cue::ContactReady);
        info!("[CaptureController] Contact OK, countdown of {}s started", delay);
        Ok(())
    }

    /// Stop the session from any state; irreversible
    pub fn cancel(&self) {
        if let Some(from) = self
            .store
            .terminate(CaptureState::Cancelled, CANCELLED_MESSAGE)
        {
            info!("[CaptureController] Cancelled during {}", from.label());
        }
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Run the session to its end, rendering with `display`.
    ///
    /// Hardware bring-up failures are returned before any thread starts.
    /// A display failure ends the session and is returned after cleanup;
    /// every other ending is reported through the outcome state.
    pub fn run(&self, display: &mut dyn Display) -> Result<CaptureOutcome, CaptureError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AlreadyStarted);
        }

        let session = self.open_session()?;
        if self.store.state() == CaptureState::Setup {
            self.store.set_message(
                "Hardware ready. Adjust the headset until every electrode is acceptable.",
            );
        }

        let (trend_tx, trend_rx) = trend_feed(self.config.display.max_history.max(1) * 4);
        let ctx = Arc::new(LoopContext {
            config: self.config.clone(),
            label: self.label,
            store: Arc::clone(&self.store),
            session: Arc::clone(&session),
            cancel: Arc::clone(&self.cancel),
            cue: Arc::clone(&self.cue),
            clock: Arc::clone(&self.clock),
        });

        let workers = vec![
            ("poll", spawn_poll_thread(Arc::clone(&ctx), trend_tx)),
            ("countdown", spawn_countdown_thread(Arc::clone(&ctx))),
            ("capture", spawn_capture_thread(Arc::clone(&ctx))),
        ];
        info!("[CaptureController] Session running for label {}", self.label);

        let rendered = self.render_loop(display, trend_rx);

        // Unwind every loop before the hardware goes away
        self.cancel.store(true, Ordering::SeqCst);
        join_workers(workers);
        drop(ctx);
        session.teardown();

        let snapshot = self.store.snapshot();
        self.play_final_cue(snapshot.state);

        rendered?;
        Ok(CaptureOutcome {
            state: snapshot.state,
            message: snapshot.message,
            progress: snapshot.progress,
            output_dir: self.output_dir(),
            events: self.store.events().snapshot(),
        })
    }

    fn open_session(&self) -> Result<Arc<DeviceSession>, CaptureError> {
        info!("[CaptureController] Connecting to {}", self.address);
        match DeviceSession::open(
            self.connector.as_ref(),
            &self.address,
            self.config.device.stream_buffer_size,
        ) {
            Ok(session) => Ok(Arc::new(session)),
            Err(err) => {
                let err = CaptureError::HardwareInit(err);
                log_capture_error(&err, "open_session");
                self.store.terminate(CaptureState::Error, err.message());
                Err(err)
            }
        }
    }

    fn render_loop(
        &self,
        display: &mut dyn Display,
        mut trend_rx: TrendConsumer,
    ) -> Result<(), CaptureError> {
        let mut history = History::new(self.config.display.max_history);
        let frame_interval = self.config.timing.frame_interval();

        loop {
            trend_rx.drain_into(&mut history);
            let snapshot = self.store.snapshot();
            let frame = ViewFrame {
                label: self.label,
                snapshot: &snapshot,
                history: &history,
                thresholds: &self.config.impedance,
                contact_ok: contact_ok(&snapshot.impedance, &self.config.impedance),
            };

            let intent = match display.render(&frame) {
                Ok(intent) => intent,
                Err(err) => {
                    log_capture_error(&err, "render");
                    self.store.terminate(CaptureState::Error, err.message());
                    return Err(err);
                }
            };

            // The last frame shows the final state; its intent is moot
            if snapshot.state.is_terminal() || self.cancel.load(Ordering::SeqCst) {
                return Ok(());
            }

            match intent {
                UserIntent::Advance => self.handle_advance(),
                UserIntent::Cancel => self.cancel(),
                UserIntent::None => {}
            }

            thread::sleep(frame_interval);
        }
    }

    fn handle_advance(&self) {
        match self.advance() {
            Ok(()) => {}
            Err(CaptureError::ContactNotReady) => {
                self.store
                    .set_message("Electrode contact not ready. Adjust the headset and try again.");
            }
            // Advancing outside setup is a no-op
            Err(CaptureError::InvalidTransition { .. }) => {}
            Err(err) => warn!("[CaptureController] Advance failed: {}", err),
        }
    }

    fn play_final_cue(&self, state: CaptureState) {
        let cue = match state {
            CaptureState::Complete => Cue::CaptureCompleted,
            CaptureState::Error => Cue::CaptureError,
            CaptureState::Cancelled => Cue::Cancelled,
            other => {
                warn!("[CaptureController] Session ended in {}", other.label());
                return;
            }
        };
        self.cue.play(cue);
    }
}

fn join_workers(workers: Vec<(&'static str, JoinHandle<()>)>) {
    for (name, handle) in workers {
        if handle.join().is_err() {
            error!("[CaptureController] {} thread panicked", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{ElectrodeReadings, ReadingKind};
    use crate::testing::{RecordingCue, ScriptedConnector, ScriptedDisplay, ScriptedSession};

    fn controller(cue: Arc<RecordingCue>) -> (CaptureController, crate::testing::ScriptProbe) {
        let (driver, probe) = ScriptedSession::new();
        let connector = Arc::new(ScriptedConnector::new(driver));
        let mut config = AppConfig::default();
        config.capture.initial_delay_secs = 0;
        let controller =
            CaptureController::new(config, ScenarioLabel::Green, connector, cue).unwrap();
        (controller, probe)
    }

    #[test]
    fn test_advance_requires_contact() {
        let cue = Arc::new(RecordingCue::default());
        let (controller, _probe) = controller(Arc::clone(&cue));

        assert_eq!(controller.advance(), Err(CaptureError::ContactNotReady));
        assert_eq!(controller.store().state(), CaptureState::Setup);

        controller
            .store()
            .publish_readings(ReadingKind::Impedance, ElectrodeReadings::uniform(700.0));
        controller.advance().unwrap();

        assert_eq!(controller.store().state(), CaptureState::Countdown);
        assert_eq!(cue.played(), vec![Cue::ContactNotReady, Cue::ContactReady]);
    }

    #[test]
    fn test_advance_outside_setup_is_rejected() {
        let (controller, _probe) = controller(Arc::new(RecordingCue::default()));
        controller.cancel();
        assert!(matches!(
            controller.advance(),
            Err(CaptureError::InvalidTransition {
                from: CaptureState::Cancelled,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let (driver, _probe) = ScriptedSession::new();
        let mut config = AppConfig::default();
        config.capture.window_rows = 0;
        let result = CaptureController::new(
            config,
            ScenarioLabel::Red,
            Arc::new(ScriptedConnector::new(driver)),
            Arc::new(RecordingCue::default()),
        );
        assert!(matches!(result, Err(CaptureError::InvalidConfig { .. })));
    }

    #[test]
    fn test_hardware_init_failure_starts_nothing() {
        let (driver, probe) = ScriptedSession::new();
        probe.fail_start();
        let controller = CaptureController::new(
            AppConfig::default(),
            ScenarioLabel::Red,
            Arc::new(ScriptedConnector::new(driver)),
            Arc::new(RecordingCue::default()),
        )
        .unwrap();
        let mut display = ScriptedDisplay::new();

        let result = controller.run(&mut display);

        assert!(matches!(result, Err(CaptureError::HardwareInit(_))));
        assert_eq!(display.frames_rendered(), 0);
        assert_eq!(controller.store().state(), CaptureState::Error);
        assert!(probe.commands().is_empty());
    }

    #[test]
    fn test_run_twice_is_rejected() {
        let (controller, probe) = controller(Arc::new(RecordingCue::default()));
        controller.cancel();
        let mut display = ScriptedDisplay::new();

        let outcome = controller.run(&mut display).unwrap();
        assert_eq!(outcome.state, CaptureState::Cancelled);
        assert_eq!(probe.release_calls(), 1);
        assert_eq!(
            controller.run(&mut display).unwrap_err(),
            CaptureError::AlreadyStarted
        );
    }
}
