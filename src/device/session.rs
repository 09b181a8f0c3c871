// DeviceSession: exclusive owner of the driver connection
//
// All driver calls go through one mutex, so mode switches and reads are
// serialised. The lock is held only for the duration of a single driver
// call; settle pauses and sleeps happen in the callers.

use std::sync::{Mutex, MutexGuard};

use log::{debug, info, warn};

use super::{BoardCommand, DeviceConnector, DeviceMode, HardwareSession, SampleBlock};
use crate::error::{log_device_error, DeviceError, ErrorCode};

struct SessionInner {
    driver: Box<dyn HardwareSession>,
    mode: DeviceMode,
    streaming: bool,
    released: bool,
}

/// Serialised, teardown-once wrapper around a [`HardwareSession`]
pub struct DeviceSession {
    inner: Mutex<SessionInner>,
}

/// Commands needed to move the headset from one mode to another.
///
/// Switching always stops the active stream before starting the next.
fn transition_commands(from: DeviceMode, to: DeviceMode) -> &'static [BoardCommand] {
    match (from, to) {
        (DeviceMode::None, DeviceMode::None)
        | (DeviceMode::Impedance, DeviceMode::Impedance)
        | (DeviceMode::Signal, DeviceMode::Signal) => &[],
        (DeviceMode::None, DeviceMode::Impedance) => &[BoardCommand::StartImpedance],
        (DeviceMode::None, DeviceMode::Signal) => &[BoardCommand::StartSignal],
        (DeviceMode::Impedance, DeviceMode::None) => &[BoardCommand::StopImpedance],
        (DeviceMode::Signal, DeviceMode::None) => &[BoardCommand::StopSignal],
        (DeviceMode::Impedance, DeviceMode::Signal) => {
            &[BoardCommand::StopImpedance, BoardCommand::StartSignal]
        }
        (DeviceMode::Signal, DeviceMode::Impedance) => {
            &[BoardCommand::StopSignal, BoardCommand::StartImpedance]
        }
    }
}

/// Mode the headset is left in once `command` has been accepted
fn mode_after(command: BoardCommand) -> DeviceMode {
    match command {
        BoardCommand::StartSignal => DeviceMode::Signal,
        BoardCommand::StartImpedance => DeviceMode::Impedance,
        BoardCommand::StopSignal | BoardCommand::StopImpedance => DeviceMode::None,
    }
}

impl DeviceSession {
    /// Connect, prepare and start streaming.
    ///
    /// No mode is activated here; the poll loop selects one from the
    /// capture state. If the stream cannot start the driver is released
    /// before the error is returned.
    pub fn open(
        connector: &dyn DeviceConnector,
        address: &str,
        buffer_size: usize,
    ) -> Result<Self, DeviceError> {
        let mut driver = connector.connect(address).inspect_err(|err| {
            log_device_error(err, "connect");
        })?;

        let started = driver
            .prepare()
            .and_then(|_| driver.start(buffer_size))
            .map_err(|err| match err {
                DeviceError::StreamStartFailed { .. } => err,
                other => DeviceError::StreamStartFailed {
                    reason: other.to_string(),
                },
            });

        if let Err(err) = started {
            log_device_error(&err, "start_stream");
            if let Err(release_err) = driver.release() {
                warn!("[DeviceSession] Release after failed start also failed: {}", release_err);
            }
            return Err(err);
        }

        info!("[DeviceSession] Stream started for {}", address);
        Ok(Self::from_parts(driver, true))
    }

    /// Wrap an already-started driver
    pub fn from_started(driver: Box<dyn HardwareSession>) -> Self {
        Self::from_parts(driver, true)
    }

    fn from_parts(driver: Box<dyn HardwareSession>, streaming: bool) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                driver,
                mode: DeviceMode::None,
                streaming,
                released: false,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionInner>, DeviceError> {
        let guard = self.inner.lock().map_err(|_| DeviceError::LockPoisoned {
            component: "device_session".to_string(),
        })?;
        if guard.released {
            return Err(DeviceError::SessionReleased);
        }
        Ok(guard)
    }

    pub fn mode(&self) -> DeviceMode {
        match self.inner.lock() {
            Ok(guard) => guard.mode,
            Err(poisoned) => poisoned.into_inner().mode,
        }
    }

    pub fn is_released(&self) -> bool {
        match self.inner.lock() {
            Ok(guard) => guard.released,
            Err(poisoned) => poisoned.into_inner().released,
        }
    }

    /// Stop the active mode and start `target`.
    ///
    /// Returns `Ok(false)` when the headset is already in `target`. On a
    /// partial failure the tracked mode reflects the last accepted command.
    pub fn switch_mode(&self, target: DeviceMode) -> Result<bool, DeviceError> {
        let mut inner = self.lock()?;
        let commands = transition_commands(inner.mode, target);
        if commands.is_empty() {
            return Ok(false);
        }

        for &command in commands {
            inner
                .driver
                .set_mode(command)
                .map_err(|err| match err {
                    DeviceError::ModeSwitchFailed { .. } => err,
                    other if other.is_fatal() => other,
                    other => DeviceError::ModeSwitchFailed {
                        command: command.as_str().to_string(),
                        reason: other.message(),
                    },
                })?;
            inner.mode = mode_after(command);
            debug!("[DeviceSession] {} accepted", command.as_str());
        }

        info!("[DeviceSession] Device mode is now {:?}", inner.mode);
        Ok(true)
    }

    pub fn read(&self, n_samples: usize) -> Result<SampleBlock, DeviceError> {
        let mut inner = self.lock()?;
        inner.driver.read(n_samples)
    }

    /// Stop the active mode, stop the stream and release the driver.
    ///
    /// Runs at most once; later calls (including the one from `Drop`)
    /// return `false` without touching the driver. Each step is attempted
    /// even if an earlier one failed.
    pub fn teardown(&self) -> bool {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if inner.released {
            return false;
        }
        inner.released = true;

        let stop_mode = match inner.mode {
            DeviceMode::Signal => Some(BoardCommand::StopSignal),
            DeviceMode::Impedance => Some(BoardCommand::StopImpedance),
            DeviceMode::None => None,
        };
        if let Some(command) = stop_mode {
            if let Err(err) = inner.driver.set_mode(command) {
                log_device_error(&err, "teardown_stop_mode");
            }
            inner.mode = DeviceMode::None;
        }

        if inner.streaming {
            if let Err(err) = inner.driver.stop() {
                log_device_error(&err, "teardown_stop_stream");
            }
            inner.streaming = false;
        }

        if let Err(err) = inner.driver.release() {
            log_device_error(&err, "teardown_release");
        }

        info!("[DeviceSession] Resources released");
        true
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
