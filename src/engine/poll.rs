// Device poll loop
//
// Keeps the telemetry snapshot fresh at roughly 5 Hz. When the capture
// state changes the device is switched to the matching mode and given a
// moment to settle before reads resume. Failures are logged and retried;
// only cancellation ends the loop.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use super::LoopContext;
use crate::analysis::{impedance_readings, signal_readings};
use crate::capture::CaptureState;
use crate::device::DeviceMode;
use crate::error::{DeviceError, ErrorCode};
use crate::telemetry::{CaptureEvent, ReadingKind, TrendProducer, TrendSample};

/// Device mode the headset should be in for a capture state.
///
/// Terminal states leave the device alone; teardown stops it.
pub fn target_mode(state: CaptureState) -> Option<DeviceMode> {
    match state {
        CaptureState::Setup => Some(DeviceMode::Impedance),
        CaptureState::Countdown | CaptureState::Capture => Some(DeviceMode::Signal),
        CaptureState::Complete | CaptureState::Error | CaptureState::Cancelled => None,
    }
}

pub fn spawn_poll_thread(ctx: Arc<LoopContext>, trend: TrendProducer) -> JoinHandle<()> {
    thread::spawn(move || PollWorker::new(ctx, trend).run())
}

struct PollWorker {
    ctx: Arc<LoopContext>,
    trend: TrendProducer,
    observed: Option<CaptureState>,
}

impl PollWorker {
    fn new(ctx: Arc<LoopContext>, trend: TrendProducer) -> Self {
        Self {
            ctx,
            trend,
            observed: None,
        }
    }

    fn run(mut self) {
        info!("[PollLoop] Started");
        let timing = self.ctx.config.timing.clone();

        while !self.ctx.cancelled() {
            let state = self.ctx.store.state();

            if self.observed != Some(state) {
                match self.follow_state(state) {
                    Ok(()) => self.observed = Some(state),
                    Err(err) => {
                        self.report("switch_mode", &err);
                        self.ctx.sleep(timing.read_retry());
                        continue;
                    }
                }
            }

            if state.is_terminal() {
                self.ctx.sleep(timing.idle());
                continue;
            }

            let kind = match self.ctx.session.mode() {
                DeviceMode::Impedance => ReadingKind::Impedance,
                DeviceMode::Signal => ReadingKind::Signal,
                DeviceMode::None => {
                    self.ctx.sleep(timing.idle());
                    continue;
                }
            };

            if let Err(err) = self.poll_once(kind) {
                self.report("poll_read", &err);
                self.ctx.sleep(timing.read_retry());
                continue;
            }

            self.ctx.sleep(timing.poll_interval());
        }

        info!("[PollLoop] Cancelled, exiting");
    }

    fn follow_state(&mut self, state: CaptureState) -> Result<(), DeviceError> {
        let Some(target) = target_mode(state) else {
            return Ok(());
        };

        let switched = match self.ctx.session.switch_mode(target) {
            Ok(switched) => switched,
            Err(err) => {
                // Publish whatever mode the device was left in
                self.ctx.store.set_device_mode(self.ctx.session.mode());
                return Err(err);
            }
        };

        // The new mode is announced only once the stream has settled, so
        // nothing downstream consumes samples from the transition
        if switched {
            debug!("[PollLoop] Settling after switch to {:?}", target);
            if self.ctx.sleep(self.ctx.config.timing.mode_settle()) {
                return Ok(());
            }
        }
        self.ctx.store.set_device_mode(self.ctx.session.mode());
        Ok(())
    }

    fn poll_once(&mut self, kind: ReadingKind) -> Result<(), DeviceError> {
        let block = self.ctx.session.read(self.ctx.config.device.poll_batch)?;
        let layout = &self.ctx.config.device.layout;
        let readings = match kind {
            ReadingKind::Impedance => {
                impedance_readings(&block, layout, &self.ctx.config.impedance)
            }
            ReadingKind::Signal => signal_readings(&block, layout),
        };

        self.ctx.store.publish_readings(kind, readings.clone());
        self.trend.push(TrendSample { kind, readings });
        Ok(())
    }

    fn report(&self, context: &str, err: &DeviceError) {
        warn!("[PollLoop] {} failed, retrying: {}", context, err);
        self.ctx.store.events().publish(CaptureEvent::ReadFailed {
            context: context.to_string(),
            code: err.code(),
            message: err.message(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_mode_per_state() {
        assert_eq!(target_mode(CaptureState::Setup), Some(DeviceMode::Impedance));
        assert_eq!(target_mode(CaptureState::Countdown), Some(DeviceMode::Signal));
        assert_eq!(target_mode(CaptureState::Capture), Some(DeviceMode::Signal));
        assert_eq!(target_mode(CaptureState::Complete), None);
        assert_eq!(target_mode(CaptureState::Cancelled), None);
    }
}
