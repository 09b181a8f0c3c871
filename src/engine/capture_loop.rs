// Window capture and persistence loop
//
// Active only while the session is in Capture and the headset has settled
// in signal mode. Every window interval one large block is read, projected
// to timestamp + electrode columns and appended to the buffer; whole
// windows are then written in order. The loop stops exactly at the target
// count and drops any leftover rows.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, info, warn};

use super::LoopContext;
use crate::capture::{CaptureState, RetryDecision, RetryPolicy, WindowBuffer, WindowWriter};
use crate::device::DeviceMode;
use crate::error::{CaptureError, DeviceError, ErrorCode};
use crate::telemetry::CaptureEvent;

pub const CAPTURE_COMPLETED_MESSAGE: &str = "Capture completed! Processing data...";

pub fn spawn_capture_thread(ctx: Arc<LoopContext>) -> JoinHandle<()> {
    thread::spawn(move || CaptureWorker::new(ctx).run())
}

/// A failed capture step, with whether it must end the session
struct StepFailure {
    context: &'static str,
    code: i32,
    message: String,
    fatal: bool,
}

impl From<DeviceError> for StepFailure {
    fn from(err: DeviceError) -> Self {
        Self {
            context: "capture_read",
            code: err.code(),
            message: err.message(),
            fatal: err.is_fatal(),
        }
    }
}

impl From<CaptureError> for StepFailure {
    fn from(err: CaptureError) -> Self {
        Self {
            context: "window_write",
            code: err.code(),
            message: err.message(),
            fatal: err.is_fatal(),
        }
    }
}

enum Flow {
    Continue,
    Stop,
}

struct CaptureWorker {
    ctx: Arc<LoopContext>,
    buffer: WindowBuffer,
    writer: WindowWriter,
    retry: RetryPolicy,
    saved: usize,
}

impl CaptureWorker {
    fn new(ctx: Arc<LoopContext>) -> Self {
        let capture = &ctx.config.capture;
        let buffer = WindowBuffer::new(capture.window_rows);
        let writer = WindowWriter::new(&capture.output_dir, ctx.label.as_str(), ctx.clock.clone());
        let retry = RetryPolicy::new(&ctx.config.retry);
        Self {
            ctx,
            buffer,
            writer,
            retry,
            saved: 0,
        }
    }

    fn run(mut self) {
        info!("[CaptureLoop] Started, writing to {:?}", self.writer.dir());
        let tick = self.ctx.config.timing.capture_tick();
        let interval = self.ctx.config.capture.window_interval();

        while !self.ctx.cancelled() {
            match self.ctx.store.state() {
                CaptureState::Capture => {}
                CaptureState::Setup | CaptureState::Countdown => {
                    self.ctx.sleep(tick);
                    continue;
                }
                _ => break,
            }

            // Only signal-mode samples may land in a window
            if self.ctx.store.device_mode() != DeviceMode::Signal {
                self.ctx.sleep(tick);
                continue;
            }

            match self.step() {
                Ok(Flow::Stop) => break,
                Ok(Flow::Continue) => {
                    self.ctx.sleep(interval);
                }
                Err(failure) => {
                    if let Flow::Stop = self.handle_failure(failure) {
                        break;
                    }
                }
            }
        }

        info!("[CaptureLoop] Exiting with {} windows saved", self.saved);
    }

    /// One read followed by as many window writes as the buffer allows
    fn step(&mut self) -> Result<Flow, StepFailure> {
        let batch = self.ctx.config.capture.capture_batch();
        let block = self.ctx.session.read(batch)?;
        let rows = block.window_rows(&self.ctx.config.device.layout)?;
        self.buffer.extend(rows);

        let target = self.ctx.config.capture.target_windows;
        while let Some(window) = self.buffer.pop_window() {
            // Nothing may be written once cancellation is observed
            if self.ctx.cancelled() || self.ctx.store.state() != CaptureState::Capture {
                self.buffer.restore_front(window);
                return Ok(Flow::Stop);
            }

            let path = match self.writer.write(self.saved, &window) {
                Ok(path) => path,
                Err(err) => {
                    self.buffer.restore_front(window);
                    return Err(err.into());
                }
            };

            self.saved += 1;
            self.retry.record_success();
            let progress = self.ctx.store.record_saved(self.saved);
            info!(
                "[CaptureLoop] Saved window {}/{} to {:?}",
                progress.saved, progress.target, path
            );
            self.ctx.store.events().publish(CaptureEvent::WindowSaved {
                sequence: self.saved - 1,
                path: path.display().to_string(),
                rows: window.len(),
            });

            if self.saved >= target {
                self.finish();
                return Ok(Flow::Stop);
            }
        }

        Ok(Flow::Continue)
    }

    fn finish(&mut self) {
        let discarded = self.buffer.clear();
        if discarded > 0 {
            info!("[CaptureLoop] Discarding {} leftover rows", discarded);
            self.ctx
                .store
                .events()
                .publish(CaptureEvent::RowsDiscarded { rows: discarded });
        }

        match self.ctx.store.transition(
            CaptureState::Capture,
            CaptureState::Complete,
            CAPTURE_COMPLETED_MESSAGE,
        ) {
            Ok(true) => info!("[CaptureLoop] Target reached"),
            Ok(false) => info!("[CaptureLoop] Target reached after session ended"),
            Err(err) => error!("[CaptureLoop] {}", err),
        }
    }

    /// Retry a transient failure, or move the session to Error.
    ///
    /// Only failures after the first saved window are ever retried.
    fn handle_failure(&mut self, failure: StepFailure) -> Flow {
        if !failure.fatal && self.saved > 0 {
            if let RetryDecision::Retry(delay) = self.retry.record_failure() {
                warn!(
                    "[CaptureLoop] {} failed ({} consecutive), retrying in {:?}: {}",
                    failure.context,
                    self.retry.consecutive_failures(),
                    delay,
                    failure.message
                );
                self.ctx.store.events().publish(CaptureEvent::ReadFailed {
                    context: failure.context.to_string(),
                    code: failure.code,
                    message: failure.message,
                });
                self.ctx.sleep(delay);
                return Flow::Continue;
            }
        }

        let message = format!("Error capturing data: {}", failure.message);
        error!(
            "[CaptureLoop] {} (code {}, fatal={}, saved={})",
            message, failure.code, failure.fatal, self.saved
        );
        if let Err(err) =
            self.ctx
                .store
                .transition(CaptureState::Capture, CaptureState::Error, message)
        {
            error!("[CaptureLoop] {}", err);
        }
        Flow::Stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unremovable_record_ends_the_session() {
        let failure = StepFailure::from(CaptureError::PartialRecord {
            path: "red_000.csv".to_string(),
            reason: "disk full; cleanup failed: permission denied".to_string(),
        });
        assert!(failure.fatal);
        assert_eq!(failure.context, "window_write");
        assert_eq!(failure.code, 2008);
    }

    #[test]
    fn test_clean_write_failure_may_be_retried() {
        let failure = StepFailure::from(CaptureError::WriteFailed {
            path: "red_000.csv".to_string(),
            reason: "disk full".to_string(),
        });
        assert!(!failure.fatal);
    }
}
