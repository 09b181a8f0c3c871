//! Failures of the headset link and of a capture session.
//!
//! [`DeviceError`] covers the driver boundary (1001-1008) and
//! [`CaptureError`] the session itself (2001-2008). Both carry a fixed
//! numeric code so a log line, a `ReadFailed` event and the status bar all
//! name the same failure.

mod capture;
mod device;

pub use capture::{log_capture_error, CaptureError, CaptureErrorCodes};
pub use device::{log_device_error, DeviceError, DeviceErrorCodes};

/// Numeric code plus operator-facing text for an error.
pub trait ErrorCode {
    /// Stable across releases; never reused for a different failure
    fn code(&self) -> i32;

    /// Sentence shown to the operator, without the code
    fn message(&self) -> String;
}
