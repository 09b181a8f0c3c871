// Capture error types and constants

use crate::capture::CaptureState;
use crate::error::{DeviceError, ErrorCode};
use log::error;
use std::fmt;

/// Capture error code constants
///
/// Error code range: 2001-2008
pub struct CaptureErrorCodes {}

impl CaptureErrorCodes {
    /// Advance requested while electrode contact is not acceptable
    pub const CONTACT_NOT_READY: i32 = 2001;

    /// Requested state transition is not allowed
    pub const INVALID_TRANSITION: i32 = 2002;

    /// Persisting a window failed
    pub const WRITE_FAILED: i32 = 2003;

    /// Configuration values are inconsistent
    pub const INVALID_CONFIG: i32 = 2004;

    /// Hardware could not be initialised
    pub const HARDWARE_INIT: i32 = 2005;

    /// The controller was already run
    pub const ALREADY_STARTED: i32 = 2006;

    /// The display collaborator failed to render a frame
    pub const DISPLAY_FAILED: i32 = 2007;

    /// A failed write left a short record that could not be removed
    pub const PARTIAL_RECORD: i32 = 2008;
}

/// Log a capture error with structured context
pub fn log_capture_error(err: &CaptureError, context: &str) {
    error!(
        "Capture error in {}: code={}, component=CaptureController, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Capture session errors
///
/// These cover the session-level failures: gating, state transitions,
/// window persistence, configuration and hardware bring-up.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// At least one electrode is outside the acceptable contact band
    ContactNotReady,

    /// Transition rejected by the state machine
    InvalidTransition { from: CaptureState, to: CaptureState },

    /// Writing a window record failed
    WriteFailed { path: String, reason: String },

    /// Configuration rejected by validation
    InvalidConfig { reason: String },

    /// Hardware bring-up failed, no threads were started
    HardwareInit(DeviceError),

    /// `run` was called twice on the same controller
    AlreadyStarted,

    /// Rendering a frame failed
    DisplayFailed { reason: String },

    /// A short record is still on disk after a failed write
    PartialRecord { path: String, reason: String },
}

impl CaptureError {
    /// Errors that must end the session instead of being retried
    pub fn is_fatal(&self) -> bool {
        matches!(self, CaptureError::PartialRecord { .. })
    }
}

impl ErrorCode for CaptureError {
    fn code(&self) -> i32 {
        match self {
            CaptureError::ContactNotReady => CaptureErrorCodes::CONTACT_NOT_READY,
            CaptureError::InvalidTransition { .. } => CaptureErrorCodes::INVALID_TRANSITION,
            CaptureError::WriteFailed { .. } => CaptureErrorCodes::WRITE_FAILED,
            CaptureError::InvalidConfig { .. } => CaptureErrorCodes::INVALID_CONFIG,
            CaptureError::HardwareInit(_) => CaptureErrorCodes::HARDWARE_INIT,
            CaptureError::AlreadyStarted => CaptureErrorCodes::ALREADY_STARTED,
            CaptureError::DisplayFailed { .. } => CaptureErrorCodes::DISPLAY_FAILED,
            CaptureError::PartialRecord { .. } => CaptureErrorCodes::PARTIAL_RECORD,
        }
    }

    fn message(&self) -> String {
        match self {
            CaptureError::ContactNotReady => {
                "Electrode contact not ready. Adjust the headset until all electrodes are acceptable."
                    .to_string()
            }
            CaptureError::InvalidTransition { from, to } => {
                format!("Cannot move from {} to {}", from.label(), to.label())
            }
            CaptureError::WriteFailed { path, reason } => {
                format!("Failed to write {}: {}", path, reason)
            }
            CaptureError::InvalidConfig { reason } => format!("Invalid configuration: {}", reason),
            CaptureError::HardwareInit(err) => {
                format!("Error initializing hardware: {}", err.message())
            }
            CaptureError::AlreadyStarted => "Capture controller already started".to_string(),
            CaptureError::DisplayFailed { reason } => format!("Display error: {}", reason),
            CaptureError::PartialRecord { path, reason } => {
                format!("Incomplete record left at {}: {}", path, reason)
            }
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CaptureError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::HardwareInit(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::WriteFailed {
            path: String::new(),
            reason: err.to_string(),
        }
    }
}
