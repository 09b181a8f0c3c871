// Device error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Device error code constants
///
/// Error code range: 1001-1008
pub struct DeviceErrorCodes {}

impl DeviceErrorCodes {
    /// Could not connect to the headset
    pub const CONNECT_FAILED: i32 = 1001;

    /// Session preparation or stream start failed
    pub const STREAM_START_FAILED: i32 = 1002;

    /// Switching between impedance and signal mode failed
    pub const MODE_SWITCH_FAILED: i32 = 1003;

    /// A single read from the stream failed
    pub const READ_FAILED: i32 = 1004;

    /// The headset link dropped
    pub const DISCONNECTED: i32 = 1005;

    /// The returned block did not contain the expected channels
    pub const MALFORMED_BLOCK: i32 = 1006;

    /// The session was already released
    pub const SESSION_RELEASED: i32 = 1007;

    /// Session mutex was poisoned
    pub const LOCK_POISONED: i32 = 1008;
}

/// Log a device error with structured context
///
/// Fields logged:
/// - error_code: Numeric error code for programmatic handling
/// - component: The component where the error occurred
/// - message: Human-readable error message
/// - context: Call site that observed the failure
pub fn log_device_error(err: &DeviceError, context: &str) {
    error!(
        "Device error in {}: code={}, component=DeviceSession, fatal={}, message={}",
        context,
        err.code(),
        err.is_fatal(),
        err.message()
    );
}

/// Hardware session errors
///
/// Every call on the hardware session may fail with one of these. Most are
/// transient and retried by the background loops; [`DeviceError::is_fatal`]
/// marks the ones that must end the capture session.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// Connecting to the headset failed
    ConnectFailed { address: String, reason: String },

    /// Preparing the session or starting the stream failed
    StreamStartFailed { reason: String },

    /// A mode command was rejected by the device
    ModeSwitchFailed { command: String, reason: String },

    /// Reading a sample block failed
    ReadFailed { reason: String },

    /// The headset link was lost
    Disconnected { reason: String },

    /// The returned block is missing a required channel
    MalformedBlock { channel: usize, available: usize },

    /// The session has already been torn down
    SessionReleased,

    /// The session mutex was poisoned by a panicking thread
    LockPoisoned { component: String },
}

impl DeviceError {
    /// Whether the failure ends the session regardless of capture progress
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DeviceError::Disconnected { .. }
                | DeviceError::SessionReleased
                | DeviceError::LockPoisoned { .. }
        )
    }
}

impl ErrorCode for DeviceError {
    fn code(&self) -> i32 {
        match self {
            DeviceError::ConnectFailed { .. } => DeviceErrorCodes::CONNECT_FAILED,
            DeviceError::StreamStartFailed { .. } => DeviceErrorCodes::STREAM_START_FAILED,
            DeviceError::ModeSwitchFailed { .. } => DeviceErrorCodes::MODE_SWITCH_FAILED,
            DeviceError::ReadFailed { .. } => DeviceErrorCodes::READ_FAILED,
            DeviceError::Disconnected { .. } => DeviceErrorCodes::DISCONNECTED,
            DeviceError::MalformedBlock { .. } => DeviceErrorCodes::MALFORMED_BLOCK,
            DeviceError::SessionReleased => DeviceErrorCodes::SESSION_RELEASED,
            DeviceError::LockPoisoned { .. } => DeviceErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            DeviceError::ConnectFailed { address, reason } => {
                format!("Failed to connect to {}: {}", address, reason)
            }
            DeviceError::StreamStartFailed { reason } => {
                format!("Failed to start stream: {}", reason)
            }
            DeviceError::ModeSwitchFailed { command, reason } => {
                format!("Device rejected {}: {}", command, reason)
            }
            DeviceError::ReadFailed { reason } => format!("Read failed: {}", reason),
            DeviceError::Disconnected { reason } => format!("Headset disconnected: {}", reason),
            DeviceError::MalformedBlock { channel, available } => format!(
                "Sample block has {} channels, channel {} is missing",
                available, channel
            ),
            DeviceError::SessionReleased => "Session already released".to_string(),
            DeviceError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeviceError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for DeviceError {}

impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        DeviceError::ReadFailed {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_codes() {
        assert_eq!(
            DeviceError::ConnectFailed {
                address: "x".to_string(),
                reason: "y".to_string()
            }
            .code(),
            DeviceErrorCodes::CONNECT_FAILED
        );
        assert_eq!(
            DeviceError::ReadFailed {
                reason: "timeout".to_string()
            }
            .code(),
            DeviceErrorCodes::READ_FAILED
        );
        assert_eq!(
            DeviceError::SessionReleased.code(),
            DeviceErrorCodes::SESSION_RELEASED
        );
        assert_eq!(
            DeviceError::MalformedBlock {
                channel: 10,
                available: 4
            }
            .code(),
            1006
        );
    }

    #[test]
    fn test_fatal_classification_is_structural() {
        // A transient error mentioning "fatal" in its text stays transient
        let err = DeviceError::ReadFailed {
            reason: "Fatal-looking vendor message".to_string(),
        };
        assert!(!err.is_fatal());

        assert!(DeviceError::Disconnected {
            reason: "link lost".to_string()
        }
        .is_fatal());
        assert!(DeviceError::SessionReleased.is_fatal());
        assert!(!DeviceError::MalformedBlock {
            channel: 1,
            available: 0
        }
        .is_fatal());
    }

    #[test]
    fn test_device_error_display() {
        let err = DeviceError::ModeSwitchFailed {
            command: "StartSignal".to_string(),
            reason: "busy".to_string(),
        };
        let display = format!("{}", err);
        assert!(display.contains("DeviceError"));
        assert!(display.contains("1003"));
        assert!(err.message().contains("StartSignal"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::other("pipe closed");
        let err: DeviceError = io_err.into();
        match err {
            DeviceError::ReadFailed { reason } => assert!(reason.contains("pipe closed")),
            other => panic!("Expected ReadFailed, got {:?}", other),
        }
    }
}
