// Neural Capture - EEG acquisition controller
// Guided electrode check and labelled window capture for a BrainBit headband

// Module declarations
pub mod analysis;
pub mod capture;
pub mod config;
pub mod cue;
pub mod device;
pub mod engine;
pub mod error;
pub mod telemetry;
pub mod testing;

// Re-exports for convenience
pub use capture::{CaptureState, ScenarioLabel};
pub use config::AppConfig;
pub use engine::{CaptureController, CaptureOutcome};
pub use error::{CaptureError, DeviceError, ErrorCode};
