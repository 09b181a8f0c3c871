//! Configuration management for capture sessions
//!
//! This module provides runtime configuration loading from JSON files so
//! that window sizes, thresholds and loop timings can be adjusted without
//! recompilation. Defaults mirror the values used for dataset collection
//! with the BrainBit headband.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::device::ChannelLayout;
use crate::error::CaptureError;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub impedance: ImpedanceConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Window capture parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Number of window files to persist before the session completes
    pub target_windows: usize,
    /// Interval between capture reads in seconds
    pub window_seconds: f64,
    /// Exact number of data rows in every window file
    pub window_rows: usize,
    /// Countdown before capture starts, in seconds
    pub initial_delay_secs: u64,
    /// Root directory; windows land in `<output_dir>/<label>/`
    pub output_dir: PathBuf,
    /// Native sample rate of the headset stream
    pub sample_rate_hz: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_windows: 100,
            window_seconds: 10.0,
            window_rows: 100,
            initial_delay_secs: 30,
            output_dir: PathBuf::from("../dataset"),
            sample_rate_hz: 250,
        }
    }
}

impl CaptureConfig {
    /// Rows requested from the device on every capture read
    pub fn capture_batch(&self) -> usize {
        ((self.sample_rate_hz as f64) * self.window_seconds).round().max(1.0) as usize
    }

    pub fn window_interval(&self) -> Duration {
        Duration::from_secs_f64(self.window_seconds.max(0.0))
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}

/// Headset connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// MAC address used when none is given on the command line
    pub mac_address: String,
    /// Ring buffer size handed to the driver when the stream starts
    pub stream_buffer_size: usize,
    /// Rows requested by each poll-loop read
    pub poll_batch: usize,
    #[serde(default)]
    pub layout: ChannelLayout,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            mac_address: "C8:8F:B6:6D:E1:E2".to_string(),
            stream_buffer_size: 450_000,
            poll_batch: 100,
            layout: ChannelLayout::default(),
        }
    }
}

/// Contact quality thresholds, all in kΩ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpedanceConfig {
    /// Below this the contact is shorted
    pub too_low: f64,
    /// Below this the contact is excellent
    pub excellent: f64,
    /// Below this the contact is acceptable
    pub acceptable: f64,
    /// Below this the contact is poor, above it the contact is open
    pub poor: f64,
    /// Exclusive lower bound of plausible readings
    pub valid_min: f64,
    /// Exclusive upper bound of plausible readings
    pub valid_max: f64,
    /// Published when a batch carries no plausible reading
    pub fallback: f64,
}

impl Default for ImpedanceConfig {
    fn default() -> Self {
        Self {
            too_low: 200.0,
            excellent: 800.0,
            acceptable: 1500.0,
            poor: 2000.0,
            valid_min: 1.0,
            valid_max: 5000.0,
            fallback: 4000.0,
        }
    }
}

/// Loop pacing, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    pub poll_interval_ms: u64,
    pub mode_settle_ms: u64,
    pub read_retry_ms: u64,
    pub idle_ms: u64,
    pub capture_tick_ms: u64,
    pub countdown_tick_ms: u64,
    pub frame_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            mode_settle_ms: 1000,
            read_retry_ms: 500,
            idle_ms: 500,
            capture_tick_ms: 100,
            countdown_tick_ms: 100,
            frame_interval_ms: 100,
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn mode_settle(&self) -> Duration {
        Duration::from_millis(self.mode_settle_ms)
    }

    pub fn read_retry(&self) -> Duration {
        Duration::from_millis(self.read_retry_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    pub fn capture_tick(&self) -> Duration {
        Duration::from_millis(self.capture_tick_ms)
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

/// Bounded retry policy for transient read failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Consecutive transient failures tolerated before escalating to fatal
    pub max_consecutive_failures: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
            base_backoff_ms: 1000,
            max_backoff_ms: 5000,
        }
    }
}

/// Terminal view parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Points kept per electrode trend line
    pub max_history: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { max_history: 50 }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// Missing files and invalid JSON fall back to the defaults with a
    /// warning, so a fresh checkout runs without any config present.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    pub fn load() -> Self {
        Self::load_from_file("assets/capture_config.json")
    }

    /// Reject configurations the capture engine cannot honour
    pub fn validate(&self) -> Result<(), CaptureError> {
        let invalid = |reason: &str| {
            Err(CaptureError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if self.capture.window_rows == 0 {
            return invalid("window_rows must be > 0");
        }
        if self.capture.target_windows == 0 {
            return invalid("target_windows must be > 0");
        }
        if self.capture.sample_rate_hz == 0 {
            return invalid("sample_rate_hz must be > 0");
        }
        if !(self.capture.window_seconds > 0.0) {
            return invalid("window_seconds must be > 0");
        }
        if self.device.poll_batch == 0 {
            return invalid("poll_batch must be > 0");
        }

        let imp = &self.impedance;
        let ascending = imp.too_low < imp.excellent
            && imp.excellent < imp.acceptable
            && imp.acceptable < imp.poor;
        if !ascending {
            return invalid("impedance thresholds must be strictly ascending");
        }
        if !(imp.valid_min < imp.valid_max) {
            return invalid("impedance valid range is empty");
        }
        if self.retry.max_consecutive_failures == 0 {
            return invalid("max_consecutive_failures must be > 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.capture.target_windows, 100);
        assert_eq!(config.capture.window_rows, 100);
        assert_eq!(config.capture.initial_delay_secs, 30);
        assert_eq!(config.capture.capture_batch(), 2500);
        assert_eq!(config.impedance.excellent, 800.0);
        assert_eq!(config.device.mac_address, "C8:8F:B6:6D:E1:E2");
        assert_eq!(config.display.max_history, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "capture": { "target_windows": 3, "window_seconds": 0.1,
            "window_rows": 100, "initial_delay_secs": 0, "output_dir": "out",
            "sample_rate_hz": 250 } }"#;
        let parsed: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.capture.target_windows, 3);
        assert_eq!(parsed.capture.capture_batch(), 25);
        assert_eq!(parsed.timing.poll_interval_ms, 200);
        assert_eq!(parsed.impedance.poor, 2000.0);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::load_from_file("/nonexistent/capture_config.json");
        assert_eq!(config.capture.target_windows, 100);
    }

    #[test]
    fn test_validate_rejects_unordered_thresholds() {
        let mut config = AppConfig::default();
        config.impedance.acceptable = 700.0;
        match config.validate() {
            Err(CaptureError::InvalidConfig { reason }) => {
                assert!(reason.contains("ascending"))
            }
            other => panic!("Expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_zero_rows() {
        let mut config = AppConfig::default();
        config.capture.window_rows = 0;
        assert!(config.validate().is_err());
    }
}
