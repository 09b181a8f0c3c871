//! Capture session building blocks.
//!
//! The state machine phases, the row buffer that slices fixed windows out
//! of variable-size reads, the CSV writer and the retry policy applied to
//! transient read failures.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod backoff;
pub mod progress;
pub mod state;
pub mod window;
pub mod writer;

pub use backoff::{RetryDecision, RetryPolicy};
pub use progress::CaptureProgress;
pub use state::CaptureState;
pub use window::WindowBuffer;
pub use writer::{csv_header, window_file_name, SystemClock, WallClock, WindowWriter};

/// Recording scenario; also names the output directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioLabel {
    Red,
    Green,
    Trash,
}

impl ScenarioLabel {
    pub const ALL: [ScenarioLabel; 3] = [ScenarioLabel::Red, ScenarioLabel::Green, ScenarioLabel::Trash];

    pub fn as_str(self) -> &'static str {
        match self {
            ScenarioLabel::Red => "red",
            ScenarioLabel::Green => "green",
            ScenarioLabel::Trash => "trash",
        }
    }
}

impl fmt::Display for ScenarioLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown label '{}', expected one of: red, green, trash", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parsing() {
        assert_eq!("GREEN".parse::<ScenarioLabel>(), Ok(ScenarioLabel::Green));
        assert_eq!(" trash ".parse::<ScenarioLabel>(), Ok(ScenarioLabel::Trash));
        assert!("blue".parse::<ScenarioLabel>().is_err());
        assert_eq!(ScenarioLabel::Red.to_string(), "red");
    }
}
