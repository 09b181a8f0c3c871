// Capture session phases
//
// Setup -> Countdown -> Capture -> Complete is the only forward path.
// Error and Cancelled are escapes; every terminal state is final.

use serde::{Deserialize, Serialize};

/// Session-level phase of a capture run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    /// Checking electrode contact
    Setup,
    /// Waiting out the initial delay
    Countdown,
    /// Persisting windows
    Capture,
    /// Target number of windows saved
    Complete,
    /// Unrecoverable failure
    Error,
    /// Stopped by the user
    Cancelled,
}

impl CaptureState {
    pub fn label(self) -> &'static str {
        match self {
            CaptureState::Setup => "setup",
            CaptureState::Countdown => "countdown",
            CaptureState::Capture => "capture",
            CaptureState::Complete => "complete",
            CaptureState::Error => "error",
            CaptureState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CaptureState::Complete | CaptureState::Error | CaptureState::Cancelled
        )
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: CaptureState) -> bool {
        use CaptureState::*;

        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Cancelled) | (_, Error) => true,
            (Setup, Countdown) => true,
            (Countdown, Capture) => true,
            (Capture, Complete) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path_is_strict() {
        assert!(CaptureState::Setup.can_transition_to(CaptureState::Countdown));
        assert!(CaptureState::Countdown.can_transition_to(CaptureState::Capture));
        assert!(CaptureState::Capture.can_transition_to(CaptureState::Complete));

        assert!(!CaptureState::Setup.can_transition_to(CaptureState::Capture));
        assert!(!CaptureState::Countdown.can_transition_to(CaptureState::Complete));
        assert!(!CaptureState::Capture.can_transition_to(CaptureState::Setup));
    }

    #[test]
    fn test_escapes_allowed_from_any_active_state() {
        for state in [
            CaptureState::Setup,
            CaptureState::Countdown,
            CaptureState::Capture,
        ] {
            assert!(state.can_transition_to(CaptureState::Cancelled));
            assert!(state.can_transition_to(CaptureState::Error));
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for state in [
            CaptureState::Complete,
            CaptureState::Error,
            CaptureState::Cancelled,
        ] {
            assert!(state.is_terminal());
            assert!(!state.can_transition_to(CaptureState::Cancelled));
            assert!(!state.can_transition_to(CaptureState::Setup));
        }
    }
}
