// Display contract between the controller and a rendering front end
//
// The controller hands the display one ViewFrame per pass and gets back
// the user's intent. Key decoding lives here so every front end maps keys
// the same way.

use crate::analysis::{classify, ContactLevel};
use crate::capture::ScenarioLabel;
use crate::config::ImpedanceConfig;
use crate::device::Electrode;
use crate::error::CaptureError;
use crate::telemetry::{History, TelemetrySnapshot};

/// What the user asked for during one rendering pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserIntent {
    #[default]
    None,
    Advance,
    Cancel,
}

/// Raw key input, decoupled from any terminal library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPress {
    Enter,
    Esc,
    CtrlC,
    Char(char),
    Other,
}

pub fn intent_for_key(key: KeyPress) -> UserIntent {
    match key {
        KeyPress::Enter | KeyPress::Char('\n') | KeyPress::Char('\r') => UserIntent::Advance,
        KeyPress::Esc | KeyPress::CtrlC | KeyPress::Char('q') | KeyPress::Char('Q') => {
            UserIntent::Cancel
        }
        _ => UserIntent::None,
    }
}

/// Everything a display needs for one pass
pub struct ViewFrame<'a> {
    pub label: ScenarioLabel,
    pub snapshot: &'a TelemetrySnapshot,
    pub history: &'a History,
    pub thresholds: &'a ImpedanceConfig,
    /// Gate for advancing out of setup
    pub contact_ok: bool,
}

impl ViewFrame<'_> {
    /// Contact level per electrode from the latest impedance readings
    pub fn contact_levels(&self) -> Vec<(Electrode, Option<f64>, ContactLevel)> {
        Electrode::ALL
            .iter()
            .map(|&electrode| {
                let kohm = self.snapshot.impedance.get(electrode);
                let level = classify(kohm.unwrap_or(f64::NAN), self.thresholds);
                (electrode, kohm, level)
            })
            .collect()
    }
}

/// Rendering front end.
///
/// Errors are reported per frame; the controller ends the session and
/// still releases the hardware.
pub trait Display {
    fn render(&mut self, frame: &ViewFrame<'_>) -> Result<UserIntent, CaptureError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::ElectrodeReadings;
    use crate::telemetry::TelemetryStore;

    #[test]
    fn test_key_mapping() {
        assert_eq!(intent_for_key(KeyPress::Enter), UserIntent::Advance);
        assert_eq!(intent_for_key(KeyPress::Char('\r')), UserIntent::Advance);
        assert_eq!(intent_for_key(KeyPress::Char('\n')), UserIntent::Advance);
        assert_eq!(intent_for_key(KeyPress::Esc), UserIntent::Cancel);
        assert_eq!(intent_for_key(KeyPress::Char('q')), UserIntent::Cancel);
        assert_eq!(intent_for_key(KeyPress::Char('Q')), UserIntent::Cancel);
        assert_eq!(intent_for_key(KeyPress::CtrlC), UserIntent::Cancel);
        assert_eq!(intent_for_key(KeyPress::Char('x')), UserIntent::None);
        assert_eq!(intent_for_key(KeyPress::Other), UserIntent::None);
    }

    #[test]
    fn test_contact_levels_follow_readings() {
        let store = TelemetryStore::new(1, 4000.0);
        let mut readings = ElectrodeReadings::uniform(500.0);
        readings.insert(Electrode::O1, 1700.0);
        store.publish_readings(crate::telemetry::ReadingKind::Impedance, readings);

        let snapshot = store.snapshot();
        let history = History::new(5);
        let thresholds = ImpedanceConfig::default();
        let frame = ViewFrame {
            label: ScenarioLabel::Red,
            snapshot: &snapshot,
            history: &history,
            thresholds: &thresholds,
            contact_ok: false,
        };

        let levels = frame.contact_levels();
        assert_eq!(levels[0].2, ContactLevel::Excellent);
        assert_eq!(levels[2], (Electrode::O1, Some(1700.0), ContactLevel::Poor));
    }
}
