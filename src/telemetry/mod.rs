//! Live telemetry shared between the acquisition threads and the UI.
//!
//! [`TelemetryStore`] is the single mutex-guarded snapshot of readings and
//! capture state; it is only ever read through copy-out accessors.
//! Trend lines travel separately over a lock-free SPSC feed into a
//! [`History`] owned by the rendering thread, and every session event is
//! broadcast on an [`EventBus`], which an [`EventJournal`] can mirror into
//! the log.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::device::Electrode;

pub mod events;
pub mod history;
pub mod store;

pub use events::{CaptureEvent, EventBus, EventJournal, EventSnapshot};
pub use history::{trend_feed, History, TrendConsumer, TrendProducer, TrendSample};
pub use store::{TelemetrySnapshot, TelemetryStore};

/// Which quantity a reading set carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingKind {
    /// Contact impedance in kΩ
    Impedance,
    /// Mean absolute EEG amplitude in µV
    Signal,
}

/// One scalar per electrode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElectrodeReadings(BTreeMap<Electrode, f64>);

impl ElectrodeReadings {
    /// The same value for every electrode
    pub fn uniform(value: f64) -> Self {
        Self(Electrode::ALL.iter().map(|&e| (e, value)).collect())
    }

    pub fn get(&self, electrode: Electrode) -> Option<f64> {
        self.0.get(&electrode).copied()
    }

    pub fn insert(&mut self, electrode: Electrode, value: f64) {
        self.0.insert(electrode, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Electrode, f64)> + '_ {
        self.0.iter().map(|(e, v)| (*e, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Electrode, f64)> for ElectrodeReadings {
    fn from_iter<I: IntoIterator<Item = (Electrode, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_covers_all_electrodes() {
        let readings = ElectrodeReadings::uniform(4000.0);
        assert_eq!(readings.len(), 4);
        assert!(readings.iter().all(|(_, v)| v == 4000.0));
    }

    #[test]
    fn test_iteration_follows_column_order() {
        let readings: ElectrodeReadings = [(Electrode::O2, 1.0), (Electrode::T3, 2.0)]
            .into_iter()
            .collect();
        let order: Vec<Electrode> = readings.iter().map(|(e, _)| e).collect();
        assert_eq!(order, vec![Electrode::T3, Electrode::O2]);
    }
}
