//! Electrode contact classification from resistance readings.
//!
//! Levels are ordered by severity so that "good enough" is a single
//! comparison: every electrode must be at or below [`ContactLevel::Acceptable`].

use serde::{Deserialize, Serialize};

use crate::config::ImpedanceConfig;
use crate::device::Electrode;
use crate::telemetry::ElectrodeReadings;

/// Contact quality, least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactLevel {
    Excellent,
    Acceptable,
    /// Usable signal unlikely; adjust position
    Poor,
    /// Open contact, electrode not touching skin
    CriticalHigh,
    /// Short circuit or contact too strong
    CriticalLow,
}

impl ContactLevel {
    pub fn label(self) -> &'static str {
        match self {
            ContactLevel::Excellent => "EXCELLENT",
            ContactLevel::Acceptable => "ACCEPTABLE",
            ContactLevel::Poor => "CHECK",
            ContactLevel::CriticalHigh => "CRITICAL HIGH",
            ContactLevel::CriticalLow => "CRITICAL LOW",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ContactLevel::Excellent => "✓",
            ContactLevel::Acceptable => "⚠",
            ContactLevel::Poor => "!",
            ContactLevel::CriticalHigh | ContactLevel::CriticalLow => "✗",
        }
    }

    /// Instruction shown next to the electrode
    pub fn hint(self) -> &'static str {
        match self {
            ContactLevel::Excellent => "Optimal contact",
            ContactLevel::Acceptable => "Acceptable contact",
            ContactLevel::Poor => "Adjust position",
            ContactLevel::CriticalHigh => "Poor contact, reposition",
            ContactLevel::CriticalLow => "Contact too strong or short-circuit",
        }
    }

    pub fn is_ok(self) -> bool {
        self <= ContactLevel::Acceptable
    }
}

pub fn ohm_to_kohm(ohms: f64) -> f64 {
    ohms / 1000.0
}

/// Map a kΩ reading onto a contact level.
///
/// Bands are half-open `[lower, upper)`, so a value sitting exactly on a
/// threshold falls into the next, stricter band. Non-finite input is
/// treated as an open contact.
pub fn classify(kohm: f64, thresholds: &ImpedanceConfig) -> ContactLevel {
    if kohm.is_nan() {
        return ContactLevel::CriticalHigh;
    }
    if kohm < thresholds.too_low {
        ContactLevel::CriticalLow
    } else if kohm < thresholds.excellent {
        ContactLevel::Excellent
    } else if kohm < thresholds.acceptable {
        ContactLevel::Acceptable
    } else if kohm < thresholds.poor {
        ContactLevel::Poor
    } else {
        ContactLevel::CriticalHigh
    }
}

/// True iff every configured electrode has a reading classified as OK.
///
/// A missing electrode counts as failing.
pub fn contact_ok(readings: &ElectrodeReadings, thresholds: &ImpedanceConfig) -> bool {
    Electrode::ALL.iter().all(|&electrode| {
        readings
            .get(electrode)
            .is_some_and(|kohm| classify(kohm, thresholds).is_ok())
    })
}

/// Mean of the plausible readings in a raw Ω series, in kΩ.
///
/// Values are taken as magnitudes and kept only inside the open
/// `(valid_min, valid_max)` range; with nothing left the configured
/// fallback (a clearly bad contact) is returned.
pub fn mean_impedance_kohm(raw_ohms: &[f64], config: &ImpedanceConfig) -> f64 {
    let (sum, count) = raw_ohms
        .iter()
        .map(|ohms| ohm_to_kohm(ohms.abs()))
        .filter(|kohm| *kohm > config.valid_min && *kohm < config.valid_max)
        .fold((0.0, 0usize), |(sum, count), kohm| (sum + kohm, count + 1));

    if count == 0 {
        config.fallback
    } else {
        sum / count as f64
    }
}
