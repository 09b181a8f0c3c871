// Analysis module - per-batch reduction of raw headset samples
//
// Converts the raw blocks read by the poll loop into one scalar per
// electrode: mean impedance in kΩ while checking contact, mean absolute
// amplitude in µV while acquiring signal.

pub mod impedance;
pub mod signal;

pub use impedance::{classify, contact_ok, mean_impedance_kohm, ohm_to_kohm, ContactLevel};
pub use signal::{impedance_readings, mean_abs, signal_readings};
