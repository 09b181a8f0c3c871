use crate::config::ImpedanceConfig;
use crate::device::{ChannelLayout, Electrode, SampleBlock};
use crate::telemetry::ElectrodeReadings;

use super::impedance::mean_impedance_kohm;

/// Mean absolute amplitude; zero for an empty series
pub fn mean_abs(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|v| v.abs()).sum::<f64>() / samples.len() as f64
}

/// Per-electrode impedance (kΩ) for one resistance-mode batch.
///
/// Every electrode gets a value: an empty block or a missing channel
/// reports the configured bad-contact fallback.
pub fn impedance_readings(
    block: &SampleBlock,
    layout: &ChannelLayout,
    config: &ImpedanceConfig,
) -> ElectrodeReadings {
    let mut readings = ElectrodeReadings::default();
    for electrode in Electrode::ALL {
        let kohm = match block.channel(layout.resistance_channel(electrode)) {
            Some(raw) => mean_impedance_kohm(raw, config),
            None => config.fallback,
        };
        readings.insert(electrode, kohm);
    }
    readings
}

/// Per-electrode mean absolute EEG amplitude (µV) for one signal batch.
pub fn signal_readings(block: &SampleBlock, layout: &ChannelLayout) -> ElectrodeReadings {
    let mut readings = ElectrodeReadings::default();
    for electrode in Electrode::ALL {
        let value = block
            .channel(layout.eeg_channel(electrode))
            .map_or(0.0, mean_abs);
        readings.insert(electrode, value);
    }
    readings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(samples: usize, fill: impl Fn(usize) -> f64) -> SampleBlock {
        SampleBlock::new(
            (0..11)
                .map(|c| (0..samples).map(|_| fill(c)).collect())
                .collect(),
        )
    }

    #[test]
    fn test_mean_abs() {
        assert_eq!(mean_abs(&[]), 0.0);
        assert_eq!(mean_abs(&[-2.0, 2.0, -5.0, 5.0]), 3.5);
    }

    #[test]
    fn test_signal_readings_cover_all_electrodes() {
        let layout = ChannelLayout::default();
        let readings = signal_readings(&block(4, |c| -(c as f64)), &layout);

        assert_eq!(readings.get(Electrode::T3), Some(1.0));
        assert_eq!(readings.get(Electrode::O2), Some(4.0));
        assert_eq!(readings.len(), 4);
    }

    #[test]
    fn test_empty_signal_block_reports_zero() {
        let readings = signal_readings(&SampleBlock::empty(), &ChannelLayout::default());
        assert!(Electrode::ALL
            .iter()
            .all(|e| readings.get(*e) == Some(0.0)));
    }

    #[test]
    fn test_impedance_readings_convert_to_kohm() {
        let layout = ChannelLayout::default();
        let config = ImpedanceConfig::default();
        let readings = impedance_readings(&block(3, |c| 100_000.0 * c as f64), &layout, &config);

        assert_eq!(readings.get(Electrode::T3), Some(500.0));
        assert_eq!(readings.get(Electrode::O2), Some(800.0));
    }

    #[test]
    fn test_impedance_readings_missing_channel_uses_fallback() {
        let config = ImpedanceConfig::default();
        let short = SampleBlock::new(vec![vec![1.0]; 6]);
        let readings = impedance_readings(&short, &ChannelLayout::default(), &config);

        assert_eq!(readings.get(Electrode::T3), Some(config.fallback));
        assert_eq!(readings.get(Electrode::O2), Some(config.fallback));
    }
}
