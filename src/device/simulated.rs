//! Simulated BrainBit headband.
//!
//! Produces channel-major blocks in the same layout the vendor driver
//! uses, so the full capture flow runs on a laptop with no headset. In
//! impedance mode the contact resistance starts high and settles towards a
//! good value, read by read, the way a headband does once it is adjusted.

use std::f64::consts::TAU;
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{
    BoardCommand, ChannelLayout, DeviceConnector, DeviceMode, Electrode, HardwareSession,
    SampleBlock,
};
use crate::error::DeviceError;

const INITIAL_KOHM: f64 = 2600.0;
const SETTLED_KOHM: f64 = 550.0;
const SETTLE_RATE: f64 = 0.15;
const ALPHA_HZ: f64 = 10.0;
const ALPHA_UV: f64 = 20.0;
const NOISE_UV: f64 = 5.0;

/// Connector handing out [`SimulatedHeadset`] sessions
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    sample_rate_hz: u32,
    layout: ChannelLayout,
    seed: Option<u64>,
}

impl SimulatedConnector {
    pub fn new(sample_rate_hz: u32, layout: ChannelLayout) -> Self {
        Self {
            sample_rate_hz,
            layout,
            seed: None,
        }
    }

    /// Deterministic noise, for reproducible runs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl DeviceConnector for SimulatedConnector {
    fn connect(&self, address: &str) -> Result<Box<dyn HardwareSession>, DeviceError> {
        info!("[SimulatedHeadset] Connecting to simulated headband at {}", address);
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Box::new(SimulatedHeadset::new(
            self.sample_rate_hz,
            self.layout.clone(),
            rng,
        )))
    }
}

pub struct SimulatedHeadset {
    sample_rate_hz: u32,
    layout: ChannelLayout,
    rng: StdRng,
    prepared: bool,
    streaming: bool,
    released: bool,
    mode: DeviceMode,
    /// Contact resistance per electrode, kΩ
    contact_kohm: [f64; 4],
    /// Stream time of the next sample, seconds since the epoch
    next_timestamp: f64,
    /// Per-electrode phase offsets for the alpha rhythm
    phase: [f64; 4],
}

impl SimulatedHeadset {
    pub fn new(sample_rate_hz: u32, layout: ChannelLayout, mut rng: StdRng) -> Self {
        let contact_kohm = Electrode::ALL.map(|_| INITIAL_KOHM + rng.gen_range(-300.0..300.0));
        let phase = Electrode::ALL.map(|_| rng.gen_range(0.0..TAU));
        let next_timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        Self {
            sample_rate_hz: sample_rate_hz.max(1),
            layout,
            rng,
            prepared: false,
            streaming: false,
            released: false,
            mode: DeviceMode::None,
            contact_kohm,
            next_timestamp,
            phase,
        }
    }

    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    fn check_live(&self) -> Result<(), DeviceError> {
        if self.released {
            Err(DeviceError::SessionReleased)
        } else {
            Ok(())
        }
    }

    fn settle_contact(&mut self) {
        for kohm in self.contact_kohm.iter_mut() {
            *kohm += (SETTLED_KOHM - *kohm) * SETTLE_RATE;
        }
    }
}

impl HardwareSession for SimulatedHeadset {
    fn prepare(&mut self) -> Result<(), DeviceError> {
        self.check_live()?;
        self.prepared = true;
        Ok(())
    }

    fn start(&mut self, buffer_size: usize) -> Result<(), DeviceError> {
        self.check_live()?;
        if !self.prepared {
            return Err(DeviceError::StreamStartFailed {
                reason: "session not prepared".to_string(),
            });
        }
        info!("[SimulatedHeadset] Streaming (buffer {})", buffer_size);
        self.streaming = true;
        Ok(())
    }

    fn set_mode(&mut self, command: BoardCommand) -> Result<(), DeviceError> {
        self.check_live()?;
        self.mode = match command {
            BoardCommand::StartSignal => DeviceMode::Signal,
            BoardCommand::StartImpedance => DeviceMode::Impedance,
            BoardCommand::StopSignal | BoardCommand::StopImpedance => DeviceMode::None,
        };
        Ok(())
    }

    fn read(&mut self, n_samples: usize) -> Result<SampleBlock, DeviceError> {
        self.check_live()?;
        if !self.streaming {
            return Err(DeviceError::ReadFailed {
                reason: "stream not started".to_string(),
            });
        }

        let rate = self.sample_rate_hz as f64;
        let mut channels = vec![vec![0.0; n_samples]; self.layout.channel_count()];

        for s in 0..n_samples {
            let t = self.next_timestamp + s as f64 / rate;
            channels[self.layout.timestamp][s] = t;

            for electrode in Electrode::ALL {
                let i = electrode.index();
                match self.mode {
                    DeviceMode::Signal => {
                        let alpha = ALPHA_UV * (TAU * ALPHA_HZ * t + self.phase[i]).sin();
                        let noise = self.rng.gen_range(-NOISE_UV..NOISE_UV);
                        channels[self.layout.eeg_channel(electrode)][s] = alpha + noise;
                    }
                    DeviceMode::Impedance => {
                        let jitter = self.rng.gen_range(-0.05..0.05);
                        channels[self.layout.resistance_channel(electrode)][s] =
                            self.contact_kohm[i] * (1.0 + jitter) * 1000.0;
                    }
                    DeviceMode::None => {}
                }
            }
        }

        self.next_timestamp += n_samples as f64 / rate;
        if self.mode == DeviceMode::Impedance {
            self.settle_contact();
        }
        Ok(SampleBlock::new(channels))
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.check_live()?;
        self.streaming = false;
        Ok(())
    }

    fn release(&mut self) -> Result<(), DeviceError> {
        self.streaming = false;
        self.released = true;
        info!("[SimulatedHeadset] Released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{impedance_readings, signal_readings};
    use crate::config::ImpedanceConfig;

    fn headset() -> SimulatedHeadset {
        let mut headset =
            SimulatedHeadset::new(250, ChannelLayout::default(), StdRng::seed_from_u64(7));
        headset.prepare().unwrap();
        headset.start(1000).unwrap();
        headset
    }

    #[test]
    fn test_read_before_start_fails() {
        let mut headset =
            SimulatedHeadset::new(250, ChannelLayout::default(), StdRng::seed_from_u64(1));
        assert!(matches!(headset.read(10), Err(DeviceError::ReadFailed { .. })));
    }

    #[test]
    fn test_blocks_match_layout() {
        let mut headset = headset();
        let block = headset.read(25).unwrap();
        assert_eq!(block.num_channels(), 11);
        assert_eq!(block.num_samples(), 25);

        let stamps = block.channel(10).unwrap();
        assert!(stamps[1] > stamps[0]);
    }

    #[test]
    fn test_impedance_settles_to_good_contact() {
        let mut headset = headset();
        let layout = ChannelLayout::default();
        let config = ImpedanceConfig::default();
        headset.set_mode(BoardCommand::StartImpedance).unwrap();

        let first = impedance_readings(&headset.read(100).unwrap(), &layout, &config);
        assert!(first.get(Electrode::T3).unwrap() > config.poor);

        let mut last = first;
        for _ in 0..30 {
            last = impedance_readings(&headset.read(100).unwrap(), &layout, &config);
        }
        assert!(crate::analysis::contact_ok(&last, &config));
    }

    #[test]
    fn test_signal_mode_produces_eeg() {
        let mut headset = headset();
        headset.set_mode(BoardCommand::StartSignal).unwrap();
        let readings = signal_readings(&headset.read(250).unwrap(), &ChannelLayout::default());
        assert!(readings.iter().all(|(_, uv)| uv > 1.0 && uv < 40.0));
    }

    #[test]
    fn test_released_headset_rejects_calls() {
        let mut headset = headset();
        headset.release().unwrap();
        assert_eq!(headset.read(1), Err(DeviceError::SessionReleased));
    }
}
