//! Hardware abstraction for the EEG headset.
//!
//! The vendor driver is reached through the [`HardwareSession`] trait: a
//! synchronous configure/start/stop/read interface where every call may
//! fail. [`DeviceSession`] owns the boxed driver and serialises access to
//! it, so a read can never overlap a mode switch.

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

mod session;
pub mod simulated;

pub use session::DeviceSession;
pub use simulated::{SimulatedConnector, SimulatedHeadset};

/// Scalp electrode positions on the headband
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Electrode {
    T3,
    T4,
    O1,
    O2,
}

impl Electrode {
    /// All configured electrodes, in file column order
    pub const ALL: [Electrode; 4] = [Electrode::T3, Electrode::T4, Electrode::O1, Electrode::O2];

    pub fn index(self) -> usize {
        match self {
            Electrode::T3 => 0,
            Electrode::T4 => 1,
            Electrode::O1 => 2,
            Electrode::O2 => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Electrode::T3 => "T3",
            Electrode::T4 => "T4",
            Electrode::O1 => "O1",
            Electrode::O2 => "O2",
        }
    }
}

/// Which data stream is active on the headset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    None,
    Impedance,
    Signal,
}

/// Mode commands understood by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardCommand {
    StartSignal,
    StopSignal,
    StartImpedance,
    StopImpedance,
}

impl BoardCommand {
    /// Vendor command string passed to the driver's config call
    pub fn as_str(self) -> &'static str {
        match self {
            BoardCommand::StartSignal => "CommandStartSignal",
            BoardCommand::StopSignal => "CommandStopSignal",
            BoardCommand::StartImpedance => "CommandStartResist",
            BoardCommand::StopImpedance => "CommandStopResist",
        }
    }
}

/// Row indices of each stream inside a driver sample block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLayout {
    pub timestamp: usize,
    /// EEG rows, indexed by [`Electrode::index`]
    pub eeg: [usize; 4],
    /// Resistance rows, indexed by [`Electrode::index`]
    pub resistance: [usize; 4],
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self {
            timestamp: 10,
            eeg: [1, 2, 3, 4],
            resistance: [5, 6, 7, 8],
        }
    }
}

impl ChannelLayout {
    pub fn eeg_channel(&self, electrode: Electrode) -> usize {
        self.eeg[electrode.index()]
    }

    pub fn resistance_channel(&self, electrode: Electrode) -> usize {
        self.resistance[electrode.index()]
    }

    /// Number of rows a block must have to cover every mapped channel
    pub fn channel_count(&self) -> usize {
        self.eeg
            .iter()
            .chain(self.resistance.iter())
            .copied()
            .chain(std::iter::once(self.timestamp))
            .max()
            .map_or(0, |max| max + 1)
    }
}

/// One projected sample: timestamp plus the four electrode columns
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowRow {
    pub timestamp: f64,
    pub values: [f64; 4],
}

/// Channel-major sample matrix as returned by the driver
///
/// `channels[c][s]` is sample `s` of channel `c`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBlock {
    channels: Vec<Vec<f64>>,
}

impl SampleBlock {
    pub fn new(channels: Vec<Vec<f64>>) -> Self {
        Self { channels }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel; ragged blocks are truncated to the shortest row
    pub fn num_samples(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.num_samples() == 0
    }

    pub fn channel(&self, index: usize) -> Option<&[f64]> {
        self.channels
            .get(index)
            .map(|row| &row[..self.num_samples()])
    }

    /// Project the block onto timestamp + electrode columns
    pub fn window_rows(&self, layout: &ChannelLayout) -> Result<Vec<WindowRow>, DeviceError> {
        let samples = self.num_samples();
        if samples == 0 {
            return Ok(Vec::new());
        }

        let column = |index: usize| {
            self.channel(index).ok_or(DeviceError::MalformedBlock {
                channel: index,
                available: self.num_channels(),
            })
        };

        let timestamps = column(layout.timestamp)?;
        let mut electrodes = Vec::with_capacity(Electrode::ALL.len());
        for electrode in Electrode::ALL {
            electrodes.push(column(layout.eeg_channel(electrode))?);
        }

        Ok((0..samples)
            .map(|s| WindowRow {
                timestamp: timestamps[s],
                values: [
                    electrodes[0][s],
                    electrodes[1][s],
                    electrodes[2][s],
                    electrodes[3][s],
                ],
            })
            .collect())
    }
}

/// Synchronous driver interface for one headset connection.
///
/// Every call may fail; callers treat each as potentially throwing.
pub trait HardwareSession: Send {
    fn prepare(&mut self) -> Result<(), DeviceError>;
    fn start(&mut self, buffer_size: usize) -> Result<(), DeviceError>;
    fn set_mode(&mut self, command: BoardCommand) -> Result<(), DeviceError>;
    /// Take up to `n_samples` buffered samples; an empty block is valid
    fn read(&mut self, n_samples: usize) -> Result<SampleBlock, DeviceError>;
    fn stop(&mut self) -> Result<(), DeviceError>;
    fn release(&mut self) -> Result<(), DeviceError>;
}

/// Opens driver sessions for a device address
pub trait DeviceConnector: Send + Sync {
    fn connect(&self, address: &str) -> Result<Box<dyn HardwareSession>, DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_with(channels: usize, samples: usize) -> SampleBlock {
        SampleBlock::new(
            (0..channels)
                .map(|c| (0..samples).map(|s| (c * 100 + s) as f64).collect())
                .collect(),
        )
    }

    #[test]
    fn test_window_rows_projects_layout_columns() {
        let block = block_with(11, 3);
        let rows = block.window_rows(&ChannelLayout::default()).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].timestamp, 1000.0);
        assert_eq!(rows[2].values, [102.0, 202.0, 302.0, 402.0]);
    }

    #[test]
    fn test_window_rows_rejects_missing_channel() {
        let block = block_with(5, 2);
        match block.window_rows(&ChannelLayout::default()) {
            Err(DeviceError::MalformedBlock { channel, available }) => {
                assert_eq!(channel, 10);
                assert_eq!(available, 5);
            }
            other => panic!("Expected MalformedBlock, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_block_projects_to_nothing() {
        let rows = SampleBlock::empty()
            .window_rows(&ChannelLayout::default())
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_ragged_block_uses_shortest_channel() {
        let block = SampleBlock::new(vec![vec![1.0, 2.0, 3.0], vec![4.0]]);
        assert_eq!(block.num_samples(), 1);
        assert_eq!(block.channel(0), Some(&[1.0][..]));
    }

    #[test]
    fn test_layout_channel_count() {
        assert_eq!(ChannelLayout::default().channel_count(), 11);
    }

    #[test]
    fn test_board_command_strings() {
        assert_eq!(BoardCommand::StartImpedance.as_str(), "CommandStartResist");
        assert_eq!(BoardCommand::StopSignal.as_str(), "CommandStopSignal");
    }
}
