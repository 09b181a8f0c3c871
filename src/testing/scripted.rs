// Scripted hardware session
//
// The session and its probe share one state block. Tests keep the probe to
// inject failures and inspect calls after the session has been moved into
// the controller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::device::{
    BoardCommand, ChannelLayout, DeviceConnector, DeviceMode, Electrode, HardwareSession,
    SampleBlock,
};
use crate::error::DeviceError;

const SAMPLE_PERIOD_SECS: f64 = 0.004;
const STREAM_EPOCH_SECS: f64 = 1_700_000_000.0;

type ReadHook = Box<dyn FnMut() + Send>;

struct ReadFailure {
    n_samples: usize,
    ordinal: usize,
    error: DeviceError,
}

struct ScriptState {
    layout: ChannelLayout,
    mode: DeviceMode,
    impedance_kohm: f64,
    signal_uv: f64,
    samples_emitted: u64,
    commands: Vec<BoardCommand>,
    failing_commands: Vec<BoardCommand>,
    fail_start: bool,
    read_failures: Vec<ReadFailure>,
    read_hooks: Vec<(usize, usize, ReadHook)>,
    reads_by_size: HashMap<usize, usize>,
    start_calls: usize,
    stop_calls: usize,
    release_calls: usize,
}

type Shared = Arc<Mutex<ScriptState>>;

fn lock(state: &Shared) -> MutexGuard<'_, ScriptState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Driver double that always has data and does what it is told
pub struct ScriptedSession {
    state: Shared,
}

/// Test-side handle onto a [`ScriptedSession`]
#[derive(Clone)]
pub struct ScriptProbe {
    state: Shared,
}

impl ScriptedSession {
    /// Session with good contact (500 kΩ) and a 10 µV signal
    pub fn new() -> (Self, ScriptProbe) {
        let state = Arc::new(Mutex::new(ScriptState {
            layout: ChannelLayout::default(),
            mode: DeviceMode::None,
            impedance_kohm: 500.0,
            signal_uv: 10.0,
            samples_emitted: 0,
            commands: Vec::new(),
            failing_commands: Vec::new(),
            fail_start: false,
            read_failures: Vec::new(),
            read_hooks: Vec::new(),
            reads_by_size: HashMap::new(),
            start_calls: 0,
            stop_calls: 0,
            release_calls: 0,
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            ScriptProbe { state },
        )
    }
}

impl ScriptProbe {
    pub fn commands(&self) -> Vec<BoardCommand> {
        lock(&self.state).commands.clone()
    }

    pub fn mode(&self) -> DeviceMode {
        lock(&self.state).mode
    }

    /// Reject every `command` from now on
    pub fn fail_command(&self, command: BoardCommand) {
        lock(&self.state).failing_commands.push(command);
    }

    pub fn fail_start(&self) {
        lock(&self.state).fail_start = true;
    }

    /// Fail the `ordinal`-th (1-based) read of exactly `n_samples` rows
    pub fn fail_read(&self, n_samples: usize, ordinal: usize, error: DeviceError) {
        lock(&self.state).read_failures.push(ReadFailure {
            n_samples,
            ordinal,
            error,
        });
    }

    /// Run `hook` right after the `ordinal`-th read of `n_samples` rows
    pub fn on_read(&self, n_samples: usize, ordinal: usize, hook: impl FnMut() + Send + 'static) {
        lock(&self.state)
            .read_hooks
            .push((n_samples, ordinal, Box::new(hook)));
    }

    pub fn set_impedance_kohm(&self, kohm: f64) {
        lock(&self.state).impedance_kohm = kohm;
    }

    /// Reads requested with exactly `n_samples` rows so far
    pub fn reads_of(&self, n_samples: usize) -> usize {
        lock(&self.state)
            .reads_by_size
            .get(&n_samples)
            .copied()
            .unwrap_or(0)
    }

    pub fn start_calls(&self) -> usize {
        lock(&self.state).start_calls
    }

    pub fn stop_calls(&self) -> usize {
        lock(&self.state).stop_calls
    }

    pub fn release_calls(&self) -> usize {
        lock(&self.state).release_calls
    }
}

impl HardwareSession for ScriptedSession {
    fn prepare(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn start(&mut self, _buffer_size: usize) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        state.start_calls += 1;
        if state.fail_start {
            return Err(DeviceError::StreamStartFailed {
                reason: "scripted start failure".to_string(),
            });
        }
        Ok(())
    }

    fn set_mode(&mut self, command: BoardCommand) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        if state.failing_commands.contains(&command) {
            return Err(DeviceError::ModeSwitchFailed {
                command: command.as_str().to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        state.commands.push(command);
        state.mode = match command {
            BoardCommand::StartSignal => DeviceMode::Signal,
            BoardCommand::StartImpedance => DeviceMode::Impedance,
            BoardCommand::StopSignal | BoardCommand::StopImpedance => DeviceMode::None,
        };
        Ok(())
    }

    fn read(&mut self, n_samples: usize) -> Result<SampleBlock, DeviceError> {
        let (result, hook) = {
            let mut state = lock(&self.state);
            let ordinal = {
                let count = state.reads_by_size.entry(n_samples).or_insert(0);
                *count += 1;
                *count
            };

            let failure_idx = state
                .read_failures
                .iter()
                .position(|f| f.n_samples == n_samples && f.ordinal == ordinal);
            let failure = failure_idx.map(|idx| state.read_failures.remove(idx).error);

            let hook_idx = state
                .read_hooks
                .iter()
                .position(|(n, o, _)| *n == n_samples && *o == ordinal);
            let hook = hook_idx.map(|idx| state.read_hooks.remove(idx).2);

            let result = match failure {
                Some(error) => Err(error),
                None => Ok(state.block(n_samples)),
            };
            (result, hook)
        };

        // Hooks run outside the lock so they may call back into the probe
        if let Some(mut hook) = hook {
            hook();
        }
        result
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        lock(&self.state).stop_calls += 1;
        Ok(())
    }

    fn release(&mut self) -> Result<(), DeviceError> {
        lock(&self.state).release_calls += 1;
        Ok(())
    }
}

impl ScriptState {
    fn block(&mut self, n_samples: usize) -> SampleBlock {
        let mut channels = vec![vec![0.0; n_samples]; self.layout.channel_count()];
        for s in 0..n_samples {
            let index = self.samples_emitted + s as u64;
            channels[self.layout.timestamp][s] = STREAM_EPOCH_SECS + index as f64 * SAMPLE_PERIOD_SECS;
            let sign = if index % 2 == 0 { 1.0 } else { -1.0 };
            for electrode in Electrode::ALL {
                channels[self.layout.eeg_channel(electrode)][s] = sign * self.signal_uv;
                channels[self.layout.resistance_channel(electrode)][s] =
                    self.impedance_kohm * 1000.0;
            }
        }
        self.samples_emitted += n_samples as u64;
        SampleBlock::new(channels)
    }
}

/// Hands out one pre-built [`ScriptedSession`]
pub struct ScriptedConnector {
    session: Mutex<Option<ScriptedSession>>,
    addresses: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    pub fn new(session: ScriptedSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
            addresses: Mutex::new(Vec::new()),
        }
    }

    /// Addresses passed to `connect`, in call order
    pub fn addresses(&self) -> Vec<String> {
        self.addresses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DeviceConnector for ScriptedConnector {
    fn connect(&self, address: &str) -> Result<Box<dyn HardwareSession>, DeviceError> {
        self.addresses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(address.to_string());

        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|session| Box::new(session) as Box<dyn HardwareSession>)
            .ok_or_else(|| DeviceError::ConnectFailed {
                address: address.to_string(),
                reason: "scripted session already taken".to_string(),
            })
    }
}
