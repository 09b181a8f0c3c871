use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use neural_capture::capture::ScenarioLabel;
use neural_capture::config::AppConfig;
use neural_capture::cue::SystemCue;
use neural_capture::device::SimulatedConnector;
use neural_capture::engine::{CaptureController, CaptureOutcome};
use neural_capture::error::CaptureError;
use neural_capture::telemetry::EventJournal;
use tracing_subscriber::EnvFilter;

#[path = "neural_capture/tui.rs"]
mod tui;

#[derive(Parser, Debug)]
#[command(
    name = "neural_capture",
    about = "Guided EEG window capture for a four-electrode headband"
)]
struct Cli {
    /// Scenario label written into every window file name (red, green, trash)
    #[arg(long, default_value = "red")]
    label: ScenarioLabel,
    /// Headset MAC address; overrides the configuration file
    #[arg(long)]
    mac: Option<String>,
    /// JSON configuration file
    #[arg(long, default_value = "assets/capture_config.json")]
    config: PathBuf,
    /// Root directory for window files; overrides the configuration file
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Log destination, kept off the terminal while the view is up
    #[arg(long, default_value = "neural_capture.log")]
    log_file: PathBuf,
    /// Log filter, e.g. `info` or `neural_capture=debug`
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Seed for the simulated headband's noise
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let mut config = AppConfig::load_from_file(&cli.config);
    if let Some(dir) = &cli.output_dir {
        config.capture.output_dir = dir.clone();
    }

    let mut connector =
        SimulatedConnector::new(config.capture.sample_rate_hz, config.device.layout.clone());
    if let Some(seed) = cli.seed {
        connector = connector.with_seed(seed);
    }

    let mut controller =
        CaptureController::new(config, cli.label, Arc::new(connector), Arc::new(SystemCue))
            .context("Failed to prepare capture session")?;
    if let Some(mac) = cli.mac {
        controller = controller.with_address(mac);
    }

    let span = tracing::info_span!("session", label = %cli.label);
    let _entered = span.enter();

    let journal = EventJournal::spawn(controller.store().events().subscribe());
    let result = {
        let mut display = tui::TerminalDisplay::enter().context("Failed to set up terminal")?;
        let result = controller.run(&mut display);
        display.restore().context("Failed to restore terminal")?;
        result
    };
    let journaled = journal.finish();
    tracing::debug!(events = journaled, "Event journal closed");

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            return match failure_exit_code(&err) {
                Some(code) => {
                    eprintln!("{}", err);
                    Ok(ExitCode::from(code))
                }
                None => Err(anyhow::Error::new(err).context("Capture session failed")),
            };
        }
    };

    tracing::info!(
        state = outcome.state.label(),
        saved = outcome.progress.saved,
        target = outcome.progress.target,
        "Session finished"
    );
    print_summary(&outcome);
    Ok(if outcome.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

/// Exit status for session errors that end the run the same way an
/// incomplete session does. `None` leaves the error to `main`, which prints
/// its context chain and exits with 2.
fn failure_exit_code(err: &CaptureError) -> Option<u8> {
    match err {
        CaptureError::HardwareInit(_) | CaptureError::DisplayFailed { .. } => Some(1),
        _ => None,
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let file = File::create(&cli.log_file)
        .with_context(|| format!("Failed to create log file {}", cli.log_file.display()))?;
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("Invalid log level '{}'", cli.log_level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow!("Failed to install logger: {err}"))
}

fn print_summary(outcome: &CaptureOutcome) {
    println!("{}", outcome.message);
    println!(
        "State: {} | windows saved: {}/{}",
        outcome.state.label(),
        outcome.progress.saved,
        outcome.progress.target
    );
    println!("Output directory: {}", outcome.output_dir.display());

    let saved = outcome.events.saved_paths();
    if !saved.is_empty() {
        println!("Saved windows:");
        for path in saved {
            println!("  {}", path);
        }
    }
    if outcome.events.dropped_events > 0 {
        println!(
            "({} older events not retained in history)",
            outcome.events.dropped_events
        );
    }
}
