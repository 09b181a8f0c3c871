//! Audible cues for session milestones.
//!
//! The operator is usually looking away from the screen while a window is
//! being recorded, so every milestone is announced. On macOS the message is
//! spoken with `say`; elsewhere the terminal bell is rung.

use std::io::Write;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Milestones that get announced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cue {
    ContactReady,
    ContactNotReady,
    CaptureBegins,
    CaptureCompleted,
    CaptureError,
    Cancelled,
}

impl Cue {
    pub fn text(self) -> &'static str {
        match self {
            Cue::ContactReady => "Impedance correct, continue",
            Cue::ContactNotReady => "Impedance incorrect",
            Cue::CaptureBegins => "Capture begins",
            Cue::CaptureCompleted => "Capture completed",
            Cue::CaptureError => "Error in capture",
            Cue::Cancelled => "Operation canceled",
        }
    }
}

/// Plays cues without blocking the caller for long
pub trait CuePlayer: Send + Sync {
    fn play(&self, cue: Cue);
}

/// Platform cue player
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCue;

impl CuePlayer for SystemCue {
    fn play(&self, cue: Cue) {
        debug!("[Cue] {}", cue.text());
        announce(cue.text());
    }
}

/// Cue player that stays silent
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentCue;

impl CuePlayer for SilentCue {
    fn play(&self, cue: Cue) {
        debug!("[Cue] (silent) {}", cue.text());
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "macos")] {
        fn announce(text: &'static str) {
            use std::process::{Command, Stdio};

            let spawned = Command::new("say")
                .arg(text)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn();

            match spawned {
                Ok(mut child) => {
                    // Reap in the background so speech never stalls a loop
                    std::thread::spawn(move || {
                        let _ = child.wait();
                    });
                }
                Err(err) => {
                    warn!("[Cue] Failed to run say: {}", err);
                    ring_bell();
                }
            }
        }
    } else {
        fn announce(_text: &'static str) {
            ring_bell();
        }
    }
}

fn ring_bell() {
    let mut stdout = std::io::stdout();
    if let Err(err) = stdout.write_all(b"\x07").and_then(|_| stdout.flush()) {
        warn!("[Cue] Failed to ring bell: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cue_texts() {
        assert_eq!(Cue::CaptureBegins.text(), "Capture begins");
        assert_eq!(Cue::Cancelled.text(), "Operation canceled");
    }
}
