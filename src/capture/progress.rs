// Progress through a capture run

use serde::{Deserialize, Serialize};

/// Saved-window counter paired with its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureProgress {
    pub saved: usize,
    pub target: usize,
}

impl CaptureProgress {
    pub fn new(target: usize) -> Self {
        Self { saved: 0, target }
    }

    pub fn is_done(&self) -> bool {
        self.saved >= self.target
    }

    pub fn remaining(&self) -> usize {
        self.target.saturating_sub(self.saved)
    }

    /// Completed fraction in `[0, 1]`
    pub fn fraction(&self) -> f64 {
        if self.target == 0 {
            return 1.0;
        }
        (self.saved as f64 / self.target as f64).min(1.0)
    }

    /// Status line shown after a window is persisted
    pub fn status_message(&self) -> String {
        format!("Sample {}/{} captured", self.saved, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction_and_message() {
        let mut progress = CaptureProgress::new(4);
        assert_eq!(progress.fraction(), 0.0);
        assert_eq!(progress.remaining(), 4);

        progress.saved = 3;
        assert_eq!(progress.fraction(), 0.75);
        assert_eq!(progress.status_message(), "Sample 3/4 captured");
        assert!(!progress.is_done());

        progress.saved = 4;
        assert!(progress.is_done());
    }
}
