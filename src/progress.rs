//! Progress estimation and display
//!
//! PyInstaller does not report a completion percentage, so progress is
//! estimated from marker words in its log output. The estimate is coarse: it
//! only says which phase the build has reached.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::info;

/// Value reported right after the child process starts
pub const LAUNCHED: u8 = 10;

/// Value reported once the output stream is attached
pub const ATTACHED: u8 = 20;

pub const COMPLETE: u8 = 100;

/// Marker word, step and ceiling for each build phase, checked in order
const PHASES: [(&str, u8, u8); 4] = [
    ("Analyzing", 5, 50),
    ("Processing", 2, 70),
    ("Building", 5, 85),
    ("Copying", 2, 95),
];

/// Heuristic percentage derived from packaging tool output.
///
/// Never decreases and never exceeds 100.
#[derive(Debug, Clone, Default)]
pub struct ProgressEstimator {
    value: u8,
}

impl ProgressEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// Raise the estimate to at least `value`
    pub fn advance_to(&mut self, value: u8) -> u8 {
        self.value = self.value.max(value.min(COMPLETE));
        self.value
    }

    /// Feed one output line. At most one phase bump applies per line.
    pub fn observe(&mut self, line: &str) -> u8 {
        if let Some(&(_, step, ceiling)) = PHASES
            .iter()
            .find(|(marker, _, _)| line.contains(marker))
        {
            let next = self.value.saturating_add(step).min(ceiling);
            self.advance_to(next);
        }
        self.value
    }

    pub fn finish(&mut self) -> u8 {
        self.advance_to(COMPLETE)
    }
}

/// Terminal progress bar for the command-line front-end
pub struct ProgressTracker {
    enabled: bool,
}

impl ProgressTracker {
    /// Create a new progress tracker
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Create a percentage bar for a packaging run
    pub fn create_percent_progress(&self, operation: &str) -> Option<ProgressBar> {
        if !self.enabled {
            return None;
        }

        let pb = ProgressBar::new(COMPLETE as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏ "),
        );
        pb.set_message(format!("{}...", operation));
        pb.enable_steady_tick(Duration::from_millis(100));

        info!("Started progress tracking for: {}", operation);
        Some(pb)
    }

    /// Create a spinner for indeterminate operations
    pub fn create_spinner(&self, message: &str) -> Option<ProgressBar> {
        if !self.enabled {
            return None;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        Some(pb)
    }

    /// Move the bar to an absolute percentage
    pub fn set_percent(pb: &Option<ProgressBar>, percent: u8) {
        if let Some(ref progress) = pb {
            progress.set_position(percent.min(COMPLETE) as u64);
        }
    }

    /// Print a line above the bar, or straight to stdout without one
    pub fn println(pb: &Option<ProgressBar>, line: &str) {
        match pb {
            Some(progress) => progress.println(line),
            None => println!("{}", line),
        }
    }

    /// Finish progress with success message
    pub fn finish_progress(pb: Option<ProgressBar>, success_message: &str) {
        if let Some(progress) = pb {
            progress.finish_with_message(success_message.to_string());
            info!("Progress completed: {}", success_message);
        }
    }

    /// Finish progress with error message
    pub fn finish_with_error(pb: Option<ProgressBar>, error_message: &str) {
        if let Some(progress) = pb {
            progress.abandon_with_message(format!("❌ {}", error_message));
        }
    }
}
