//! Progress reporting and cooperative cancellation.
//!
//! The import pipeline reports `(message, percent, level)` tuples and polls
//! an externally settable abort flag between rows. No other side channel
//! exists between the engine and its caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Severity attached to a progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportingLevel {
    /// Routine progress.
    Normal,
    /// The operation continues but something was off.
    Warning,
    /// The operation failed.
    Error,
    /// The operation stopped because the abort flag was set.
    Abort,
}

/// Receiver for progress reports from long-running operations.
pub trait Progress {
    /// Report progress. `percent` is clamped to 0..=100 by callers.
    fn update(&mut self, message: &str, percent: u8, level: ReportingLevel);
}

/// Default progress receiver that routes reports through the `log` crate.
#[derive(Debug, Default)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn update(&mut self, message: &str, percent: u8, level: ReportingLevel) {
        match level {
            ReportingLevel::Normal => log::debug!("[{percent:>3}%] {message}"),
            ReportingLevel::Warning => log::warn!("[{percent:>3}%] {message}"),
            ReportingLevel::Error => log::error!("{message}"),
            ReportingLevel::Abort => log::info!("{message}"),
        }
    }
}

/// Cloneable cancellation flag shared between a caller and a running import.
///
/// The engine never sets the flag itself; it only observes it between rows.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    /// Create a new, unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the operation sharing this flag.
    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_flag_shared_between_clones() {
        let flag = AbortFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_set());
        flag.set();
        assert!(observer.is_set());
    }
}
