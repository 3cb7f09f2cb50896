//! Progress reporting for dump and monitor runs.
//!
//! The processor pushes a [`Progress`] snapshot through a callback after
//! every exported message and once more on completion.
//!
//! # Example
//!
//! ```rust
//! use rmqdump::progress::{Progress, ProgressCallback};
//! use std::sync::Arc;
//!
//! let callback: ProgressCallback = Arc::new(|progress| {
//!     if let Some(pct) = progress.percentage() {
//!         println!("Drained: {:.1}%", pct);
//!     }
//! });
//!
//! callback(Progress::new(5, Some(10)));
//! ```

use std::io::Write;
use std::sync::Arc;

/// A snapshot of consumption counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Deliveries received from the broker so far.
    pub consumed: u64,

    /// Queue depth captured before consuming, if known.
    ///
    /// `None` in monitor mode, where the stream is unbounded.
    pub total: Option<u64>,

    /// Deliveries written by the exporter.
    pub exported: u64,

    /// Deliveries rejected by the filter.
    pub filtered: u64,
}

impl Progress {
    /// Creates a progress snapshot with no exports or filtered messages.
    pub fn new(consumed: u64, total: Option<u64>) -> Self {
        Self {
            consumed,
            total,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_exported(mut self, exported: u64) -> Self {
        self.exported = exported;
        self
    }

    #[must_use]
    pub fn with_filtered(mut self, filtered: u64) -> Self {
        self.filtered = filtered;
        self
    }

    /// Returns the drained share of the backlog (0.0 - 100.0).
    ///
    /// Returns `None` if the total is not known.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rmqdump::progress::Progress;
    ///
    /// assert_eq!(Progress::new(50, Some(200)).percentage(), Some(25.0));
    /// assert_eq!(Progress::new(50, None).percentage(), None);
    /// ```
    pub fn percentage(&self) -> Option<f64> {
        self.total.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.consumed as f64 / total as f64) * 100.0
            }
        })
    }

    /// Returns whether the known backlog has been consumed.
    pub fn is_complete(&self) -> bool {
        self.total
            .is_some_and(|total| self.consumed >= total)
    }

    /// Messages still waiting in the backlog, if the total is known.
    pub fn remaining(&self) -> Option<u64> {
        self.total.map(|total| total.saturating_sub(self.consumed))
    }
}

/// Callback type for receiving progress updates.
///
/// # Example
///
/// ```rust
/// use rmqdump::progress::{Progress, ProgressCallback};
/// use std::sync::Arc;
///
/// let callback: ProgressCallback = Arc::new(|progress| {
///     println!("Consumed {} messages", progress.consumed);
/// });
///
/// callback(Progress::new(10, Some(20)));
/// ```
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// Creates a no-op progress callback.
pub fn no_progress() -> ProgressCallback {
    Arc::new(|_| {})
}

/// Creates a progress callback that rewrites one line on stderr.
///
/// Prints `Messages processed: consumed/total` (or just `consumed` when the
/// total is unknown) and ends the line once the backlog is complete.
pub fn stderr_progress() -> ProgressCallback {
    Arc::new(|progress| {
        let mut stderr = std::io::stderr().lock();
        let _ = match progress.total {
            Some(total) => write!(stderr, "\rMessages processed: {}/{}", progress.consumed, total),
            None => write!(stderr, "\rMessages processed: {}", progress.consumed),
        };
        if progress.is_complete() {
            let _ = writeln!(stderr);
        }
        let _ = stderr.flush();
    })
}
