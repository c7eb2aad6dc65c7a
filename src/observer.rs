//! Job lifecycle observation.
//!
//! A [`JobObserver`] receives one [`JobEvent`] per lifecycle transition of
//! a job. `Started` (when the engine reports it) always arrives before the
//! single terminal event. The default observer, [`LogObserver`], writes
//! them through the [`log`](https://crates.io/crates/log) facade.

use std::path::PathBuf;
use std::time::Duration;

/// A lifecycle event emitted by a job.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum JobEvent {
    /// The engine started; carries the full command line.
    Started {
        /// Rendered engine invocation.
        command: String,
    },
    /// Extraction finished successfully.
    Succeeded {
        /// Directory the frames were written to.
        output_directory: PathBuf,
        /// Number of frame files found there afterwards.
        frames: usize,
        /// Wall-clock duration of the job.
        elapsed: Duration,
    },
    /// The job failed; carries the human-readable reason.
    Failed {
        /// Failure diagnostic.
        reason: String,
    },
    /// The job was cancelled before the engine finished.
    Cancelled,
}

/// Receives lifecycle events from a job.
///
/// Observers are invoked inline on the job's task, so they should return
/// quickly.
pub trait JobObserver: Send + Sync {
    /// Called once per lifecycle event.
    fn on_event(&self, event: &JobEvent);
}

/// Writes lifecycle events to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl JobObserver for LogObserver {
    fn on_event(&self, event: &JobEvent) {
        match event {
            JobEvent::Started { command } => {
                log::info!("Started media engine with command: {command}");
            }
            JobEvent::Succeeded {
                output_directory,
                frames,
                elapsed,
            } => {
                log::info!(
                    "Frame extraction complete: {frames} frame(s) in {} ({elapsed:.2?})",
                    output_directory.display()
                );
            }
            JobEvent::Failed { reason } => {
                log::error!("Error processing video: {reason}");
            }
            JobEvent::Cancelled => {
                log::warn!("Frame extraction cancelled");
            }
        }
    }
}
