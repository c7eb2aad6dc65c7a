//! Error types for the `keyframes` crate.
//!
//! This module defines [`KeyframeError`], the unified error type returned by
//! every fallible operation in the crate. A failed job carries its
//! human-readable reason in the error's `Display` output, including the
//! media engine's own diagnostic where one was reported.

use std::{io::Error as IoError, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::job::JobState;

/// The unified error type for all `keyframes` operations.
///
/// Every variant is terminal: a job that fails is never retried, and frames
/// already written to the output directory are left in place.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeyframeError {
    /// The sampling rate was zero, negative, or not a finite number.
    #[error("Sampling rate must be a finite number greater than zero, got {0}")]
    InvalidSamplingRate(f64),

    /// A configuration field was missing or malformed.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The output directory could not be created or is not usable.
    #[error("Failed to prepare output directory {path}: {source}")]
    Filesystem {
        /// The directory that was being prepared.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: IoError,
    },

    /// The output directory already holds frames and overwriting is off.
    #[error("Output directory {path} already contains {frames} frame(s)")]
    OutputNotEmpty {
        /// The output directory.
        path: PathBuf,
        /// Number of existing frame files found.
        frames: usize,
    },

    /// The media engine reported a failure.
    ///
    /// Carries the engine's diagnostic text (for FFmpeg, the tail of its
    /// stderr and the exit status).
    #[error("Media engine error: {0}")]
    EngineError(String),

    /// The engine finished without reporting either success or failure.
    #[error("Media engine exited without reporting success or failure")]
    MissingOutcome,

    /// The engine reported more than one terminal outcome.
    #[error("Media engine reported conflicting outcomes ({successes} success, {failures} failure)")]
    ConflictingOutcome {
        /// Number of success signals observed.
        successes: usize,
        /// Number of failure signals observed.
        failures: usize,
    },

    /// The engine did not finish before the configured timeout.
    #[error("Media engine did not finish within {0:?}")]
    Timeout(Duration),

    /// The job was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// `run` was called on a job that already left the `Created` state.
    #[error("Job has already been started (current state: {0})")]
    AlreadyStarted(JobState),

    /// The probe engine failed or returned output that could not be parsed.
    #[error("Failed to probe media file: {0}")]
    ProbeError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),
}
