//! Job configuration.
//!
//! [`JobConfig`] names *what* a job extracts: the source video, the output
//! directory, and the sampling rate. It is validated once at construction
//! and immutable afterwards.
//!
//! [`JobOptions`] is a builder that threads operational settings (progress
//! callbacks, cancellation, timeout, observer, engine tuning) through a job
//! without polluting its constructor.
//!
//! # Example
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use keyframes::{CancellationToken, JobConfig, JobOptions, LogObserver};
//!
//! let config = JobConfig::new("input.mkv", "frames", 1.0)?;
//! let token = CancellationToken::new();
//! let options = JobOptions::new()
//!     .with_cancellation(token.clone())
//!     .with_timeout(Duration::from_secs(600))
//!     .with_jpeg_quality(3)
//!     .with_observer(Arc::new(LogObserver));
//! # Ok::<(), keyframes::KeyframeError>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::EngineLogLevel;
use crate::error::KeyframeError;
use crate::observer::{JobObserver, LogObserver};
use crate::output::FRAME_PATTERN;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Best JPEG quality accepted by FFmpeg's `-q:v` for the MJPEG encoder.
const BEST_JPEG_QUALITY: u8 = 2;
/// Worst JPEG quality accepted by FFmpeg's `-q:v` for the MJPEG encoder.
const WORST_JPEG_QUALITY: u8 = 31;

/// What a keyframe-extraction job works on.
///
/// # Example
///
/// ```
/// use keyframes::JobConfig;
///
/// let config = JobConfig::new("video.mkv", "keyframes_out", 0.5).unwrap();
/// assert_eq!(config.sampling_rate_hz(), 0.5);
///
/// assert!(JobConfig::new("video.mkv", "keyframes_out", 0.0).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    source_path: PathBuf,
    output_directory: PathBuf,
    sampling_rate_hz: f64,
}

impl JobConfig {
    /// Create a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`KeyframeError::InvalidSamplingRate`] unless
    /// `sampling_rate_hz` is finite and strictly positive, and
    /// [`KeyframeError::InvalidConfiguration`] if either path is empty.
    /// The source file's existence is left to the media engine to check.
    pub fn new<S: AsRef<Path>, O: AsRef<Path>>(
        source_path: S,
        output_directory: O,
        sampling_rate_hz: f64,
    ) -> Result<Self, KeyframeError> {
        let config = Self {
            source_path: source_path.as_ref().to_path_buf(),
            output_directory: output_directory.as_ref().to_path_buf(),
            sampling_rate_hz,
        };
        config.validate()?;
        Ok(config)
    }

    /// Re-check the invariants enforced by [`JobConfig::new`].
    pub fn validate(&self) -> Result<(), KeyframeError> {
        if !self.sampling_rate_hz.is_finite() || self.sampling_rate_hz <= 0.0 {
            return Err(KeyframeError::InvalidSamplingRate(self.sampling_rate_hz));
        }
        if self.source_path.as_os_str().is_empty() {
            return Err(KeyframeError::InvalidConfiguration(
                "source path is empty".to_string(),
            ));
        }
        if self.output_directory.as_os_str().is_empty() {
            return Err(KeyframeError::InvalidConfiguration(
                "output directory is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The video to sample.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Where frame images are written.
    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Frames sampled per second of source video time.
    pub fn sampling_rate_hz(&self) -> f64 {
        self.sampling_rate_hz
    }

    /// The engine's output path pattern, e.g. `frames/frame-%04d.jpg`.
    ///
    /// Any `%` in the directory is doubled so the engine reads it literally.
    pub fn output_pattern(&self) -> PathBuf {
        escape_percent(&self.output_directory).join(FRAME_PATTERN)
    }
}

#[cfg(unix)]
fn escape_percent(directory: &Path) -> PathBuf {
    use std::ffi::OsString;
    use std::os::unix::ffi::{OsStrExt, OsStringExt};

    let bytes = directory.as_os_str().as_bytes();
    let mut escaped = Vec::with_capacity(bytes.len());
    for &byte in bytes {
        if byte == b'%' {
            escaped.push(b'%');
        }
        escaped.push(byte);
    }
    PathBuf::from(OsString::from_vec(escaped))
}

#[cfg(not(unix))]
fn escape_percent(directory: &Path) -> PathBuf {
    match directory.to_str() {
        Some(text) => PathBuf::from(text.replace('%', "%%")),
        None => directory.to_path_buf(),
    }
}

/// Operational settings for a job.
///
/// A default-constructed value logs lifecycle events through the `log`
/// facade, overwrites existing frames, never times out, and cannot be
/// cancelled.
#[derive(Clone)]
pub struct JobOptions {
    /// Progress callback. Defaults to a no-op.
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// Lifecycle observer. Defaults to [`LogObserver`].
    pub(crate) observer: Arc<dyn JobObserver>,
    /// Cancellation token. `None` means never cancelled.
    pub(crate) cancellation: Option<CancellationToken>,
    /// Upper bound on the engine's run time.
    pub(crate) timeout: Option<Duration>,
    /// Number of frames the job is expected to produce, for percentages.
    pub(crate) expected_frames: Option<u64>,
    /// JPEG quality passed as `-q:v` (2 best, 31 worst).
    pub(crate) jpeg_quality: Option<u8>,
    /// Whether a job may write into a directory that already holds frames.
    pub(crate) overwrite: bool,
    /// Verbosity of the engine's own stderr output.
    pub(crate) log_level: EngineLogLevel,
}

impl Debug for JobOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("JobOptions")
            .field("has_cancellation", &self.cancellation.is_some())
            .field("timeout", &self.timeout)
            .field("expected_frames", &self.expected_frames)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("overwrite", &self.overwrite)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl JobOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            observer: Arc::new(LogObserver),
            cancellation: None,
            timeout: None,
            expected_frames: None,
            jpeg_quality: None,
            overwrite: true,
            log_level: EngineLogLevel::Error,
        }
    }

    /// Attach a progress callback, invoked for every progress block the
    /// engine reports.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Replace the lifecycle observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Attach a cancellation token.
    ///
    /// When the token is cancelled the engine process is killed and the
    /// job fails with [`KeyframeError::Cancelled`].
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Bound the engine's run time.
    ///
    /// When the timeout elapses the engine process is killed and the job
    /// fails with [`KeyframeError::Timeout`].
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Tell the progress reporter how many frames to expect.
    ///
    /// See [`MediaMetadata::expected_frames`](crate::MediaMetadata::expected_frames).
    #[must_use]
    pub fn with_expected_frames(mut self, frames: u64) -> Self {
        self.expected_frames = Some(frames);
        self
    }

    /// Set the JPEG quality, clamped to FFmpeg's `2..=31` range.
    #[must_use]
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = Some(quality.clamp(BEST_JPEG_QUALITY, WORST_JPEG_QUALITY));
        self
    }

    /// Control whether existing frame files may be replaced. Defaults to
    /// `true`.
    ///
    /// With `false`, a job whose output directory already contains frame
    /// files fails with [`KeyframeError::OutputNotEmpty`] before the engine
    /// starts. FFmpeg's image sequence writer ignores `-n`.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Set the engine's own log verbosity. Defaults to
    /// [`EngineLogLevel::Error`].
    #[must_use]
    pub fn with_log_level(mut self, level: EngineLogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Returns `true` if cancellation has been requested.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}
