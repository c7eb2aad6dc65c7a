//! The keyframe-extraction job.
//!
//! [`KeyframeJob`] is a single-shot unit of work: it ensures the output
//! directory exists, runs the media engine once, and resolves to exactly
//! one outcome. It moves through
//! `Created -> Running -> {Succeeded, Failed, Cancelled}` and never retries.
//!
//! # Example
//!
//! ```no_run
//! use keyframes::{FfmpegEngine, JobConfig, KeyframeError, KeyframeJob};
//!
//! # async fn example() -> Result<(), KeyframeError> {
//! let config = JobConfig::new("./video/video_in/sample_video.mkv", "./video/keyframes_out", 1.0)?;
//! let mut job = KeyframeJob::new(config, FfmpegEngine::new("/usr/bin/ffmpeg"));
//! let report = job.run().await?;
//! println!("{} frames in {}", report.frames.len(), report.output_directory.display());
//! # Ok(())
//! # }
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::future::pending;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::configuration::{JobConfig, JobOptions};
use crate::engine::{EngineCommand, EngineSignal, EngineSignals, FfmpegEngine, MediaEngine};
use crate::error::KeyframeError;
use crate::observer::{JobEvent, JobObserver};
use crate::output::{self, MAX_SORTABLE_FRAMES};
use crate::progress::ProgressTracker;

/// Lifecycle state of a [`KeyframeJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Constructed, not yet run.
    Created,
    /// `run` has been called and has not resolved yet.
    Running,
    /// The engine reported success.
    Succeeded,
    /// Validation, directory setup, or the engine failed.
    Failed,
    /// The job was cancelled.
    Cancelled,
}

impl JobState {
    /// Returns `true` for the three final states.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            JobState::Created => "created",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// What a successful job produced.
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    /// Directory holding the frames.
    pub output_directory: PathBuf,
    /// Frame files found in the output directory, ordered by index.
    ///
    /// Includes frames left there by earlier runs that were not replaced.
    pub frames: Vec<PathBuf>,
    /// The engine command line that was run.
    pub command: String,
    /// Wall-clock duration of the job.
    pub elapsed: Duration,
}

/// Outcome of a job: the report on success, the reason on failure.
pub type JobResult = Result<ExtractionReport, KeyframeError>;

/// A single-shot keyframe-extraction job.
///
/// Generic over the [`MediaEngine`] so the engine (and therefore the binary
/// it runs) is injected rather than configured globally.
pub struct KeyframeJob<E: MediaEngine = FfmpegEngine> {
    config: JobConfig,
    options: JobOptions,
    engine: E,
    state: JobState,
}

impl<E: MediaEngine> KeyframeJob<E> {
    /// Create a job in the `Created` state with default [`JobOptions`].
    pub fn new(config: JobConfig, engine: E) -> Self {
        Self {
            config,
            options: JobOptions::default(),
            engine,
            state: JobState::Created,
        }
    }

    /// Replace the job's operational options.
    #[must_use]
    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }

    /// The job's configuration.
    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// The job's current lifecycle state.
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Run the job to its single terminal outcome.
    ///
    /// The output directory is created before the engine starts, so it
    /// exists even when the engine then fails. Frames written before a
    /// failure, timeout, or cancellation are left on disk.
    ///
    /// # Errors
    ///
    /// - [`KeyframeError::AlreadyStarted`] if the job is not in `Created`
    ///   state; nothing else happens in that case.
    /// - [`KeyframeError::InvalidSamplingRate`] /
    ///   [`KeyframeError::InvalidConfiguration`] before anything is touched.
    /// - [`KeyframeError::OutputNotEmpty`] if overwriting is disabled and the
    ///   output directory already holds frames; the engine is not started.
    /// - [`KeyframeError::Filesystem`] if the output directory cannot be
    ///   prepared; the engine is not started.
    /// - [`KeyframeError::EngineError`] with the engine's diagnostic.
    /// - [`KeyframeError::MissingOutcome`] /
    ///   [`KeyframeError::ConflictingOutcome`] if the engine broke its
    ///   signalling contract.
    /// - [`KeyframeError::Timeout`] / [`KeyframeError::Cancelled`].
    pub async fn run(&mut self) -> JobResult {
        if self.state != JobState::Created {
            return Err(KeyframeError::AlreadyStarted(self.state));
        }
        self.state = JobState::Running;

        let started_at = Instant::now();
        let outcome = self.drive(started_at).await;

        let observer = &self.options.observer;
        match &outcome {
            Ok(report) => {
                self.state = JobState::Succeeded;
                observer.on_event(&JobEvent::Succeeded {
                    output_directory: report.output_directory.clone(),
                    frames: report.frames.len(),
                    elapsed: report.elapsed,
                });
            }
            Err(KeyframeError::Cancelled) => {
                self.state = JobState::Cancelled;
                observer.on_event(&JobEvent::Cancelled);
            }
            Err(error) => {
                self.state = JobState::Failed;
                observer.on_event(&JobEvent::Failed {
                    reason: error.to_string(),
                });
            }
        }

        outcome
    }

    async fn drive(&self, started_at: Instant) -> JobResult {
        self.config.validate()?;
        if self.options.is_cancelled() {
            return Err(KeyframeError::Cancelled);
        }

        let output_directory = self.config.output_directory();
        output::ensure_directory(output_directory).await?;

        if !self.options.overwrite {
            let existing = output::collect_frames(output_directory).await?;
            if !existing.is_empty() {
                return Err(KeyframeError::OutputNotEmpty {
                    path: output_directory.to_path_buf(),
                    frames: existing.len(),
                });
            }
        }

        if let Some(expected) = self.options.expected_frames {
            if expected > MAX_SORTABLE_FRAMES {
                log::warn!(
                    "Expecting ~{expected} frames; names past {MAX_SORTABLE_FRAMES} gain a digit and no longer sort lexicographically"
                );
            }
        }

        let command =
            EngineCommand::frame_extraction(self.engine.program(), &self.config, &self.options);
        log::debug!("Running media engine: {command}");

        self.supervise(&command).await?;

        Ok(ExtractionReport {
            output_directory: output_directory.to_path_buf(),
            frames: output::collect_frames(output_directory).await?,
            command: command.to_string(),
            elapsed: started_at.elapsed(),
        })
    }

    /// Drive the engine while listening for its signals, the timeout, and
    /// cancellation.
    async fn supervise(&self, command: &EngineCommand) -> Result<(), KeyframeError> {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let engine_run = self.engine.execute(command, EngineSignals::new(sender));
        tokio::pin!(engine_run);

        let timeout = self.options.timeout;
        let deadline = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => pending().await,
            }
        };
        tokio::pin!(deadline);

        let cancellation = self.options.cancellation.clone();
        let cancelled = async {
            match &cancellation {
                Some(token) => token.cancelled().await,
                None => pending().await,
            }
        };
        tokio::pin!(cancelled);

        let tracker =
            ProgressTracker::new(self.options.progress.clone(), self.options.expected_frames);
        let mut tally = OutcomeTally::default();
        let mut engine_finished = false;

        // Returning early drops `engine_run`, which stops the engine. Once
        // the engine has finished, only its buffered signals remain and
        // cancellation or timeout no longer apply.
        loop {
            tokio::select! {
                biased;
                () = &mut engine_run, if !engine_finished => engine_finished = true,
                () = &mut cancelled, if !engine_finished => return Err(KeyframeError::Cancelled),
                () = &mut deadline, if !engine_finished => {
                    return Err(KeyframeError::Timeout(timeout.unwrap_or_default()));
                }
                signal = receiver.recv() => match signal {
                    Some(signal) => tally.record(signal, self.options.observer.as_ref(), &tracker),
                    // Every sender is gone: the engine has finished.
                    None => break,
                },
            }
        }

        tally.resolve()
    }
}

/// Run a job with default options and the `ffmpeg` found on `PATH`.
pub async fn extract_keyframes(config: JobConfig) -> JobResult {
    KeyframeJob::new(config, FfmpegEngine::default())
        .run()
        .await
}

/// Counts the terminal signals of one engine run.
#[derive(Debug, Default)]
struct OutcomeTally {
    started: bool,
    successes: usize,
    failures: Vec<String>,
}

impl OutcomeTally {
    fn record(&mut self, signal: EngineSignal, observer: &dyn JobObserver, tracker: &ProgressTracker) {
        match signal {
            EngineSignal::Start(command) => {
                if self.started {
                    log::warn!("Media engine reported start more than once");
                    return;
                }
                self.started = true;
                observer.on_event(&JobEvent::Started { command });
            }
            EngineSignal::Progress(update) => tracker.record(update),
            EngineSignal::Error(message) => self.failures.push(message),
            EngineSignal::End => self.successes += 1,
        }
    }

    fn resolve(mut self) -> Result<(), KeyframeError> {
        match (self.successes, self.failures.len()) {
            (1, 0) => Ok(()),
            (0, 1) => Err(KeyframeError::EngineError(self.failures.remove(0))),
            (0, 0) => Err(KeyframeError::MissingOutcome),
            (successes, failures) => Err(KeyframeError::ConflictingOutcome {
                successes,
                failures,
            }),
        }
    }
}
