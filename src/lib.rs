//! # keyframes
//!
//! Extract still frames from video files at a fixed sampling rate.
//!
//! `keyframes` drives an external FFmpeg binary: it builds the command line,
//! makes sure the output directory exists, watches the engine's lifecycle,
//! and resolves each job to exactly one outcome. Decoding, frame sampling
//! and JPEG encoding are done entirely by FFmpeg.
//!
//! ## Quick Start
//!
//! ### One frame per second
//!
//! ```no_run
//! use keyframes::{JobConfig, KeyframeError, extract_keyframes};
//!
//! # async fn example() -> Result<(), KeyframeError> {
//! let config = JobConfig::new("./video/video_in/sample_video.mkv", "./video/keyframes_out", 1.0)?;
//! let report = extract_keyframes(config).await?;
//! // ./video/keyframes_out/frame-0001.jpg, frame-0002.jpg, ...
//! println!("Extracted {} frames", report.frames.len());
//! # Ok(())
//! # }
//! ```
//!
//! ### Explicit engine, timeout and cancellation
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use keyframes::{
//!     CancellationToken, FfmpegEngine, JobConfig, JobOptions, KeyframeError, KeyframeJob,
//! };
//!
//! # async fn example() -> Result<(), KeyframeError> {
//! let token = CancellationToken::new();
//! let options = JobOptions::new()
//!     .with_timeout(Duration::from_secs(300))
//!     .with_cancellation(token.clone());
//!
//! let config = JobConfig::new("lecture.mp4", "slides", 0.2)?;
//! let mut job = KeyframeJob::new(config, FfmpegEngine::new("/opt/ffmpeg/bin/ffmpeg"))
//!     .with_options(options);
//! job.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Single-shot jobs** — `Created -> Running -> {Succeeded, Failed,
//!   Cancelled}`, never retried
//! - **Injected engine** — the FFmpeg location is a constructor argument,
//!   and any [`MediaEngine`] implementation can stand in for it
//! - **Lifecycle observation** — [`JobObserver`] events, logged through the
//!   `log` facade by default
//! - **Progress & cancellation** — FFmpeg's `-progress` stream feeds
//!   [`ProgressCallback`]s; a [`CancellationToken`] kills the engine
//! - **Probing & validation** — `ffprobe`-based [`MediaProbe`] and a
//!   [`ValidationReport`] before extraction
//!
//! ## Requirements
//!
//! An FFmpeg installation providing the `ffmpeg` (and, for probing,
//! `ffprobe`) executables.

pub mod configuration;
pub mod engine;
pub mod error;
pub mod job;
pub mod observer;
pub mod output;
pub mod probe;
pub mod progress;
pub mod validation;

pub use configuration::{JobConfig, JobOptions};
pub use engine::{
    EngineCommand, EngineLogLevel, EngineSignal, EngineSignals, FfmpegEngine, MediaEngine,
};
pub use error::KeyframeError;
pub use job::{ExtractionReport, JobResult, JobState, KeyframeJob, extract_keyframes};
pub use observer::{JobEvent, JobObserver, LogObserver};
pub use output::{FRAME_PATTERN, ensure_directory, frame_file_name, list_frames};
pub use probe::{MediaMetadata, MediaProbe, VideoMetadata};
pub use progress::{
    CancellationToken, ProgressCallback, ProgressInfo, ProgressParser, ProgressUpdate,
};
pub use validation::ValidationReport;
