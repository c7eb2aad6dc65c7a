//! Progress reporting and cancellation support.
//!
//! FFmpeg writes machine-readable progress blocks when invoked with
//! `-progress pipe:1`:
//!
//! ```text
//! frame=12
//! out_time_us=11000000
//! progress=continue
//! ```
//!
//! [`ProgressParser`] turns those lines into [`ProgressUpdate`]s, and the
//! job forwards each one to a [`ProgressCallback`] as a [`ProgressInfo`]
//! snapshot. [`CancellationToken`] lets another task stop a running job.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use keyframes::{
//!     FfmpegEngine, JobConfig, JobOptions, KeyframeError, KeyframeJob, ProgressCallback,
//!     ProgressInfo,
//! };
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("{pct:.1}% ({} frames)", info.current);
//!         }
//!     }
//! }
//!
//! # async fn example() -> Result<(), KeyframeError> {
//! let config = JobConfig::new("input.mkv", "frames", 1.0)?;
//! let options = JobOptions::new()
//!     .with_expected_frames(120)
//!     .with_progress(Arc::new(PrintProgress));
//! KeyframeJob::new(config, FfmpegEngine::default())
//!     .with_options(options)
//!     .run()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

/// A snapshot of extraction progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// How many frames the engine has written so far.
    pub current: u64,
    /// Total frames expected, if known ahead of time.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the engine started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// Position in the source video the engine has reached.
    pub current_timestamp: Option<Duration>,
    /// `true` for the engine's final progress block.
    pub finished: bool,
}

/// Trait for receiving progress updates during extraction.
///
/// Progress callbacks are **infallible**: they observe but cannot halt the
/// job. Use [`CancellationToken`] for cancellation.
pub trait ProgressCallback: Send + Sync {
    /// Called once per progress block reported by the engine.
    fn on_progress(&self, info: &ProgressInfo);
}

/// A no-op implementation that discards all progress notifications.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// One parsed progress block from the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Cumulative number of frames written.
    pub frame: u64,
    /// Source position reached, when the engine knows it.
    pub out_time: Option<Duration>,
    /// Whether this is the last block (`progress=end`).
    pub finished: bool,
}

/// Incremental parser for FFmpeg's `-progress` key/value output.
///
/// Feed it one line at a time; a complete [`ProgressUpdate`] is returned
/// when the block-terminating `progress=` line arrives. Unknown keys and
/// unparsable values (FFmpeg prints `N/A` before the first frame) are
/// ignored.
///
/// ```
/// use keyframes::ProgressParser;
///
/// let mut parser = ProgressParser::new();
/// assert!(parser.feed_line("frame=3").is_none());
/// assert!(parser.feed_line("out_time_us=2500000").is_none());
/// let update = parser.feed_line("progress=continue").unwrap();
/// assert_eq!(update.frame, 3);
/// assert!(!update.finished);
/// ```
#[derive(Debug, Default)]
pub struct ProgressParser {
    pending: ProgressUpdate,
}

impl ProgressParser {
    /// Create a parser with no accumulated state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one line of engine output.
    pub fn feed_line(&mut self, line: &str) -> Option<ProgressUpdate> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key.trim() {
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.pending.frame = frame;
                }
            }
            // `out_time_ms` is also in microseconds; FFmpeg kept the old name.
            "out_time_us" | "out_time_ms" => {
                if let Ok(micros) = value.parse::<u64>() {
                    self.pending.out_time = Some(Duration::from_micros(micros));
                }
            }
            "progress" => {
                let mut update = self.pending;
                update.finished = value == "end";
                return Some(update);
            }
            _ => {}
        }

        None
    }
}

/// Cooperative cancellation token.
///
/// Clone this token and share it between tasks; call
/// [`cancel`](CancellationToken::cancel) from anywhere to stop the
/// associated job. A running job awaits
/// [`cancelled`](CancellationToken::cancelled) alongside the engine.
///
/// # Example
///
/// ```
/// use keyframes::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationState>,
}

#[derive(Debug, Default)]
struct CancellationState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationState::default()),
        }
    }

    /// Request cancellation.
    ///
    /// All clones of this token observe the cancellation, and every task
    /// waiting in [`cancelled`](CancellationToken::cancelled) is woken.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            // Registered before the flag check so a concurrent `cancel`
            // cannot slip between the two.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Internal helper that turns engine updates into [`ProgressInfo`]
/// snapshots and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    total: Option<u64>,
    start_time: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, total: Option<u64>) -> Self {
        Self {
            callback,
            total,
            start_time: Instant::now(),
        }
    }

    pub(crate) fn record(&self, update: ProgressUpdate) {
        let info = self.snapshot(update, self.start_time.elapsed());
        self.callback.on_progress(&info);
    }

    fn snapshot(&self, update: ProgressUpdate, elapsed: Duration) -> ProgressInfo {
        let current = update.frame;

        let percentage = if update.finished {
            Some(100.0)
        } else {
            self.total
                .filter(|&t| t > 0)
                .map(|t| ((current as f32 / t as f32) * 100.0).min(100.0))
        };

        let estimated_remaining = if update.finished {
            Some(Duration::ZERO)
        } else if current > 0 {
            self.total.and_then(|t| {
                let remaining = t.saturating_sub(current);
                let per_item = elapsed.as_secs_f64() / current as f64;
                Duration::try_from_secs_f64(per_item * remaining as f64).ok()
            })
        } else {
            None
        };

        ProgressInfo {
            current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            current_timestamp: update.out_time,
            finished: update.finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut ProgressParser, text: &str) -> Vec<ProgressUpdate> {
        text.lines().filter_map(|line| parser.feed_line(line)).collect()
    }

    #[test]
    fn parses_consecutive_blocks() {
        let output = "\
frame=0
fps=0.00
out_time_us=N/A
out_time=N/A
progress=continue
frame=5
fps=4.9
out_time_us=4000000
out_time=00:00:04.000000
speed=3.9x
progress=continue
frame=8
out_time_us=7000000
progress=end
";
        let mut parser = ProgressParser::new();
        let updates = feed_all(&mut parser, output);

        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].frame, 0);
        assert_eq!(updates[0].out_time, None);
        assert_eq!(updates[1].frame, 5);
        assert_eq!(updates[1].out_time, Some(Duration::from_secs(4)));
        assert!(!updates[1].finished);
        assert_eq!(updates[2].frame, 8);
        assert!(updates[2].finished);
    }

    #[test]
    fn ignores_lines_without_separator() {
        let mut parser = ProgressParser::new();
        assert!(parser.feed_line("").is_none());
        assert!(parser.feed_line("garbage").is_none());
        assert!(parser.feed_line("frame=abc").is_none());
        assert_eq!(parser.feed_line("progress=continue").unwrap().frame, 0);
    }

    struct Recorder(std::sync::Mutex<Vec<ProgressInfo>>);

    impl ProgressCallback for Recorder {
        fn on_progress(&self, info: &ProgressInfo) {
            self.0.lock().unwrap().push(info.clone());
        }
    }

    #[test]
    fn tracker_computes_percentage_and_clamps() {
        let tracker = ProgressTracker::new(Arc::new(NoOpProgress), Some(10));

        let half = tracker.snapshot(
            ProgressUpdate { frame: 5, out_time: None, finished: false },
            Duration::from_secs(5),
        );
        assert_eq!(half.percentage, Some(50.0));
        assert_eq!(half.estimated_remaining, Some(Duration::from_secs(5)));

        let over = tracker.snapshot(
            ProgressUpdate { frame: 11, out_time: None, finished: false },
            Duration::from_secs(5),
        );
        assert_eq!(over.percentage, Some(100.0));
    }

    #[test]
    fn tracker_handles_counts_beyond_u32() {
        let total = 1_u64 << 33;
        let tracker = ProgressTracker::new(Arc::new(NoOpProgress), Some(total));

        let info = tracker.snapshot(
            ProgressUpdate { frame: 1 << 32, out_time: None, finished: false },
            Duration::from_secs(100),
        );
        assert_eq!(info.percentage, Some(50.0));
        let remaining = info.estimated_remaining.unwrap();
        assert!((remaining.as_secs_f64() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn tracker_without_total_has_no_percentage() {
        let tracker = ProgressTracker::new(Arc::new(NoOpProgress), None);
        let info = tracker.snapshot(
            ProgressUpdate { frame: 3, out_time: None, finished: false },
            Duration::from_secs(1),
        );
        assert_eq!(info.percentage, None);
        assert_eq!(info.estimated_remaining, None);

        let done = tracker.snapshot(
            ProgressUpdate { frame: 3, out_time: None, finished: true },
            Duration::from_secs(1),
        );
        assert_eq!(done.percentage, Some(100.0));
    }

    #[test]
    fn tracker_forwards_to_callback() {
        let recorder = Arc::new(Recorder(std::sync::Mutex::new(Vec::new())));
        let tracker = ProgressTracker::new(recorder.clone(), Some(4));
        tracker.record(ProgressUpdate { frame: 1, out_time: None, finished: false });
        tracker.record(ProgressUpdate { frame: 4, out_time: None, finished: true });

        let infos = recorder.0.lock().unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].current, 1);
        assert!(infos[1].finished);
    }

    #[test]
    fn cancellation_token_clone_shares_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tokio::task::yield_now().await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("waiter should wake up")
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("already cancelled token should resolve");
    }
}
