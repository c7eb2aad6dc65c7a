//! Pre-extraction validation.
//!
//! [`validate_metadata`] inspects probed [`MediaMetadata`] against the
//! sampling rate a job will use and returns a [`ValidationReport`]
//! describing anything that would make extraction fail or surprise.
//!
//! # Example
//!
//! ```no_run
//! use keyframes::{MediaProbe, validation::validate_metadata};
//!
//! # async fn example() -> Result<(), keyframes::KeyframeError> {
//! let metadata = MediaProbe::default().probe("input.mkv").await?;
//! let report = validate_metadata(&metadata, 1.0);
//! if !report.is_valid() {
//!     print!("{report}");
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

use crate::output::MAX_SORTABLE_FRAMES;
use crate::probe::MediaMetadata;

/// Summary of media file validation.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Informational notices (not problems).
    pub info: Vec<String>,
    /// Non-fatal issues that may affect the extracted frames.
    pub warnings: Vec<String>,
    /// Fatal issues that will prevent extraction.
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Returns `true` if no errors were found.
    ///
    /// Warnings do not affect this result.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Total number of entries (info + warnings + errors).
    pub fn issue_count(&self) -> usize {
        self.info.len() + self.warnings.len() + self.errors.len()
    }
}

impl Display for ValidationReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for item in &self.info {
            writeln!(f, "[INFO] {item}")?;
        }
        for item in &self.warnings {
            writeln!(f, "[WARN] {item}")?;
        }
        for item in &self.errors {
            writeln!(f, "[ERROR] {item}")?;
        }
        if self.issue_count() == 0 {
            writeln!(f, "No issues found.")?;
        }
        Ok(())
    }
}

/// Check `metadata` for problems with sampling at `sampling_rate_hz`.
pub fn validate_metadata(metadata: &MediaMetadata, sampling_rate_hz: f64) -> ValidationReport {
    let mut report = ValidationReport::default();

    // ── Sampling rate ──────────────────────────────────────────────
    if !sampling_rate_hz.is_finite() || sampling_rate_hz <= 0.0 {
        report.errors.push(format!(
            "Sampling rate must be greater than zero, got {sampling_rate_hz}"
        ));
    }

    // ── Stream presence ────────────────────────────────────────────
    let Some(video) = &metadata.video else {
        report
            .errors
            .push("No video stream found; there are no frames to extract".to_string());
        return report;
    };

    report.info.push(format!(
        "Video: {} {}×{} @ {:.2} fps, ~{} frames",
        video.codec, video.width, video.height, video.frames_per_second, video.frame_count,
    ));

    if video.width == 0 || video.height == 0 {
        report.errors.push(format!(
            "Invalid video dimensions: {}×{}",
            video.width, video.height,
        ));
    }

    // ── Duration ───────────────────────────────────────────────────
    if metadata.duration == Duration::ZERO {
        report
            .warnings
            .push("Media duration is zero or unknown; the job may write no frames".to_string());
    }

    if !report.is_valid() || sampling_rate_hz <= 0.0 {
        return report;
    }

    // ── Sampling versus source ─────────────────────────────────────
    if video.frames_per_second > 0.0 && sampling_rate_hz > video.frames_per_second {
        report.warnings.push(format!(
            "Sampling rate ({sampling_rate_hz} Hz) exceeds the source frame rate ({:.2} fps); frames will be duplicated",
            video.frames_per_second,
        ));
    }

    let expected = metadata.expected_frames(sampling_rate_hz);
    if expected > MAX_SORTABLE_FRAMES {
        report.warnings.push(format!(
            "About {expected} frames expected; names past {MAX_SORTABLE_FRAMES} no longer sort lexicographically",
        ));
    }
    report
        .info
        .push(format!("About {expected} frame(s) at {sampling_rate_hz} Hz"));

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::VideoMetadata;

    fn metadata(duration_secs: u64, fps: f64) -> MediaMetadata {
        MediaMetadata {
            video: Some(VideoMetadata {
                width: 640,
                height: 360,
                frames_per_second: fps,
                frame_count: (duration_secs as f64 * fps) as u64,
                codec: "h264".to_string(),
            }),
            has_audio: true,
            duration: Duration::from_secs(duration_secs),
            format: "matroska,webm".to_string(),
        }
    }

    #[test]
    fn healthy_file_is_valid() {
        let report = validate_metadata(&metadata(60, 25.0), 1.0);
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
        assert!(report.info.iter().any(|line| line.contains("About 60 frame(s)")));
    }

    #[test]
    fn missing_video_is_an_error() {
        let mut audio_only = metadata(60, 25.0);
        audio_only.video = None;
        let report = validate_metadata(&audio_only, 1.0);
        assert!(!report.is_valid());
        assert!(report.to_string().contains("[ERROR] No video stream"));
    }

    #[test]
    fn non_positive_rate_is_an_error() {
        let report = validate_metadata(&metadata(60, 25.0), 0.0);
        assert!(!report.is_valid());
    }

    #[test]
    fn oversampling_and_long_runs_warn() {
        let report = validate_metadata(&metadata(60, 25.0), 30.0);
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|line| line.contains("exceeds the source frame rate")));

        let long = validate_metadata(&metadata(20_000, 25.0), 1.0);
        assert!(long.warnings.iter().any(|line| line.contains("no longer sort")));
    }

    #[test]
    fn zero_duration_warns() {
        let report = validate_metadata(&metadata(0, 25.0), 1.0);
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|line| line.contains("duration is zero")));
    }

    #[test]
    fn empty_report_display() {
        assert_eq!(ValidationReport::default().to_string(), "No issues found.\n");
    }
}
