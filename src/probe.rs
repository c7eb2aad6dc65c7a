//! Lightweight media file probing through `ffprobe`.
//!
//! [`MediaProbe`] runs the probe binary once, parses its JSON report into a
//! [`MediaMetadata`], and exits. The metadata is used to estimate how many
//! frames a job will write (for progress percentages) and by
//! [`validation`](crate::validation) to flag problems before extraction.
//!
//! # Example
//!
//! ```no_run
//! use keyframes::MediaProbe;
//!
//! # async fn example() -> Result<(), keyframes::KeyframeError> {
//! let metadata = MediaProbe::default().probe("input.mkv").await?;
//! println!("Duration: {:?}, format: {}", metadata.duration, metadata.format);
//! println!("~{} frames at 1 fps", metadata.expected_frames(1.0));
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;

use crate::error::KeyframeError;

/// Binary looked up on `PATH` when no explicit location is given.
pub const DEFAULT_FFPROBE_BINARY: &str = "ffprobe";

/// Container-level metadata for a media file.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct MediaMetadata {
    /// Metadata of the first video stream, if there is one.
    pub video: Option<VideoMetadata>,
    /// Whether the file carries at least one audio stream.
    pub has_audio: bool,
    /// Total duration of the media file.
    pub duration: Duration,
    /// Container format name (e.g. `"matroska,webm"`, `"mov,mp4,m4a,3gp,3g2,mj2"`).
    pub format: String,
}

/// Metadata for a video stream.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct VideoMetadata {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Average frames per second (approximate for variable frame rate).
    pub frames_per_second: f64,
    /// Frame count reported by the container, or estimated from duration
    /// and frame rate.
    pub frame_count: u64,
    /// Codec name (e.g. `"h264"`, `"vp9"`, `"av1"`).
    pub codec: String,
}

impl MediaMetadata {
    /// Estimate how many frames sampling at `sampling_rate_hz` will write.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use keyframes::MediaMetadata;
    ///
    /// let metadata = MediaMetadata {
    ///     video: None,
    ///     has_audio: false,
    ///     duration: Duration::from_millis(10_500),
    ///     format: "matroska,webm".to_string(),
    /// };
    /// assert_eq!(metadata.expected_frames(1.0), 11);
    /// assert_eq!(metadata.expected_frames(0.5), 6);
    /// ```
    pub fn expected_frames(&self, sampling_rate_hz: f64) -> u64 {
        if !sampling_rate_hz.is_finite() || sampling_rate_hz <= 0.0 {
            return 0;
        }
        (self.duration.as_secs_f64() * sampling_rate_hz).ceil() as u64
    }
}

/// Runs `ffprobe` to inspect media files.
#[derive(Debug, Clone)]
pub struct MediaProbe {
    binary: PathBuf,
}

impl Default for MediaProbe {
    fn default() -> Self {
        Self::new(DEFAULT_FFPROBE_BINARY)
    }
}

impl MediaProbe {
    /// Use the `ffprobe` executable at `binary`.
    pub fn new<P: AsRef<Path>>(binary: P) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
        }
    }

    /// Probe a media file and return its metadata.
    ///
    /// # Errors
    ///
    /// Returns [`KeyframeError::ProbeError`] if the probe binary cannot be
    /// started, rejects the file, or prints output that cannot be parsed.
    pub async fn probe<P: AsRef<Path>>(&self, path: P) -> Result<MediaMetadata, KeyframeError> {
        let path = path.as_ref();
        log::debug!("Probing media file: {}", path.display());

        let output = Command::new(&self.binary)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|error| {
                KeyframeError::ProbeError(format!(
                    "failed to start {}: {error}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.trim();
            return Err(KeyframeError::ProbeError(if reason.is_empty() {
                format!("{} exited with {}", self.binary.display(), output.status)
            } else {
                reason.to_string()
            }));
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    /// Probe several files; a file that fails produces an `Err` entry
    /// instead of aborting the batch.
    pub async fn probe_many<P: AsRef<Path>>(
        &self,
        paths: &[P],
    ) -> Vec<Result<MediaMetadata, KeyframeError>> {
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            results.push(self.probe(path).await);
        }
        results
    }
}

/// Parse the JSON document printed by
/// `ffprobe -print_format json -show_format -show_streams`.
pub fn parse_probe_output(json: &str) -> Result<MediaMetadata, KeyframeError> {
    let document: Value = serde_json::from_str(json)
        .map_err(|error| KeyframeError::ProbeError(format!("invalid probe output: {error}")))?;

    let streams = document["streams"].as_array().map(Vec::as_slice).unwrap_or(&[]);
    let format = &document["format"];

    let video_stream = streams
        .iter()
        .find(|stream| stream["codec_type"] == "video");
    let has_audio = streams
        .iter()
        .any(|stream| stream["codec_type"] == "audio");

    let duration = seconds_field(&format["duration"])
        .or_else(|| video_stream.and_then(|stream| seconds_field(&stream["duration"])))
        .unwrap_or(Duration::ZERO);

    let video = video_stream.map(|stream| {
        let frames_per_second = parse_rate(&stream["avg_frame_rate"])
            .filter(|rate| *rate > 0.0)
            .or_else(|| parse_rate(&stream["r_frame_rate"]))
            .unwrap_or(0.0);
        let frame_count = integer_field(&stream["nb_frames"])
            .unwrap_or_else(|| (duration.as_secs_f64() * frames_per_second).round() as u64);

        VideoMetadata {
            width: integer_field(&stream["width"]).unwrap_or(0) as u32,
            height: integer_field(&stream["height"]).unwrap_or(0) as u32,
            frames_per_second,
            frame_count,
            codec: stream["codec_name"].as_str().unwrap_or("unknown").to_string(),
        }
    });

    Ok(MediaMetadata {
        video,
        has_audio,
        duration,
        format: format["format_name"].as_str().unwrap_or("unknown").to_string(),
    })
}

/// ffprobe prints most numbers as strings; accept either form.
fn integer_field(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|text| text.parse().ok()))
}

fn seconds_field(value: &Value) -> Option<Duration> {
    let seconds = value
        .as_f64()
        .or_else(|| value.as_str().and_then(|text| text.parse().ok()))?;
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
}

/// Parse a rational frame rate such as `"30000/1001"`.
fn parse_rate(value: &Value) -> Option<f64> {
    let text = value.as_str()?;
    match text.split_once('/') {
        Some((numerator, denominator)) => {
            let numerator: f64 = numerator.parse().ok()?;
            let denominator: f64 = denominator.parse().ok()?;
            (denominator != 0.0).then(|| numerator / denominator)
        }
        None => text.parse().ok(),
    }
}
