use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use keyframes::{
    CancellationToken, EngineLogLevel, ExtractionReport, FfmpegEngine, JobConfig, JobOptions,
    KeyframeError, KeyframeJob, MediaMetadata, MediaProbe, ProgressCallback, ProgressInfo,
    validation::validate_metadata,
};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  keyframes extract ./video/video_in/sample_video.mkv --out ./video/keyframes_out\n  keyframes extract input.mp4 --out slides --fps 0.2 --quality 3 --progress\n  keyframes probe input.mp4 --json\n  keyframes validate input.mp4 --fps 2\n  keyframes completions zsh > _keyframes";

#[derive(Debug, Parser)]
#[command(
    name = "keyframes",
    version,
    about = "Extract frames from a video at a fixed sampling rate using FFmpeg",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone)]
struct GlobalOptions {
    /// Show additional logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar while extracting.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow replacing frames already present in the output directory.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Path to the ffmpeg executable.
    #[arg(long, global = true, env = "KEYFRAMES_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Path to the ffprobe executable.
    #[arg(long, global = true, env = "KEYFRAMES_FFPROBE", default_value = "ffprobe")]
    ffprobe: PathBuf,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract frames into an output directory.
    #[command(
        about = "Extract frames at a fixed sampling rate",
        after_help = "Examples:\n  keyframes extract input.mkv --out frames\n  keyframes extract input.mkv --out frames --fps 0.5 --timeout 10:00"
    )]
    Extract {
        /// Input video path.
        video: PathBuf,
        /// Output directory for frame images (created if missing).
        #[arg(long)]
        out: PathBuf,
        /// Frames sampled per second of video.
        #[arg(long, default_value_t = 1.0)]
        fps: f64,
        /// JPEG quality, 2 (best) to 31 (worst).
        #[arg(long)]
        quality: Option<u8>,
        /// Give up after this long (seconds, MM:SS or HH:MM:SS).
        #[arg(long)]
        timeout: Option<String>,
        /// Print the result as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print metadata for a video file.
    #[command(
        about = "Print media metadata",
        visible_alias = "info",
        after_help = "Examples:\n  keyframes probe input.mp4\n  keyframes probe a.mp4 b.mkv --json"
    )]
    Probe {
        /// Input video paths.
        #[arg(required = true)]
        videos: Vec<PathBuf>,
        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check a video before extracting from it.
    #[command(
        about = "Validate a video for extraction",
        after_help = "Examples:\n  keyframes validate input.mp4\n  keyframes validate input.mp4 --fps 5"
    )]
    Validate {
        /// Input video path.
        video: PathBuf,
        /// Sampling rate the extraction would use.
        #[arg(long, default_value_t = 1.0)]
        fps: f64,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return seconds_to_duration(seconds, trimmed);
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    seconds_to_duration(total_seconds, trimmed)
}

fn seconds_to_duration(seconds: f64, input: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("time must be a finite, non-negative value: {input}").into());
    }
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| format!("time is too large: {input}").into())
}

/// Warn before `--overwrite` replaces frames from an earlier run.
fn warn_on_existing_frames(out: &Path, overwrite: bool) -> Result<usize, Box<dyn std::error::Error>> {
    if !out.is_dir() {
        return Ok(0);
    }

    let existing = keyframes::list_frames(out)?.len();
    if existing > 0 && overwrite {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            format!(
                "replacing {existing} frame(s) in existing directory {}",
                out.display()
            )
            .yellow()
        );
    }
    Ok(existing)
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new(total: Option<u64>) -> Result<Self, Box<dyn std::error::Error>> {
        let bar = match total {
            Some(total) => {
                let bar = ProgressBar::new(total);
                let style = ProgressStyle::with_template(
                    "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} frames {msg}",
                )?;
                bar.set_style(style.progress_chars("##-"));
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(ProgressStyle::with_template("{spinner:.green} {pos} frames {msg}")?);
                bar
            }
        };
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            if info.current > total {
                self.bar.set_length(info.current);
            }
        }
        self.bar.set_position(info.current);
        if let Some(timestamp) = info.current_timestamp {
            self.bar.set_message(format!("@ {:.1}s", timestamp.as_secs_f64()));
        }
        if info.finished {
            self.bar.finish_with_message("done");
        }
    }
}

async fn expected_frames(probe: &MediaProbe, video: &Path, fps: f64) -> Option<u64> {
    match probe.probe(video).await {
        Ok(metadata) => Some(metadata.expected_frames(fps)).filter(|&frames| frames > 0),
        Err(error) => {
            log::warn!("Could not estimate frame count: {error}");
            None
        }
    }
}

fn print_report(report: &ExtractionReport, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        let name_of = |path: &PathBuf| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
        };
        let payload = json!({
            "output_directory": report.output_directory,
            "frames": report.frames.len(),
            "first_frame": report.frames.first().and_then(name_of),
            "last_frame": report.frames.last().and_then(name_of),
            "elapsed_seconds": report.elapsed.as_secs_f64(),
            "command": report.command,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!(
            "{} {}",
            "success:".green().bold(),
            format!(
                "Extracted {} frame(s) to {} in {:.2?}",
                report.frames.len(),
                report.output_directory.display(),
                report.elapsed
            )
            .green()
        );
    }
    Ok(())
}

fn print_metadata(
    video: &Path,
    metadata: &MediaMetadata,
    json: bool,
    with_header: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        let payload = json!({
            "path": video,
            "format": metadata.format,
            "duration_seconds": metadata.duration.as_secs_f64(),
            "has_audio": metadata.has_audio,
            "video": metadata.video.as_ref().map(|video| json!({
                "width": video.width,
                "height": video.height,
                "fps": video.frames_per_second,
                "frame_count": video.frame_count,
                "codec": video.codec,
            })),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        if with_header {
            println!("== {} ==", video.display());
        }
        println!("Format: {}", metadata.format);
        println!("Duration: {:?}", metadata.duration);
        match &metadata.video {
            Some(video) => println!(
                "Video: {}x{} @ {:.2} fps, ~{} frames [{}]",
                video.width, video.height, video.frames_per_second, video.frame_count, video.codec,
            ),
            None => println!("Video: none"),
        }
        println!("Audio: {}", if metadata.has_audio { "yes" } else { "no" });
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let log_level = match &cli.global.log_level {
        Some(level) => level.parse::<EngineLogLevel>()?,
        None => EngineLogLevel::default(),
    };
    let probe = MediaProbe::new(&cli.global.ffprobe);

    match cli.command {
        Commands::Extract {
            video,
            out,
            fps,
            quality,
            timeout,
            json,
        } => {
            let config = JobConfig::new(&video, &out, fps)?;
            warn_on_existing_frames(&out, cli.global.overwrite)?;

            let token = CancellationToken::new();
            let interrupt = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    interrupt.cancel();
                }
            });

            let mut options = JobOptions::new()
                .with_cancellation(token)
                .with_overwrite(cli.global.overwrite)
                .with_log_level(log_level);
            if let Some(quality) = quality {
                options = options.with_jpeg_quality(quality);
            }
            if let Some(timeout) = timeout {
                options = options.with_timeout(parse_timecode(&timeout)?);
            }
            if cli.global.progress {
                let total = expected_frames(&probe, &video, fps).await;
                if let Some(total) = total {
                    options = options.with_expected_frames(total);
                }
                options = options.with_progress(Arc::new(TerminalProgress::new(total)?));
            }

            let mut job = KeyframeJob::new(config, FfmpegEngine::new(&cli.global.ffmpeg))
                .with_options(options);
            let report = match job.run().await {
                Err(error @ KeyframeError::OutputNotEmpty { .. }) => {
                    return Err(format!("{error} (use --overwrite)").into());
                }
                result => result?,
            };
            print_report(&report, json)?;
        }
        Commands::Probe { videos, json } => {
            let results = probe.probe_many(&videos).await;
            let mut failures = 0;
            for (video, result) in videos.iter().zip(results) {
                match result {
                    Ok(metadata) => print_metadata(video, &metadata, json, videos.len() > 1)?,
                    Err(error) => {
                        failures += 1;
                        eprintln!("{} {}: {error}", "error:".red().bold(), video.display());
                    }
                }
            }
            if failures > 0 {
                return Err(format!("{failures} of {} file(s) could not be probed", videos.len()).into());
            }
        }
        Commands::Validate { video, fps } => {
            let metadata = probe.probe(&video).await?;
            let report = validate_metadata(&metadata, fps);
            print!("{report}");
            if !report.is_valid() {
                return Err(format!("{} is not suitable for extraction", video.display()).into());
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "keyframes", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
