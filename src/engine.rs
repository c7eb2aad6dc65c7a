//! The external media engine.
//!
//! Decoding, frame sampling and JPEG encoding are all done by an external
//! binary. This module builds its command line ([`EngineCommand`]), defines
//! the contract any engine must honour ([`MediaEngine`]), and provides the
//! production implementation that runs FFmpeg as a child process
//! ([`FfmpegEngine`]).
//!
//! An engine reports its lifecycle through [`EngineSignals`]: zero or one
//! `start`, any number of `progress` updates, then exactly one of `error`
//! or `end`. The job checks that last rule after the engine returns.

use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::str::FromStr;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;

use crate::configuration::{JobConfig, JobOptions};
use crate::progress::{ProgressParser, ProgressUpdate};

/// Binary looked up on `PATH` when no explicit location is given.
pub const DEFAULT_FFMPEG_BINARY: &str = "ffmpeg";

/// How many trailing stderr lines are kept as a failure diagnostic.
const DIAGNOSTIC_LINES: usize = 10;

/// FFmpeg's own log verbosity, passed as `-loglevel`.
///
/// # Ordering (most verbose → most quiet)
///
/// `Trace` > `Debug` > `Verbose` > `Info` > `Warning` > `Error` > `Fatal` > `Panic` > `Quiet`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EngineLogLevel {
    /// Print no output at all.
    Quiet,
    /// Only log conditions after which the process aborts.
    Panic,
    /// Only log unrecoverable errors.
    Fatal,
    /// Log recoverable errors. This is the default, so failures still carry
    /// a diagnostic while successful runs stay silent.
    #[default]
    Error,
    /// Log warnings.
    Warning,
    /// Log informational messages.
    Info,
    /// Log verbose informational messages.
    Verbose,
    /// Log debugging messages.
    Debug,
    /// Extremely verbose tracing output.
    Trace,
}

impl EngineLogLevel {
    /// The value FFmpeg expects after `-loglevel`.
    pub fn as_arg(self) -> &'static str {
        match self {
            EngineLogLevel::Quiet => "quiet",
            EngineLogLevel::Panic => "panic",
            EngineLogLevel::Fatal => "fatal",
            EngineLogLevel::Error => "error",
            EngineLogLevel::Warning => "warning",
            EngineLogLevel::Info => "info",
            EngineLogLevel::Verbose => "verbose",
            EngineLogLevel::Debug => "debug",
            EngineLogLevel::Trace => "trace",
        }
    }
}

impl FromStr for EngineLogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "quiet" => Ok(EngineLogLevel::Quiet),
            "panic" => Ok(EngineLogLevel::Panic),
            "fatal" => Ok(EngineLogLevel::Fatal),
            "error" => Ok(EngineLogLevel::Error),
            "warning" | "warn" => Ok(EngineLogLevel::Warning),
            "info" => Ok(EngineLogLevel::Info),
            "verbose" => Ok(EngineLogLevel::Verbose),
            "debug" => Ok(EngineLogLevel::Debug),
            "trace" => Ok(EngineLogLevel::Trace),
            other => Err(format!("unsupported engine log level: {other}")),
        }
    }
}

/// A fully built engine invocation: program plus arguments.
///
/// `Display` renders it as a shell-like command line for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl EngineCommand {
    /// Start a command for `program` with no arguments.
    pub fn new<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg);
        }
        self
    }

    /// The executable to run.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The arguments, in order.
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Build the frame-extraction invocation for `config`.
    ///
    /// The resulting command reads `config.source_path()`, keeps one frame
    /// per `1 / sampling_rate_hz` seconds of video (`-vf fps=`), and writes
    /// numbered JPEGs through [`JobConfig::output_pattern`]. Machine
    /// readable progress goes to stdout, diagnostics to stderr.
    pub fn frame_extraction(program: &Path, config: &JobConfig, options: &JobOptions) -> Self {
        let mut command = Self::new(program);
        command
            .args(["-hide_banner", "-nostdin", "-loglevel"])
            .arg(options.log_level.as_arg())
            .arg(if options.overwrite { "-y" } else { "-n" })
            .arg("-i")
            .arg(config.source_path())
            .arg("-vf")
            .arg(format!("fps={}", config.sampling_rate_hz()));

        if let Some(quality) = options.jpeg_quality {
            command.arg("-q:v").arg(quality.to_string());
        }

        command
            .args(["-progress", "pipe:1", "-nostats"])
            .arg(config.output_pattern());
        command
    }

    fn to_process_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl Display for EngineCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", quote(self.program.as_os_str()))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(value: &OsStr) -> String {
    let text = value.to_string_lossy();
    if !text.is_empty() && !text.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
        text.into_owned()
    } else {
        format!("\"{}\"", text.replace('"', "\\\""))
    }
}

/// A lifecycle signal from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineSignal {
    /// The engine process started; carries the rendered command line.
    Start(String),
    /// A progress block was reported.
    Progress(ProgressUpdate),
    /// Unrecoverable failure, with the engine's diagnostic message.
    Error(String),
    /// All frames were extracted.
    End,
}

/// Sending half of an engine's signal channel.
///
/// Dropping every `EngineSignals` handle tells the job that the engine is
/// done; an engine must not keep one alive after its run has finished.
#[derive(Debug, Clone)]
pub struct EngineSignals {
    sender: UnboundedSender<EngineSignal>,
}

impl EngineSignals {
    pub(crate) fn new(sender: UnboundedSender<EngineSignal>) -> Self {
        Self { sender }
    }

    fn send(&self, signal: EngineSignal) {
        // The job stops listening once it is cancelled or timed out.
        if self.sender.send(signal).is_err() {
            log::trace!("Engine signal dropped: job is no longer listening");
        }
    }

    /// Report that the engine started running `command_line`.
    pub fn start(&self, command_line: impl Into<String>) {
        self.send(EngineSignal::Start(command_line.into()));
    }

    /// Report a progress block.
    pub fn progress(&self, update: ProgressUpdate) {
        self.send(EngineSignal::Progress(update));
    }

    /// Report an unrecoverable failure.
    pub fn error(&self, message: impl Into<String>) {
        self.send(EngineSignal::Error(message.into()));
    }

    /// Report successful completion.
    pub fn end(&self) {
        self.send(EngineSignal::End);
    }
}

/// Contract for an external media engine.
///
/// `execute` runs `command` to completion, reporting through `signals`, and
/// resolves once the engine has stopped. Dropping the returned future must
/// stop the engine; the job relies on that for cancellation and timeouts.
pub trait MediaEngine: Send + Sync {
    /// Run one invocation.
    fn execute(
        &self,
        command: &EngineCommand,
        signals: EngineSignals,
    ) -> impl Future<Output = ()> + Send;

    /// The executable this engine runs, used to build its command line.
    fn program(&self) -> &Path;
}

/// Runs the FFmpeg binary as a child process.
///
/// The binary location is an explicit constructor argument, so concurrent
/// jobs can use different FFmpeg builds without any process-wide state.
///
/// ```no_run
/// use keyframes::FfmpegEngine;
///
/// let bundled = FfmpegEngine::new("/opt/ffmpeg/bin/ffmpeg");
/// let from_path = FfmpegEngine::default();
/// ```
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    binary: PathBuf,
}

impl FfmpegEngine {
    /// Use the FFmpeg executable at `binary`.
    pub fn new<P: AsRef<Path>>(binary: P) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
        }
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new(DEFAULT_FFMPEG_BINARY)
    }
}

impl MediaEngine for FfmpegEngine {
    async fn execute(&self, command: &EngineCommand, signals: EngineSignals) {
        let spawned = command
            .to_process_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(error) => {
                signals.error(format!(
                    "failed to start {}: {error}",
                    command.program().display()
                ));
                return;
            }
        };

        signals.start(command.to_string());

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (status, (), diagnostic) = tokio::join!(
            child.wait(),
            forward_progress(stdout, &signals),
            read_diagnostic(stderr),
        );

        match status {
            Ok(status) if status.success() => signals.end(),
            Ok(status) => signals.error(failure_message(status, &diagnostic)),
            Err(error) => signals.error(format!(
                "failed to wait for {}: {error}",
                command.program().display()
            )),
        }
    }

    fn program(&self) -> &Path {
        &self.binary
    }
}

async fn forward_progress<R: AsyncRead + Unpin>(stream: Option<R>, signals: &EngineSignals) {
    let Some(stream) = stream else {
        return;
    };

    let mut parser = ProgressParser::new();
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(update) = parser.feed_line(&line) {
                    signals.progress(update);
                }
            }
            Ok(None) => break,
            Err(error) => {
                log::debug!("Stopped reading engine progress: {error}");
                break;
            }
        }
    }
}

/// Read all of stderr, keeping only the last few non-empty lines.
async fn read_diagnostic<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };

    let mut raw = Vec::new();
    if let Err(error) = stream.read_to_end(&mut raw).await {
        log::debug!("Stopped reading engine diagnostics: {error}");
    }

    let text = String::from_utf8_lossy(&raw);
    let mut tail: VecDeque<&str> = VecDeque::with_capacity(DIAGNOSTIC_LINES);
    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if tail.len() == DIAGNOSTIC_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}

fn failure_message(status: ExitStatus, diagnostic: &str) -> String {
    if diagnostic.is_empty() {
        format!("engine exited with {status}")
    } else {
        format!("{diagnostic} (engine exited with {status})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(command: &EngineCommand) -> Vec<String> {
        command
            .get_args()
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn frame_extraction_command_layout() {
        let config = JobConfig::new("video/in.mkv", "out", 1.0).unwrap();
        let command =
            EngineCommand::frame_extraction(Path::new("ffmpeg"), &config, &JobOptions::new());

        let expected_output = Path::new("out").join("frame-%04d.jpg");
        assert_eq!(command.program(), Path::new("ffmpeg"));
        assert_eq!(
            args_of(&command),
            vec![
                "-hide_banner",
                "-nostdin",
                "-loglevel",
                "error",
                "-y",
                "-i",
                "video/in.mkv",
                "-vf",
                "fps=1",
                "-progress",
                "pipe:1",
                "-nostats",
                expected_output.to_str().unwrap(),
            ],
        );
    }

    #[test]
    fn fractional_rates_and_options_are_rendered() {
        let config = JobConfig::new("in.mp4", "out", 0.25).unwrap();
        let options = JobOptions::new()
            .with_overwrite(false)
            .with_jpeg_quality(4)
            .with_log_level(EngineLogLevel::Warning);
        let args = args_of(&EngineCommand::frame_extraction(
            Path::new("/opt/ffmpeg"),
            &config,
            &options,
        ));

        assert!(args.contains(&"fps=0.25".to_string()));
        assert!(args.contains(&"-n".to_string()));
        assert!(!args.contains(&"-y".to_string()));
        let quality = args.iter().position(|arg| arg == "-q:v").unwrap();
        assert_eq!(args[quality + 1], "4");
        let level = args.iter().position(|arg| arg == "-loglevel").unwrap();
        assert_eq!(args[level + 1], "warning");
    }

    #[test]
    fn percent_in_output_directory_is_escaped() {
        let config = JobConfig::new("in.mkv", "100%_done", 1.0).unwrap();
        let command =
            EngineCommand::frame_extraction(Path::new("ffmpeg"), &config, &JobOptions::new());

        let expected = Path::new("100%%_done").join("frame-%04d.jpg");
        assert_eq!(command.get_args().last().unwrap(), expected.as_os_str());
    }

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let mut command = EngineCommand::new("ffmpeg");
        command.args(["-i", "my video.mkv", "-vf", "fps=1"]);
        assert_eq!(command.to_string(), "ffmpeg -i \"my video.mkv\" -vf fps=1");
    }

    #[test]
    fn log_level_parsing() {
        assert_eq!("quiet".parse(), Ok(EngineLogLevel::Quiet));
        assert_eq!("WARN".parse(), Ok(EngineLogLevel::Warning));
        assert_eq!("trace".parse(), Ok(EngineLogLevel::Trace));
        assert!("loud".parse::<EngineLogLevel>().is_err());
        assert_eq!(EngineLogLevel::default().as_arg(), "error");
    }

    #[tokio::test]
    async fn diagnostic_keeps_last_non_empty_lines() {
        let text: String = (1..=15).map(|n| format!("line {n}\n\n")).collect();
        let diagnostic = read_diagnostic(Some(text.as_bytes())).await;
        let lines: Vec<&str> = diagnostic.lines().collect();
        assert_eq!(lines.len(), DIAGNOSTIC_LINES);
        assert_eq!(lines.first(), Some(&"line 6"));
        assert_eq!(lines.last(), Some(&"line 15"));
    }

    #[tokio::test]
    async fn progress_lines_become_signals() {
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
        let signals = EngineSignals::new(sender);
        let output = "frame=1\nprogress=continue\nframe=2\nprogress=end\n";
        forward_progress(Some(output.as_bytes()), &signals).await;
        drop(signals);

        let mut frames = Vec::new();
        while let Some(signal) = receiver.recv().await {
            if let EngineSignal::Progress(update) = signal {
                frames.push((update.frame, update.finished));
            }
        }
        assert_eq!(frames, vec![(1, false), (2, true)]);
    }

    #[tokio::test]
    async fn missing_binary_reports_error_without_start() {
        let engine = FfmpegEngine::new("/nonexistent/keyframes-test/ffmpeg");
        let command = EngineCommand::new(engine.program());
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();

        engine.execute(&command, EngineSignals::new(sender)).await;

        let mut signals = Vec::new();
        while let Some(signal) = receiver.recv().await {
            signals.push(signal);
        }
        assert_eq!(signals.len(), 1);
        match &signals[0] {
            EngineSignal::Error(message) => assert!(message.contains("failed to start")),
            other => panic!("expected error signal, got {other:?}"),
        }
    }
}
