//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};
use crate::progress::EncodeProgress;

/// One input file plus the arguments that precede its `-i`.
#[derive(Debug, Clone)]
struct Input {
    pre_args: Vec<String>,
    path: PathBuf,
}

/// Builder for FFmpeg commands with multiple inputs.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<Input>,
    output_args: Vec<String>,
    output: PathBuf,
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output_args: Vec::new(),
            output: output.as_ref().to_path_buf(),
            log_level: "error".to_string(),
        }
    }

    /// Add an input file with per-input arguments (placed before its `-i`).
    pub fn input<I, S>(mut self, pre_args: I, path: impl AsRef<Path>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(Input {
            pre_args: pre_args.into_iter().map(Into::into).collect(),
            path: path.as_ref().to_path_buf(),
        });
        self
    }

    /// Add an output argument.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Build the command line arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-v".to_string(),
            self.log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ];

        for input in &self.inputs {
            args.extend(input.pre_args.clone());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.clone());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// Runner for FFmpeg commands with progress tracking and cancellation.
///
/// Cancellation is cooperative: when the watch flag flips, the runner kills
/// the subprocess and reports `MediaError::Cancelled`.
pub struct FfmpegRunner {
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self { cancel_rx: None }
    }

    /// Set the cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Run an FFmpeg command, forwarding progress and diagnostic lines.
    pub async fn run<P, D>(
        &self,
        cmd: &FfmpegCommand,
        on_progress: P,
        on_diagnostic: D,
    ) -> MediaResult<()>
    where
        P: Fn(EncodeProgress) + Send + 'static,
        D: Fn(String) + Send + 'static,
    {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child.stderr.take().ok_or_else(|| {
            MediaError::ffmpeg_failed("stderr not captured", None, None)
        })?;
        let mut reader = BufReader::new(stderr).lines();

        // Stderr carries both the -progress key=value stream and regular
        // FFmpeg log lines; split them between the two callbacks.
        let stderr_task = tokio::spawn(async move {
            let mut current = EncodeProgress::default();
            let mut tail: Vec<String> = Vec::new();

            while let Ok(Some(line)) = reader.next_line().await {
                match classify_line(&line, &mut current) {
                    LineKind::ProgressFlush => on_progress(current.clone()),
                    LineKind::ProgressField => {}
                    LineKind::Diagnostic => {
                        if tail.len() >= 20 {
                            tail.remove(0);
                        }
                        tail.push(line.clone());
                        on_diagnostic(line);
                    }
                }
            }
            tail
        });

        let mut cancel_rx = self.cancel_rx.clone();
        let status = tokio::select! {
            status = child.wait() => status?,
            _ = wait_cancelled(&mut cancel_rx) => {
                info!("Encode cancelled, stopping FFmpeg");
                let _ = child.kill().await;
                let _ = child.wait().await;
                stderr_task.abort();
                return Err(MediaError::Cancelled);
            }
        };

        let tail = stderr_task.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(tail.join("\n")),
                status.code(),
            ))
        }
    }
}

/// Resolve when the cancellation flag flips to true; pend forever otherwise.
async fn wait_cancelled(rx: &mut Option<watch::Receiver<bool>>) {
    match rx {
        Some(rx) => {
            if *rx.borrow() {
                return;
            }
            loop {
                if rx.changed().await.is_err() {
                    // Sender gone without cancelling; nothing to wait for.
                    std::future::pending::<()>().await;
                }
                if *rx.borrow_and_update() {
                    return;
                }
            }
        }
        None => std::future::pending().await,
    }
}

enum LineKind {
    /// A `progress=` line; the accumulated snapshot should be flushed.
    ProgressFlush,
    /// A key=value field belonging to the progress stream.
    ProgressField,
    /// A regular FFmpeg log line.
    Diagnostic,
}

/// Fold a stderr line into the running progress snapshot.
fn classify_line(line: &str, current: &mut EncodeProgress) -> LineKind {
    let Some((key, value)) = line.trim().split_once('=') else {
        return LineKind::Diagnostic;
    };

    match key {
        "out_time_ms" | "out_time_us" => {
            // Despite the name, recent FFmpeg emits microseconds for both.
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
            LineKind::ProgressField
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
            LineKind::ProgressField
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
            LineKind::ProgressField
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.parse().ok()) {
                current.speed = speed;
            }
            LineKind::ProgressField
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            LineKind::ProgressFlush
        }
        // Remaining -progress keys (bitrate, total_size, ...) are ignored.
        "bitrate" | "total_size" | "out_time" | "dup_frames" | "drop_frames" | "stream_0_0_q" => {
            LineKind::ProgressField
        }
        _ => LineKind::Diagnostic,
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder_orders_inputs() {
        let cmd = FfmpegCommand::new("out.mp4")
            .input(["-loop", "1"], "cover.jpg")
            .input(Vec::<String>::new(), "track.mp3")
            .output_args(["-c:v", "libx264"]);

        let args = cmd.build_args();
        let loop_pos = args.iter().position(|a| a == "-loop").unwrap();
        let cover_pos = args.iter().position(|a| a == "cover.jpg").unwrap();
        let track_pos = args.iter().position(|a| a == "track.mp3").unwrap();
        assert!(loop_pos < cover_pos);
        assert!(cover_pos < track_pos);
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_progress_parsing() {
        let mut progress = EncodeProgress::default();

        assert!(matches!(
            classify_line("out_time_ms=5000000", &mut progress),
            LineKind::ProgressField
        ));
        assert_eq!(progress.out_time_ms, 5000);

        classify_line("speed=1.5x", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        assert!(matches!(
            classify_line("progress=end", &mut progress),
            LineKind::ProgressFlush
        ));
        assert!(progress.is_complete);
    }

    #[test]
    fn test_log_lines_are_diagnostics() {
        let mut progress = EncodeProgress::default();
        assert!(matches!(
            classify_line("[aac @ 0x55] Qavg: 234.1", &mut progress),
            LineKind::Diagnostic
        ));
    }
}
