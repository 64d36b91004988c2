//! Mixtape encoder: ordered audio tracks over a looping cover image.

use std::path::PathBuf;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::progress::{DiagnosticFn, PercentFn};

/// One audio input, already downloaded to the local scratch dir.
#[derive(Debug, Clone)]
pub struct EncodeTrack {
    pub path: PathBuf,
    pub volume: f64,
    pub trim_start: f64,
    /// 0 = play to the end of the file.
    pub trim_end: f64,
    pub duration_secs: f64,
}

/// Everything the encoder needs for one render.
#[derive(Debug, Clone)]
pub struct EncodeSpec {
    pub cover_image: PathBuf,
    pub tracks: Vec<EncodeTrack>,
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
    pub loop_count: u32,
    pub master_volume: f64,
    pub output: PathBuf,
    /// Total output duration in seconds (all tracks, all loops).
    pub total_duration_secs: f64,
}

/// FFmpeg-backed mixtape encoder.
#[derive(Debug, Clone, Default)]
pub struct MixtapeEncoder;

impl MixtapeEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Render the spec to `spec.output`.
    ///
    /// Observes `cancel_rx` and ends the subprocess early when it flips;
    /// that path surfaces as `MediaError::Cancelled`.
    pub async fn encode(
        &self,
        spec: &EncodeSpec,
        cancel_rx: watch::Receiver<bool>,
        on_percent: PercentFn,
        on_diagnostic: DiagnosticFn,
    ) -> MediaResult<()> {
        if spec.tracks.is_empty() {
            return Err(MediaError::ffmpeg_failed("no tracks to encode", None, None));
        }
        if !spec.cover_image.exists() {
            return Err(MediaError::FileNotFound(spec.cover_image.clone()));
        }
        for track in &spec.tracks {
            if !track.path.exists() {
                return Err(MediaError::FileNotFound(track.path.clone()));
            }
        }

        let filter = build_filter_graph(spec);
        debug!(filter = %filter, "Built encode filter graph");

        let mut cmd = FfmpegCommand::new(&spec.output)
            .input(["-loop", "1", "-framerate", "30"], &spec.cover_image);
        for track in &spec.tracks {
            cmd = cmd.input(Vec::<String>::new(), &track.path);
        }

        let cmd = cmd
            .filter_complex(filter)
            .output_args(["-map", "[vout]", "-map", "[aout]"])
            .output_args(["-c:v", "libx264", "-preset", "medium"])
            .output_args(["-b:v", &format!("{}k", spec.bitrate_kbps)])
            .output_args(["-c:a", "aac", "-b:a", "192k"])
            .output_args(["-r", "30", "-pix_fmt", "yuv420p"])
            .output_args(["-t", &format!("{:.3}", spec.total_duration_secs)])
            .output_args(["-movflags", "+faststart"]);

        let total_ms = (spec.total_duration_secs * 1000.0) as i64;
        let runner = FfmpegRunner::new().with_cancel(cancel_rx);

        runner
            .run(
                &cmd,
                move |progress| on_percent(progress.percentage(total_ms)),
                move |line| on_diagnostic(line),
            )
            .await?;

        info!(output = %spec.output.display(), "Encode complete");
        Ok(())
    }
}

/// Build the filter_complex string for a spec.
///
/// Input 0 is the cover image; inputs 1..=N are the tracks in order.
fn build_filter_graph(spec: &EncodeSpec) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut labels: Vec<String> = Vec::new();

    for (idx, track) in spec.tracks.iter().enumerate() {
        let input = idx + 1;
        let label = format!("a{}", input);
        let mut chain = format!("[{}:a]atrim=start={:.3}", input, track.trim_start);
        if track.trim_end > 0.0 {
            chain.push_str(&format!(":end={:.3}", track.trim_end));
        }
        chain.push_str(",asetpts=PTS-STARTPTS");
        if (track.volume - 1.0).abs() > f64::EPSILON {
            chain.push_str(&format!(",volume={:.3}", track.volume));
        }
        chain.push_str(&format!("[{}]", label));
        parts.push(chain);
        labels.push(label);
    }

    let concat_inputs: String = labels.iter().map(|l| format!("[{}]", l)).collect();
    let mut audio = format!(
        "{}concat=n={}:v=0:a=1",
        concat_inputs,
        spec.tracks.len()
    );
    if spec.loop_count > 1 {
        audio.push_str(&format!(",aloop=loop={}:size=2147483647", spec.loop_count - 1));
    }
    if (spec.master_volume - 1.0).abs() > f64::EPSILON {
        audio.push_str(&format!(",volume={:.3}", spec.master_volume));
    }
    audio.push_str("[aout]");
    parts.push(audio);

    parts.push(format!(
        "[0:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,format=yuv420p[vout]",
        w = spec.width,
        h = spec.height
    ));

    parts.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_with_tracks(tracks: Vec<EncodeTrack>) -> EncodeSpec {
        EncodeSpec {
            cover_image: PathBuf::from("cover.jpg"),
            tracks,
            width: 1920,
            height: 1080,
            bitrate_kbps: 5000,
            loop_count: 1,
            master_volume: 1.0,
            output: PathBuf::from("out.mp4"),
            total_duration_secs: 300.0,
        }
    }

    fn track(volume: f64, trim_start: f64, trim_end: f64) -> EncodeTrack {
        EncodeTrack {
            path: PathBuf::from("t.mp3"),
            volume,
            trim_start,
            trim_end,
            duration_secs: 180.0,
        }
    }

    #[test]
    fn test_filter_graph_single_track() {
        let spec = spec_with_tracks(vec![track(1.0, 0.0, 0.0)]);
        let filter = build_filter_graph(&spec);

        assert!(filter.contains("[1:a]atrim=start=0.000,asetpts=PTS-STARTPTS[a1]"));
        assert!(filter.contains("concat=n=1:v=0:a=1[aout]"));
        assert!(filter.contains("scale=1920:1080"));
        // Unity volumes and single loop add no redundant filters
        assert!(!filter.contains("volume="));
        assert!(!filter.contains("aloop"));
    }

    #[test]
    fn test_filter_graph_trims_and_volumes() {
        let spec = spec_with_tracks(vec![track(0.8, 5.0, 125.0), track(1.0, 0.0, 0.0)]);
        let filter = build_filter_graph(&spec);

        assert!(filter.contains("atrim=start=5.000:end=125.000"));
        assert!(filter.contains("volume=0.800"));
        assert!(filter.contains("[a1][a2]concat=n=2:v=0:a=1"));
    }

    #[test]
    fn test_filter_graph_loops_and_master_volume() {
        let mut spec = spec_with_tracks(vec![track(1.0, 0.0, 0.0)]);
        spec.loop_count = 3;
        spec.master_volume = 0.5;
        let filter = build_filter_graph(&spec);

        assert!(filter.contains("aloop=loop=2:size=2147483647"));
        assert!(filter.contains(",volume=0.500[aout]"));
    }

    #[tokio::test]
    async fn test_encode_rejects_missing_cover() {
        let spec = spec_with_tracks(vec![track(1.0, 0.0, 0.0)]);
        let (_tx, rx) = tokio::sync::watch::channel(false);
        let encoder = MixtapeEncoder::new();
        let result = encoder
            .encode(&spec, rx, std::sync::Arc::new(|_| {}), std::sync::Arc::new(|_| {}))
            .await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
