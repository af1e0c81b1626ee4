//! Clip concatenation with crossfades.
//!
//! The polished path normalizes every clip to a common encode, then
//! chains xfade/acrossfade transitions. Any failure there falls back to
//! a hard concat with stream copy; the composition never gives up just
//! because transitions did.

use std::path::{Path, PathBuf};

use metrics::counter;
use tracing::{info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::video_duration;

/// Crossfade duration in seconds.
pub const FADE_S: f64 = 0.3;

/// Normalize a clip so xfade inputs agree on codec, size, fps and
/// pixel format.
pub async fn normalize_clip(
    runner: &FfmpegRunner,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(output.as_ref())
        .input(input.as_ref())
        .video_filter("scale=1080:-2,fps=24,format=yuv420p")
        .video_codec("libx264")
        .crf(22)
        .preset("fast")
        .audio_codec("aac")
        .output_args(["-ar", "44100", "-ac", "2"]);
    runner.run(&cmd).await
}

/// Build the xfade + acrossfade filter chain for `durations.len()`
/// normalized inputs.
///
/// Each transition starts at the cumulative duration of everything
/// before it minus the fade overlap already consumed by earlier
/// transitions.
pub fn build_crossfade_filters(durations: &[f64], fade: f64) -> Vec<String> {
    let n = durations.len();
    let mut filters = Vec::new();
    let mut cumulative = 0.0;

    for i in 1..n {
        let v_prev = if i == 1 {
            "[0:v]".to_string()
        } else {
            format!("[vx{}]", i - 1)
        };
        let a_prev = if i == 1 {
            "[0:a]".to_string()
        } else {
            format!("[ax{}]", i - 1)
        };
        let is_last = i == n - 1;
        let v_out = if is_last { "[vout]".to_string() } else { format!("[vx{i}]") };
        let a_out = if is_last { "[aout]".to_string() } else { format!("[ax{i}]") };

        cumulative += durations[i - 1];
        let offset = (cumulative - fade * i as f64).max(0.0);

        filters.push(format!(
            "{v_prev}[{i}:v]xfade=transition=fade:duration={fade}:offset={offset:.3}{v_out}"
        ));
        filters.push(format!("{a_prev}[{i}:a]acrossfade=d={fade}{a_out}"));
    }

    filters
}

/// Concat with 0.3s crossfades, falling back to a hard concat.
pub async fn crossfade_concat(
    runner: &FfmpegRunner,
    input_paths: &[PathBuf],
    output_path: &Path,
    work_dir: &Path,
) -> MediaResult<()> {
    if input_paths.is_empty() {
        return Err(MediaError::internal("no clips to concatenate"));
    }
    if input_paths.len() == 1 {
        tokio::fs::copy(&input_paths[0], output_path).await?;
        return Ok(());
    }

    match try_crossfade(runner, input_paths, output_path, work_dir).await {
        Ok(()) => {
            info!(clips = input_paths.len(), "crossfade concat complete");
            Ok(())
        }
        Err(e) => {
            warn!("crossfade failed, falling back to hard concat: {}", e);
            counter!("media_concat_fallbacks_total").increment(1);
            hard_concat(runner, input_paths, output_path, work_dir).await
        }
    }
}

async fn try_crossfade(
    runner: &FfmpegRunner,
    input_paths: &[PathBuf],
    output_path: &Path,
    work_dir: &Path,
) -> MediaResult<()> {
    let mut norm_paths = Vec::with_capacity(input_paths.len());
    for (i, input) in input_paths.iter().enumerate() {
        let norm_path = work_dir.join(format!("norm_{i}.mp4"));
        normalize_clip(runner, input, &norm_path).await?;
        norm_paths.push(norm_path);
    }

    let mut durations = Vec::with_capacity(norm_paths.len());
    for path in &norm_paths {
        durations.push(video_duration(path).await?);
    }

    let filters = build_crossfade_filters(&durations, FADE_S);

    let mut cmd = FfmpegCommand::new(output_path);
    for path in &norm_paths {
        cmd = cmd.input(path);
    }
    let cmd = cmd
        .filter_complex(filters.join(";"))
        .map("[vout]")
        .map("[aout]")
        .video_codec("libx264")
        .crf(22)
        .preset("fast")
        .audio_codec("aac");

    runner.run(&cmd).await
}

/// Hard concat with the concat demuxer and stream copy.
pub async fn hard_concat(
    runner: &FfmpegRunner,
    input_paths: &[PathBuf],
    output_path: &Path,
    work_dir: &Path,
) -> MediaResult<()> {
    let list_path = work_dir.join("concat_fallback.txt");
    let list = input_paths
        .iter()
        .map(|p| format!("file '{}'", p.to_string_lossy().replace('\'', "'\\''")))
        .collect::<Vec<_>>()
        .join("\n");
    tokio::fs::write(&list_path, list).await?;

    let cmd = FfmpegCommand::new(output_path)
        .input_arg("-f")
        .input_arg("concat")
        .input_arg("-safe")
        .input_arg("0")
        .input(&list_path)
        .output_args(["-c", "copy"]);
    runner.run(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_offsets_account_for_consumed_fades() {
        // three 5s clips: transitions at 4.7 and 9.4
        let filters = build_crossfade_filters(&[5.0, 5.0, 5.0], FADE_S);
        assert_eq!(filters.len(), 4);
        assert!(filters[0].contains("offset=4.700"));
        assert!(filters[0].starts_with("[0:v][1:v]xfade"));
        assert!(filters[1].starts_with("[0:a][1:a]acrossfade"));
        assert!(filters[2].contains("offset=9.400"));
        assert!(filters[2].contains("[vout]"));
        assert!(filters[3].contains("[aout]"));
    }

    #[test]
    fn filter_offset_clamps_at_zero() {
        let filters = build_crossfade_filters(&[0.1, 5.0], 0.3);
        assert!(filters[0].contains("offset=0.000"));
    }

    #[test]
    fn two_clips_go_straight_to_final_labels() {
        let filters = build_crossfade_filters(&[5.0, 4.0], FADE_S);
        assert_eq!(filters.len(), 2);
        assert!(filters[0].ends_with("[vout]"));
        assert!(filters[1].ends_with("[aout]"));
    }
}
