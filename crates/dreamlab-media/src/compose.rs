//! Per-clip compositing: diagram picture-in-picture and subtitle burn-in.

use std::path::Path;
use std::sync::OnceLock;

use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Font search order. CJK-capable fonts first; plain Latin fallbacks
/// keep drawtext working on minimal images.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/PingFang.ttc",
    "/System/Library/Fonts/STHeiti Medium.ttc",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/System/Library/Fonts/Helvetica.ttc",
];

static RESOLVED_FONT: OnceLock<Option<&'static str>> = OnceLock::new();

/// First available subtitle font, resolved once per process.
pub fn find_font() -> Option<&'static str> {
    *RESOLVED_FONT.get_or_init(|| {
        FONT_CANDIDATES
            .iter()
            .copied()
            .find(|p| Path::new(p).exists())
    })
}

/// Escape text for a drawtext filter argument.
fn escape_drawtext(text: &str) -> String {
    let cleaned: String = text
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
        .replace('\n', " ");
    cleaned.chars().take(160).collect()
}

/// Build a drawtext subtitle filter.
///
/// Returns `None` when no usable font exists; the caller skips the
/// subtitle rather than rendering broken glyphs.
pub fn build_drawtext(text: &str, y_offset: u32) -> Option<String> {
    let font_file = find_font()?;
    let safe_text = escape_drawtext(text);
    Some(format!(
        "drawtext=fontfile={font_file}:\
         text='{safe_text}':fontcolor=white:fontsize=34:\
         borderw=3:bordercolor=black@0.85:\
         box=1:boxcolor=black@0.35:boxborderw=8:\
         x=(w-text_w)/2:y=h-{y_offset}:\
         line_spacing=8"
    ))
}

/// Picture-in-picture placement for a diagram overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipGeometry {
    pub base_w: u32,
    pub base_h: u32,
    pub pip_w: u32,
    pub pip_x: u32,
    pub pip_y: u32,
}

/// Compute overlay geometry from the job aspect ratio. The diagram
/// takes 28% of the base width and sits in the lower-right corner,
/// above the subtitle band.
pub fn pip_geometry(aspect_ratio: &str) -> PipGeometry {
    let (w, h) = aspect_ratio
        .split_once(':')
        .and_then(|(w, h)| Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?)))
        .unwrap_or((9, 16));

    let base_w: u32 = 1080;
    let base_h = (base_w as f64 * h as f64 / w as f64).round() as u32;
    let pip_w = (base_w as f64 * 0.28).round() as u32;
    let pip_x = base_w - pip_w - 20;
    let pip_h = (pip_w as f64 * h as f64 / w as f64).round() as u32;
    let pip_y = base_h.saturating_sub(pip_h + 110);

    PipGeometry {
        base_w,
        base_h,
        pip_w,
        pip_x,
        pip_y,
    }
}

/// Compose a clip with an optional diagram overlay and optional
/// subtitle burn-in. With neither, the clip is copied through.
pub async fn compose_pip_clip(
    runner: &FfmpegRunner,
    clip_path: &Path,
    diagram_path: Option<&Path>,
    output_path: &Path,
    dialogue: &str,
    aspect_ratio: &str,
) -> MediaResult<()> {
    let subtitle = if dialogue.trim().is_empty() {
        None
    } else {
        build_drawtext(dialogue, 80)
    };

    match diagram_path {
        Some(diagram) => {
            let geo = pip_geometry(aspect_ratio);
            // The diagram fills the frame; the character clip shrinks
            // into the corner and keeps the audio.
            let mut filters = vec![
                format!("[0:v]scale={}:{},setsar=1[bg]", geo.base_w, geo.base_h),
                format!("[1:v]scale={}:-2[pip]", geo.pip_w),
                format!(
                    "[bg][pip]overlay={}:{}{}",
                    geo.pip_x,
                    geo.pip_y,
                    if subtitle.is_some() { "[composed]" } else { "[out]" }
                ),
            ];
            if let Some(ref sub) = subtitle {
                filters.push(format!("[composed]{sub}[out]"));
            }

            debug!("composing diagram overlay for {}", clip_path.display());
            let cmd = FfmpegCommand::new(output_path)
                .input_arg("-loop")
                .input_arg("1")
                .input(diagram)
                .input(clip_path)
                .filter_complex(filters.join(";"))
                .map("[out]")
                .map("1:a?")
                .video_codec("libx264")
                .crf(23)
                .preset("fast")
                .audio_codec("aac")
                .output_arg("-shortest");
            runner.run(&cmd).await
        }
        None => match subtitle {
            Some(sub) => {
                let cmd = FfmpegCommand::new(output_path)
                    .input(clip_path)
                    .filter_complex(format!("[0:v]{sub}[out]"))
                    .map("[out]")
                    .map("0:a?")
                    .video_codec("libx264")
                    .crf(23)
                    .preset("fast")
                    .audio_codec("aac");
                runner.run(&cmd).await
            }
            None => {
                tokio::fs::copy(clip_path, output_path).await?;
                Ok(())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_for_vertical_video() {
        let geo = pip_geometry("9:16");
        assert_eq!(geo.base_w, 1080);
        assert_eq!(geo.base_h, 1920);
        assert_eq!(geo.pip_w, 302);
        assert_eq!(geo.pip_x, 1080 - 302 - 20);
        // pip height 302 * 16/9 = 537
        assert_eq!(geo.pip_y, 1920 - 537 - 110);
    }

    #[test]
    fn geometry_defaults_on_malformed_ratio() {
        assert_eq!(pip_geometry("not-a-ratio"), pip_geometry("9:16"));
    }

    #[test]
    fn drawtext_escapes_quotes_and_colons() {
        let escaped = escape_drawtext("it's 10:30\nnext line");
        assert_eq!(escaped, "it\\'s 10\\:30 next line");
    }

    #[test]
    fn drawtext_truncates_long_text() {
        let long = "x".repeat(500);
        assert_eq!(escape_drawtext(&long).chars().count(), 160);
    }
}
