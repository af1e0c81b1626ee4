//! Continuity frame extraction.

use std::path::Path;

use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// How far from the end of the clip the still is taken. Landing inside
/// the last GOP keeps the seek cheap and the frame representative of
/// where the next clip picks up.
pub const TAIL_OFFSET_S: f64 = 0.5;

/// Extract a single still from the tail of `input` into `output` (JPEG).
pub async fn extract_last_frame(
    runner: &FfmpegRunner,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> MediaResult<()> {
    let input = input.as_ref();
    let output = output.as_ref();

    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }

    debug!(
        "Extracting tail frame from {} to {}",
        input.display(),
        output.display()
    );

    let cmd = FfmpegCommand::new(output)
        .seek_from_end(TAIL_OFFSET_S)
        .input(input)
        .single_frame()
        .output_arg("-q:v")
        .output_arg("2");

    runner.run(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_command_seeks_from_end() {
        let cmd = FfmpegCommand::new("frame.jpg")
            .seek_from_end(TAIL_OFFSET_S)
            .input("clip.mp4")
            .single_frame();
        let joined = cmd.build_args().join(" ");
        assert!(joined.contains("-sseof -0.5"));
        assert!(joined.contains("-vframes 1"));
    }
}
