use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use log::{debug, warn};
use crate::error::RemuxError;
use crate::utils::{try_delete, TRY_MAX_TRIES, TRY_WAIT_DURATION};

/// Sibling of `video` the remuxed file is written to before it replaces the original
fn remux_temp_path(video: &Path) -> PathBuf {
    let stem = video.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let name = match video.extension() {
        Some(ext) => format!("{}.remux.{}", stem, ext.to_string_lossy()),
        None => format!("{}.remux", stem),
    };
    video.with_file_name(name)
}

fn discard(temp: &Path) {
    if let Err(e) = try_delete(temp, TRY_MAX_TRIES, TRY_WAIT_DURATION) {
        warn!("Could not remove \"{}\": {}", temp.display(), e);
    }
}

/// Video from `video`, audio from `audio_source`, both copied. Output length follows the video.
fn remux_command(video: &Path, audio_source: &Path, temp: &Path) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y");
    cmd.arg("-loglevel").arg("error");
    cmd.arg("-i").arg(video);
    cmd.arg("-i").arg(audio_source);
    cmd.arg("-map").arg("0:v");
    cmd.arg("-map").arg("1:a?"); // Inputs without audio just keep the video
    cmd.arg("-c").arg("copy");
    cmd.arg(temp);
    cmd.stdin(Stdio::null());
    cmd
}

/// Copies the audio streams of `audio_source` into the video-only `video`.
///
/// Streams are copied, not re-encoded. `video` is only replaced once ffmpeg succeeded,
/// on any failure it is left as it was.
pub fn remux_audio(video: impl AsRef<Path>, audio_source: impl AsRef<Path>) -> Result<(), RemuxError> {
    let (video, audio_source) = (video.as_ref(), audio_source.as_ref());
    for path in [video, audio_source] {
        if !path.is_file() {
            return Err(RemuxError::Missing(path.to_path_buf()));
        }
    }
    let temp = remux_temp_path(video);

    let mut cmd = remux_command(video, audio_source, &temp);
    debug!("Running: {:?}", cmd);

    let status = match cmd.status() {
        Ok(status) => status,
        Err(e) => {
            discard(&temp);
            return Err(RemuxError::Spawn(e));
        }
    };
    if !status.success() {
        discard(&temp);
        return Err(RemuxError::Failed(status));
    }

    // Rename within one directory, readers see either the old or the new file
    fs::rename(&temp, video).map_err(|source| {
        discard(&temp);
        RemuxError::Replace { path: video.to_path_buf(), source }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_path_keeps_the_container() {
        assert_eq!(remux_temp_path(Path::new("out/clip.mp4")), PathBuf::from("out/clip.remux.mp4"));
        assert_eq!(remux_temp_path(Path::new("clip")), PathBuf::from("clip.remux"));
    }

    #[test]
    fn remux_keeps_every_video_frame() {
        let cmd = remux_command(Path::new("video.mp4"), Path::new("input.mkv"), Path::new("video.remux.mp4"));
        let args: Vec<&std::ffi::OsStr> = cmd.get_args().collect();
        assert!(!args.iter().any(|a| *a == "-shortest"));
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "1:a?"));
        assert!(args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
        assert_eq!(args.last().copied(), Some(std::ffi::OsStr::new("video.remux.mp4")));
    }

    #[test]
    fn missing_audio_source_leaves_video_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("video.mp4");
        fs::write(&video, b"not really a video").unwrap();

        let err = remux_audio(&video, dir.path().join("gone.mp4")).unwrap_err();
        assert!(matches!(err, RemuxError::Missing(_)));
        assert_eq!(fs::read(&video).unwrap(), b"not really a video");
        assert!(!remux_temp_path(&video).exists());
    }
}
