use std::path::Path;
use std::time::Duration;
use std::fs;
use std::process::Command;
use crate::error::VideoError;

pub const TRY_WAIT_DURATION : Duration = Duration::from_millis(300);
pub const TRY_MAX_TRIES: usize = 3;

pub fn try_delete(path: impl AsRef<Path>, max_tries: usize, wait: Duration) -> std::io::Result<()> {
    let mut i = 0;
    loop {
        match fs::remove_file(path.as_ref()) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) if i + 1 >= max_tries => return Err(e),
            Err(_) => std::thread::sleep(wait),
        }
        i += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoParams {
    pub framerate: f64,
    pub width: u32,
    pub height: u32,
    pub duration: Duration,
}

impl VideoParams {
    /// Frame count implied by rate and duration, 0 when either is unknown
    pub fn estimated_frames(&self) -> usize {
        (self.framerate * self.duration.as_secs_f64()).floor().max(0.0) as usize
    }

    /// Same geometry at a multiple of the frame rate
    pub fn with_rate_multiplier(&self, multiplier: f64) -> Self {
        Self {
            framerate: self.framerate * multiplier,
            ..*self
        }
    }
}

fn parse_rate(val: &str) -> Option<f64> {
    let mut parts = val.splitn(2, '/');
    let num: f64 = parts.next()?.trim().parse().ok()?;
    let den: f64 = parts.next().unwrap_or("1").trim().parse().ok()?;
    Some(if den != 0.0 { num / den } else { 0.0 })
}

fn parse_probe_output(stdout: &str) -> Result<VideoParams, String> {
    let mut width = None;
    let mut height = None;
    let mut framerate = None;
    let mut duration = None;

    for line in stdout.lines() {
        if let Some(val) = line.strip_prefix("width=") {
            width = val.trim().parse().ok();
        } else if let Some(val) = line.strip_prefix("height=") {
            height = val.trim().parse().ok();
        } else if let Some(val) = line.strip_prefix("r_frame_rate=") {
            framerate = parse_rate(val);
        } else if let Some(val) = line.strip_prefix("duration=") {
            // "N/A" for some containers, treated as unknown length
            duration = Some(val.trim().parse::<f64>().map(Duration::from_secs_f64).unwrap_or_default());
        }
    }

    Ok(VideoParams {
        width: width.ok_or("missing width")?,
        height: height.ok_or("missing height")?,
        framerate: framerate.ok_or("missing frame rate")?,
        duration: duration.unwrap_or_default(),
    })
}

pub fn get_video_params(file_path: impl AsRef<Path>) -> Result<VideoParams, VideoError> {
    let file_path = file_path.as_ref();
    if !file_path.exists() {
        return Err(VideoError::Missing(file_path.to_path_buf()));
    }

    let output = Command::new("ffprobe")
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", "stream=width,height,r_frame_rate",
            "-show_entries", "format=duration",
            "-of", "default=noprint_wrappers=1:nokey=0",
        ])
        .arg(file_path)
        .output()?;

    if !output.status.success() {
        return Err(VideoError::Probe {
            path: file_path.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
        .map_err(|reason| VideoError::Probe { path: file_path.to_path_buf(), reason })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        let params = parse_probe_output("width=2560\nheight=1440\nr_frame_rate=60/1\nduration=2.500000\n").unwrap();
        assert_eq!(params.width, 2560);
        assert_eq!(params.height, 1440);
        assert_eq!(params.framerate, 60.0);
        assert_eq!(params.estimated_frames(), 150);
    }

    #[test]
    fn test_parse_probe_output_ntsc_and_unknown_duration() {
        let params = parse_probe_output("width=640\nheight=480\nr_frame_rate=30000/1001\nduration=N/A\n").unwrap();
        assert!((params.framerate - 29.97).abs() < 0.01);
        assert_eq!(params.estimated_frames(), 0);
    }

    #[test]
    fn test_parse_probe_output_missing_width() {
        assert!(parse_probe_output("height=480\nr_frame_rate=30/1\n").is_err());
    }

    #[test]
    fn test_try_delete_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(try_delete(dir.path().join("nope.png"), TRY_MAX_TRIES, Duration::ZERO).is_ok());
    }
}
