use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::collections::VecDeque;
use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::OutputVideoFrame;
use log::{debug, info, warn};
use crate::error::VideoError;
use crate::frame::{frame_from_output, Frame};
use crate::utils::{get_video_params, VideoParams};
use crate::VIDEO_DECODE_ARGS;

/// Supplies decoded frames in presentation order
pub trait FrameSource {
    fn params(&self) -> &VideoParams;
    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError>;
}

/// Accepts frames for encoding, all at the geometry it was opened with
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), VideoError>;
    /// Flushes and closes the output. Writing afterwards is an error.
    fn finish(&mut self) -> Result<(), VideoError>;
}

fn check_size(params: &VideoParams, frame: &Frame) -> Result<(), VideoError> {
    let expected = (params.width, params.height);
    if frame.dimensions() != expected {
        return Err(VideoError::FrameSize { expected, actual: frame.dimensions() });
    }
    Ok(())
}

pub struct FfmpegSource {
    params: VideoParams,
    child: FfmpegChild,
    frames: Box<dyn Iterator<Item = OutputVideoFrame>>,
}

impl FfmpegSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VideoError> {
        let path = path.as_ref();
        let params = get_video_params(path)?;

        let mut command = FfmpegCommand::new();
        command.input(path.display().to_string());
        command.args(VIDEO_DECODE_ARGS);
        debug!("Decoding \"{}\" ({}x{} @ {:.3} fps)", path.display(), params.width, params.height, params.framerate);

        let mut child = command.spawn()?;
        let frames = child.iter()
            .map_err(|e| VideoError::Decode(e.to_string()))?
            .filter_frames();
        Ok(Self {
            params,
            child,
            frames: Box::new(frames),
        })
    }
}

impl FrameSource for FfmpegSource {
    fn params(&self) -> &VideoParams {
        &self.params
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
        let Some(output) = self.frames.next() else { return Ok(None) };
        let frame = frame_from_output(output)?;
        check_size(&self.params, &frame)?;
        Ok(Some(frame))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        // Decoder may still be running if the consumer stopped early
        if let Err(e) = self.child.kill() {
            debug!("Decoder already exited: {}", e);
        }
        let _ = self.child.wait();
    }
}

/// Encodes rgb24 frames by piping them into an ffmpeg child process
pub struct FfmpegSink {
    params: VideoParams,
    output_path: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl FfmpegSink {
    pub fn create(
        output_path: impl AsRef<Path>,
        params: &VideoParams,
        encode_args: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self, VideoError> {
        let output_path = output_path.as_ref().to_path_buf();
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-y");
        cmd.arg("-loglevel").arg("error");
        cmd.arg("-f").arg("rawvideo");
        cmd.arg("-framerate").arg(params.framerate.to_string());
        cmd.arg("-pixel_format").arg("rgb24");
        cmd.arg("-video_size").arg(format!("{}x{}", params.width, params.height));
        cmd.arg("-i").arg("-");
        for arg in encode_args {
            let arg = arg.as_ref();
            if !arg.is_empty() {
                cmd.arg(arg);
            }
        }
        cmd.arg(&output_path);
        debug!("Running: {:?}", cmd);

        cmd.stdin(Stdio::piped());
        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take()
            .ok_or_else(|| VideoError::Encode("ffmpeg stdin unavailable".into()))?;
        Ok(Self {
            params: *params,
            output_path,
            child,
            stdin: Some(stdin),
        })
    }
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), VideoError> {
        check_size(&self.params, frame)?;
        let stdin = self.stdin.as_mut()
            .ok_or_else(|| VideoError::Encode("sink already finished".into()))?;
        stdin.write_all(frame.as_raw())?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), VideoError> {
        let Some(stdin) = self.stdin.take() else { return Ok(()) };
        drop(stdin);
        let status = self.child.wait()?;
        if !status.success() {
            return Err(VideoError::Encode(format!("ffmpeg exited with {}", status)));
        }
        info!("Wrote \"{}\"", self.output_path.display());
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            warn!("Encoder for \"{}\" dropped without finishing", self.output_path.display());
            if let Err(e) = self.finish() {
                warn!("{}", e);
            }
        }
    }
}

/// In-memory source, frames must all share the given geometry
pub struct MemorySource {
    params: VideoParams,
    frames: VecDeque<Frame>,
}

impl MemorySource {
    pub fn new(frames: impl IntoIterator<Item = Frame>, framerate: f64) -> Self {
        let frames: VecDeque<Frame> = frames.into_iter().collect();
        let (width, height) = frames.front().map(|f| f.dimensions()).unwrap_or((0, 0));
        let duration = if framerate > 0.0 {
            std::time::Duration::from_secs_f64(frames.len() as f64 / framerate)
        } else {
            std::time::Duration::ZERO
        };
        Self {
            params: VideoParams { framerate, width, height, duration },
            frames,
        }
    }
}

impl FrameSource for MemorySource {
    fn params(&self) -> &VideoParams {
        &self.params
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
        let Some(frame) = self.frames.pop_front() else { return Ok(None) };
        check_size(&self.params, &frame)?;
        Ok(Some(frame))
    }
}

/// Collects written frames, mostly useful for tests
#[derive(Debug)]
pub struct MemorySink {
    pub params: VideoParams,
    pub frames: Vec<Frame>,
    pub finished: bool,
}

impl MemorySink {
    pub fn new(params: &VideoParams) -> Self {
        Self { params: *params, frames: Vec::new(), finished: false }
    }
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), VideoError> {
        if self.finished {
            return Err(VideoError::Encode("sink already finished".into()));
        }
        check_size(&self.params, frame)?;
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), VideoError> {
        self.finished = true;
        Ok(())
    }
}

impl<T: FrameSink + ?Sized> FrameSink for &mut T {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), VideoError> {
        (**self).write_frame(frame)
    }

    fn finish(&mut self) -> Result<(), VideoError> {
        (**self).finish()
    }
}
