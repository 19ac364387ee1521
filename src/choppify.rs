use log::{debug, info, warn};
use crate::error::VideoError;
use crate::utils::VideoParams;
use crate::video::{FrameSink, FrameSource};

/// Every how many source frames one is kept, at least 1
pub fn chop_step(source_fps: f64, target_fps: f64) -> usize {
    if target_fps <= 0.0 || !source_fps.is_finite() {
        return 1;
    }
    (source_fps / target_fps).floor().max(1.0) as usize
}

/// Drops frames from `source` so only every `chop_step`-th one remains, written at `target_fps`.
///
/// Returns (frames read, frames kept).
pub fn choppify<S, K, F>(source: &mut S, open_sink: F, target_fps: f64) -> Result<(usize, usize), VideoError>
where
    S: FrameSource + ?Sized,
    K: FrameSink,
    F: FnOnce(&VideoParams) -> Result<K, VideoError>,
{
    let params = *source.params();
    if target_fps >= params.framerate {
        warn!("Target rate {:.2} is not below the source rate {:.2}, the output will not look choppy", target_fps, params.framerate);
    }
    let step = chop_step(params.framerate, target_fps);
    info!("Keeping every {} frame(s) of {:.3} fps input", step, params.framerate);

    let mut sink = open_sink(&VideoParams { framerate: target_fps, ..params })?;
    let mut read = 0;
    let mut kept = 0;
    while let Some(frame) = source.next_frame()? {
        if read % step == 0 {
            sink.write_frame(&frame)?;
            kept += 1;
        }
        read += 1;
        if read % 500 == 0 {
            debug!("Processed {} frames", read);
        }
    }
    sink.finish()?;
    info!("Kept {} of {} frames", kept, read);
    Ok((read, kept))
}
