use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use chrono::Local;
use log::{debug, info, warn};
use crate::Args;
use crate::debug_artifacts::{ArtifactPaths, DebugArtifactEmitter, DebugPolicy, PairView};
use crate::detect::{Analysis, ArtifactDetector, Metrics};
use crate::error::{PipelineError, Result, VideoError};
use crate::explain::{explain, Explanation};
use crate::frame::{blend, Frame};
use crate::interpolate::Interpolator;
use crate::remux::remux_audio;
use crate::report::{FrameReportEntry, Metadata, ReportBuilder, ReportDocument};
use crate::utils::VideoParams;
use crate::video::{FfmpegSink, FfmpegSource, FrameSink, FrameSource};

/// Every run doubles the frame rate, higher factors need another pass over the output
pub const RATE_MULTIPLIER: f64 = 2.0;
const SYNTHESIS_TIME: f32 = 0.5;

/// INIT -> STREAMING -> FINALIZE -> DONE.
///
/// Input problems (no frames, unreadable first frame) fail in INIT. Later decode errors only stop
/// streaming early. FAILED is still reachable from STREAMING and FINALIZE, when the sink rejects
/// a frame or cannot be finished, or when the report cannot be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Streaming,
    Finalize,
    Done,
    Failed,
}

impl RunState {
    pub fn can_transition(self, to: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, to),
            (Init, Streaming) | (Init, Failed)
                | (Streaming, Finalize) | (Streaming, Failed)
                | (Finalize, Done) | (Finalize, Failed)
        )
    }
}

/// Shared stop flag, checked once per frame pair
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Called after every pair with (pair index, estimated pair count or 0, metrics)
pub type ProgressFn<'a> = Box<dyn FnMut(usize, usize, &Metrics) + 'a>;

/// Names recorded in the report metadata
#[derive(Debug, Clone, Default)]
pub struct RunInfo {
    pub input_file: String,
    pub output_file: String,
}

/// What a finished run hands back: the report and the closed sink
pub struct RunOutput<K> {
    pub report: ReportDocument,
    pub sink: K,
}

/// One video, one instance. `run` consumes it.
pub struct Pipeline<'a> {
    interpolator: Interpolator,
    detector: ArtifactDetector,
    emitter: DebugArtifactEmitter,
    debug_policy: DebugPolicy,
    cancel: Option<CancelToken>,
    progress: Option<ProgressFn<'a>>,
    state: RunState,
}

impl<'a> Pipeline<'a> {
    /// Fails with `PipelineError::Config` when no synthesizer is usable
    pub fn new(args: &Args) -> Result<Self> {
        Ok(Self::with_interpolator(Interpolator::from_args(args)?, args))
    }

    pub fn with_interpolator(interpolator: Interpolator, args: &Args) -> Self {
        Self {
            interpolator,
            detector: ArtifactDetector::new(args.max_flow_width),
            emitter: DebugArtifactEmitter::new(&args.debug_dir, args.save_raw_frames),
            debug_policy: args.debug_policy,
            cancel: None,
            progress: None,
            state: RunState::Init,
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_progress(mut self, progress: impl FnMut(usize, usize, &Metrics) + 'a) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    fn transition(&mut self, to: RunState) {
        debug_assert!(self.state.can_transition(to), "{:?} -> {:?}", self.state, to);
        debug!("Pipeline state {:?} -> {:?}", self.state, to);
        self.state = to;
    }

    fn fail<T>(&mut self, e: PipelineError) -> Result<T> {
        self.transition(RunState::Failed);
        Err(e)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Doubles the frame rate of `source` into the sink returned by `open_sink`
    /// and grades every synthesized frame. The report is written to `report_path` if given.
    pub fn run<S, K, F>(mut self, source: &mut S, open_sink: F, info: RunInfo, report_path: Option<&Path>) -> Result<RunOutput<K>>
    where
        S: FrameSource + ?Sized,
        K: FrameSink,
        F: FnOnce(&VideoParams) -> std::result::Result<K, VideoError>,
    {
        // INIT
        let mut prev = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return self.fail(PipelineError::EmptyInput),
            Err(e) => return self.fail(PipelineError::Input(e)),
        };
        let params = *source.params();
        let output_params = params.with_rate_multiplier(RATE_MULTIPLIER);
        let mut sink = match open_sink(&output_params) {
            Ok(sink) => sink,
            Err(e) => return self.fail(PipelineError::Output(e)),
        };
        if let Err(e) = sink.write_frame(&prev) {
            return self.fail(PipelineError::Output(e));
        }

        let mut report = ReportBuilder::new(Metadata {
            input_file: info.input_file,
            output_file: info.output_file,
            processing_date: Local::now(),
            model_used: self.interpolator.synthesizer_name().to_string(),
            frame_rate_original: params.framerate,
            frame_rate_output: output_params.framerate,
            total_frames_processed: 0,
        });
        let total_pairs = params.estimated_frames().saturating_sub(1);
        let mut frames_read = 1usize;
        let mut stopped_early = false;
        self.transition(RunState::Streaming);

        // STREAMING
        loop {
            if self.is_cancelled() {
                info!("Cancelled after {} frame pairs", report.entries().len());
                stopped_early = true;
                break;
            }
            let current = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!("Decoding stopped after {} frames: {}", frames_read, e);
                    stopped_early = true;
                    break;
                }
            };
            if current.dimensions() != prev.dimensions() {
                warn!(
                    "Decoding stopped after {} frames: frame is {:?}, expected {:?}",
                    frames_read, current.dimensions(), prev.dimensions()
                );
                stopped_early = true;
                break;
            }
            frames_read += 1;

            let index = report.entries().len();
            let timestamp = if params.framerate > 0.0 {
                (index as f64 + 0.5) / params.framerate
            } else {
                0.0
            };
            let (synthesized, entry) = self.process_pair(index, timestamp, &prev, &current);
            if let Some(progress) = self.progress.as_mut() {
                progress(index, total_pairs, &entry.metrics);
            }
            report.append(entry);

            for frame in [&synthesized, &current] {
                if let Err(e) = sink.write_frame(frame) {
                    return self.fail(PipelineError::Output(e));
                }
            }
            prev = current;
        }

        // FINALIZE
        self.transition(RunState::Finalize);
        if let Err(e) = sink.finish() {
            return self.fail(PipelineError::Output(e));
        }
        let document = report.finalize(frames_read, stopped_early);
        if let Some(path) = report_path {
            if let Err(e) = document.write_json(path) {
                return self.fail(e);
            }
            info!("Report saved to \"{}\"", path.display());
        }
        self.transition(RunState::Done);
        Ok(RunOutput { report: document, sink })
    }

    /// Synthesize, detect, explain and maybe emit for one pair. Never fails, problems degrade the entry.
    fn process_pair(&mut self, index: usize, timestamp: f64, prev: &Frame, next: &Frame) -> (Frame, FrameReportEntry) {
        let (synthesized, synthesis_error) = match self.interpolator.interpolate(prev, next, SYNTHESIS_TIME) {
            Ok(frame) => (frame, None),
            Err(e) => {
                warn!("Frame {}: synthesis failed ({}), substituting a linear blend", index, e);
                (blend(prev, next, SYNTHESIS_TIME).unwrap_or_else(|| prev.clone()), Some(e))
            }
        };

        let (metrics, flow, explanation) = match self.detector.detect(prev, next, &synthesized) {
            Ok(Analysis { metrics, flow }) => {
                let explanation = explain(&metrics);
                match synthesis_error {
                    Some(e) => (metrics, Some(flow), explanation.degraded(e)),
                    None => (metrics, Some(flow), explanation),
                }
            }
            Err(e) => {
                warn!("Frame {}: artifact detection failed ({})", index, e);
                (Metrics::default(), None, Explanation::failed(e))
            }
        };
        debug!("Frame {}: {} (severity {:.2})", index, explanation.verdict, explanation.severity);

        let paths = if self.debug_policy.should_emit(index, explanation.verdict) {
            self.emitter.emit(&PairView {
                frame_number: index,
                prev,
                next,
                synthesized: &synthesized,
                metrics: &metrics,
                flow: flow.as_ref(),
                verdict: explanation.verdict,
            })
        } else {
            ArtifactPaths::default()
        };

        let entry = FrameReportEntry::new(index, timestamp, metrics, explanation, paths);
        (synthesized, entry)
    }
}

/// Settings for pass `pass` of `passes`. Every pass but the last writes its debug artifacts
/// into `<debug_dir>/pass<k>`, so later passes cannot overwrite files an earlier report points to.
pub fn pass_args(args: &Args, pass: u32, passes: u32) -> Args {
    let debug_dir: PathBuf = if pass < passes {
        args.debug_dir.join(format!("pass{}", pass))
    } else {
        args.debug_dir.clone()
    };
    Args { debug_dir, ..args.clone() }
}

/// Decodes `input`, writes the doubled-rate video to `output` and the report to `report_path`.
///
/// Audio is copied over afterwards when `args.remux_audio` is set. A failed remux leaves a video-only output.
pub fn process_video(
    args: &Args,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    report_path: impl AsRef<Path>,
    encode_args: &[String],
    cancel: Option<CancelToken>,
) -> Result<ReportDocument> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let mut pipeline = Pipeline::new(args)?;
    if let Some(token) = cancel {
        pipeline = pipeline.with_cancel_token(token);
    }
    let mut source = FfmpegSource::open(input).map_err(PipelineError::Input)?;
    info!("Processing \"{}\" ({}x{} @ {:.3} fps)", input.display(), source.params().width, source.params().height, source.params().framerate);

    let info = RunInfo {
        input_file: input.display().to_string(),
        output_file: output.display().to_string(),
    };
    let RunOutput { report, sink } = pipeline.run(
        &mut source,
        |params| FfmpegSink::create(output, params, encode_args),
        info,
        Some(report_path.as_ref()),
    )?;
    drop(sink);
    drop(source);

    if args.remux_audio {
        match remux_audio(output, input) {
            Ok(()) => info!("Copied audio from \"{}\"", input.display()),
            Err(e) => warn!("Audio remux failed, output stays video-only: {}", e),
        }
    }
    Ok(report)
}
