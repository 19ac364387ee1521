use std::path::{Path, PathBuf};
use clap::{CommandFactory, FromArgMatches, Parser};
use fern::Dispatch;
use log::{error, info};
use mimalloc::MiMalloc;
use synthesight::pipeline::{pass_args, process_video};
use synthesight::report::ReportDocument;
use synthesight::{Args, DebugPolicy, SynthesizerKind, DEFAULT_ENCODE_ARGS};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;


/// Doubles a video's frame rate with frame interpolation and grades every synthesized frame.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// The input video file path
    #[arg(short)]
    input_path: PathBuf,
    /// The output video file path
    #[arg(short, default_value = "output.mp4")]
    output_path: PathBuf,
    /// The JSON report file path
    #[arg(short, default_value = "report.json")]
    report_path: PathBuf,

    /// Frame synthesizer: auto (model, falling back to linear blending), model or linear
    #[arg(long, default_value = "auto")]
    synthesizer: SynthesizerKind,
    /// ONNX frame interpolation model
    #[arg(short = 'm', long)]
    model: Option<PathBuf>,
    /// Threads used by the model session
    /// Range: 1..
    #[arg(long, default_value_t = 4, verbatim_doc_comment)]
    model_threads: usize,

    /// Fraction of color histogram dissimilarity that counts as a scene cut
    /// Range: 0.0..1.0 (higher = fewer cuts detected)
    #[arg(long, default_value_t = 0.3, verbatim_doc_comment)]
    scene_cut_threshold: f64,
    /// Frames wider than this are downscaled before motion estimation
    /// Range: 16.. (lower = faster, coarser motion estimate)
    #[arg(long, default_value_t = 640, verbatim_doc_comment)]
    max_flow_width: u32,

    /// When to write debug composites: off, on-issue or interval:N
    #[arg(long, default_value = "off")]
    debug_policy: DebugPolicy,
    /// Directory debug composites are written to
    #[arg(long, default_value = "debug_frames")]
    debug_dir: PathBuf,
    /// Also save the previous, synthesized and next frame of every debugged pair
    #[arg(long, action)]
    save_raw_frames: bool,

    /// How many times the frame rate is doubled, each pass runs on the previous pass's output
    /// Range: 1..
    #[arg(long, default_value_t = 1, verbatim_doc_comment)]
    passes: u32,
    /// Space seperated output args passed to ffmpeg
    #[arg(long, default_value_t = DEFAULT_ENCODE_ARGS.join(" "))]
    render_args: String,
    /// Do not copy the input's audio into the output
    #[arg(long, action)]
    no_remux: bool,
    /// Werther to enable debug logging
    #[arg(short, long, action)]
    verbose: bool,
}

impl Cli {

    fn as_args(&self) -> Args {
        Args {
            scene_cut_threshold: self.scene_cut_threshold,
            synthesizer: self.synthesizer,
            model_path: self.model.clone(),
            model_threads: self.model_threads,
            debug_policy: self.debug_policy,
            debug_dir: self.debug_dir.clone(),
            save_raw_frames: self.save_raw_frames,
            max_flow_width: self.max_flow_width,
            remux_audio: !self.no_remux,
        }
    }

}

fn setup_logging(args: &Cli) {
    let filename = args.input_path.file_name().expect("Expected input file");
    let log_filename = format!("{}.log", filename.to_string_lossy());
    Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!("[{}] {}", record.level(), message))
        })
        .level(if args.verbose {log::LevelFilter::Debug} else {log::LevelFilter::Info})
        .chain(std::io::stdout())
        .chain(fern::log_file(log_filename).expect("Expected to open log file"))
        .apply()
        .unwrap();
}

/// `<stem>_pass<k>.<ext>` next to `path`
fn pass_path(path: &Path, pass: u32) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_pass{}.{}", stem, pass, ext.to_string_lossy()),
        None => format!("{}_pass{}", stem, pass),
    };
    path.with_file_name(name)
}

fn log_summary(pass: u32, report: &ReportDocument) {
    let summary = &report.summary;
    let dist = summary.verdict_distribution;
    info!(
        "Pass {}: {} frames graded in {:.2}s, PASS {} / WARNING {} / FAIL {}, average severity {:.3}{}",
        pass,
        report.frames.len(),
        summary.processing_time_seconds,
        dist.pass,
        dist.warning,
        dist.fail,
        summary.average_severity,
        if summary.cancelled { " (stopped early)" } else { "" }
    );
}

fn main() {
    let full_template = "\
{before-help}{name} v{version} by {author}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}";
    let mut matches = Cli::command().help_template(full_template).get_matches();
    let cli_args = Cli::from_arg_matches_mut(&mut matches).unwrap();
    if !cli_args.input_path.exists() {
        eprintln!("Error: Input file does not exist");
        std::process::exit(1);
    }
    setup_logging(&cli_args);

    let args = cli_args.as_args();
    let encode_args: Vec<String> = cli_args.render_args.split(' ').map(str::to_string).collect();
    let passes = cli_args.passes.max(1);
    let start = std::time::Instant::now();

    let mut input = cli_args.input_path.clone();
    for pass in 1..=passes {
        let (output, report) = if pass == passes {
            (cli_args.output_path.clone(), cli_args.report_path.clone())
        } else {
            (pass_path(&cli_args.output_path, pass), pass_path(&cli_args.report_path, pass))
        };
        info!("Pass {}/{}: \"{}\" to \"{}\"", pass, passes, input.display(), output.display());

        match process_video(&pass_args(&args, pass, passes), &input, &output, &report, &encode_args, None) {
            Ok(document) => log_summary(pass, &document),
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        }
        input = output;
    }

    info!("Finished in {:.2}s", start.elapsed().as_secs_f32());
}
