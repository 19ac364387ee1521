use std::path::PathBuf;
use clap::Parser;
use fern::Dispatch;
use log::error;
use synthesight::choppify::choppify;
use synthesight::video::{FfmpegSink, FfmpegSource};
use synthesight::DEFAULT_ENCODE_ARGS;

/// Drops frames from a smooth video to create choppy test input.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// The input video file path
    #[arg(short)]
    input_path: PathBuf,
    /// The output video file path
    #[arg(short, default_value = "choppy_output.mp4")]
    output_path: PathBuf,

    /// The frame rate to reduce to
    #[arg(short = 'f', long, default_value_t = 10.0)]
    fps: f64,

    /// Space seperated output args passed to ffmpeg
    #[arg(short, long, default_value_t = DEFAULT_ENCODE_ARGS.join(" "))]
    render_args: String,

    /// Werther to enable debug logging
    #[arg(short, long, action)]
    verbose: bool,
}

fn setup_logging(args: &Cli) {
    Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!("[{}] {}", record.level(), message))
        })
        .level(if args.verbose {log::LevelFilter::Debug} else {log::LevelFilter::Info})
        .chain(std::io::stdout())
        .apply()
        .unwrap();
}

fn main() {
    let cli_args = Cli::parse();
    setup_logging(&cli_args);

    let mut source = match FfmpegSource::open(&cli_args.input_path) {
        Ok(source) => source,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let encode_args = cli_args.render_args.split(' ');
    let result = choppify(
        &mut source,
        |params| FfmpegSink::create(&cli_args.output_path, params, encode_args),
        cli_args.fps,
    );
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}
