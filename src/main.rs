pub mod codecs;
pub mod config;
pub mod containers;
pub mod converter;
pub mod error;
pub mod ffmpeg;
pub mod filescanner;
pub mod fstools;
pub mod probe;
pub mod progress;
pub mod quality;
pub mod validator;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use human_repr::HumanDuration;
use rustop::opts;
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use converter::{ConversionResult, Converter, ConverterOptions, OutputTarget};
use error::{Error, Result};
use ffmpeg::runner::{SystemRunner, TranscodeRunner};
use filescanner::FileScanner;
use quality::Quality;
use validator::check_ffmpeg_installed;

const EXIT_INTERRUPTED: u8 = 130;
const RULE: &str = "============================================================";

struct Cli {
    paths: Vec<String>,
    output: Option<PathBuf>,
    quality: Quality,
    recursive: bool,
    parallel: usize,
    verbose: bool,
}

fn main() -> ExitCode {
    let (args, _rest) = opts! {
        synopsis "Convert QuickTime MOV videos to MP4 (H.264/AAC).";
        version env!("CARGO_PKG_VERSION");
        opt output:Option<String>, short:'o', desc:"Output directory (default: next to each input)";
        opt quality:String=String::from("medium"), short:'q', desc:"Output quality. [low, medium, high]";
        opt recursive:bool=false, short:'r', desc:"Search directories recursively.";
        opt parallel:usize=1, short:'p', desc:"Number of parallel conversions.";
        opt verbose:bool=false, short:'v', desc:"Show detailed output.";
        param paths:Vec<String>, desc:"MOV files or directories containing MOV files";
    }.parse_or_exit();

    init_logging(args.verbose);

    if !matches!(args.quality.to_lowercase().as_str(), "low" | "medium" | "high") {
        warn!("unknown quality {:?}, using medium", args.quality);
    }

    let cli = Cli {
        paths: args.paths,
        output: args.output.map(PathBuf::from),
        quality: Quality::from_str(&args.quality),
        recursive: args.recursive,
        parallel: args.parallel.max(1),
        verbose: args.verbose,
    };

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{}", err);
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        },
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let started = Instant::now();

    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop)).map_err(Error::Signal)?;
    }

    let config = Config::from_env();
    debug!("{:?}", config);
    let options = ConverterOptions {
        quality: cli.quality,
        verbose: cli.verbose,
        probe_timeout: config.probe_timeout,
        show_progress: true,
    };
    let tool_check_timeout = config.tool_check_timeout;
    let runner: Arc<dyn TranscodeRunner> = Arc::new(SystemRunner::new(config));

    println!("Checking FFmpeg installation...");
    match check_ffmpeg_installed(runner.as_ref(), tool_check_timeout) {
        Ok(msg) => {
            if cli.verbose {
                println!("✓ {}", msg);
            }
        },
        Err(msg) => {
            eprintln!("Error: {}", msg);
            print_install_hints();
            return Ok(ExitCode::FAILURE);
        },
    }

    let files = FileScanner::new(cli.recursive).scan(&cli.paths);
    if files.is_empty() {
        eprintln!("Error: No MOV files found");
        return Ok(ExitCode::FAILURE);
    }

    println!();
    println!("Found {} MOV file(s) to convert", files.len());
    println!("Quality: {}", cli.quality);
    if let Some(output) = &cli.output {
        println!("Output directory: {}", output.display());
    }
    if cli.parallel > 1 {
        println!("Parallel conversions: {}", cli.parallel);
    }
    println!();

    let converter = Converter::new(runner, options);
    let code = if let [input] = files.as_slice() {
        convert_one(&converter, input, cli.output.as_deref(), &stop)
    } else {
        convert_many(&converter, &files, cli.output.as_deref(), cli.parallel, &stop)
    };

    println!("Elapsed: {}", started.elapsed().human_duration());
    Ok(code)
}

fn convert_one(converter: &Converter, input: &Path, output: Option<&Path>, stop: &AtomicBool) -> ExitCode {
    let target = match output {
        Some(dir) => OutputTarget::Directory(dir.to_path_buf()),
        None => OutputTarget::Alongside,
    };
    let job = converter.job(input.to_path_buf(), &target);

    let outcome = {
        let mut tracker = converter.tracker(1);
        converter.convert_single(&job, Some(&mut tracker), stop)
    };

    match outcome {
        Ok(result) if result.success => {
            println!();
            println!("✓ Conversion successful!");
            println!("Output: {}", result.message);
            ExitCode::SUCCESS
        },
        Ok(result) => {
            eprintln!();
            eprintln!("✗ Conversion failed: {}", result.message);
            ExitCode::FAILURE
        },
        Err(Error::Interrupted { .. }) => {
            println!();
            println!("Conversion interrupted by user");
            ExitCode::from(EXIT_INTERRUPTED)
        },
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        },
    }
}

fn convert_many(
    converter: &Converter,
    files: &[PathBuf],
    output: Option<&Path>,
    parallel: usize,
    stop: &AtomicBool,
) -> ExitCode {
    match converter.convert_batch(files, output, parallel, stop) {
        Ok(results) => {
            let failed = print_summary(&results);
            if failed > 0 { ExitCode::FAILURE } else { ExitCode::SUCCESS }
        },
        Err(Error::Interrupted { completed }) => {
            print_summary(&completed);
            println!();
            println!("Conversion interrupted by user");
            ExitCode::from(EXIT_INTERRUPTED)
        },
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        },
    }
}

/// Prints the per-job outcome table and returns the number of failures.
fn print_summary(results: &[ConversionResult]) -> usize {
    let file_name = |path: &Path| path.file_name().unwrap_or(path.as_os_str()).to_string_lossy().into_owned();

    println!();
    println!("{}", RULE);
    println!("CONVERSION SUMMARY");
    println!("{}", RULE);

    let mut failed = 0;
    for result in results {
        if result.success {
            println!("✓ {} → {}", file_name(&result.input), file_name(Path::new(&result.message)));
        } else {
            failed += 1;
            println!("✗ {}: {}", file_name(&result.input), result.message);
        }
    }

    println!("{}", RULE);
    println!("Total: {} files", results.len());
    println!("Successful: {}", results.len() - failed);
    if failed > 0 {
        println!("Failed: {}", failed);
    }
    println!("{}", RULE);
    failed
}

fn print_install_hints() {
    println!();
    println!("Please install FFmpeg:");
    println!("  macOS:   brew install ffmpeg");
    println!("  Linux:   sudo apt install ffmpeg  (Ubuntu/Debian)");
    println!("           sudo yum install ffmpeg  (CentOS/RHEL)");
    println!("  Windows: Download from https://ffmpeg.org/download.html");
}
