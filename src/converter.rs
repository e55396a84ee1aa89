use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use human_repr::HumanCount;
use rayon::ThreadPoolBuilder;
use tracing::{debug, error, info, warn};

use crate::config::MEDIA_PROBE_TIMEOUT;
use crate::containers::{self, Container};
use crate::error::{Error, Result};
use crate::ffmpeg::runner::TranscodeRunner;
use crate::ffmpeg::transcode_args;
use crate::fstools::file_size;
use crate::probe::probe_duration;
use crate::progress::ProgressTracker;
use crate::quality::Quality;
use crate::validator::{check_disk_space, check_video_streams, validate_input_file, validate_output_dir};

/// Where a job's output goes.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputTarget {
    /// Next to the input, extension replaced.
    Alongside,
    /// Inside this directory, which is created if missing.
    Directory(PathBuf),
    /// This exact path, unless it names an existing directory.
    File(PathBuf),
}

#[derive(Clone, Debug)]
pub struct ConversionJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub quality: Quality,
}

impl ConversionJob {
    pub fn new(input: PathBuf, target: &OutputTarget, quality: Quality) -> Self {
        let output = resolve_output_path(&input, target);
        ConversionJob { input, output, quality }
    }
}

/// Outcome of one job. `message` is the output path on success and the
/// failure reason otherwise.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversionResult {
    pub input: PathBuf,
    pub success: bool,
    pub message: String,
}

impl ConversionResult {
    fn succeeded(job: &ConversionJob) -> Self {
        ConversionResult { input: job.input.clone(), success: true, message: job.output.display().to_string() }
    }

    fn failed(job: &ConversionJob, message: impl Into<String>) -> Self {
        ConversionResult { input: job.input.clone(), success: false, message: message.into() }
    }

    fn collides(job: &ConversionJob, first: &Path) -> Self {
        let message = format!("Output {} is already produced by {}", job.output.display(), first.display());
        warn!("{}", message);
        ConversionResult::failed(job, message)
    }
}

#[derive(Clone, Debug)]
pub struct ConverterOptions {
    pub quality: Quality,
    pub verbose: bool,
    pub probe_timeout: Duration,
    /// Draw progress bars for batches.
    pub show_progress: bool,
}

impl Default for ConverterOptions {
    fn default() -> Self {
        ConverterOptions {
            quality: Quality::Medium,
            verbose: false,
            probe_timeout: MEDIA_PROBE_TIMEOUT,
            show_progress: true,
        }
    }
}

#[derive(Clone)]
pub struct Converter {
    runner: Arc<dyn TranscodeRunner>,
    options: ConverterOptions,
}

impl Converter {
    pub fn new(runner: Arc<dyn TranscodeRunner>, options: ConverterOptions) -> Self {
        Converter { runner, options }
    }

    pub fn job(&self, input: PathBuf, target: &OutputTarget) -> ConversionJob {
        ConversionJob::new(input, target, self.options.quality)
    }

    pub fn tracker(&self, total_files: usize) -> ProgressTracker {
        if self.options.show_progress {
            ProgressTracker::new(total_files, self.options.verbose)
        } else {
            ProgressTracker::hidden(total_files)
        }
    }

    /// Convert one file. Every failure is reported in the returned result;
    /// `Err` means the run was interrupted.
    pub fn convert_single(
        &self,
        job: &ConversionJob,
        mut tracker: Option<&mut ProgressTracker>,
        stop: &AtomicBool,
    ) -> Result<ConversionResult> {
        let input = &job.input;
        let output = &job.output;
        let timeout = self.options.probe_timeout;

        if let Err(msg) = validate_input_file(input) {
            return Ok(ConversionResult::failed(job, msg));
        }
        if let Err(msg) = check_video_streams(self.runner.as_ref(), input, timeout) {
            return Ok(ConversionResult::failed(job, msg));
        }

        let output_dir = output.parent().unwrap_or(Path::new("."));
        match validate_output_dir(output_dir) {
            Ok(msg) => debug!("{}", msg),
            Err(msg) => return Ok(ConversionResult::failed(job, msg)),
        }

        let input_size = file_size(input).unwrap_or(0);
        if let Err(msg) = check_disk_space(output, input_size) {
            warn!("{}", msg);
        }

        let duration = match probe_duration(self.runner.as_ref(), input, timeout) {
            Ok(duration) => duration,
            Err(err) => {
                warn!("Could not get video duration: {}", err);
                None
            },
        };

        let name = display_name(input);
        if let Some(t) = tracker.as_deref_mut() {
            t.start_file(&name, duration);
        }

        let args = transcode_args(input, output, job.quality, tracker.is_some());
        info!("Converting {} to {}", name, display_name(output));

        let verbose = self.options.verbose;
        let outcome = {
            let mut on_line = |line: &str| match tracker.as_deref_mut() {
                Some(t) => t.update(line),
                None if verbose => debug!("ffmpeg: {}", line.trim()),
                None => (),
            };
            self.runner.transcode(&args, &mut on_line, stop)
        };

        let result = match outcome {
            Err(err @ Error::Interrupted { .. }) => {
                info!("Conversion of {} interrupted by user", name);
                remove_partial_output(output);
                finish(&mut tracker, false);
                return Err(err);
            },
            Err(err) => {
                error!("Conversion error: {}", err);
                remove_partial_output(output);
                ConversionResult::failed(job, format!("Conversion error: {}", err))
            },
            Ok(Some(0)) => match file_size(output) {
                Some(size) if size > 0 => {
                    info!(
                        "Successfully converted {} ({} -> {})",
                        name,
                        input_size.human_count_bytes(),
                        size.human_count_bytes());
                    ConversionResult::succeeded(job)
                },
                _ => ConversionResult::failed(job, "Output file was not created or is empty"),
            },
            Ok(Some(code)) => ConversionResult::failed(job, format!("FFmpeg failed with return code {}", code)),
            Ok(None) => ConversionResult::failed(job, "FFmpeg was terminated by a signal"),
        };

        finish(&mut tracker, result.success);
        Ok(result)
    }

    /// Convert every input. With `parallel <= 1` jobs run one after another
    /// in input order with per-file progress; otherwise up to `parallel` run
    /// at once and results arrive in completion order. Always yields one
    /// result per input unless interrupted, in which case the results
    /// gathered so far travel inside `Error::Interrupted`.
    ///
    /// When two inputs resolve to the same output (`a.mov` and `a.MOV`), the
    /// later one fails without running.
    pub fn convert_batch(
        &self,
        inputs: &[PathBuf],
        output_dir: Option<&Path>,
        parallel: usize,
        stop: &AtomicBool,
    ) -> Result<Vec<ConversionResult>> {
        let target = match output_dir {
            Some(dir) => OutputTarget::Directory(dir.to_path_buf()),
            None => OutputTarget::Alongside,
        };
        let jobs: Vec<ConversionJob> = inputs.iter().map(|i| self.job(i.clone(), &target)).collect();

        let clashes = output_clashes(&jobs);

        if parallel <= 1 {
            self.run_sequential(&jobs, &clashes, stop)
        } else {
            self.run_parallel(&jobs, &clashes, parallel, stop)
        }
    }

    fn run_sequential(
        &self,
        jobs: &[ConversionJob],
        clashes: &[Option<&Path>],
        stop: &AtomicBool,
    ) -> Result<Vec<ConversionResult>> {
        let mut tracker = self.tracker(jobs.len());
        let mut results = Vec::with_capacity(jobs.len());

        for (job, clash) in jobs.iter().zip(clashes) {
            if stop.load(Ordering::SeqCst) {
                return Err(Error::Interrupted { completed: results });
            }
            if let Some(first) = clash {
                tracker.finish_file(false);
                results.push(ConversionResult::collides(job, first));
                continue;
            }
            match self.convert_single(job, Some(&mut tracker), stop) {
                Ok(result) => {
                    log_result(&result);
                    results.push(result);
                },
                Err(Error::Interrupted { .. }) => return Err(Error::Interrupted { completed: results }),
                Err(err) => return Err(err),
            }
        }

        Ok(results)
    }

    fn run_parallel(
        &self,
        jobs: &[ConversionJob],
        clashes: &[Option<&Path>],
        parallel: usize,
        stop: &AtomicBool,
    ) -> Result<Vec<ConversionResult>> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(parallel.min(jobs.len()).max(1))
            .thread_name(|i| format!("convert-{}", i))
            .build()?;

        let mut tracker = self.tracker(jobs.len());
        let mut results = Vec::with_capacity(jobs.len());
        let mut interrupted = false;
        let mut fault = None;

        let (tx, rx) = mpsc::channel();
        pool.in_place_scope(|scope| {
            for (job, clash) in jobs.iter().zip(clashes) {
                if let Some(first) = clash {
                    let _ = tx.send(Ok(ConversionResult::collides(job, first)));
                    continue;
                }
                let tx = tx.clone();
                scope.spawn(move |_| {
                    // jobs that have not started yet are abandoned on stop
                    let outcome = if stop.load(Ordering::SeqCst) {
                        Err(Error::interrupted())
                    } else {
                        self.convert_single(job, None, stop)
                    };
                    let _ = tx.send(outcome);
                });
            }
            drop(tx);

            for outcome in rx {
                match outcome {
                    Ok(result) => {
                        tracker.finish_file(result.success);
                        log_result(&result);
                        results.push(result);
                    },
                    Err(Error::Interrupted { .. }) => interrupted = true,
                    Err(err) => {
                        error!("{}", err);
                        if fault.is_none() {
                            fault = Some(err);
                        }
                    },
                }
            }
        });

        if interrupted {
            return Err(Error::Interrupted { completed: results });
        }
        match fault {
            Some(err) => Err(err),
            None => Ok(results),
        }
    }
}

/// Output location for `input`: the target's directory (or the input's own
/// directory) with the target container's extension.
pub fn resolve_output_path(input: &Path, target: &OutputTarget) -> PathBuf {
    let extension = Container::extension(containers::TARGET);
    let file_name = || {
        let mut name = PathBuf::from(input.file_name().unwrap_or(input.as_os_str()));
        name.set_extension(extension);
        name
    };

    match target {
        OutputTarget::Alongside => input.with_extension(extension),
        OutputTarget::Directory(dir) => dir.join(file_name()),
        OutputTarget::File(path) if path.is_dir() => path.join(file_name()),
        OutputTarget::File(path) => path.clone(),
    }
}

/// For each job, the input of an earlier job that writes the same output.
fn output_clashes(jobs: &[ConversionJob]) -> Vec<Option<&Path>> {
    let mut claimed: HashMap<&Path, &Path> = HashMap::new();
    jobs.iter()
        .map(|job| match claimed.entry(job.output.as_path()) {
            Entry::Occupied(entry) => Some(*entry.get()),
            Entry::Vacant(entry) => {
                entry.insert(job.input.as_path());
                None
            },
        })
        .collect()
}

fn finish(tracker: &mut Option<&mut ProgressTracker>, success: bool) {
    if let Some(t) = tracker.as_deref_mut() {
        t.finish_file(success);
    }
}

fn remove_partial_output(output: &Path) {
    if output.exists() {
        match fs::remove_file(output) {
            Ok(()) => debug!("removed partial output {}", output.display()),
            Err(err) => warn!("unable to remove partial output {}: {}", output.display(), err),
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name().unwrap_or(path.as_os_str()).to_string_lossy().into_owned()
}

fn log_result(result: &ConversionResult) {
    if result.success {
        info!("✓ {} → {}", display_name(&result.input), result.message);
    } else {
        warn!("✗ {}: {}", display_name(&result.input), result.message);
    }
}
