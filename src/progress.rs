use std::io::IsTerminal;
use std::sync::LazyLock;

use kdam::{term, tqdm, Bar, BarExt};
use regex::Regex;
use tracing::debug;

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time=(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("time pattern is valid")
});

static FRAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"frame=\s*(\d+)").expect("frame pattern is valid")
});

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrackerState {
    Idle,
    Active,
    Completed,
    Failed,
}

/// Unit of an indeterminate counter. Seconds win over frames.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Unit {
    Seconds,
    Frames,
}

impl Unit {
    fn label(&self) -> &'static str {
        match self {
            Unit::Seconds => "s",
            Unit::Frames => "frames",
        }
    }
}

/// Progress of the file currently being converted.
struct FileProgress {
    desc: String,
    row: u16,
    display: bool,
    duration: Option<f64>,
    position: f64,
    last_time: f64,
    last_frame: u64,
    unit: Option<Unit>,
    bar: Option<Bar>,
}

impl FileProgress {
    fn new(desc: String, row: u16, display: bool, duration: Option<f64>) -> Self {
        let mut file = FileProgress {
            desc,
            row,
            display,
            duration,
            position: 0.0,
            last_time: 0.0,
            last_frame: 0,
            unit: None,
            bar: None,
        };
        if let Some(d) = duration {
            file.open_bar(d.ceil() as usize, Unit::Seconds);
        }
        file
    }

    fn open_bar(&mut self, total: usize, unit: Unit) {
        if self.display {
            self.bar = Some(tqdm!(
                total = total,
                desc = self.desc.clone(),
                unit = String::from(unit.label()),
                position = self.row,
                leave = false,
                force_refresh = true
            ));
        }
    }

    /// Switches the indeterminate counter to seconds. Any frame count
    /// gathered before the first timestamp is discarded.
    fn count_seconds(&mut self) {
        if self.unit == Some(Unit::Seconds) {
            return;
        }
        if self.unit == Some(Unit::Frames) {
            self.close();
            self.position = 0.0;
            self.last_frame = 0;
        }
        self.unit = Some(Unit::Seconds);
        self.open_bar(0, Unit::Seconds);
    }

    fn set_time(&mut self, elapsed: f64) {
        match self.duration {
            Some(duration) => {
                self.position = elapsed.clamp(0.0, duration);
                self.render();
            },
            None => {
                self.count_seconds();
                // timestamps occasionally repeat or step backwards
                let delta = elapsed - self.last_time;
                if delta > 0.0 {
                    self.position += delta;
                    self.last_time = elapsed;
                    self.render();
                }
            },
        }
    }

    /// Frames only count until a timestamp has been seen.
    fn set_frames(&mut self, frames: u64) {
        if self.duration.is_some() {
            return;
        }
        match self.unit {
            Some(Unit::Seconds) => return,
            Some(Unit::Frames) => (),
            None => {
                self.unit = Some(Unit::Frames);
                self.open_bar(0, Unit::Frames);
            },
        }
        if frames > self.last_frame {
            self.position += (frames - self.last_frame) as f64;
            self.last_frame = frames;
            self.render();
        }
    }

    fn render(&mut self) {
        if let Some(bar) = &mut self.bar {
            let _ = bar.update_to(self.position.round() as usize);
        }
    }

    fn close(&mut self) {
        if let Some(mut bar) = self.bar.take() {
            let _ = bar.clear();
        }
    }
}

impl Drop for FileProgress {
    fn drop(&mut self) {
        self.close();
    }
}

/// Per-file and overall progress for a batch.
///
/// Detailed per-file progress is only meaningful when one job's output is
/// read synchronously. For concurrent jobs only `finish_file` is called and
/// only the completed count advances.
pub struct ProgressTracker {
    total_files: usize,
    started: usize,
    completed: usize,
    verbose: bool,
    display: bool,
    state: TrackerState,
    current: Option<FileProgress>,
    last_position: Option<f64>,
    overall: Option<Bar>,
}

impl ProgressTracker {
    /// Draws progress bars when stderr is a terminal.
    pub fn new(total_files: usize, verbose: bool) -> Self {
        ProgressTracker::with_display(total_files, verbose, std::io::stderr().is_terminal())
    }

    /// Tracks progress without drawing anything.
    pub fn hidden(total_files: usize) -> Self {
        ProgressTracker::with_display(total_files, false, false)
    }

    fn with_display(total_files: usize, verbose: bool, display: bool) -> Self {
        let overall = if display && total_files > 1 {
            term::init(false);
            Some(tqdm!(
                total = total_files,
                desc = String::from("Overall Progress"),
                unit = String::from("file"),
                position = 0,
                force_refresh = true
            ))
        } else {
            None
        };

        ProgressTracker {
            total_files,
            started: 0,
            completed: 0,
            verbose,
            display,
            state: TrackerState::Idle,
            current: None,
            last_position: None,
            overall,
        }
    }

    pub fn start_file(&mut self, name: &str, duration: Option<f64>) {
        // release the previous file's bar before drawing a new one
        if let Some(mut previous) = self.current.take() {
            previous.close();
        }

        self.started += 1;
        let mut desc = format!("Converting {}", name);
        if self.total_files > 1 {
            desc = format!("[{}/{}] {}", self.started, self.total_files, desc);
        }
        let row = if self.overall.is_some() { 1 } else { 0 };
        let duration = duration.filter(|d| d.is_finite() && *d > 0.0);

        self.current = Some(FileProgress::new(desc, row, self.display, duration));
        self.last_position = None;
        self.state = TrackerState::Active;
    }

    /// Feed one line of transcoder output. Unrecognised lines are ignored.
    pub fn update(&mut self, line: &str) {
        let Some(file) = self.current.as_mut() else { return };

        if self.verbose {
            debug!("ffmpeg: {}", line.trim());
        }

        if let Some(elapsed) = parse_timestamp(line) {
            file.set_time(elapsed);
            return;
        }

        if let Some(frames) = parse_frame(line) {
            file.set_frames(frames);
        }
    }

    /// Counts the file as done whether or not it succeeded.
    pub fn finish_file(&mut self, success: bool) {
        if let Some(mut file) = self.current.take() {
            if success {
                if let Some(duration) = file.duration {
                    file.position = duration;
                    file.render();
                }
            }
            self.last_position = Some(file.position);
            file.close();
        }

        self.state = if success { TrackerState::Completed } else { TrackerState::Failed };
        self.completed += 1;
        if let Some(bar) = &mut self.overall {
            let _ = bar.update(1);
        }
    }

    /// Release every bar. Also runs on drop.
    pub fn finish(&mut self) {
        if let Some(mut file) = self.current.take() {
            file.close();
        }
        if let Some(mut bar) = self.overall.take() {
            let _ = bar.refresh();
            eprintln!();
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn total_files(&self) -> usize {
        self.total_files
    }

    /// Position of the active file, or the final position of the last one.
    pub fn position(&self) -> Option<f64> {
        match &self.current {
            Some(file) => Some(file.position),
            None => self.last_position,
        }
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.finish();
    }
}

/// `time=HH:MM:SS.ff` (also matches `out_time=`) as seconds.
fn parse_timestamp(line: &str) -> Option<f64> {
    let caps = TIME_RE.captures(line)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn parse_frame(line: &str) -> Option<u64> {
    FRAME_RE.captures(line)?[1].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: Option<f64>, expected: f64) {
        let actual = actual.unwrap();
        assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("out_time=00:01:05.000000"), Some(65.0));
        assert_eq!(parse_timestamp("frame=  10 fps=0.0 q=0.0 size=0kB time=01:00:00.50 bitrate=N/A"), Some(3600.5));
        assert_eq!(parse_timestamp("out_time=N/A"), None);
        assert_eq!(parse_timestamp("out_time_ms=65000000"), None);
    }

    #[test]
    fn test_parse_frame() {
        assert_eq!(parse_frame("frame=42"), Some(42));
        assert_eq!(parse_frame("frame=   7 fps=0.0"), Some(7));
        assert_eq!(parse_frame("fps=25.0"), None);
    }

    #[test]
    fn test_state_transitions() {
        let mut tracker = ProgressTracker::hidden(2);
        assert_eq!(tracker.state(), TrackerState::Idle);
        tracker.start_file("a.mov", None);
        assert_eq!(tracker.state(), TrackerState::Active);
        tracker.finish_file(true);
        assert_eq!(tracker.state(), TrackerState::Completed);
        tracker.start_file("b.mov", None);
        tracker.finish_file(false);
        assert_eq!(tracker.state(), TrackerState::Failed);
        assert_eq!(tracker.completed(), 2);
    }

    #[test]
    fn test_delta_without_duration() {
        let mut tracker = ProgressTracker::hidden(1);
        tracker.start_file("clip.mov", None);
        tracker.update("time=00:01:05.00");
        let before = tracker.position().unwrap();
        tracker.update("time=00:01:07.50");
        assert_close(tracker.position(), before + 2.5);
    }

    #[test]
    fn test_non_monotonic_timestamps_never_decrement() {
        let mut tracker = ProgressTracker::hidden(1);
        tracker.start_file("clip.mov", None);
        tracker.update("out_time=00:00:10.00");
        tracker.update("out_time=00:00:08.00");
        assert_close(tracker.position(), 10.0);
        tracker.update("out_time=00:00:10.00");
        assert_close(tracker.position(), 10.0);
        tracker.update("out_time=00:00:11.00");
        assert_close(tracker.position(), 11.0);
    }

    #[test]
    fn test_absolute_with_duration() {
        let mut tracker = ProgressTracker::hidden(1);
        tracker.start_file("clip.mov", Some(60.0));
        tracker.update("out_time=00:00:30.00");
        assert_close(tracker.position(), 30.0);
        tracker.update("out_time=00:00:20.00");
        assert_close(tracker.position(), 20.0);
        tracker.update("out_time=00:05:00.00");
        assert_close(tracker.position(), 60.0);
    }

    #[test]
    fn test_frames_ignored_with_duration() {
        let mut tracker = ProgressTracker::hidden(1);
        tracker.start_file("clip.mov", Some(60.0));
        tracker.update("frame=500");
        assert_close(tracker.position(), 0.0);
    }

    #[test]
    fn test_frames_without_duration() {
        let mut tracker = ProgressTracker::hidden(1);
        tracker.start_file("clip.mov", None);
        tracker.update("frame=10");
        tracker.update("frame=25");
        tracker.update("frame=20");
        assert_close(tracker.position(), 25.0);
    }

    #[test]
    fn test_timestamp_replaces_frame_count() {
        let mut tracker = ProgressTracker::hidden(1);
        tracker.start_file("clip.mov", None);
        tracker.update("frame=25");
        assert_close(tracker.position(), 25.0);
        tracker.update("out_time=00:00:01.00");
        assert_close(tracker.position(), 1.0);
        tracker.update("frame=50");
        assert_close(tracker.position(), 1.0);
    }

    #[test]
    fn test_interleaved_progress_block_counts_time() {
        let mut tracker = ProgressTracker::hidden(1);
        tracker.start_file("clip.mov", None);
        for line in ["frame=1", "fps=0.0", "out_time_us=65000000", "out_time=00:01:05.000000", "progress=continue"] {
            tracker.update(line);
        }
        let before = tracker.position().unwrap();
        for line in ["frame=2", "fps=0.0", "out_time_us=67500000", "out_time=00:01:07.500000", "progress=continue"] {
            tracker.update(line);
        }
        assert_close(tracker.position(), before + 2.5);
        assert_close(tracker.position(), 67.5);
    }

    #[test]
    fn test_unrecognised_lines_are_ignored() {
        let mut tracker = ProgressTracker::hidden(1);
        tracker.start_file("clip.mov", None);
        tracker.update("progress=continue");
        tracker.update("");
        tracker.update("bitrate=N/A");
        assert_close(tracker.position(), 0.0);
    }

    #[test]
    fn test_update_without_active_file() {
        let mut tracker = ProgressTracker::hidden(1);
        tracker.update("time=00:00:01.00");
        assert_eq!(tracker.position(), None);
    }

    #[test]
    fn test_finish_snaps_to_duration() {
        let mut tracker = ProgressTracker::hidden(1);
        tracker.start_file("clip.mov", Some(12.34));
        tracker.update("out_time=00:00:12.30");
        tracker.finish_file(true);
        assert_close(tracker.position(), 12.34);
    }

    #[test]
    fn test_failed_file_does_not_snap() {
        let mut tracker = ProgressTracker::hidden(1);
        tracker.start_file("clip.mov", Some(100.0));
        tracker.update("out_time=00:00:40.00");
        tracker.finish_file(false);
        assert_close(tracker.position(), 40.0);
        assert_eq!(tracker.completed(), 1);
    }

    #[test]
    fn test_restart_resets_counters() {
        let mut tracker = ProgressTracker::hidden(2);
        tracker.start_file("a.mov", None);
        tracker.update("time=00:00:30.00");
        tracker.start_file("b.mov", None);
        assert_close(tracker.position(), 0.0);
        tracker.update("time=00:00:02.00");
        assert_close(tracker.position(), 2.0);
    }

    #[test]
    fn test_finish_file_without_start_counts() {
        let mut tracker = ProgressTracker::hidden(3);
        tracker.finish_file(true);
        tracker.finish_file(false);
        assert_eq!(tracker.completed(), 2);
        assert_eq!(tracker.total_files(), 3);
    }
}
