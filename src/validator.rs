//! Preflight checks. Each returns `Ok(message)` when the check passes and
//! `Err(reason)` with a human readable reason when it does not.

use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::time::Duration;

use human_repr::HumanCount;
use tracing::warn;

use crate::containers::{self, Container};
use crate::error::ProbeError;
use crate::ffmpeg::Program;
use crate::ffmpeg::runner::TranscodeRunner;
use crate::fstools::{classify_file, file_size, free_space, is_writable, DirEntryCategory};
use crate::probe::{probe_streams, StreamCheck};

pub type CheckResult = Result<String, String>;

pub fn check_ffmpeg_installed(runner: &dyn TranscodeRunner, timeout: Duration) -> CheckResult {
    match runner.probe(Program::FFmpeg, &[OsString::from("-version")], timeout) {
        Ok(output) if output.success() => {
            let version = output.stdout.lines().next().unwrap_or("").trim().to_string();
            Ok(format!("FFmpeg found: {}", version))
        },
        Ok(output) => match output.code {
            Some(code) => Err(format!("FFmpeg command failed with exit code {}", code)),
            None => Err(String::from("FFmpeg command failed")),
        },
        Err(ProbeError::NotFound(_)) => Err(String::from("FFmpeg not found. Please install FFmpeg first.")),
        Err(ProbeError::TimedOut { .. }) => Err(String::from("FFmpeg check timed out")),
        Err(err) => Err(format!("Error checking FFmpeg: {}", err)),
    }
}

pub fn validate_input_file(path: &Path) -> CheckResult {
    match classify_file(path) {
        DirEntryCategory::DoesNotExist => return Err(format!("File not found: {}", path.display())),
        DirEntryCategory::RegularFile => (),
        _ => return Err(format!("Not a file: {}", path.display())),
    }

    if !Container::matches(containers::SOURCE, path) {
        return Err(format!("Not a MOV file: {}", path.display()));
    }

    match file_size(path) {
        Some(0) => Err(format!("File is empty: {}", path.display())),
        Some(_) => Ok(String::from("Valid input file")),
        None => Err(format!("Unable to read file: {}", path.display())),
    }
}

/// Creates `dir` (and its parents) when it is missing.
pub fn validate_output_dir(dir: &Path) -> CheckResult {
    let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };

    match classify_file(dir) {
        DirEntryCategory::DoesNotExist => match fs::create_dir_all(dir) {
            Ok(()) => Ok(format!("Created output directory: {}", dir.display())),
            Err(err) => Err(format!("Cannot create directory {}: {}", dir.display(), err)),
        },
        DirEntryCategory::Directory => {
            if is_writable(dir) {
                Ok(String::from("Valid output directory"))
            } else {
                Err(format!("Directory is not writable: {}", dir.display()))
            }
        },
        _ => Err(format!("Not a directory: {}", dir.display())),
    }
}

/// Requires 110% of `input_size` to be free next to `output_path`. Failing
/// to query free space counts as a pass.
pub fn check_disk_space(output_path: &Path, input_size: u64) -> CheckResult {
    let location = match output_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let required = input_size.saturating_mul(11) / 10;

    match free_space(location) {
        Some(available) if available < required => Err(format!(
            "Insufficient disk space. Required: {}, Available: {}",
            required.human_count_bytes(),
            available.human_count_bytes())),
        Some(_) => Ok(String::from("Sufficient disk space")),
        None => {
            warn!("Could not check disk space at {}", location.display());
            Ok(String::from("Could not verify disk space"))
        },
    }
}

/// Confirms the file has a video stream. A missing ffprobe is not a reason
/// to refuse the conversion.
pub fn check_video_streams(runner: &dyn TranscodeRunner, path: &Path, timeout: Duration) -> CheckResult {
    match probe_streams(runner, path, timeout) {
        Ok(StreamCheck::HasVideo) => Ok(String::from("Valid video file")),
        Ok(StreamCheck::NoVideo) => Err(String::from("File does not contain a video stream")),
        Ok(StreamCheck::Failed(stderr)) => Err(format!("FFprobe error: {}", stderr)),
        Ok(StreamCheck::Unparseable(err)) => {
            warn!("Could not validate video {}: {}", path.display(), err);
            Ok(String::from("Could not verify video"))
        },
        Err(ProbeError::NotFound(_)) => {
            warn!("ffprobe not found, skipping detailed validation");
            Ok(String::from("Could not verify (ffprobe not found)"))
        },
        Err(ProbeError::TimedOut { .. }) => Err(String::from("Video validation timed out")),
        Err(err) => {
            warn!("Could not validate video {}: {}", path.display(), err);
            Ok(String::from("Could not verify video"))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use crate::error::Result;
    use crate::ffmpeg::runner::ProbeOutput;

    /// Answers every probe with the same canned outcome.
    struct CannedProbe(fn() -> std::result::Result<ProbeOutput, ProbeError>);

    impl TranscodeRunner for CannedProbe {
        fn probe(&self, _: Program, _: &[OsString], _: Duration) -> std::result::Result<ProbeOutput, ProbeError> {
            (self.0)()
        }

        fn transcode(&self, _: &[OsString], _: &mut dyn FnMut(&str), _: &AtomicBool) -> Result<Option<i32>> {
            unreachable!("validators never transcode")
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn ok_with(stdout: &'static str) -> std::result::Result<ProbeOutput, ProbeError> {
        Ok(ProbeOutput { code: Some(0), stdout: String::from(stdout), stderr: String::new() })
    }

    #[test]
    fn test_ffmpeg_installed() {
        let runner = CannedProbe(|| ok_with("ffmpeg version 7.1 Copyright (c) 2000-2024\nbuilt with gcc\n"));
        assert_eq!(check_ffmpeg_installed(&runner, TIMEOUT), Ok(String::from("FFmpeg found: ffmpeg version 7.1 Copyright (c) 2000-2024")));
    }

    #[test]
    fn test_ffmpeg_outcomes_are_distinct() {
        let missing = CannedProbe(|| Err(ProbeError::NotFound(String::from("ffmpeg"))));
        let failing = CannedProbe(|| Ok(ProbeOutput { code: Some(1), ..ProbeOutput::default() }));
        let hung = CannedProbe(|| Err(ProbeError::TimedOut { program: String::from("ffmpeg"), timeout: TIMEOUT }));

        let messages = [
            check_ffmpeg_installed(&missing, TIMEOUT).unwrap_err(),
            check_ffmpeg_installed(&failing, TIMEOUT).unwrap_err(),
            check_ffmpeg_installed(&hung, TIMEOUT).unwrap_err(),
        ];
        assert!(messages[0].contains("not found"));
        assert!(messages[1].contains("failed"));
        assert!(messages[2].contains("timed out"));
    }

    #[test]
    fn test_validate_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("clip.mov");
        let upper = dir.path().join("CLIP2.MOV");
        let empty = dir.path().join("empty.mov");
        let wrong = dir.path().join("clip.avi");
        fs::write(&good, b"data").unwrap();
        fs::write(&upper, b"data").unwrap();
        fs::write(&empty, b"").unwrap();
        fs::write(&wrong, b"data").unwrap();

        assert!(validate_input_file(&good).is_ok());
        assert!(validate_input_file(&upper).is_ok());
        assert!(validate_input_file(&empty).unwrap_err().starts_with("File is empty"));
        assert!(validate_input_file(&wrong).unwrap_err().starts_with("Not a MOV file"));
        assert!(validate_input_file(&dir.path().join("missing.mov")).unwrap_err().starts_with("File not found"));
        assert!(validate_input_file(dir.path()).unwrap_err().starts_with("Not a file"));
    }

    #[test]
    fn test_validate_output_dir_creates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let msg = validate_output_dir(&nested).unwrap();
        assert!(msg.starts_with("Created output directory"));
        assert!(nested.is_dir());
        assert_eq!(validate_output_dir(&nested), Ok(String::from("Valid output directory")));
    }

    #[test]
    fn test_validate_output_dir_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not_a_dir");
        fs::write(&file, b"x").unwrap();
        assert!(validate_output_dir(&file).unwrap_err().starts_with("Not a directory"));
    }

    #[test]
    fn test_check_disk_space() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip.mp4");
        assert!(check_disk_space(&output, 1024).is_ok());
        let err = check_disk_space(&output, u64::MAX / 2).unwrap_err();
        assert!(err.starts_with("Insufficient disk space"));
    }

    #[test]
    fn test_check_video_streams() {
        let path = Path::new("clip.mov");
        let video = CannedProbe(|| ok_with(r#"{"streams": [{"codec_type": "video"}]}"#));
        let audio_only = CannedProbe(|| ok_with(r#"{"streams": []}"#));
        let broken = CannedProbe(|| Ok(ProbeOutput { code: Some(1), stdout: String::new(), stderr: String::from("moov atom not found\n") }));
        let no_ffprobe = CannedProbe(|| Err(ProbeError::NotFound(String::from("ffprobe"))));
        let hung = CannedProbe(|| Err(ProbeError::TimedOut { program: String::from("ffprobe"), timeout: TIMEOUT }));

        assert!(check_video_streams(&video, path, TIMEOUT).is_ok());
        assert_eq!(check_video_streams(&audio_only, path, TIMEOUT), Err(String::from("File does not contain a video stream")));
        assert_eq!(check_video_streams(&broken, path, TIMEOUT), Err(String::from("FFprobe error: moov atom not found")));
        assert_eq!(check_video_streams(&no_ffprobe, path, TIMEOUT), Ok(String::from("Could not verify (ffprobe not found)")));
        assert_eq!(check_video_streams(&hung, path, TIMEOUT), Err(String::from("Video validation timed out")));
    }
}
