use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ProbeError;
use crate::ffmpeg::Program;
use crate::ffmpeg::runner::TranscodeRunner;

#[derive(Deserialize, Debug, Default)]
struct FFProbeJsonOutput {
    #[serde(default)]
    pub streams: Vec<FFProbeJsonStream>,
    pub format: Option<FFProbeJsonFormat>,
}

#[derive(Deserialize, Debug)]
struct FFProbeJsonStream {
    pub codec_type: Option<String>,
}

#[derive(Deserialize, Debug)]
struct FFProbeJsonFormat {
    pub duration: Option<String>,
}

/// What a stream probe concluded.
#[derive(Debug, PartialEq)]
pub enum StreamCheck {
    HasVideo,
    NoVideo,
    /// ffprobe ran but failed; carries its stderr.
    Failed(String),
    /// ffprobe output could not be understood.
    Unparseable(String),
}

fn args(list: &[&str], path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = list.iter().map(OsString::from).collect();
    args.push(path.as_os_str().to_owned());
    args
}

/// Container duration in seconds; `None` when ffprobe does not report a
/// positive one.
pub fn probe_duration(runner: &dyn TranscodeRunner, path: &Path, timeout: Duration) -> Result<Option<f64>, ProbeError> {
    let output = runner.probe(
        Program::FFprobe,
        &args(&["-v", "error", "-show_entries", "format=duration", "-of", "json"], path),
        timeout)?;
    if !output.success() {
        return Ok(None);
    }
    Ok(parse_duration(&output.stdout))
}

fn parse_duration(json: &str) -> Option<f64> {
    let deserialized = serde_json::from_str::<FFProbeJsonOutput>(json).ok()?;
    let duration: f64 = deserialized.format?.duration?.parse().ok()?;
    if duration.is_finite() && duration > 0.0 { Some(duration) } else { None }
}

pub fn probe_streams(runner: &dyn TranscodeRunner, path: &Path, timeout: Duration) -> Result<StreamCheck, ProbeError> {
    let output = runner.probe(
        Program::FFprobe,
        &args(&["-v", "error", "-select_streams", "v:0", "-show_entries", "stream=codec_type", "-of", "json"], path),
        timeout)?;
    if !output.success() {
        return Ok(StreamCheck::Failed(output.stderr.trim().to_string()));
    }
    Ok(parse_streams(&output.stdout))
}

fn parse_streams(json: &str) -> StreamCheck {
    match serde_json::from_str::<FFProbeJsonOutput>(json) {
        Ok(deserialized) => {
            let has_video = deserialized.streams
                .iter()
                .any(|s| s.codec_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("video")));
            if has_video { StreamCheck::HasVideo } else { StreamCheck::NoVideo }
        },
        Err(err) => StreamCheck::Unparseable(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration(r#"{"format": {"duration": "12.500000"}}"#), Some(12.5));
        assert_eq!(parse_duration(r#"{"format": {"duration": "0.000000"}}"#), None);
        assert_eq!(parse_duration(r#"{"format": {"duration": "N/A"}}"#), None);
        assert_eq!(parse_duration(r#"{"format": {}}"#), None);
        assert_eq!(parse_duration(r#"{}"#), None);
        assert_eq!(parse_duration("not json"), None);
    }

    #[test]
    fn test_parse_streams() {
        assert_eq!(parse_streams(r#"{"programs": [], "streams": [{"codec_type": "video"}]}"#), StreamCheck::HasVideo);
        assert_eq!(parse_streams(r#"{"programs": [], "streams": []}"#), StreamCheck::NoVideo);
        assert_eq!(parse_streams(r#"{"streams": [{"codec_type": "audio"}]}"#), StreamCheck::NoVideo);
        assert!(matches!(parse_streams("garbage"), StreamCheck::Unparseable(_)));
    }
}
