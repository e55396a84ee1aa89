use std::ffi::OsString;
use std::fmt::Display;
use std::path::Path;

use crate::codecs::Codec;
use crate::containers::{self, Container};
use crate::quality::Quality;

pub mod runner;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Program {
    FFmpeg,
    FFprobe,
}

impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Program::FFmpeg => write!(f, "ffmpeg"),
            Program::FFprobe => write!(f, "ffprobe"),
        }
    }
}

/// Arguments for one transcode. With `structured_progress` ffmpeg writes
/// key=value progress to stdout for a tracker to parse; without it, plain
/// stats lines are emitted on a fixed cadence.
pub fn transcode_args(input: &Path, output: &Path, quality: Quality, structured_progress: bool) -> Vec<OsString> {
    fn os(s: &str) -> OsString { OsString::from(s) }

    let mut args = vec![
        os("-hide_banner"),
        os("-nostdin"),
        os("-y"),
        os("-i"), input.as_os_str().to_owned(),
    ];

    let mut encoding: Vec<String> = Codec::parameters(&Codec::H264);
    encoding.append(&mut quality.args());
    encoding.append(&mut Codec::parameters(&Codec::AAC));

    // explicitly set container format, regardless of destination extension
    encoding.append(&mut Container::parameters(containers::TARGET));
    args.extend(encoding.iter().map(|s| os(s)));

    if structured_progress {
        args.extend([os("-loglevel"), os("warning"), os("-nostats"), os("-progress"), os("pipe:1")]);
    } else {
        args.extend([os("-stats"), os("-stats_period"), os("0.5")]);
    }

    args.push(output.as_os_str().to_owned());
    args
}

pub fn display_args(args: &[OsString]) -> String {
    args.iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>().join(" ")
}
