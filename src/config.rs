use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

pub const FFMPEG_ENV: &str = "CONVERT_MOV_FFMPEG";
pub const FFPROBE_ENV: &str = "CONVERT_MOV_FFPROBE";
pub const PROBE_TIMEOUT_ENV: &str = "CONVERT_MOV_PROBE_TIMEOUT";

pub const TOOL_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
pub const MEDIA_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Process-wide settings resolved once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub tool_check_timeout: Duration,
    pub probe_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            tool_check_timeout: TOOL_CHECK_TIMEOUT,
            probe_timeout: MEDIA_PROBE_TIMEOUT,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Config::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config {
            ffmpeg: tool_path("ffmpeg", lookup(FFMPEG_ENV)),
            ffprobe: tool_path("ffprobe", lookup(FFPROBE_ENV)),
            ..Config::default()
        };

        if let Some(raw) = lookup(PROBE_TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => {
                    config.tool_check_timeout = Duration::from_secs(secs);
                    config.probe_timeout = Duration::from_secs(secs);
                },
                _ => warn!("ignoring {}={:?}: expected a positive number of seconds", PROBE_TIMEOUT_ENV, raw),
            }
        }

        config
    }
}

/// Explicit path from the environment if it exists, then `PATH`, then the
/// bare name so the spawn error reports the tool as missing.
fn tool_path(name: &str, configured: Option<String>) -> PathBuf {
    if let Some(path) = configured.map(PathBuf::from) {
        if path.is_file() {
            return path;
        }
        warn!("{} does not exist; falling back to PATH lookup for {}", path.display(), name);
    }

    which::which(name).unwrap_or_else(|_| PathBuf::from(name))
}
