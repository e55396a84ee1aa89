use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, ProbeError, Result};
use super::{display_args, Program};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured output of a short-lived probe invocation.
#[derive(Clone, Debug, Default)]
pub struct ProbeOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProbeOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Seam between the conversion logic and the external tools.
pub trait TranscodeRunner: Send + Sync {
    /// Run `program` to completion, killing it once `timeout` elapses.
    fn probe(&self, program: Program, args: &[OsString], timeout: Duration) -> std::result::Result<ProbeOutput, ProbeError>;

    /// Run the transcoder, handing each line of its combined stdout/stderr to
    /// `on_line`. Returns the exit code, or `Error::Interrupted` if `stop` was
    /// raised while it ran.
    fn transcode(&self, args: &[OsString], on_line: &mut dyn FnMut(&str), stop: &AtomicBool) -> Result<Option<i32>>;
}

pub struct SystemRunner {
    config: Config,
}

impl SystemRunner {
    pub fn new(config: Config) -> Self {
        SystemRunner { config }
    }

    fn command(&self, program: Program) -> Command {
        let path = match program {
            Program::FFmpeg => &self.config.ffmpeg,
            Program::FFprobe => &self.config.ffprobe,
        };
        let mut cmd = Command::new(path);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl TranscodeRunner for SystemRunner {
    fn probe(&self, program: Program, args: &[OsString], timeout: Duration) -> std::result::Result<ProbeOutput, ProbeError> {
        let name = program.to_string();
        debug!("{} {}", name, display_args(args));
        let mut child = self.command(program)
            .args(args)
            .spawn()
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => ProbeError::NotFound(name.clone()),
                _ => ProbeError::Io { program: name.clone(), source: err },
            })?;

        let stdout = read_to_string(child.stdout.take());
        let stderr = read_to_string(child.stderr.take());

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= timeout => {
                    kill(&mut child);
                    return Err(ProbeError::TimedOut { program: name, timeout });
                },
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => {
                    kill(&mut child);
                    return Err(ProbeError::Io { program: name, source: err });
                },
            }
        };

        Ok(ProbeOutput {
            code: status.code(),
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }

    fn transcode(&self, args: &[OsString], on_line: &mut dyn FnMut(&str), stop: &AtomicBool) -> Result<Option<i32>> {
        debug!("ffmpeg {}", display_args(args));
        let mut child = self.command(Program::FFmpeg).args(args).spawn()?;

        let (tx, rx) = mpsc::channel();
        let readers = [
            forward_lines(child.stdout.take(), tx.clone()),
            forward_lines(child.stderr.take(), tx),
        ];

        loop {
            if stop.load(Ordering::SeqCst) {
                warn!("Caught stop signal; killing ffmpeg ({})", child.id());
                kill(&mut child);
                return Err(Error::interrupted());
            }
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => on_line(&line),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = child.wait()?;
        for reader in readers {
            let _ = reader.join();
        }

        // ffmpeg receives the same SIGINT we do and exits on its own
        if stop.load(Ordering::SeqCst) {
            return Err(Error::interrupted());
        }

        Ok(status.code())
    }
}

fn kill(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!("error killing process ({}) {err:?}", child.id());
    }
    let _ = child.wait();
}

fn read_to_string<R: Read + Send + 'static>(stream: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut s) = stream {
            let _ = s.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Stats lines are terminated by '\r', progress lines by '\n'; split on both.
fn forward_lines<R: Read + Send + 'static>(stream: Option<R>, tx: Sender<String>) -> JoinHandle<()> {
    thread::spawn(move || {
        let Some(s) = stream else { return };
        for chunk in BufReader::new(s).split(b'\n').map_while(io::Result::ok) {
            for part in chunk.split(|b| *b == b'\r').filter(|p| !p.is_empty()) {
                if tx.send(String::from_utf8_lossy(part).into_owned()).is_err() {
                    return;
                }
            }
        }
    })
}
