use crate::error::{BenchError, Result};
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// stdout followed by stderr, the way a terminal would interleave them
    /// when nothing is written concurrently.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        text.push_str(&self.stderr);
        text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

fn spawn_reader<R>(mut source: R, stream: Stream, echo: bool, done: Sender<(Stream, String)>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut captured = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            };
            captured.extend_from_slice(&buf[..n]);
            let _ = match (echo, stream) {
                (true, Stream::Stdout) => io::stdout().write_all(&buf[..n]),
                (true, Stream::Stderr) => io::stderr().write_all(&buf[..n]),
                (false, _) => Ok(()),
            };
        }
        let _ = done.send((stream, String::from_utf8_lossy(&captured).into_owned()));
    });
}

fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!(error = %e, "failed to kill child process");
    }
    let _ = child.wait();
}

/// Runs `cmd` to completion, capturing both streams and optionally echoing
/// them live. The deadline covers the child and anything it leaves holding
/// its stdout or stderr open. If `timeout` elapses first the child is killed
/// and `BenchError::Timeout` is returned; output read so far is dropped.
pub fn run_with_deadline(
    mut cmd: Command,
    label: &str,
    timeout: Duration,
    echo: bool,
) -> Result<CapturedOutput> {
    let program = cmd.get_program().to_string_lossy().to_string();
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    let mut child = cmd
        .spawn()
        .map_err(|source| BenchError::Spawn { program, source })?;

    let (done, finished) = mpsc::channel();
    let mut pending = 0;
    if let Some(out) = child.stdout.take() {
        spawn_reader(out, Stream::Stdout, echo, done.clone());
        pending += 1;
    }
    if let Some(err) = child.stderr.take() {
        spawn_reader(err, Stream::Stderr, echo, done.clone());
        pending += 1;
    }
    drop(done);

    let timed_out = || BenchError::Timeout {
        task_id: label.to_string(),
        limit: timeout,
    };
    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                kill_and_reap(&mut child);
                return Err(e.into());
            }
        }
        if Instant::now() >= deadline {
            kill_and_reap(&mut child);
            // Readers are detached: a grandchild may still hold the pipes.
            return Err(timed_out());
        }
        thread::sleep(POLL_INTERVAL);
    };

    let mut stdout = String::new();
    let mut stderr = String::new();
    while pending > 0 {
        match finished.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok((Stream::Stdout, text)) => stdout = text,
            Ok((Stream::Stderr, text)) => stderr = text,
            Err(RecvTimeoutError::Timeout) => {
                warn!(task_id = label, "output pipes still open after exit");
                return Err(timed_out());
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
        pending -= 1;
    }

    Ok(CapturedOutput {
        status,
        stdout,
        stderr,
    })
}
