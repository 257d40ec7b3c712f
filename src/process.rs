//! Subprocess execution with a hard deadline.
//!
//! Every external invocation in the pipeline (tagger, VCS) goes through
//! [`run_with_timeout`]: argv-style commands, captured output, and a
//! watchdog that kills the child when the deadline passes. No shell ever
//! interpolates user-supplied strings.

use anyhow::{Context, Result};
use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Captured outcome of a finished child process.
#[derive(Debug)]
pub struct CmdOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    /// Combined output for error-text matching.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }
}

/// Outcome of [`run_with_timeout`]: the child either finished or was killed
/// at the deadline.
#[derive(Debug)]
pub enum Waited {
    Finished(CmdOutput),
    TimedOut,
}

impl Waited {
    /// Treat a timeout as an error; convenience for callers that cannot
    /// make progress without the output.
    pub fn finished(self, what: &str) -> Result<CmdOutput> {
        match self {
            Waited::Finished(output) => Ok(output),
            Waited::TimedOut => anyhow::bail!("{what} timed out"),
        }
    }
}

/// Run `cmd` to completion or kill it after `timeout`.
///
/// Stdout and stderr are drained on separate threads so a chatty child can
/// never dead-lock on a full pipe.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<Waited> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawning {:?}", cmd.get_program()))?;

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let stdout_thread = std::thread::spawn(move || drain(&mut stdout_pipe));
    let stderr_thread = std::thread::spawn(move || drain(&mut stderr_pipe));

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait().context("waiting for child process")? {
            Some(status) => break Some(status),
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
            None => std::thread::sleep(Duration::from_millis(25)),
        }
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();

    Ok(match status {
        Some(status) => Waited::Finished(CmdOutput {
            success: status.success(),
            stdout,
            stderr,
        }),
        None => Waited::TimedOut,
    })
}

fn drain(pipe: &mut Option<impl Read>) -> String {
    let mut buf = Vec::new();
    if let Some(pipe) = pipe.as_mut() {
        let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_output_of_a_quick_child() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2"]);
        let waited = run_with_timeout(&mut cmd, Duration::from_secs(10)).unwrap();
        let output = waited.finished("sh").unwrap();
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(output.combined().contains("out"));
        assert!(output.combined().contains("err"));
    }

    #[test]
    fn reports_failure_status() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 3"]);
        let output = run_with_timeout(&mut cmd, Duration::from_secs(10))
            .unwrap()
            .finished("sh")
            .unwrap();
        assert!(!output.success);
    }

    #[test]
    fn kills_a_hung_child() {
        let started = Instant::now();
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let waited = run_with_timeout(&mut cmd, Duration::from_millis(200)).unwrap();
        assert!(matches!(waited, Waited::TimedOut));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
