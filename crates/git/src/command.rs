//! Running `git` as a child process under a [`TaskContext`].

use std::ffi::{OsStr, OsString};
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use harvest_core::{CollectError, ParseError, ProgressBuffer, TaskContext};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Handle to the git executable.
#[derive(Debug, Clone)]
pub struct Git {
    program: OsString,
}

impl Default for Git {
    fn default() -> Self {
        Self { program: OsString::from("git") }
    }
}

pub(crate) enum RunError {
    Io(io::Error),
    Cancelled,
    TimedOut(Duration),
}

impl From<io::Error> for RunError {
    fn from(e: io::Error) -> Self {
        RunError::Io(e)
    }
}

impl From<RunError> for CollectError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::Io(e) => CollectError::Io(e),
            RunError::Cancelled => CollectError::Cancelled,
            RunError::TimedOut(after) => CollectError::TimedOut(after),
        }
    }
}

impl From<RunError> for ParseError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::Io(e) => ParseError::Io(e),
            RunError::Cancelled | RunError::TimedOut(_) => ParseError::Cancelled,
        }
    }
}

pub(crate) struct Captured {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Git {
    /// Use a specific git executable instead of `git` from `PATH`.
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self { program: program.into() }
    }

    fn command<I, S>(&self, cwd: Option<&Path>, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run git, copying stdout and stderr into `progress` as they arrive.
    pub(crate) fn run_streaming<I, S>(
        &self,
        cwd: Option<&Path>,
        args: I,
        progress: &ProgressBuffer,
        ctx: &TaskContext,
    ) -> Result<ExitStatus, RunError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        check_context(ctx, Instant::now())?;
        let mut cmd = self.command(cwd, args);
        debug!(command = ?cmd, "spawning git");
        let mut child = cmd.spawn()?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        thread::scope(|s| {
            if let Some(out) = stdout {
                s.spawn(move || pump(out, |chunk| progress.write_bytes(chunk)));
            }
            if let Some(err) = stderr {
                s.spawn(move || pump(err, |chunk| progress.write_bytes(chunk)));
            }
            wait_with_context(&mut child, ctx)
        })
    }

    /// Run git and collect its output.
    pub(crate) fn run_captured<I, S>(
        &self,
        cwd: Option<&Path>,
        args: I,
        ctx: &TaskContext,
    ) -> Result<Captured, RunError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        check_context(ctx, Instant::now())?;
        let mut child = self.command(cwd, args).spawn()?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        thread::scope(|s| {
            let out = s.spawn(move || read_all(stdout));
            let err = s.spawn(move || read_all(stderr));
            let status = wait_with_context(&mut child, ctx)?;
            Ok(Captured {
                status,
                stdout: out.join().unwrap_or_default(),
                stderr: err.join().unwrap_or_default(),
            })
        })
    }
}

fn check_context(ctx: &TaskContext, started: Instant) -> Result<(), RunError> {
    if ctx.is_cancelled() {
        return Err(RunError::Cancelled);
    }
    if ctx.deadline_passed() {
        return Err(RunError::TimedOut(started.elapsed()));
    }
    Ok(())
}

/// Poll the child until it exits, killing it once the context expires.
fn wait_with_context(child: &mut Child, ctx: &TaskContext) -> Result<ExitStatus, RunError> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if let Err(e) = check_context(ctx, started) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn pump<R: Read>(mut reader: R, mut sink: impl FnMut(&[u8])) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => sink(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

fn read_all<R: Read>(reader: Option<R>) -> Vec<u8> {
    let mut out = Vec::new();
    if let Some(r) = reader {
        pump(r, |chunk| out.extend_from_slice(chunk));
    }
    out
}
