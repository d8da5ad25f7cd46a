//! Subprocess contract for external collaborators (renderer, reconstruction,
//! translation).
//!
//! A command runs to completion, to its deadline, or until cancelled. Output is
//! captured on reader threads so a chatty child never blocks on a full pipe.

use rayon::prelude::*;
use std::fmt;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::constants::external::{OUTPUT_DRAIN_GRACE, POLL_INTERVAL};
use crate::errors::PipelineError;

/// Program, arguments, and environment of one external invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        command
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Captured outcome of a successful invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalResult {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Cooperative cancellation flag shared between a caller and running commands.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A command paired with its deadline, for [`run_external_batch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalJob {
    pub command: ExternalCommand,
    pub timeout: Duration,
}

/// Run `command` to completion or until `timeout` elapses.
pub fn run_external(
    command: &ExternalCommand,
    timeout: Duration,
) -> Result<ExternalResult, PipelineError> {
    run_external_with_cancel(command, timeout, &CancelToken::new())
}

/// [`run_external`] that also stops when `cancel` fires.
///
/// The child runs in its own process group. On deadline or cancellation the
/// whole group is killed and `Timeout` carries the output captured so far.
/// A non-zero exit yields `ExternalProcess`.
pub fn run_external_with_cancel(
    command: &ExternalCommand,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<ExternalResult, PipelineError> {
    let shown = command.to_string();
    let started = Instant::now();
    let mut child = command.to_command().spawn().map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => PipelineError::NotFound {
            path: command.program.clone(),
        },
        _ => PipelineError::Io(err),
    })?;
    debug!(command = %shown, pid = child.id(), "spawned external command");

    let stdout = OutputCapture::spawn(child.stdout.take());
    let stderr = OutputCapture::spawn(child.stderr.take());

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {}
            Err(err) => {
                terminate(&mut child);
                return Err(PipelineError::Io(err));
            }
        }
        let elapsed = started.elapsed();
        if cancel.is_cancelled() || elapsed >= timeout {
            break None;
        }
        thread::sleep(POLL_INTERVAL.min(timeout - elapsed));
    };

    let Some(status) = status else {
        terminate(&mut child);
        let elapsed = started.elapsed();
        let stdout = stdout.into_string(OUTPUT_DRAIN_GRACE);
        let stderr = stderr.into_string(OUTPUT_DRAIN_GRACE);
        warn!(
            command = %shown,
            elapsed_secs = elapsed.as_secs_f64(),
            cancelled = cancel.is_cancelled(),
            "external command stopped before completion"
        );
        return Err(PipelineError::Timeout {
            command: shown,
            elapsed,
            stdout,
            stderr,
        });
    };

    // Descendants may still hold the pipes; they get until the deadline.
    let drain = timeout.saturating_sub(started.elapsed()).max(OUTPUT_DRAIN_GRACE);
    let draining = Instant::now();
    let drained = stdout.finished_within(drain)
        && stderr.finished_within(drain.saturating_sub(draining.elapsed()));
    if !drained {
        warn!(command = %shown, "descendants kept output open past the deadline; killed");
        kill_process_group(child.id());
    }
    let elapsed = started.elapsed();
    let stdout = stdout.into_string(OUTPUT_DRAIN_GRACE);
    let stderr = stderr.into_string(OUTPUT_DRAIN_GRACE);
    match status.code() {
        Some(0) => {
            info!(
                command = %shown,
                elapsed_secs = elapsed.as_secs_f64(),
                "external command finished"
            );
            Ok(ExternalResult {
                code: 0,
                stdout,
                stderr,
                elapsed,
            })
        }
        _ => Err(PipelineError::ExternalProcess {
            command: shown,
            status: status.to_string(),
            stdout,
            stderr,
        }),
    }
}

/// Run independent jobs on a bounded pool of `workers` threads.
///
/// Results keep the order of `jobs`. One failing job does not stop the others.
pub fn run_external_batch(
    jobs: &[ExternalJob],
    workers: usize,
) -> Result<Vec<Result<ExternalResult, PipelineError>>, PipelineError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|err| PipelineError::Config(format!("failed to build worker pool: {err}")))?;
    Ok(pool.install(|| {
        jobs.par_iter()
            .map(|job| run_external(&job.command, job.timeout))
            .collect()
    }))
}

/// Pipe contents accumulated by a reader thread.
///
/// The reader signals EOF over a channel, so callers can stop waiting at a
/// deadline and keep whatever arrived.
struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    eof: Receiver<()>,
}

impl OutputCapture {
    fn spawn<R: Read + Send + 'static>(pipe: Option<R>) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (done, eof) = mpsc::channel();
        match pipe {
            Some(mut pipe) => {
                let sink = Arc::clone(&buffer);
                thread::spawn(move || {
                    let mut chunk = [0u8; 8192];
                    loop {
                        match pipe.read(&mut chunk) {
                            Ok(0) | Err(_) => break,
                            Ok(read) => lock(&sink).extend_from_slice(&chunk[..read]),
                        }
                    }
                    // The receiver may already be gone after a deadline.
                    done.send(()).ok();
                });
            }
            None => drop(done),
        }
        Self { buffer, eof }
    }

    /// Wait up to `wait` for EOF; true once the pipe is closed.
    fn finished_within(&self, wait: Duration) -> bool {
        match self.eof.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Everything read so far, after at most `grace` more for EOF.
    fn into_string(self, grace: Duration) -> String {
        self.finished_within(grace);
        String::from_utf8_lossy(&lock(&self.buffer)).into_owned()
    }
}

fn lock(buffer: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}

fn terminate(child: &mut Child) {
    kill_process_group(child.id());
    if let Err(err) = child.kill() {
        debug!(pid = child.id(), error = %err, "kill failed; child may have exited");
    }
    if let Err(err) = child.wait() {
        debug!(pid = child.id(), error = %err, "wait after kill failed");
    }
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    let result = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if result != 0 {
        debug!(pid, error = %io::Error::last_os_error(), "process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}
