//! Child process execution with a timeout and bounded output capture.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured output of a finished (or killed) child process.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Bytes discarded beyond the capture limit, stdout and stderr combined.
    pub dropped_bytes: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Last `max_bytes` of stderr followed by stdout, lossily decoded.
    pub fn tail(&self, max_bytes: usize) -> String {
        let mut combined = String::from_utf8_lossy(&self.stderr).into_owned();
        if !self.stdout.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&String::from_utf8_lossy(&self.stdout));
        }
        let trimmed = combined.trim();
        if trimmed.len() <= max_bytes {
            return trimmed.to_string();
        }
        let mut start = trimmed.len() - max_bytes;
        while !trimmed.is_char_boundary(start) {
            start += 1;
        }
        format!("[...]{}", &trimmed[start..])
    }
}

/// Time allowed for the output pipes to close once the child has been reaped.
///
/// A descendant that escaped the process group can hold a pipe open forever;
/// after this grace period the readers are abandoned and the output captured
/// so far is returned.
const PIPE_GRACE: Duration = Duration::from_secs(2);

/// Spawn `cmd`, wait up to `timeout`, and capture stdout/stderr.
///
/// Both pipes are drained on their own threads so a chatty child cannot
/// deadlock. At most `output_limit_bytes` of each stream are kept. On Unix
/// the child leads its own process group, and a child still running at the
/// timeout is killed together with everything it spawned (`npx` launching
/// `node`, `sh -c` launching a pipeline). Failing to spawn is an error; a
/// non-zero exit or a timeout is not.
#[instrument(skip_all, fields(program = ?cmd.get_program(), timeout_secs = timeout.as_secs()))]
pub fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    own_process_group(&mut cmd);

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {:?}", cmd.get_program()));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_reader = StreamReader::spawn(stdout, output_limit_bytes);
    let stderr_reader = StreamReader::spawn(stderr, output_limit_bytes);

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            kill_process_tree(&mut child);
            child.wait().context("wait command after kill")?
        }
    };

    let pipes_deadline = Instant::now() + PIPE_GRACE;
    let stdout = stdout_reader.finish(pipes_deadline, "stdout")?;
    let stderr = stderr_reader.finish(pipes_deadline, "stderr")?;
    let dropped_bytes = stdout.dropped + stderr.dropped;
    if dropped_bytes > 0 {
        warn!(dropped_bytes, "command output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout: stdout.bytes,
        stderr: stderr.bytes,
        dropped_bytes,
        timed_out,
    })
}

/// Substitute `{key}` placeholders in every argument.
pub fn expand_args(template: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (key, value)| {
                acc.replace(&format!("{{{key}}}"), value)
            })
        })
        .collect()
}

#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

/// Kill the child and, on Unix, every process in its group.
fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        match i32::try_from(child.id()) {
            Ok(pgid) => {
                if let Err(errno) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                    debug!(pgid, errno = %errno, "killpg failed");
                }
            }
            Err(_) => warn!(pid = child.id(), "pid out of range for killpg"),
        }
    }
    if let Err(err) = child.kill() {
        debug!(err = %err, "kill after group signal failed");
    }
}

/// Bytes kept from one stream plus the count discarded past the limit.
#[derive(Debug, Default)]
struct Capture {
    bytes: Vec<u8>,
    dropped: usize,
}

/// A pipe drained on a background thread into a shared [`Capture`].
struct StreamReader {
    capture: Arc<Mutex<Capture>>,
    done: mpsc::Receiver<Result<()>>,
}

impl StreamReader {
    fn spawn<R: Read + Send + 'static>(reader: R, limit: usize) -> Self {
        let capture = Arc::new(Mutex::new(Capture::default()));
        let (tx, done) = mpsc::channel();
        let shared = Arc::clone(&capture);
        thread::spawn(move || {
            let _ = tx.send(read_limited(reader, limit, &shared));
        });
        Self { capture, done }
    }

    /// Wait for EOF until `deadline`, then take whatever was captured.
    fn finish(self, deadline: Instant, stream: &'static str) -> Result<Capture> {
        match self
            .done
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
        {
            Ok(result) => result.with_context(|| format!("read {stream}"))?,
            Err(RecvTimeoutError::Timeout) => {
                warn!(stream, "pipe still open after exit, keeping partial output");
            }
            Err(RecvTimeoutError::Disconnected) => bail!("{stream} reader thread panicked"),
        }
        let mut capture = self
            .capture
            .lock()
            .map_err(|_| anyhow!("{stream} capture lock poisoned"))?;
        Ok(std::mem::take(&mut *capture))
    }
}

fn read_limited<R: Read>(mut reader: R, limit: usize, capture: &Mutex<Capture>) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            return Ok(());
        }
        let mut capture = capture
            .lock()
            .map_err(|_| anyhow!("capture lock poisoned"))?;
        let keep = n.min(limit.saturating_sub(capture.bytes.len()));
        capture.bytes.extend_from_slice(&chunk[..keep]);
        capture.dropped += n - keep;
    }
}
