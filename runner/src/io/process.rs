//! Child-process execution raced against a deadline, with bounded output.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
///
/// When `timed_out` is set the child was killed and reaped, and whatever it
/// printed is discarded: `stdout` and `stderr` are empty.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    fn timed_out(status: ExitStatus) -> Self {
        Self {
            status,
            stdout: Vec::new(),
            stderr: Vec::new(),
            stdout_truncated: 0,
            stderr_truncated: 0,
            timed_out: true,
        }
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

type StreamResult = Result<(Vec<u8>, usize)>;

/// Run a command, feeding `stdin`, until it exits or `timeout` elapses.
///
/// The deadline covers the whole call: waiting for the child and draining its
/// pipes. A background process the child leaves behind keeps the pipes open,
/// so output that has not arrived by the deadline counts as a timeout too.
///
/// On unix the child leads its own process group, and on timeout the whole
/// group is killed so no descendant keeps running. The direct child is reaped
/// before returning; reader threads are detached so late output cannot leak
/// into the result. `output_limit_bytes` bounds what is kept of each stream.
#[instrument(skip_all, fields(timeout_ms = timeout.as_millis() as u64, output_limit_bytes))]
pub fn run_with_deadline(
    mut cmd: Command,
    stdin: Option<Vec<u8>>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let deadline = Instant::now() + timeout;
    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
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
    let stdout_rx = spawn_reader(stdout, output_limit_bytes);
    let stderr_rx = spawn_reader(stderr, output_limit_bytes);

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        // Written off-thread so a child that never reads stdin is still bounded by the deadline.
        thread::spawn(move || {
            if let Err(e) = child_stdin.write_all(&input) {
                warn!(err = %e, "failed to write child stdin");
            }
        });
    }

    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_ms = timeout.as_millis() as u64, "command timed out, killing");
            let status = kill_and_reap(&mut child)?;
            return Ok(CommandOutput::timed_out(status));
        }
    };

    let Some((stdout, stdout_truncated)) = recv_before(&stdout_rx, deadline).context("read stdout")?
    else {
        warn!("command exited but a descendant held stdout open past the deadline, killing");
        kill_process_group(child.id());
        return Ok(CommandOutput::timed_out(status));
    };
    let Some((stderr, stderr_truncated)) = recv_before(&stderr_rx, deadline).context("read stderr")?
    else {
        warn!("command exited but a descendant held stderr open past the deadline, killing");
        kill_process_group(child.id());
        return Ok(CommandOutput::timed_out(status));
    };

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out: false,
    })
}

fn spawn_reader<R: Read + Send + 'static>(reader: R, limit: usize) -> Receiver<StreamResult> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone once the deadline passed; nothing left to report to.
        let _ = tx.send(read_stream_limited(reader, limit));
    });
    rx
}

/// Wait for a reader's result until `deadline`. `None` means it is still open.
fn recv_before(rx: &Receiver<StreamResult>, deadline: Instant) -> Result<Option<(Vec<u8>, usize)>> {
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(result) => result.map(Some),
        Err(RecvTimeoutError::Timeout) => Ok(None),
        Err(RecvTimeoutError::Disconnected) => Err(anyhow!("output reader thread panicked")),
    }
}

fn kill_and_reap(child: &mut Child) -> Result<ExitStatus> {
    kill_process_group(child.id());
    if let Err(e) = child.kill() {
        debug!(err = %e, "direct kill failed, child already gone");
    }
    child.wait().context("wait command after kill")
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let result = Command::new("kill")
        .arg("-KILL")
        .arg("--")
        .arg(format!("-{pid}"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match result {
        Ok(status) if status.success() => debug!(pgid = pid, "killed process group"),
        Ok(status) => debug!(pgid = pid, exit_code = ?status.code(), "process group already gone"),
        Err(e) => warn!(pgid = pid, err = %e, "failed to run kill for process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> StreamResult {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
