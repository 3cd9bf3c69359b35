//! External command execution with timeout and output caps.
//!
//! Both the snapshot converter and the bulk loader are long-running external
//! programs. Each run gets:
//!
//! - A hard timeout with SIGTERM → SIGKILL escalation
//! - Output size caps so a chatty tool cannot exhaust memory
//! - Captured stdout/stderr that callers append to the per-date log
//!
//! A non-zero exit is not an error at this layer; callers decide what an exit
//! status means.

use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::logging::event_names;

/// Default maximum captured bytes per stream (10MB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Grace period between SIGTERM and SIGKILL in milliseconds.
const SIGTERM_GRACE_MS: u64 = 500;

const CHUNK_SIZE: usize = 8192;

/// Errors that prevent a command from running to completion.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What to run.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub max_output: usize,
}

impl ToolSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            timeout,
            max_output: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn with_max_output(mut self, max_output: usize) -> Self {
        self.max_output = max_output;
        self
    }

    /// Shell-like rendering for logs. Arguments containing whitespace are
    /// quoted.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) {
                    format!("\"{}\"", part.replace('"', "\\\""))
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    pub command_line: String,
    #[serde(skip)]
    pub stdout: Vec<u8>,
    #[serde(skip)]
    pub stderr: Vec<u8>,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub truncated: bool,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl ToolOutput {
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Exit code 0 within the timeout.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Human-readable status for error messages.
    pub fn status_text(&self) -> String {
        if self.timed_out {
            format!("timed out after {}ms", self.duration_ms)
        } else {
            match self.exit_code {
                Some(code) => format!("exit status {}", code),
                None => "killed by signal".to_string(),
            }
        }
    }

    /// Append the command line, captured output and exit status to `path`.
    pub fn append_to_log(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut log = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(log, "$ {}", self.command_line)?;
        log.write_all(&self.stdout)?;
        log.write_all(&self.stderr)?;
        if self.truncated {
            writeln!(log, "[output truncated]")?;
        }
        writeln!(log, "[{}]", self.status_text())?;
        Ok(())
    }
}

/// Substitute `{name}` placeholders in `template` from `vars`.
///
/// Follows the same recognition rules as [`sdb_config::placeholders`]:
/// `${NAME}` and non-identifier braces pass through untouched, as do
/// identifiers without a binding.
pub fn expand_placeholders(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            break;
        };
        let name = &after[..close];
        let binding = if rest[..open].ends_with('$') {
            None
        } else {
            vars.iter().find(|(key, _)| *key == name).map(|(_, value)| *value)
        };

        out.push_str(&rest[..open]);
        match binding {
            Some(value) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Run `spec` to completion or timeout.
pub fn run(spec: &ToolSpec) -> Result<ToolOutput, ToolError> {
    let command_line = spec.command_line();
    info!(
        target: event_names::TOOL_STARTED,
        command = %command_line,
        timeout_ms = spec.timeout.as_millis() as u64,
        "Running external command"
    );

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &spec.working_dir {
        command.current_dir(dir);
    }

    let start = Instant::now();
    let mut child = command.spawn().map_err(|source| {
        error!(command = %command_line, error = %source, "Failed to spawn");
        ToolError::SpawnFailed {
            program: spec.program.clone(),
            source,
        }
    })?;

    let captured = execute_with_timeout(&mut child, spec.timeout, spec.max_output)?;
    let duration_ms = start.elapsed().as_millis() as u64;

    let output = ToolOutput {
        command_line,
        stdout: captured.stdout,
        stderr: captured.stderr,
        exit_code: captured.exit_code,
        truncated: captured.truncated,
        timed_out: captured.timed_out,
        duration_ms,
    };

    info!(
        target: event_names::TOOL_FINISHED,
        command = %output.command_line,
        exit_code = ?output.exit_code,
        timed_out = output.timed_out,
        duration_ms,
        "External command finished"
    );
    Ok(output)
}

struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<i32>,
    truncated: bool,
    timed_out: bool,
}

fn push_capped(buf: &mut Vec<u8>, data: &[u8], max: usize, truncated: &mut bool) {
    let space = max.saturating_sub(buf.len());
    if data.len() > space {
        *truncated = true;
    }
    buf.extend_from_slice(&data[..data.len().min(space)]);
}

fn execute_with_timeout(
    child: &mut Child,
    timeout: Duration,
    max_output: usize,
) -> Result<Captured, ToolError> {
    let deadline = Instant::now() + timeout;
    let mut stdout_buf = Vec::with_capacity(max_output.min(65536));
    let mut stderr_buf = Vec::with_capacity(max_output.min(65536));
    let mut truncated = false;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        if Instant::now() >= deadline {
            warn!("Command timed out, sending SIGTERM");
            kill_with_grace(child);
            let exit_code = child.wait().ok().and_then(|s| s.code());
            return Ok(Captured {
                stdout: stdout_buf,
                stderr: stderr_buf,
                exit_code,
                truncated,
                timed_out: true,
            });
        }

        let mut did_read = false;
        if let Some(out) = stdout.as_mut() {
            if let Ok(n) = try_read_nonblocking(out, &mut chunk) {
                if n > 0 {
                    did_read = true;
                    push_capped(&mut stdout_buf, &chunk[..n], max_output, &mut truncated);
                }
            }
        }
        if let Some(err) = stderr.as_mut() {
            if let Ok(n) = try_read_nonblocking(err, &mut chunk) {
                if n > 0 {
                    did_read = true;
                    push_capped(&mut stderr_buf, &chunk[..n], max_output, &mut truncated);
                }
            }
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                if let Some(out) = stdout.as_mut() {
                    drain(out, &mut stdout_buf, max_output, &mut truncated);
                }
                if let Some(err) = stderr.as_mut() {
                    drain(err, &mut stderr_buf, max_output, &mut truncated);
                }
                trace!(exit_code = ?status.code(), "Process exited");
                return Ok(Captured {
                    stdout: stdout_buf,
                    stderr: stderr_buf,
                    exit_code: status.code(),
                    truncated,
                    timed_out: false,
                });
            }
            Ok(None) => {
                if !did_read {
                    thread::sleep(Duration::from_millis(10));
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to wait for child");
                return Err(ToolError::Io(e));
            }
        }
    }
}

/// Collect whatever is immediately readable after exit. Non-blocking so a
/// grandchild still holding the pipe cannot hang us.
fn drain<R: Read + ReadFd>(stream: &mut R, buf: &mut Vec<u8>, max: usize, truncated: &mut bool) {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    while !*truncated {
        match try_read_nonblocking(stream, &mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => push_capped(buf, &chunk[..n], max, truncated),
        }
    }
}

/// Kill a process with SIGTERM, then SIGKILL after grace period.
#[cfg(unix)]
fn kill_with_grace(child: &mut Child) {
    let pid = child.id() as i32;

    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    debug!(pid, "Sent SIGTERM");

    thread::sleep(Duration::from_millis(SIGTERM_GRACE_MS));

    match child.try_wait() {
        Ok(Some(_)) => trace!(pid, "Process exited after SIGTERM"),
        Ok(None) => {
            warn!(pid, "Process did not exit after SIGTERM, sending SIGKILL");
            unsafe {
                libc::kill(pid, libc::SIGKILL);
            }
        }
        Err(e) => error!(pid, error = %e, "Failed to check process status"),
    }
}

#[cfg(not(unix))]
fn kill_with_grace(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(unix)]
trait ReadFd: std::os::unix::io::AsRawFd {}
#[cfg(unix)]
impl<T: std::os::unix::io::AsRawFd> ReadFd for T {}

#[cfg(not(unix))]
trait ReadFd {}
#[cfg(not(unix))]
impl<T> ReadFd for T {}

/// Read without blocking. Returns `Ok(0)` when nothing is available.
#[cfg(unix)]
fn try_read_nonblocking<R: Read + ReadFd>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    use std::os::unix::io::AsRawFd;
    let fd = stream.as_raw_fd();

    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }

    let was_nonblocking = (flags & libc::O_NONBLOCK) != 0;
    if !was_nonblocking {
        let result = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if result < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    let result = stream.read(buf);

    if !was_nonblocking {
        unsafe {
            libc::fcntl(fd, libc::F_SETFL, flags);
        }
    }

    match result {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn try_read_nonblocking<R: Read + ReadFd>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    stream.read(buf)
}
