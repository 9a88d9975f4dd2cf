//! External parser invocation: run the ESIS-producing parser on a document
//! and capture its standard output, with a hard deadline.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use wait_timeout::ChildExt as _;

use crate::error::Error;

/// Parser used when the config does not name one.
pub const DEFAULT_PROGRAM: &str = "onsgmls";

/// Deadline used when the config does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Time the pipe readers get to finish once the parser has exited.
const PIPE_GRACE: Duration = Duration::from_millis(500);

/// Default flags: per-line location output and ID attribute annotation.
pub fn default_args() -> Vec<String> {
    return vec!["-oline".to_string(), "-oid".to_string()];
}

/// Bytes read from one pipe, delivered by its reader thread.
type Captured = Receiver<std::io::Result<Vec<u8>>>;

/// How to run the external parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserTool {
    /// Flags passed before the document path.
    pub args: Vec<String>,
    /// Program name or path.
    pub program: String,
    /// How long to wait before killing the parser.
    pub timeout: Duration,
}

impl Default for ParserTool {
    fn default() -> Self {
        return Self {
            args: default_args(),
            program: DEFAULT_PROGRAM.to_string(),
            timeout: DEFAULT_TIMEOUT,
        };
    }
}

impl ParserTool {
    /// Run the parser on `document` and return its captured standard output.
    ///
    /// A non-zero exit that still produced output is accepted with a warning:
    /// the parser reports validation errors that way, and validation is not
    /// this tool's job.
    ///
    /// # Errors
    ///
    /// Returns `Error::ToolInvocation` if the program is missing, cannot be
    /// spawned, is killed by a signal, or fails without output, and
    /// `Error::ToolTimeout` if it outlives `timeout`, or exits while something
    /// it started still holds its output open past the deadline.
    pub fn run(&self, document: &Path) -> Result<String, Error> {
        let executable = self.locate()?;
        let start = Instant::now();
        let deadline = start.checked_add(self.timeout);

        let mut child = Command::new(&executable)
            .args(&self.args)
            .arg(document)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| return self.invocation_error(format!("spawn failed: {e}")))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // Wait with timeout using OS-level waiting, readers keep the pipes empty.
        let Some(status) = child.wait_timeout(self.timeout)? else {
            kill_and_reap(&mut child);
            // Descendants of the parser may still hold the pipes; the readers
            // are left to finish on their own.
            drop((stdout, stderr));
            warn!(program = %self.program, elapsed = ?start.elapsed(), "parser timed out");
            return Err(self.timeout_error());
        };

        let deadline = deadline
            .and_then(|deadline| return Instant::now().checked_add(PIPE_GRACE).map(|grace| return deadline.max(grace)));
        let (Some(stdout), Some(stderr)) = (collect(stdout, deadline)?, collect(stderr, deadline)?) else {
            warn!(
                program = %self.program,
                elapsed = ?start.elapsed(),
                "parser exited but its output stayed open past the deadline"
            );
            return Err(self.timeout_error());
        };
        let output = String::from_utf8_lossy(&stdout).into_owned();
        let diagnostics = String::from_utf8_lossy(&stderr).trim().to_string();
        debug!(
            program = %self.program,
            elapsed = ?start.elapsed(),
            bytes = output.len(),
            code = ?status.code(),
            "parser finished"
        );

        let Some(code) = status.code() else {
            return Err(self.invocation_error(with_stderr("terminated by signal".to_string(), &diagnostics)));
        };
        if code != 0 {
            if output.trim().is_empty() {
                return Err(self.invocation_error(with_stderr(format!("exit status {code}"), &diagnostics)));
            }
            warn!(program = %self.program, code, "parser reported errors, using its output anyway");
        }

        info!(program = %self.program, document = %document.display(), "parsed document");
        return Ok(output);
    }

    /// Build a `ToolInvocation` error for this program.
    fn invocation_error(&self, reason: String) -> Error {
        return Error::ToolInvocation { program: self.program.clone(), reason };
    }

    /// Build a `ToolTimeout` error for this program.
    fn timeout_error(&self) -> Error {
        return Error::ToolTimeout {
            program: self.program.clone(),
            timeout: self.timeout,
        };
    }

    /// Resolve the program against `PATH` so a missing tool fails before spawning.
    ///
    /// # Errors
    ///
    /// Returns `Error::ToolInvocation` if the program cannot be found.
    fn locate(&self) -> Result<PathBuf, Error> {
        return which::which(&self.program)
            .map_err(|e| return self.invocation_error(format!("not found: {e}")));
    }
}

/// Read a pipe to the end on a background thread.
fn drain<R>(pipe: Option<R>) -> Option<Captured>
where
    R: std::io::Read + Send + 'static,
{
    return pipe.map(|mut reader| {
        let (sender, receiver) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let result = reader.read_to_end(&mut buf).map(|_| return buf);
            let _ = sender.send(result);
        });
        return receiver;
    });
}

/// Collect what a reader thread captured, waiting no later than `deadline`.
/// Returns `None` if the pipe was still open when the deadline passed.
///
/// # Errors
///
/// Returns `Error::Io` if reading the pipe failed.
fn collect(pipe: Option<Captured>, deadline: Option<Instant>) -> Result<Option<Vec<u8>>, Error> {
    let Some(receiver) = pipe else {
        return Ok(Some(Vec::new()));
    };
    let received = match deadline {
        Some(deadline) => receiver.recv_timeout(deadline.saturating_duration_since(Instant::now())),
        None => receiver.recv().map_err(|_| return RecvTimeoutError::Disconnected),
    };
    return match received {
        Ok(result) => Ok(Some(result?)),
        Err(RecvTimeoutError::Timeout) => Ok(None),
        Err(RecvTimeoutError::Disconnected) => {
            Err(Error::Io(std::io::Error::other("pipe reader thread stopped without a result")))
        },
    };
}

/// Kill a child that overran its deadline and reap it.
fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Append captured stderr to a failure reason.
fn with_stderr(reason: String, stderr: &str) -> String {
    if stderr.is_empty() {
        return reason;
    }
    return format!("{reason}: {stderr}");
}
