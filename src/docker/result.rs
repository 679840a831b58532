// Results of container CLI invocations

use crate::report::DefinitionList;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

/// How long to wait for output readers after a background container stops
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a completed (or failed to start) CLI invocation
#[derive(Debug)]
pub struct RunResult {
    pub executed_command: String,
    /// Present only once the process has exited with a code
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Set when the process could not be started or waited on
    pub error: Option<io::Error>,
}

impl RunResult {
    pub fn failed_to_start(executed_command: impl Into<String>, error: io::Error) -> Self {
        Self {
            executed_command: executed_command.into(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(error),
        }
    }

    pub fn has_exited(&self) -> bool {
        self.exit_code.is_some()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.exit_code == Some(0)
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }

    /// Render the debug report for this result, followed by `extra` definitions
    pub fn debug_info(&self, extra: &[(&str, String)]) -> String {
        let mut list = DefinitionList::new();
        list.add("Executed command", self.executed_command.as_str());
        if let Some(code) = self.exit_code {
            list.add("Exit code", code.to_string());
        }
        list.add("StdOut", self.stdout.as_str());
        list.add("StdErr", self.stderr.as_str());
        list.add("Error", self.error_message().unwrap_or_default());
        for (term, definition) in extra {
            list.add(*term, definition.as_str());
        }
        list.to_report()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Exited; the code is absent when the process was killed by a signal
    Exited(Option<i32>),
}

/// Handle to a process started in the background
pub trait ProcessHandle: Send {
    fn state(&mut self) -> ProcessState;
}

impl ProcessHandle for tokio::process::Child {
    fn state(&mut self) -> ProcessState {
        match self.try_wait() {
            Ok(Some(status)) => ProcessState::Exited(status.code()),
            Ok(None) => ProcessState::Running,
            Err(e) => {
                // A process we can no longer observe is treated as gone
                tracing::warn!(error = %e, "failed to poll background process");
                ProcessState::Exited(None)
            }
        }
    }
}

/// Stdout/stderr of a background process, collected while it runs
#[derive(Debug, Default)]
pub struct CapturedOutput {
    stdout: Arc<Mutex<String>>,
    stderr: Arc<Mutex<String>>,
    readers: Vec<JoinHandle<()>>,
}

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start collecting lines from `reader` into the stdout buffer
    pub fn capture_stdout<R>(&mut self, reader: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let handle = spawn_reader(reader, self.stdout.clone());
        self.readers.push(handle);
    }

    /// Start collecting lines from `reader` into the stderr buffer
    pub fn capture_stderr<R>(&mut self, reader: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let handle = spawn_reader(reader, self.stderr.clone());
        self.readers.push(handle);
    }

    pub fn push_stdout(&self, text: &str) {
        append(&self.stdout, text);
    }

    pub fn push_stderr(&self, text: &str) {
        append(&self.stderr, text);
    }

    /// Output collected so far
    pub fn snapshot(&self) -> (String, String) {
        (read(&self.stdout), read(&self.stderr))
    }

    /// Wait for readers to reach end of stream, then return everything collected
    async fn drain(mut self) -> (String, String) {
        for mut handle in self.readers.drain(..) {
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut handle).await.is_err() {
                tracing::debug!("output reader did not finish, aborting");
                handle.abort();
            }
        }
        self.snapshot()
    }
}

fn spawn_reader<R>(reader: R, buffer: Arc<Mutex<String>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    append(&buffer, &line);
                    append(&buffer, "\n");
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "output stream closed with error");
                    break;
                }
            }
        }
    })
}

fn append(buffer: &Mutex<String>, text: &str) {
    buffer
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push_str(text);
}

fn read(buffer: &Mutex<String>) -> String {
    buffer
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

/// A container started without waiting for it to exit.
///
/// The process handle is only valid until the container is stopped;
/// [`BackgroundRun::into_result`] drops it and keeps the captured output.
pub struct BackgroundRun {
    container_name: String,
    executed_command: String,
    error: Option<io::Error>,
    process: Option<Box<dyn ProcessHandle>>,
    output: CapturedOutput,
}

impl BackgroundRun {
    pub fn started(
        container_name: impl Into<String>,
        executed_command: impl Into<String>,
        process: Box<dyn ProcessHandle>,
        output: CapturedOutput,
    ) -> Self {
        Self {
            container_name: container_name.into(),
            executed_command: executed_command.into(),
            error: None,
            process: Some(process),
            output,
        }
    }

    pub fn failed_to_start(
        container_name: impl Into<String>,
        executed_command: impl Into<String>,
        error: io::Error,
    ) -> Self {
        Self {
            container_name: container_name.into(),
            executed_command: executed_command.into(),
            error: Some(error),
            process: None,
            output: CapturedOutput::new(),
        }
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn executed_command(&self) -> &str {
        &self.executed_command
    }

    pub fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }

    pub fn output(&self) -> &CapturedOutput {
        &self.output
    }

    /// Current process state; a run that never started counts as exited
    pub fn state(&mut self) -> ProcessState {
        match self.process.as_mut() {
            Some(process) => process.state(),
            None => ProcessState::Exited(None),
        }
    }

    pub fn has_exited(&mut self) -> bool {
        matches!(self.state(), ProcessState::Exited(_))
    }

    /// Release the process handle and collect the remaining output.
    /// Call only after the container has been stopped.
    pub async fn into_result(mut self, exit_code: Option<i32>) -> RunResult {
        drop(self.process.take());
        let (stdout, stderr) = self.output.drain().await;

        RunResult {
            executed_command: self.executed_command,
            exit_code,
            stdout,
            stderr,
            error: self.error,
        }
    }
}

impl std::fmt::Debug for BackgroundRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRun")
            .field("container_name", &self.container_name)
            .field("executed_command", &self.executed_command)
            .field("error", &self.error)
            .field("has_process", &self.process.is_some())
            .finish()
    }
}
