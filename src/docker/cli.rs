// Container CLI wrapper: every operation shells out to the docker executable

use crate::config::Settings;
use crate::docker::args::RunArguments;
use crate::docker::result::{BackgroundRun, CapturedOutput, RunResult};
use crate::script::quote;
use std::future::Future;
use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::Command;

/// Default upper bound for a foreground container run
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// How often `docker port` is retried while the container is still being created
const PORT_QUERY_ATTEMPTS: u32 = 10;
const PORT_QUERY_INTERVAL: Duration = Duration::from_millis(500);

const NO_SUCH_CONTAINER: &str = "No such container";

static CONTAINER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Operations the orchestrator needs from a container runtime
pub trait ContainerCli: Send + Sync {
    /// Run a container and wait for it to exit
    fn run(&self, args: &RunArguments) -> impl Future<Output = RunResult> + Send;

    /// Start a container and return as soon as the process is spawned
    fn run_in_background(&self, args: &RunArguments)
        -> impl Future<Output = BackgroundRun> + Send;

    /// Query the host binding of `port` inside `container`
    fn port_mapping(&self, container: &str, port: u16) -> impl Future<Output = RunResult> + Send;

    /// Stop and remove `container`. A container that no longer exists counts as stopped.
    fn stop_container(&self, container: &str) -> impl Future<Output = RunResult> + Send;
}

/// [`ContainerCli`] backed by the `docker` command line
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
    command_timeout: Duration,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            program: "docker".to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            program: settings.docker.clone(),
            command_timeout: settings.command_timeout(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Check if the docker executable can be invoked
    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Build `docker run` arguments (passed as argv, never through a shell)
    pub fn run_args(args: &RunArguments, container_name: Option<&str>) -> Vec<String> {
        let mut cli_args = vec!["run".to_string(), "--rm".to_string()];

        if let Some(name) = container_name {
            cli_args.push("--name".to_string());
            cli_args.push(name.to_string());
        }

        for var in &args.environment {
            cli_args.push("-e".to_string());
            cli_args.push(var.to_arg());
        }

        for volume in &args.volumes {
            cli_args.push("-v".to_string());
            cli_args.push(volume.mount_spec());
        }

        if let Some(link) = &args.link {
            cli_args.push("--link".to_string());
            cli_args.push(link.clone());
        }

        if let Some(port) = args.port {
            // Publishing without a host port lets the engine pick a free one
            cli_args.push("-p".to_string());
            cli_args.push(port.to_string());
        }

        cli_args.push(args.image.clone());

        if let Some(command) = &args.command {
            cli_args.push(command.clone());
        }
        cli_args.extend(args.command_args.iter().cloned());

        cli_args
    }

    /// Human-readable form of an invocation, for debug reports
    fn display_command(&self, args: &[String]) -> String {
        std::iter::once(self.program.as_str())
            .chain(args.iter().map(String::as_str))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the docker executable to completion, bounded by the command timeout
    async fn execute(&self, args: Vec<String>) -> RunResult {
        let executed_command = self.display_command(&args);
        tracing::debug!(command = %executed_command, "invoking container CLI");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => return RunResult::failed_to_start(executed_command, e),
        };

        // Dropping the future on timeout drops the child, which kills it
        match tokio::time::timeout(self.command_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => RunResult {
                executed_command,
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                error: None,
            },
            Ok(Err(e)) => RunResult::failed_to_start(executed_command, e),
            Err(_) => RunResult::failed_to_start(
                executed_command,
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("command timed out after {:?}", self.command_timeout),
                ),
            ),
        }
    }
}

impl ContainerCli for DockerCli {
    async fn run(&self, args: &RunArguments) -> RunResult {
        self.execute(Self::run_args(args, None)).await
    }

    async fn run_in_background(&self, args: &RunArguments) -> BackgroundRun {
        let container_name = generate_container_name();
        let cli_args = Self::run_args(args, Some(&container_name));
        let executed_command = self.display_command(&cli_args);
        tracing::debug!(
            command = %executed_command,
            container = %container_name,
            "starting background container"
        );

        let spawned = Command::new(&self.program)
            .args(&cli_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        match spawned {
            Ok(mut child) => {
                let mut output = CapturedOutput::new();
                if let Some(stdout) = child.stdout.take() {
                    output.capture_stdout(stdout);
                }
                if let Some(stderr) = child.stderr.take() {
                    output.capture_stderr(stderr);
                }
                BackgroundRun::started(container_name, executed_command, Box::new(child), output)
            }
            Err(e) => BackgroundRun::failed_to_start(container_name, executed_command, e),
        }
    }

    async fn port_mapping(&self, container: &str, port: u16) -> RunResult {
        let args = vec!["port".to_string(), container.to_string(), port.to_string()];
        let mut attempt = 1;

        loop {
            let result = self.execute(args.clone()).await;

            // `docker run` may not have created the container yet
            let still_creating = result.error.is_none()
                && !result.is_success()
                && result.stderr.contains(NO_SUCH_CONTAINER);
            if !still_creating || attempt >= PORT_QUERY_ATTEMPTS {
                return result;
            }

            tracing::debug!(container, attempt, "container not created yet, querying port again");
            attempt += 1;
            tokio::time::sleep(PORT_QUERY_INTERVAL).await;
        }
    }

    async fn stop_container(&self, container: &str) -> RunResult {
        let args = vec!["rm".to_string(), "--force".to_string(), container.to_string()];
        let mut result = self.execute(args).await;

        if result.error.is_none() && !result.is_success() && result.stderr.contains(NO_SUCH_CONTAINER)
        {
            tracing::debug!(container, "container already removed");
            result.exit_code = Some(0);
        }

        result
    }
}

/// Unique per process and per call, so concurrent tests never share a name
pub fn generate_container_name() -> String {
    let sequence = CONTAINER_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!(
        "runprobe-{}-{}-{}",
        chrono::Utc::now().format("%Y%m%d%H%M%S"),
        std::process::id(),
        sequence
    )
}
