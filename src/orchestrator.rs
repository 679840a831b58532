// Build, run, poll and assert against a container started in the background.
//
// The run phase is a small state machine. Failures leave it as `Err`; the
// container is stopped exactly once whatever the outcome.

use crate::assertions::Mismatch;
use crate::docker::args::{EnvironmentVariable, RunArguments, APP_NAME_VARIABLE};
use crate::docker::cli::ContainerCli;
use crate::docker::ports::parse_port_mapping;
use crate::docker::result::{BackgroundRun, ProcessState, RunResult};
use crate::errors::{HarnessError, Result};
use crate::report::OutputSink;
use crate::volume::Volume;
use std::future::Future;
use std::io;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(6);

/// How long to keep polling a started application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Waited before every attempt, including the first
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The application is not accepting connections yet
    Transient,
    Fatal,
}

/// Decide whether an assertion failure is worth another attempt.
///
/// The whole cause chain is inspected, so context added by the assertion
/// does not hide a refused connection underneath it.
pub fn classify(err: &anyhow::Error) -> Failure {
    for cause in err.chain() {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if is_transient_kind(io_err.kind()) {
                return Failure::Transient;
            }
        }
        if let Some(http_err) = cause.downcast_ref::<reqwest::Error>() {
            if is_transient_http(http_err) {
                return Failure::Transient;
            }
        }
    }
    Failure::Fatal
}

/// A request that failed before any status line arrived, e.g. a socket
/// accepted and then closed by an application that is still booting
fn is_transient_http(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || (err.is_request() && err.status().is_none())
}

fn is_transient_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::TimedOut
            | io::ErrorKind::AddrNotAvailable
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Launching,
    ResolvingPort,
    Polling { host_port: u16, attempt: u32 },
    Succeeded,
}

/// An application to build in one image and run in another
#[derive(Debug, Clone, Default)]
pub struct AppRun {
    pub build_image: String,
    /// Empty means the build image's default command
    pub build_command: String,
    pub build_args: Vec<String>,
    pub runtime_image: String,
    pub environment: Vec<EnvironmentVariable>,
    pub volumes: Vec<Volume>,
    /// Container port the application listens on
    pub port: u16,
    pub link: Option<String>,
    pub run_command: String,
    pub run_args: Vec<String>,
}

impl AppRun {
    pub fn new(runtime_image: impl Into<String>, port: u16) -> Self {
        Self {
            runtime_image: runtime_image.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_build<I, S>(
        mut self,
        image: impl Into<String>,
        command: impl Into<String>,
        args: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.build_image = image.into();
        self.build_command = command.into();
        self.build_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_run<I, S>(mut self, command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run_command = command.into();
        self.run_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, environment: Vec<EnvironmentVariable>) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_volumes(mut self, volumes: Vec<Volume>) -> Self {
        self.volumes = volumes;
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Export the application name the runtime images expect
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.environment
            .push(EnvironmentVariable::new(APP_NAME_VARIABLE, name));
        self
    }

    pub fn build_arguments(&self) -> RunArguments {
        let args = RunArguments::new(self.build_image.as_str())
            .with_env(self.environment.clone())
            .with_volumes(self.volumes.clone());

        if self.build_command.is_empty() {
            args
        } else {
            args.with_command(self.build_command.as_str(), self.build_args.iter().cloned())
        }
    }

    pub fn runtime_arguments(&self) -> RunArguments {
        let args = RunArguments::new(self.runtime_image.as_str())
            .with_env(self.environment.clone())
            .with_volumes(self.volumes.clone())
            .with_link(self.link.clone())
            .with_port(self.port);

        if self.run_command.is_empty() {
            args
        } else {
            args.with_command(self.run_command.as_str(), self.run_args.iter().cloned())
        }
    }
}

pub struct Orchestrator<C, S> {
    cli: C,
    sink: S,
    policy: RetryPolicy,
}

impl<C, S> Orchestrator<C, S>
where
    C: ContainerCli,
    S: OutputSink,
{
    pub fn new(cli: C, sink: S) -> Self {
        Self {
            cli,
            sink,
            policy: RetryPolicy::default(),
        }
    }

    /// `max_attempts` below 1 is raised to 1
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        if policy.max_attempts == 0 {
            tracing::warn!("retry policy with zero attempts, making one attempt");
        }
        self.policy = RetryPolicy {
            max_attempts: policy.max_attempts.max(1),
            ..policy
        };
        self
    }

    pub fn cli(&self) -> &C {
        &self.cli
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run the build step to completion
    pub async fn build(&self, app: &AppRun) -> Result<RunResult> {
        tracing::info!(image = %app.build_image, "building application");
        let result = self.cli.run(&app.build_arguments()).await;

        if !result.is_success() {
            let err = HarnessError::BuildFailed {
                command: result.executed_command.clone(),
                exit_code: result.exit_code,
            };
            self.emit_report(&result, &err);
            return Err(err);
        }

        Ok(result)
    }

    /// Build the application, then run it and poll it with `assertion`
    pub async fn build_run_and_assert<F, Fut>(&self, app: &AppRun, assertion: F) -> Result<()>
    where
        F: FnMut(u16) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        self.build(app).await?;
        self.run_and_assert(app, assertion).await
    }

    /// Start the runtime container and poll it with `assertion`, which
    /// receives the host port the application is published on
    pub async fn run_and_assert<F, Fut>(&self, app: &AppRun, mut assertion: F) -> Result<()>
    where
        F: FnMut(u16) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        tracing::info!(image = %app.runtime_image, port = app.port, "starting application");
        let mut run = self.cli.run_in_background(&app.runtime_arguments()).await;
        let outcome = self.poll(&mut run, app.port, &mut assertion).await;

        // Process state is only read before the container is stopped
        let exit_code = match run.state() {
            ProcessState::Exited(code) => code,
            ProcessState::Running => None,
        };

        let stopped = self.cli.stop_container(run.container_name()).await;
        if !stopped.is_success() {
            tracing::warn!(
                container = run.container_name(),
                exit_code = ?stopped.exit_code,
                error = ?stopped.error_message(),
                "failed to stop container"
            );
        }

        let result = run.into_result(exit_code).await;
        match outcome {
            Ok(()) => {
                tracing::info!("application passed");
                Ok(())
            }
            Err(err) => {
                self.emit_report(&result, &err);
                Err(err)
            }
        }
    }

    /// Run a one-shot container and hand the result to `check`
    pub async fn exec<F>(&self, args: &RunArguments, check: F) -> Result<RunResult>
    where
        F: FnOnce(&RunResult) -> anyhow::Result<()>,
    {
        let result = self.cli.run(args).await;

        if let Some(error) = &result.error {
            let err = HarnessError::CommandFailed(error.to_string());
            self.emit_report(&result, &err);
            return Err(err);
        }

        if let Err(check_err) = check(&result) {
            let err = assertion_error(check_err);
            self.emit_report(&result, &err);
            return Err(err);
        }

        Ok(result)
    }

    async fn poll<F, Fut>(
        &self,
        run: &mut BackgroundRun,
        container_port: u16,
        assertion: &mut F,
    ) -> Result<()>
    where
        F: FnMut(u16) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let mut phase = Phase::Launching;

        loop {
            tracing::debug!(?phase, container = run.container_name());
            phase = match phase {
                Phase::Launching => {
                    if let Some(error) = run.error() {
                        return Err(HarnessError::Launch(error.to_string()));
                    }
                    if let ProcessState::Exited(code) = run.state() {
                        return Err(HarnessError::PrematureExit(code));
                    }
                    Phase::ResolvingPort
                }
                Phase::ResolvingPort => {
                    let host_port = self
                        .resolve_host_port(run.container_name(), container_port)
                        .await?;
                    tracing::info!(host_port, "application published");
                    Phase::Polling {
                        host_port,
                        attempt: 1,
                    }
                }
                Phase::Polling { host_port, attempt } => {
                    tokio::time::sleep(self.policy.delay).await;

                    if let ProcessState::Exited(code) = run.state() {
                        return Err(HarnessError::PrematureExit(code));
                    }

                    match assertion(host_port).await {
                        Ok(()) => Phase::Succeeded,
                        Err(err) => match classify(&err) {
                            Failure::Transient if attempt < self.policy.max_attempts => {
                                tracing::debug!(
                                    attempt,
                                    max_attempts = self.policy.max_attempts,
                                    error = %format!("{err:#}"),
                                    "application not ready"
                                );
                                Phase::Polling {
                                    host_port,
                                    attempt: attempt + 1,
                                }
                            }
                            Failure::Transient => {
                                return Err(HarnessError::RetriesExhausted {
                                    attempts: attempt,
                                    last: format!("{err:#}"),
                                })
                            }
                            Failure::Fatal => return Err(assertion_error(err)),
                        },
                    }
                }
                Phase::Succeeded => return Ok(()),
            };
        }
    }

    async fn resolve_host_port(&self, container: &str, port: u16) -> Result<u16> {
        let result = self.cli.port_mapping(container, port).await;

        if let Some(error) = &result.error {
            return Err(HarnessError::PortMapping(error.to_string()));
        }
        if !result.is_success() {
            return Err(HarnessError::PortMapping(format!(
                "{} exited with {:?}: {}",
                result.executed_command,
                result.exit_code,
                result.stderr.trim()
            )));
        }

        Ok(parse_port_mapping(&result.stdout)?.host_port)
    }

    fn emit_report(&self, result: &RunResult, err: &HarnessError) {
        tracing::error!(command = %result.executed_command, "{}", err);

        let mut extra = vec![("Failure", err.to_string())];
        extra.extend(err.report_definitions());

        if let Err(e) = self.sink.append_report(&result.debug_info(&extra)) {
            tracing::warn!(error = %e, "failed to write debug report");
        }
    }
}

fn assertion_error(err: anyhow::Error) -> HarnessError {
    match err.chain().find_map(|cause| cause.downcast_ref::<Mismatch>()) {
        Some(mismatch) => HarnessError::Mismatch {
            actual: mismatch.actual.clone(),
            expected: mismatch.expected.clone(),
        },
        None => HarnessError::Assertion(format!("{err:#}")),
    }
}
