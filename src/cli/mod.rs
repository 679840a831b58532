pub mod build_run;
pub mod exec;
pub mod ports;
pub mod version;

use crate::config::Settings;
use crate::docker::DockerCli;
use crate::errors::{HarnessError, Result};
use crate::orchestrator::Orchestrator;
use crate::report::{FileSink, OutputSink, StderrSink};
use std::env;
use std::path::{Path, PathBuf};

/// Everything a command needs: settings and the report destination
pub struct Context {
    pub settings: Settings,
    pub report_file: Option<PathBuf>,
}

impl Context {
    pub fn load(config: Option<&Path>, report_file: Option<&Path>) -> Result<Self> {
        let settings = match config {
            Some(path) => {
                let mut settings = Settings::load_file(path)?;
                settings.apply_overrides(|key| env::var(key).ok());
                settings.validate()?;
                settings
            }
            None => Settings::load(&env::current_dir()?)?,
        };

        Ok(Self {
            settings,
            report_file: report_file.map(Path::to_path_buf),
        })
    }

    pub fn sink(&self) -> Box<dyn OutputSink> {
        match &self.report_file {
            Some(path) => Box::new(FileSink::new(path)),
            None => Box::new(StderrSink),
        }
    }

    /// Orchestrator over the configured docker CLI, failing early when it cannot be run
    pub async fn orchestrator(&self) -> Result<Orchestrator<DockerCli, Box<dyn OutputSink>>> {
        let docker = DockerCli::from_settings(&self.settings);
        if !docker.is_available().await {
            return Err(HarnessError::CommandFailed(format!(
                "'{}' is not available. Install Docker or set RUNPROBE_DOCKER",
                docker.program()
            )));
        }

        Ok(Orchestrator::new(docker, self.sink()).with_policy(self.settings.retry_policy()))
    }
}
