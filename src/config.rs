use crate::assertions::HttpExpectation;
use crate::docker::args::EnvironmentVariable;
use crate::errors::{HarnessError, Result};
use crate::orchestrator::{AppRun, RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::volume::Volume;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_FILE: &str = ".runprobe.yml";

pub const ENV_DOCKER: &str = "RUNPROBE_DOCKER";
pub const ENV_BUILD_IMAGE: &str = "RUNPROBE_BUILD_IMAGE";
pub const ENV_PLATFORM_VERSION: &str = "RUNPROBE_PLATFORM_VERSION";

const DEFAULT_BUILD_IMAGE: &str = "oryxdevms/build:latest";
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Harness settings, read from `.runprobe.yml` and the environment
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Container CLI executable
    pub docker: String,
    /// Image used for the build step of every scenario
    pub build_image: String,
    pub retry: RetryConfig,
    /// Upper bound for foreground runs (build step, exec checks)
    pub command_timeout_secs: u64,
    /// Upper bound for one HTTP request against a running application
    pub request_timeout_secs: u64,
    /// Base version the runtime images are stamped with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_version: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
            build_image: DEFAULT_BUILD_IMAGE.to_string(),
            retry: RetryConfig::default(),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            platform_version: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay_secs: DEFAULT_RETRY_DELAY.as_secs(),
        }
    }
}

impl Settings {
    /// Load settings from `.runprobe.yml` in `dir` (defaults when absent),
    /// then apply environment overrides
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SETTINGS_FILE);
        let mut settings = if path.exists() {
            Self::load_file(&path)?
        } else {
            Settings::default()
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from an explicit file, without environment overrides
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HarnessError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let settings: Settings = serde_yml::from_str(&content)
            .map_err(|e| HarnessError::Config(format!("Failed to parse settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `RUNPROBE_*` overrides; empty values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(docker) = lookup(ENV_DOCKER) {
            self.docker = docker;
        }
        if let Some(image) = lookup(ENV_BUILD_IMAGE) {
            self.build_image = image;
        }
        if let Some(version) = lookup(ENV_PLATFORM_VERSION) {
            self.platform_version = Some(version);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(HarnessError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.command_timeout_secs == 0 {
            return Err(HarnessError::Config(
                "command_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(HarnessError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.docker.trim().is_empty() {
            return Err(HarnessError::Config("docker must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            delay: Duration::from_secs(self.retry.delay_secs),
        }
    }
}

/// One build/run/assert case, read from a YAML file
#[derive(Debug, Deserialize, Clone)]
pub struct Scenario {
    /// Exported to the runtime as the application name
    pub app_name: Option<String>,
    /// Overrides the build image from the settings
    pub build_image: Option<String>,
    pub build: Option<CommandSpec>,
    pub runtime_image: String,
    pub port: u16,
    #[serde(default)]
    pub env: Vec<EnvEntry>,
    #[serde(default, deserialize_with = "deserialize_volume_list")]
    pub volumes: Vec<VolumeSpec>,
    pub link: Option<String>,
    pub run: CommandSpec,
    #[serde(default)]
    pub expect: HttpExpectation,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct EnvEntry {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VolumeSpec {
    pub source: String,
    pub target: String,
}

/// Custom deserializer for volume list that handles "source -> target" format
fn deserialize_volume_list<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<VolumeSpec>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let items: Vec<String> = Vec::deserialize(deserializer)?;
    let mut volumes = Vec::new();

    for item in items {
        let parts: Vec<&str> = item.split("->").map(|s| s.trim()).collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(D::Error::custom(format!(
                "Invalid volume format '{}'. Expected 'source -> target'",
                item
            )));
        }

        volumes.push(VolumeSpec {
            source: parts[0].to_string(),
            target: parts[1].to_string(),
        });
    }

    Ok(volumes)
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HarnessError::Scenario(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_yml::from_str(&content).map_err(|e| {
            HarnessError::Scenario(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Resolve the scenario into an [`AppRun`]. Volume sources are relative to
    /// `base_dir` and are mirrored into temporary directories.
    pub fn to_app_run(&self, settings: &Settings, base_dir: &Path) -> Result<AppRun> {
        let volumes = self
            .volumes
            .iter()
            .map(|spec| Volume::mirror(&resolve(base_dir, &spec.source), spec.target.as_str()))
            .collect::<Result<Vec<_>>>()?;

        let environment = self
            .env
            .iter()
            .map(|entry| EnvironmentVariable::new(entry.name.as_str(), entry.value.as_str()))
            .collect();

        let (build_command, build_args) = match &self.build {
            Some(build) => (build.command.clone(), build.args.clone()),
            None => (String::new(), Vec::new()),
        };

        let app = AppRun {
            build_image: self
                .build_image
                .clone()
                .unwrap_or_else(|| settings.build_image.clone()),
            build_command,
            build_args,
            runtime_image: self.runtime_image.clone(),
            environment,
            volumes,
            port: self.port,
            link: self.link.clone(),
            run_command: self.run.command.clone(),
            run_args: self.run.args.clone(),
        };

        Ok(match &self.app_name {
            Some(name) => app.with_app_name(name),
            None => app,
        })
    }
}

fn resolve(base_dir: &Path, source: &str) -> PathBuf {
    let path = Path::new(source);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::args::APP_NAME_VARIABLE;
    use std::collections::HashMap;
    use tempfile::TempDir;

    const SCENARIO: &str = r#"
app_name: flask-app
build:
  command: oryx
  args: [build, /app]
runtime_image: oryxdevms/python-3.7
port: 5000
env:
  - name: FLASK_ENV
    value: production
volumes:
  - "flask-app -> /app"
run:
  command: /bin/sh
  args: ["-c", "cd /app && gunicorn app:app"]
expect:
  path: /health
  body_contains: "Hello World!"
"#;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.docker, "docker");
        assert_eq!(settings.retry.max_attempts, 10);
        assert_eq!(settings.retry.delay_secs, 6);
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
        assert_eq!(settings.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_missing_settings() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load_file(&temp_dir.path().join(SETTINGS_FILE));
        assert!(matches!(settings, Err(HarnessError::Config(_))));
    }

    #[test]
    fn test_load_partial_settings_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE);
        fs::write(
            &path,
            "build_image: myregistry/build:1.0\nretry:\n  delay_secs: 2\n",
        )
        .unwrap();

        let settings = Settings::load_file(&path).unwrap();
        assert_eq!(settings.build_image, "myregistry/build:1.0");
        assert_eq!(settings.retry.delay_secs, 2);
        assert_eq!(settings.retry.max_attempts, 10);
        assert_eq!(settings.docker, "docker");
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE);
        fs::write(&path, "retry:\n  max_attempts: 0\n").unwrap();
        assert!(Settings::load_file(&path).is_err());

        fs::write(&path, "retry: fast\n").unwrap();
        assert!(Settings::load_file(&path).is_err());

        fs::write(&path, "request_timeout_secs: 0\n").unwrap();
        assert!(Settings::load_file(&path).is_err());
    }

    #[test]
    fn test_overrides_ignore_empty_values() {
        let env: HashMap<&str, &str> = [
            (ENV_DOCKER, "podman"),
            (ENV_BUILD_IMAGE, "  "),
            (ENV_PLATFORM_VERSION, "0.2."),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.docker, "podman");
        assert_eq!(settings.build_image, DEFAULT_BUILD_IMAGE);
        assert_eq!(settings.platform_version.as_deref(), Some("0.2."));
    }

    #[test]
    fn test_parse_scenario() {
        let scenario: Scenario = serde_yml::from_str(SCENARIO).unwrap();
        assert_eq!(scenario.app_name.as_deref(), Some("flask-app"));
        assert_eq!(scenario.build.as_ref().unwrap().args, vec!["build", "/app"]);
        assert_eq!(scenario.port, 5000);
        assert_eq!(
            scenario.volumes,
            vec![VolumeSpec {
                source: "flask-app".to_string(),
                target: "/app".to_string()
            }]
        );
        assert_eq!(scenario.expect.path, "/health");
        assert_eq!(scenario.expect.status, 200);
        assert_eq!(scenario.expect.body_contains.as_deref(), Some("Hello World!"));
    }

    #[test]
    fn test_invalid_volume_format() {
        let yaml = SCENARIO.replace("flask-app -> /app", "flask-app:/app");
        let result: std::result::Result<Scenario, _> = serde_yml::from_str(&yaml);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Expected 'source -> target'"));
    }

    #[test]
    fn test_scenario_to_app_run() {
        let temp_dir = TempDir::new().unwrap();
        let sample = temp_dir.path().join("flask-app");
        fs::create_dir_all(&sample).unwrap();
        fs::write(sample.join("app.py"), "app = None").unwrap();

        let scenario: Scenario = serde_yml::from_str(SCENARIO).unwrap();
        let app = scenario
            .to_app_run(&Settings::default(), temp_dir.path())
            .unwrap();

        assert_eq!(app.build_image, DEFAULT_BUILD_IMAGE);
        assert_eq!(app.build_command, "oryx");
        assert_eq!(app.volumes.len(), 1);
        assert!(app.volumes[0].is_mirror());
        assert!(app.volumes[0].host_dir().join("app.py").exists());
        assert_eq!(app.environment[0], EnvironmentVariable::new("FLASK_ENV", "production"));
        assert_eq!(
            app.environment.last().unwrap(),
            &EnvironmentVariable::new(APP_NAME_VARIABLE, "flask-app")
        );
    }

    #[test]
    fn test_scenario_missing_volume_source() {
        let temp_dir = TempDir::new().unwrap();
        let scenario: Scenario = serde_yml::from_str(SCENARIO).unwrap();
        let result = scenario.to_app_run(&Settings::default(), temp_dir.path());
        assert!(matches!(result, Err(HarnessError::Scenario(_))));
    }
}
