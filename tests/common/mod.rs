/// Common test utilities for runprobe integration tests
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Variables that would change the binary's behavior if inherited from the host
const HOST_ENV: &[&str] = &[
    "RUNPROBE_DOCKER",
    "RUNPROBE_BUILD_IMAGE",
    "RUNPROBE_PLATFORM_VERSION",
    "RUNPROBE_LOG",
    "AGENT_OS",
    "BUILD_SOURCEVERSION",
    "BUILD_BUILDNUMBER",
];

/// A scratch working directory for running the binary
pub struct TestDir {
    pub temp_dir: TempDir,
}

impl TestDir {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        TestDir { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Run runprobe in this directory
    #[allow(dead_code)]
    pub fn runprobe(&self, args: &[&str]) -> CommandResult {
        self.runprobe_with_env(args, &[])
    }

    /// Run runprobe with extra environment variables
    pub fn runprobe_with_env(&self, args: &[&str], env: &[(&str, &str)]) -> CommandResult {
        let mut command = Command::new(env!("CARGO_BIN_EXE_runprobe"));
        command.args(args).current_dir(self.path());
        for key in HOST_ENV {
            command.env_remove(key);
        }
        command.envs(env.iter().copied());

        let output = command.output().expect("Failed to execute runprobe");

        CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            exit_code: output.status.code(),
        }
    }

    /// Write a file relative to the directory, creating parents
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Install a shell script that answers like the docker CLI.
    ///
    /// `run --name` keeps running like a server, any other `run` exits with
    /// `$FAKE_EXIT_CODE`, and `port` reports `$FAKE_HOST_PORT`.
    #[cfg(unix)]
    #[allow(dead_code)]
    pub fn install_fake_docker(&self) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = r#"#!/bin/sh
case "$1" in
  --version)
    echo "Docker version 24.0.0, build fake"
    exit 0
    ;;
  port)
    echo "$3/tcp -> 0.0.0.0:${FAKE_HOST_PORT:-32768}"
    exit 0
    ;;
  rm)
    exit 0
    ;;
  run)
    for arg in "$@"; do
      if [ "$arg" = "--name" ]; then
        echo "Listening on port 5000"
        exec sleep 30
      fi
    done
    echo "fake run: $*"
    echo "Python 3.7.3"
    exit "${FAKE_EXIT_CODE:-0}"
    ;;
esac
echo "unsupported: $*" >&2
exit 1
"#;
        let path = self.write("bin/fake-docker", script);
        let mut permissions = std::fs::metadata(&path)
            .expect("Failed to stat fake docker")
            .permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(&path, permissions).expect("Failed to chmod fake docker");
        path
    }
}

/// Result of running a command
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: Option<i32>,
}

impl CommandResult {
    /// Assert the command succeeded
    pub fn assert_success(&self) {
        if !self.success {
            panic!(
                "Command failed:\nstdout: {}\nstderr: {}\nexit code: {:?}",
                self.stdout, self.stderr, self.exit_code
            );
        }
    }

    /// Assert the command failed
    #[allow(dead_code)]
    pub fn assert_failure(&self) {
        if self.success {
            panic!(
                "Command succeeded when it should have failed:\nstdout: {}\nstderr: {}",
                self.stdout, self.stderr
            );
        }
    }

    /// Assert stdout contains text
    #[allow(dead_code)]
    pub fn assert_stdout_contains(&self, text: &str) {
        assert!(
            self.stdout.contains(text),
            "stdout does not contain '{}'\nstdout: {}",
            text,
            self.stdout
        );
    }

    /// Assert stderr contains text
    #[allow(dead_code)]
    pub fn assert_stderr_contains(&self, text: &str) {
        assert!(
            self.stderr.contains(text),
            "stderr does not contain '{}'\nstderr: {}",
            text,
            self.stderr
        );
    }
}
