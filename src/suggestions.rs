// Error suggestion system for better user experience
use crate::config::SETTINGS_FILE;
use crate::errors::HarnessError;
use colored::Colorize;

/// Display an error with helpful suggestions
pub fn display_error_with_suggestions(error: &HarnessError) {
    eprintln!("\n{}: {}", "Error".bright_red().bold(), error);

    let suggestions = suggestions_for(error);
    if suggestions.is_empty() {
        return;
    }

    eprintln!("\n{}:", "Suggestions".bright_yellow());
    for suggestion in suggestions {
        eprintln!("  • {}", suggestion);
    }
}

fn suggestions_for(error: &HarnessError) -> Vec<String> {
    match error {
        HarnessError::BuildFailed { .. } => vec![
            "Check the build output in the debugging information above".to_string(),
            format!(
                "Try another build image with {}",
                "RUNPROBE_BUILD_IMAGE=<image>".bright_cyan()
            ),
        ],

        HarnessError::Launch(_) | HarnessError::CommandFailed(_) => vec![
            format!("Check that Docker is running: {}", "docker info".bright_cyan()),
            format!(
                "Point to another container CLI with {}",
                "RUNPROBE_DOCKER=<program>".bright_cyan()
            ),
        ],

        HarnessError::PrematureExit(_) => vec![
            "The application exited during startup; its StdErr is in the report".to_string(),
            "Check the scenario's run command and port".to_string(),
        ],

        HarnessError::PortMapping(_) | HarnessError::MalformedPortMapping(_) => vec![
            format!(
                "Inspect the mapping by hand: {}",
                "docker port <container> <port>".bright_cyan()
            ),
            format!(
                "Test the parser directly: {}",
                "runprobe port '5000/tcp -> 0.0.0.0:32768'".bright_cyan()
            ),
        ],

        HarnessError::RetriesExhausted { .. } => vec![
            "Make sure the application listens on 0.0.0.0, not localhost".to_string(),
            format!(
                "Give slow applications more time via {} in {}",
                "retry.max_attempts".bright_cyan(),
                SETTINGS_FILE
            ),
        ],

        HarnessError::Config(_) => vec![format!("Check {} for typos", SETTINGS_FILE)],

        HarnessError::Scenario(_) => vec![
            "Volume sources are resolved relative to the scenario file".to_string(),
            "Volumes are written as 'source -> target'".to_string(),
        ],

        HarnessError::Mismatch { .. } | HarnessError::Assertion(_) | HarnessError::Io(_) => {
            Vec::new()
        }
    }
}
