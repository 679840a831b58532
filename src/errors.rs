use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Build step failed: {command} (exit code {exit_code:?})")]
    BuildFailed {
        command: String,
        exit_code: Option<i32>,
    },

    #[error("Failed to launch container: {0}")]
    Launch(String),

    #[error("Container exited before it became ready (exit code {0:?})")]
    PrematureExit(Option<i32>),

    #[error("Port mapping query failed: {0}")]
    PortMapping(String),

    #[error("Malformed port mapping '{0}'. Expected '<port>/<proto> -> <address>:<port>'")]
    MalformedPortMapping(String),

    #[error("Application not reachable after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("Assertion failed: expected '{expected}', got '{actual}'")]
    Mismatch { actual: String, expected: String },

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Scenario error: {0}")]
    Scenario(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Extra definitions appended to the debug report for this failure
    pub fn report_definitions(&self) -> Vec<(&'static str, String)> {
        match self {
            HarnessError::Mismatch { actual, expected } => vec![
                ("Actual value", actual.clone()),
                ("Expected value", expected.clone()),
            ],
            _ => Vec::new(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_report_definitions() {
        let err = HarnessError::Mismatch {
            actual: "Python 3.6.8".to_string(),
            expected: "Python 3.7.3".to_string(),
        };
        let defs = err.report_definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0], ("Actual value", "Python 3.6.8".to_string()));
        assert_eq!(defs[1], ("Expected value", "Python 3.7.3".to_string()));
    }

    #[test]
    fn test_other_errors_have_no_extra_definitions() {
        assert!(HarnessError::PrematureExit(Some(1)).report_definitions().is_empty());
    }
}
