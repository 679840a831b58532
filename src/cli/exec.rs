use crate::assertions::{expect_contains, expect_eq, normalize_newlines};
use crate::cli::Context;
use crate::docker::{EnvironmentVariable, RunArguments, RunResult};
use crate::errors::{HarnessError, Result};
use colored::*;

/// Checks applied to a one-shot container run
#[derive(Debug, Clone, Default)]
pub struct ExecChecks {
    pub exit_code: Option<i32>,
    /// Compared with stdout after newlines are normalized
    pub stdout: Option<String>,
    pub stdout_contains: Vec<String>,
    pub stderr_contains: Vec<String>,
}

impl ExecChecks {
    /// Apply every configured check. Without an explicit exit code the run
    /// must succeed.
    pub fn verify(&self, result: &RunResult) -> anyhow::Result<()> {
        match self.exit_code {
            Some(expected) => {
                let actual = result
                    .exit_code
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "none".to_string());
                expect_eq(actual, expected.to_string())?;
            }
            None => {
                if !result.is_success() {
                    anyhow::bail!("command exited with {:?}", result.exit_code);
                }
            }
        }

        if let Some(expected) = &self.stdout {
            expect_eq(normalize_newlines(&result.stdout), expected.clone())?;
        }
        for needle in &self.stdout_contains {
            expect_contains(&result.stdout, needle)?;
        }
        for needle in &self.stderr_contains {
            expect_contains(&result.stderr, needle)?;
        }

        Ok(())
    }
}

/// Parse `NAME=value` pairs given on the command line
pub fn parse_env(pairs: &[String]) -> Result<Vec<EnvironmentVariable>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) if !name.is_empty() => Ok(EnvironmentVariable::new(name, value)),
            _ => Err(HarnessError::Config(format!(
                "Invalid environment variable '{}'. Expected NAME=value",
                pair
            ))),
        })
        .collect()
}

pub async fn run(
    ctx: &Context,
    image: &str,
    command: &[String],
    env: &[String],
    checks: &ExecChecks,
) -> Result<()> {
    let mut args = RunArguments::new(image).with_env(parse_env(env)?);
    if let Some((program, rest)) = command.split_first() {
        args = args.with_command(program.as_str(), rest.iter().cloned());
    }

    let orchestrator = ctx.orchestrator().await?;
    let result = orchestrator
        .exec(&args, |result| checks.verify(result))
        .await?;

    println!(
        "{} {} (exit code {})",
        "✓".green(),
        result.executed_command,
        result
            .exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "none".to_string())
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertions::Mismatch;

    fn result(exit_code: i32, stdout: &str) -> RunResult {
        RunResult {
            executed_command: "docker run --rm oryxdevms/python-3.7 python --version".to_string(),
            exit_code: Some(exit_code),
            stdout: stdout.to_string(),
            stderr: String::new(),
            error: None,
        }
    }

    #[test]
    fn test_default_checks_require_success() {
        let checks = ExecChecks::default();
        assert!(checks.verify(&result(0, "")).is_ok());
        assert!(checks.verify(&result(1, "")).is_err());
    }

    #[test]
    fn test_exit_code_sentinel() {
        let checks = ExecChecks {
            exit_code: Some(222),
            ..Default::default()
        };
        assert!(checks.verify(&result(222, "")).is_ok());

        let err = checks.verify(&result(0, "")).unwrap_err();
        let mismatch = err.downcast_ref::<Mismatch>().unwrap();
        assert_eq!(mismatch.actual, "0");
        assert_eq!(mismatch.expected, "222");
    }

    #[test]
    fn test_stdout_is_normalized() {
        let checks = ExecChecks {
            stdout: Some("Python 3.7.3".to_string()),
            ..Default::default()
        };
        assert!(checks.verify(&result(0, "Python 3.7.3\n")).is_ok());
        assert!(checks.verify(&result(0, "Python 3.6.8\n")).is_err());
    }

    #[test]
    fn test_parse_env() {
        let vars = parse_env(&["A=1".to_string(), "B=x=y".to_string()]).unwrap();
        assert_eq!(vars[0], EnvironmentVariable::new("A", "1"));
        assert_eq!(vars[1], EnvironmentVariable::new("B", "x=y"));

        assert!(parse_env(&["missing".to_string()]).is_err());
        assert!(parse_env(&["=value".to_string()]).is_err());
    }
}
