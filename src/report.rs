// Debug reports for failed runs and the sinks they are written to

use crate::errors::{HarnessError, Result};
use fs2::FileExt;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const REPORT_HEADING: &str = "Debugging Information:";

/// Ordered list of term/definition pairs, rendered with aligned terms
#[derive(Debug, Clone, Default)]
pub struct DefinitionList {
    entries: Vec<(String, String)>,
}

impl DefinitionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, term: impl Into<String>, definition: impl Into<String>) -> &mut Self {
        self.entries.push((term.into(), definition.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Render under the standard heading used for all debug reports
    pub fn to_report(&self) -> String {
        format!(
            "\n{}\n{}\n{}",
            REPORT_HEADING,
            "-".repeat(REPORT_HEADING.len()),
            self
        )
    }
}

impl fmt::Display for DefinitionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .entries
            .iter()
            .map(|(term, _)| term.len())
            .max()
            .unwrap_or(0);

        for (term, definition) in &self.entries {
            let mut lines = definition.lines();
            let first = lines.next().unwrap_or("");
            writeln!(f, "{:<width$}: {}", term, first, width = width)?;

            // Continuation lines line up under the first line of the definition
            for line in lines {
                writeln!(f, "{:width$}  {}", "", line, width = width)?;
            }
        }

        Ok(())
    }
}

/// Destination for debug reports.
///
/// Each call appends one complete report; implementations must not let
/// concurrent callers interleave their text.
pub trait OutputSink: Send + Sync {
    fn append_report(&self, report: &str) -> Result<()>;
}

impl<T: OutputSink + ?Sized> OutputSink for Box<T> {
    fn append_report(&self, report: &str) -> Result<()> {
        (**self).append_report(report)
    }
}

impl<T: OutputSink + ?Sized> OutputSink for Arc<T> {
    fn append_report(&self, report: &str) -> Result<()> {
        (**self).append_report(report)
    }
}

/// Writes reports to stderr while holding the stderr lock
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrSink;

impl OutputSink for StderrSink {
    fn append_report(&self, report: &str) -> Result<()> {
        let mut stderr = std::io::stderr().lock();
        stderr.write_all(report.as_bytes())?;
        writeln!(stderr)?;
        stderr.flush()?;
        Ok(())
    }
}

/// Appends reports to a file under an exclusive lock, so several test
/// processes can share one report file
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputSink for FileSink {
    fn append_report(&self, report: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive().map_err(|e| {
            HarnessError::CommandFailed(format!(
                "Failed to lock report file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let written = file
            .write_all(report.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.flush());

        // Release lock before surfacing any write error
        let _ = file.unlock();
        written?;

        Ok(())
    }
}

/// Collects reports in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    reports: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<String> {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl OutputSink for MemorySink {
    fn append_report(&self, report: &str) -> Result<()> {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(report.to_string());
        Ok(())
    }
}
