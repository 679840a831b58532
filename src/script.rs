// Compose `/bin/sh -c` scripts for one-shot containers

use std::fmt;

const DEFAULT_SEPARATOR: &str = " && ";

#[derive(Debug, Clone)]
pub struct ShellScriptBuilder {
    commands: Vec<String>,
    separator: String,
}

impl Default for ShellScriptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellScriptBuilder {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Append a command verbatim
    pub fn add_command(mut self, command: impl Into<String>) -> Self {
        self.commands.push(command.into());
        self
    }

    pub fn create_directory(self, path: &str) -> Self {
        let command = format!("mkdir -p {}", quote(path));
        self.add_command(command)
    }

    pub fn create_file(self, path: &str, content: &str) -> Self {
        let command = format!("echo {} > {}", quote(content), quote(path));
        self.add_command(command)
    }

    pub fn set_environment_variable(self, name: &str, value: &str) -> Self {
        let command = format!("export {}={}", name, quote(value));
        self.add_command(command)
    }

    /// Fail the script when `path` is not a directory
    pub fn add_directory_exists_check(self, path: &str) -> Self {
        let path = quote(path);
        let command = format!(
            "if [ ! -d {path} ]; then echo \"Directory \"{path}\" not found\" 1>&2; exit 1; fi"
        );
        self.add_command(command)
    }

    /// Fail the script when `path` is not a regular file
    pub fn add_file_exists_check(self, path: &str) -> Self {
        let path = quote(path);
        let command = format!(
            "if [ ! -f {path} ]; then echo \"File \"{path}\" not found\" 1>&2; exit 1; fi"
        );
        self.add_command(command)
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn build(&self) -> String {
        self.commands.join(&self.separator)
    }
}

impl fmt::Display for ShellScriptBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}

/// Single-quote `arg` for POSIX shells when it contains anything special
pub(crate) fn quote(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg.chars().any(|c| {
            c.is_whitespace()
                || matches!(
                    c,
                    '\'' | '"' | '$' | '&' | ';' | '|' | '<' | '>' | '(' | ')' | '`' | '\\' | '*'
                )
        });

    if needs_quotes {
        format!("'{}'", arg.replace('\'', r"'\''"))
    } else {
        arg.to_string()
    }
}
