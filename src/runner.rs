//! Invocation of the storage administration tool.

use std::path::PathBuf;
use std::process::Command;

use crate::error::{PlacementError, Result};

/// Runs the administration tool with the given arguments and returns stdout.
pub trait CommandRunner {
    fn run(&self, args: &[String]) -> Result<String>;
}

/// Runs a real program, appending the connection arguments every call needs.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
    common_args: Vec<String>,
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            common_args: Vec::new(),
        }
    }

    pub fn with_cell(mut self, cell: Option<&str>) -> Self {
        if let Some(cell) = cell {
            self.common_args.extend(["-cell".to_string(), cell.to_string()]);
        }
        self
    }

    pub fn with_localauth(mut self, localauth: bool) -> Self {
        if localauth {
            self.common_args.push("-localauth".to_string());
        }
        self
    }

    fn command_line(&self, args: &[String]) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(args.iter().cloned())
            .chain(self.common_args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, args: &[String]) -> Result<String> {
        let command = self.command_line(args);
        tracing::debug!(%command, "running");

        let output = Command::new(&self.program)
            .args(args)
            .args(&self.common_args)
            .output()?;

        if !output.status.success() {
            let status = match output.status.code() {
                Some(code) => format!("status {}", code),
                None => "a signal".to_string(),
            };
            return Err(PlacementError::CommandFailed {
                command,
                status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Owned argument list from string literals and values
#[macro_export]
macro_rules! args {
    ($($arg:expr),* $(,)?) => {
        vec![$($arg.to_string()),*]
    };
}
