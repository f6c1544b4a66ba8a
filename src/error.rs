//! Error handling for PyBundle
//!
//! Typed failures the front-ends react to live in [`PackError`]; everything
//! else travels as `anyhow::Error` with path context attached.

use anyhow::Context;
use std::path::Path;

pub type Result<T> = anyhow::Result<T>;

/// Extension trait for Results to add context with file paths
pub trait ResultExt<T> {
    /// Add context with file path information
    fn with_path_context<P: AsRef<Path>>(self, operation: &str, path: P) -> Result<T>;

    /// Add context naming the external tool involved
    fn with_tool_context(self, tool: &str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error> + Send + Sync + 'static,
{
    fn with_path_context<P: AsRef<Path>>(self, operation: &str, path: P) -> Result<T> {
        self.map_err(|e| e.into())
            .with_context(|| format!("Failed to {} file: {}", operation, path.as_ref().display()))
    }

    fn with_tool_context(self, tool: &str) -> Result<T> {
        self.map_err(|e| e.into())
            .with_context(|| format!("Error running {}", tool))
    }
}

/// Specific error types for PyBundle operations
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// No source file given, or it does not name an existing regular file
    #[error("Select an existing Python source file first")]
    MissingSource,

    #[error("PyInstaller is not available and could not be installed: {reason}")]
    ToolMissing { reason: String },

    #[error("Packaging failed (exit code {}), see the log for details", exit_code_text(.code))]
    ProcessFailure { code: Option<i32> },

    #[error("Packaging was cancelled")]
    Cancelled,

    #[error("Failed to access settings file {path}: {reason}")]
    SettingsIo { path: String, reason: String },

    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

impl PackError {
    pub(crate) fn settings_io<P: AsRef<Path>>(path: P, reason: impl ToString) -> Self {
        PackError::SettingsIo {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}

fn exit_code_text(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}
