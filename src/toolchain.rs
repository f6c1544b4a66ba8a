//! Packaging tool detection and installation

use crate::error::{PackError, Result, ResultExt};
use crate::options::ToolInvocation;
use std::process::{Command, Output, Stdio};
use tracing::{info, warn};

/// Versions reported by the interpreter and the packaging tool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolReport {
    pub python: Option<String>,
    pub pyinstaller: Option<String>,
}

impl ToolReport {
    pub fn is_ready(&self) -> bool {
        self.python.is_some() && self.pyinstaller.is_some()
    }

    /// Human-readable status lines for a log pane
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        match &self.python {
            Some(version) => lines.push(format!("✅ Python: {}", version)),
            None => lines.push("❌ Python interpreter not found!".to_string()),
        }
        match &self.pyinstaller {
            Some(version) => lines.push(format!("✅ PyInstaller: {}", version)),
            None => lines.push(
                "⚠️ PyInstaller is not installed - it will be installed before packaging"
                    .to_string(),
            ),
        }
        lines
    }
}

/// Probes and installs the packaging tool for one interpreter
pub struct Toolchain {
    invocation: ToolInvocation,
}

impl Toolchain {
    pub fn new(invocation: ToolInvocation) -> Self {
        Self { invocation }
    }

    /// Query interpreter and PyInstaller versions. Missing tools are `None`.
    pub fn probe(&self) -> ToolReport {
        let python = self
            .run_quiet(&["--version"])
            .ok()
            .and_then(|output| version_text(&output));
        let pyinstaller = self.pyinstaller_version();

        let report = ToolReport {
            python,
            pyinstaller,
        };
        info!("Toolchain probe: {:?}", report);
        report
    }

    pub fn pyinstaller_version(&self) -> Option<String> {
        self.run_quiet(&["-m", ToolInvocation::MODULE, "--version"])
            .ok()
            .and_then(|output| version_text(&output))
    }

    /// Make sure PyInstaller can be launched, installing it with pip if needed.
    ///
    /// Returns the detected version on success.
    pub fn ensure_installed(&self) -> std::result::Result<String, PackError> {
        if let Some(version) = self.pyinstaller_version() {
            return Ok(version);
        }

        warn!(
            "PyInstaller not available for {}, installing with pip",
            self.invocation.interpreter
        );
        self.install().map_err(|e| PackError::ToolMissing {
            reason: format!("{:#}", e),
        })?;

        self.pyinstaller_version()
            .ok_or_else(|| PackError::ToolMissing {
                reason: "PyInstaller still not runnable after installation".to_string(),
            })
    }

    fn install(&self) -> Result<()> {
        let output = self.run_quiet(&["-m", "pip", "install", "pyinstaller"])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "pip install pyinstaller exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }
        info!("Installed PyInstaller");
        Ok(())
    }

    fn run_quiet(&self, args: &[&str]) -> Result<Output> {
        Command::new(&self.invocation.interpreter)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .with_tool_context(&self.invocation.interpreter)
    }
}

/// First non-empty line of a successful command's stdout (or stderr, where
/// older interpreters print `--version`)
fn version_text(output: &Output) -> Option<String> {
    if !output.status.success() {
        return None;
    }
    [&output.stdout, &output.stderr]
        .iter()
        .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
        .find(|text| !text.is_empty())
        .and_then(|text| text.lines().next().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_interpreter_probe() {
        let toolchain = Toolchain::new(ToolInvocation::new("pybundle-missing-python-xyz"));
        let report = toolchain.probe();

        assert_eq!(report, ToolReport::default());
        assert!(!report.is_ready());
    }

    #[test]
    fn test_missing_interpreter_is_tool_missing() {
        let toolchain = Toolchain::new(ToolInvocation::new("pybundle-missing-python-xyz"));
        assert!(matches!(
            toolchain.ensure_installed(),
            Err(PackError::ToolMissing { .. })
        ));
    }

    #[test]
    fn test_summary_lines() {
        let report = ToolReport {
            python: Some("Python 3.12.1".to_string()),
            pyinstaller: None,
        };
        let lines = report.summary_lines();

        assert_eq!(lines[0], "✅ Python: Python 3.12.1");
        assert!(lines[1].contains("not installed"));
    }
}
