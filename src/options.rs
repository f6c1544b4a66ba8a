//! Conversion options model
//!
//! This module holds the immutable option set a packaging run is built from,
//! along with the small value types that keep its fields in range.

use crate::error::PackError;
use std::path::{Path, PathBuf};

/// Environment variable overriding the interpreter used to launch PyInstaller
pub const PYTHON_ENV: &str = "PYBUNDLE_PYTHON";

/// How the packaging tool is launched: `<interpreter> -m PyInstaller`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub interpreter: String,
}

impl ToolInvocation {
    pub const MODULE: &'static str = "PyInstaller";

    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    /// Interpreter from `PYBUNDLE_PYTHON`, falling back to the platform default
    pub fn from_env() -> Self {
        match std::env::var(PYTHON_ENV) {
            Ok(value) if !value.trim().is_empty() => Self::new(value.trim()),
            _ => Self::default(),
        }
    }

    /// Leading tokens of every packaging command line
    pub fn prefix(&self) -> Vec<String> {
        vec![
            self.interpreter.clone(),
            "-m".to_string(),
            Self::MODULE.to_string(),
        ]
    }
}

impl Default for ToolInvocation {
    fn default() -> Self {
        if cfg!(windows) {
            Self::new("python")
        } else {
            Self::new("python3")
        }
    }
}

/// Bytecode optimisation level passed as `-O<n>`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct OptimizationLevel(u8);

impl OptimizationLevel {
    pub const MAX: u8 = 2;

    /// Build a level, saturating values above [`Self::MAX`]
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(0, Self::MAX as i64) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for OptimizationLevel {
    type Error = PackError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value > Self::MAX {
            return Err(PackError::InvalidOption(format!(
                "optimization level must be between 0 and {}, got {}",
                Self::MAX,
                value
            )));
        }
        Ok(Self(value))
    }
}

/// UPX compression level, 0 meaning "tool default"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    pub const MAX: u8 = 9;

    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(0, Self::MAX as i64) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for CompressionLevel {
    type Error = PackError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value > Self::MAX {
            return Err(PackError::InvalidOption(format!(
                "compression level must be between 0 and {}, got {}",
                Self::MAX,
                value
            )));
        }
        Ok(Self(value))
    }
}

/// Module names the packaging tool must bundle explicitly.
///
/// Keeps insertion order and rejects duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HiddenImports(Vec<String>);

impl HiddenImports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module name; returns `false` if it is blank or already present
    pub fn insert(&mut self, name: impl AsRef<str>) -> bool {
        let name = name.as_ref().trim();
        if name.is_empty() || self.contains(name) {
            return false;
        }
        self.0.push(name.to_string());
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|existing| existing != name);
        before != self.0.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|existing| existing == name)
    }

    /// Merge names that are not yet present, returning how many were added
    pub fn extend_new<I, S>(&mut self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter(|name| self.insert(name))
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

impl<S: AsRef<str>> FromIterator<S> for HiddenImports {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut imports = HiddenImports::new();
        imports.extend_new(iter);
        imports
    }
}

/// Everything a single packaging run is built from
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOptions {
    /// Python entry script
    pub source: PathBuf,

    /// Base name of the produced executable
    pub output_name: Option<String>,

    /// Root for `dist/`, `build/` and the generated `.spec`
    pub output_dir: Option<PathBuf>,

    /// Executable icon, ignored when the file does not exist
    pub icon: Option<PathBuf>,

    pub single_file: bool,
    pub windowed: bool,
    pub no_console: bool,
    pub clean: bool,
    pub no_confirm: bool,
    pub strip_debug: bool,

    pub optimization: OptimizationLevel,
    pub hidden_imports: HiddenImports,

    /// Extra files or folders bundled next to the program
    pub extra_data: Vec<PathBuf>,

    /// Use UPX compression
    pub compress: bool,
    pub compression_level: CompressionLevel,

    /// Free-form arguments appended before the source path
    pub extra_args: String,

    pub tool: ToolInvocation,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            output_name: None,
            output_dir: None,
            icon: None,
            single_file: true,
            windowed: false,
            no_console: false,
            clean: false,
            no_confirm: true,
            strip_debug: false,
            optimization: OptimizationLevel::default(),
            hidden_imports: HiddenImports::new(),
            extra_data: Vec::new(),
            compress: false,
            compression_level: CompressionLevel::default(),
            extra_args: String::new(),
            tool: ToolInvocation::default(),
        }
    }
}

impl ConversionOptions {
    pub fn new<P: Into<PathBuf>>(source: P) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Whether the source names an existing regular file
    pub fn has_valid_source(&self) -> bool {
        !self.source.as_os_str().is_empty() && self.source.is_file()
    }

    /// Output directory, treating an empty path as unset
    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty())
    }

    /// Output name, treating an empty string as unset
    pub fn output_name(&self) -> Option<&str> {
        self.output_name.as_deref().filter(|name| !name.is_empty())
    }

    /// Directory the packaging tool runs in: the output directory if set,
    /// otherwise the folder holding the source file
    pub fn working_dir(&self) -> PathBuf {
        if let Some(dir) = self.output_dir() {
            return dir.to_path_buf();
        }

        match self.source.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Suggested executable name derived from the source file stem
    pub fn default_output_name(&self) -> Option<String> {
        self.source
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_observed_profile_defaults() {
        let options = ConversionOptions::default();

        assert!(options.single_file);
        assert!(options.no_confirm);
        assert!(!options.windowed);
        assert!(!options.no_console);
        assert!(!options.clean);
        assert!(!options.strip_debug);
        assert!(!options.compress);
        assert_eq!(options.optimization.get(), 0);
        assert_eq!(options.compression_level.get(), 0);
    }

    #[test]
    fn test_hidden_imports_reject_duplicates() {
        let mut imports = HiddenImports::new();

        assert!(imports.insert("numpy"));
        assert!(imports.insert("pandas"));
        assert!(!imports.insert("numpy"));
        assert!(!imports.insert("   "));

        assert_eq!(imports.to_vec(), vec!["numpy", "pandas"]);
    }

    #[test]
    fn test_hidden_imports_extend_new_counts_additions() {
        let mut imports: HiddenImports = ["flask", "jinja2"].into_iter().collect();
        let added = imports.extend_new(["jinja2", "werkzeug", "flask"]);

        assert_eq!(added, 1);
        assert_eq!(imports.to_vec(), vec!["flask", "jinja2", "werkzeug"]);
        assert!(imports.remove("jinja2"));
        assert!(!imports.remove("jinja2"));
    }

    #[test]
    fn test_level_bounds() {
        assert!(OptimizationLevel::try_from(2).is_ok());
        assert!(OptimizationLevel::try_from(3).is_err());
        assert!(CompressionLevel::try_from(9).is_ok());
        assert!(CompressionLevel::try_from(10).is_err());

        assert_eq!(OptimizationLevel::clamped(7).get(), 2);
        assert_eq!(CompressionLevel::clamped(-1).get(), 0);
    }

    #[test]
    fn test_working_dir_prefers_output_dir() {
        let mut options = ConversionOptions::new("/projects/app/main.py");
        assert_eq!(options.working_dir(), PathBuf::from("/projects/app"));

        options.output_dir = Some(PathBuf::from("/tmp/out"));
        assert_eq!(options.working_dir(), PathBuf::from("/tmp/out"));

        options.output_dir = Some(PathBuf::new());
        assert_eq!(options.working_dir(), PathBuf::from("/projects/app"));
    }

    #[test]
    fn test_relative_source_runs_in_current_dir() {
        let options = ConversionOptions::new("main.py");
        assert_eq!(options.working_dir(), PathBuf::from("."));
        assert_eq!(options.default_output_name().as_deref(), Some("main"));
    }

    #[test]
    fn test_tool_prefix() {
        let tool = ToolInvocation::new("/usr/bin/python3.12");
        assert_eq!(tool.prefix(), vec!["/usr/bin/python3.12", "-m", "PyInstaller"]);
    }
}
