//! Settings persistence
//!
//! Two documents are stored as pretty-printed JSON:
//!
//! * profiles, a flat snapshot of [`ConversionOptions`] the user saves and
//!   loads explicitly;
//! * the application settings file, which remembers the last directories
//!   used in file pickers.

use crate::error::PackError;
use crate::options::{
    CompressionLevel, ConversionOptions, HiddenImports, OptimizationLevel, ToolInvocation,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// On-disk profile layout. Unknown keys are ignored, missing keys default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileDocument {
    pub source: String,
    pub output_name: String,
    pub output_dir: String,
    pub icon: String,
    pub onefile: bool,
    pub windowed: bool,
    pub clean: bool,
    pub noconsole: bool,
    pub noconfirm: bool,
    pub strip: bool,
    pub extra_files: Vec<String>,
    pub hidden_imports: Vec<String>,
    pub optimize: i64,
    pub upx: bool,
    pub upx_level: i64,
    pub extra_args: String,
}

impl Default for ProfileDocument {
    fn default() -> Self {
        Self {
            source: String::new(),
            output_name: String::new(),
            output_dir: String::new(),
            icon: String::new(),
            onefile: true,
            windowed: false,
            clean: false,
            noconsole: false,
            noconfirm: true,
            strip: false,
            extra_files: Vec::new(),
            hidden_imports: Vec::new(),
            optimize: 0,
            upx: false,
            upx_level: 0,
            extra_args: String::new(),
        }
    }
}

impl From<&ConversionOptions> for ProfileDocument {
    fn from(options: &ConversionOptions) -> Self {
        Self {
            source: path_string(&options.source),
            output_name: options.output_name().unwrap_or_default().to_string(),
            output_dir: options.output_dir().map(path_string).unwrap_or_default(),
            icon: options.icon.as_deref().map(path_string).unwrap_or_default(),
            onefile: options.single_file,
            windowed: options.windowed,
            clean: options.clean,
            noconsole: options.no_console,
            noconfirm: options.no_confirm,
            strip: options.strip_debug,
            extra_files: options.extra_data.iter().map(|p| path_string(p)).collect(),
            hidden_imports: options.hidden_imports.to_vec(),
            optimize: options.optimization.get() as i64,
            upx: options.compress,
            upx_level: options.compression_level.get() as i64,
            extra_args: options.extra_args.clone(),
        }
    }
}

impl ProfileDocument {
    /// Options described by this profile, launched through `tool`.
    ///
    /// Out-of-range levels are clamped and duplicate imports dropped.
    pub fn into_options(self, tool: ToolInvocation) -> ConversionOptions {
        ConversionOptions {
            source: PathBuf::from(self.source),
            output_name: non_empty(self.output_name),
            output_dir: non_empty(self.output_dir).map(PathBuf::from),
            icon: non_empty(self.icon).map(PathBuf::from),
            single_file: self.onefile,
            windowed: self.windowed,
            no_console: self.noconsole,
            clean: self.clean,
            no_confirm: self.noconfirm,
            strip_debug: self.strip,
            optimization: OptimizationLevel::clamped(self.optimize),
            hidden_imports: self.hidden_imports.iter().collect::<HiddenImports>(),
            extra_data: self
                .extra_files
                .into_iter()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect(),
            compress: self.upx,
            compression_level: CompressionLevel::clamped(self.upx_level),
            extra_args: self.extra_args,
            tool,
        }
    }
}

/// Write `options` to `path` as a profile
pub fn save_profile(path: &Path, options: &ConversionOptions) -> Result<(), PackError> {
    let document = ProfileDocument::from(options);
    let json =
        serde_json::to_string_pretty(&document).map_err(|e| PackError::settings_io(path, e))?;
    fs::write(path, json).map_err(|e| PackError::settings_io(path, e))?;

    info!("Saved profile: {}", path.display());
    Ok(())
}

/// Read a profile from `path`. The interpreter comes from the environment.
pub fn load_profile(path: &Path) -> Result<ConversionOptions, PackError> {
    let contents = fs::read_to_string(path).map_err(|e| PackError::settings_io(path, e))?;
    let document: ProfileDocument =
        serde_json::from_str(&contents).map_err(|e| PackError::settings_io(path, e))?;

    info!("Loaded profile: {}", path.display());
    Ok(document.into_options(ToolInvocation::from_env()))
}

/// Directories last used in the file pickers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecentDirs {
    pub last_source_dir: Option<PathBuf>,
    pub last_output_dir: Option<PathBuf>,
}

impl RecentDirs {
    /// Remember the folder holding a picked source file
    pub fn remember_source(&mut self, source: &Path) {
        if let Some(parent) = source.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.last_source_dir = Some(parent.to_path_buf());
        }
    }

    pub fn remember_output(&mut self, dir: &Path) {
        self.last_output_dir = Some(dir.to_path_buf());
    }
}

/// Application-wide settings kept between sessions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    #[serde(flatten)]
    pub recent: RecentDirs,
}

impl AppSettings {
    pub const FILE_NAME: &'static str = "settings.json";

    /// `<config dir>/pybundle/settings.json`, or the current directory when
    /// the platform has no config dir
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("pybundle"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::FILE_NAME)
    }

    /// Load settings, falling back to defaults when absent or unreadable
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring unreadable settings: {}", e);
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, PackError> {
        let contents = fs::read_to_string(path).map_err(|e| PackError::settings_io(path, e))?;
        serde_json::from_str(&contents).map_err(|e| PackError::settings_io(path, e))
    }

    pub fn save(&self, path: &Path) -> Result<(), PackError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PackError::settings_io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| PackError::settings_io(path, e))?;
        fs::write(path, json).map_err(|e| PackError::settings_io(path, e))
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
