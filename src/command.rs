//! PyInstaller command construction
//!
//! Maps a [`ConversionOptions`] value onto the exact, ordered token list the
//! packaging tool is invoked with. The order is part of the contract: every
//! rule appends to the list in a fixed position so toggling one option never
//! moves the tokens produced by another.

use crate::error::PackError;
use crate::options::ConversionOptions;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Separator between source and destination in `--add-data`
pub const DATA_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// Ordered command-line tokens for one packaging run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    tokens: Vec<String>,
}

impl CommandLine {
    /// Wrap an explicit token list. The first token is the program.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn program(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    pub fn args(&self) -> &[String] {
        self.tokens.get(1..).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Process builder for these tokens running in `working_dir`
    pub fn to_command(&self, working_dir: &Path) -> Option<Command> {
        let program = self.program()?;
        let mut cmd = Command::new(program);
        cmd.args(self.args()).current_dir(working_dir);
        Some(cmd)
    }

    pub fn into_tokens(self) -> Vec<String> {
        self.tokens
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens.join(" "))
    }
}

/// Build the packaging command for `options`.
///
/// Fails with [`PackError::MissingSource`] when the source path is empty or
/// does not name an existing regular file. Icons and extra data paths that no
/// longer exist are dropped without error.
pub fn build(options: &ConversionOptions) -> Result<CommandLine, PackError> {
    if !options.has_valid_source() {
        return Err(PackError::MissingSource);
    }

    let mut tokens = options.tool.prefix();

    let flags = [
        (options.single_file, "--onefile"),
        (options.windowed, "--windowed"),
        (options.no_console, "--noconsole"),
        (options.clean, "--clean"),
        (options.no_confirm, "--noconfirm"),
        (options.strip_debug, "--strip"),
    ];
    tokens.extend(
        flags
            .iter()
            .filter(|(enabled, _)| *enabled)
            .map(|(_, flag)| flag.to_string()),
    );

    if let Some(name) = options.output_name() {
        tokens.push("--name".to_string());
        tokens.push(name.to_string());
    }

    if let Some(icon) = options.icon.as_deref() {
        if icon.is_file() {
            tokens.push("--icon".to_string());
            tokens.push(path_token(icon));
        } else {
            debug!("Skipping missing icon: {}", icon.display());
        }
    }

    if let Some(dir) = options.output_dir() {
        tokens.push("--distpath".to_string());
        tokens.push(path_token(&dir.join("dist")));
        tokens.push("--workpath".to_string());
        tokens.push(path_token(&dir.join("build")));
        tokens.push("--specpath".to_string());
        tokens.push(path_token(dir));
    }

    for path in &options.extra_data {
        match add_data_spec(path) {
            Some(spec) => {
                tokens.push("--add-data".to_string());
                tokens.push(spec);
            }
            None => debug!("Skipping missing data path: {}", path.display()),
        }
    }

    for module in options.hidden_imports.iter() {
        tokens.push("--hidden-import".to_string());
        tokens.push(module.to_string());
    }

    let level = options.optimization.get();
    if level > 0 {
        tokens.push(format!("-O{}", level));
    }

    if options.compress {
        tokens.push("--upx-dir=upx".to_string());
        let level = options.compression_level.get();
        if level > 0 {
            tokens.push(format!("--upx-level={}", level));
        }
    } else {
        tokens.push("--noupx".to_string());
    }

    tokens.extend(options.extra_args.split_whitespace().map(str::to_string));

    tokens.push(path_token(&options.source));

    Ok(CommandLine { tokens })
}

/// `<path><sep><basename>` for an existing file or folder
fn add_data_spec(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }
    let dest = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string());
    Some(format!("{}{}{}", path_token(path), DATA_SEPARATOR, dest))
}

fn path_token(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Paths in `extra_data` that would currently be skipped
pub fn missing_data_paths(options: &ConversionOptions) -> Vec<PathBuf> {
    options
        .extra_data
        .iter()
        .filter(|path| !path.exists())
        .cloned()
        .collect()
}
