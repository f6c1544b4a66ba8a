//! Locating and revealing packaging output

use crate::error::{Result, ResultExt};
use crate::options::ConversionOptions;
use std::path::{Path, PathBuf};
use anyhow::Context;
use std::process::{Command, ExitStatus};
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// Folder to show the user after a run: `dist/` inside the working
/// directory when it exists, otherwise the working directory itself
pub fn output_target(options: &ConversionOptions) -> Option<PathBuf> {
    locate_output(&options.working_dir())
}

pub fn locate_output(work_dir: &Path) -> Option<PathBuf> {
    let dist = work_dir.join("dist");
    if dist.is_dir() {
        Some(dist)
    } else if work_dir.is_dir() {
        Some(work_dir.to_path_buf())
    } else {
        None
    }
}

/// Open `path` in the host's file browser
pub fn open_in_file_browser(path: &Path) -> Result<()> {
    let opener = if cfg!(target_os = "windows") {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };

    info!("Opening {} with {}", path.display(), opener);
    spawn_detached(opener, path)?;
    Ok(())
}

/// Start `program path` and reap it on a background thread
fn spawn_detached(program: &str, path: &Path) -> Result<JoinHandle<Option<ExitStatus>>> {
    let mut child = Command::new(program)
        .arg(path)
        .spawn()
        .with_tool_context(program)?;

    let reaper = thread::Builder::new()
        .name("pybundle-opener".to_string())
        .spawn(move || match child.wait() {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("Failed to reap file browser: {}", e);
                None
            }
        })
        .context("Failed to spawn opener thread")?;
    Ok(reaper)
}
