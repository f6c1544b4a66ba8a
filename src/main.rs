//! PyBundle - package Python programs with PyInstaller
//!
//! Command-line front-end: builds the PyInstaller command from arguments (or
//! a saved profile), runs it and mirrors its output on the terminal.

use anyhow::Context;
use pybundle::{
    command,
    config::Config,
    error::{PackError, Result},
    imports::detect_imports_in_file,
    progress::ProgressTracker,
    runner::{ConversionRunner, Outcome, RunEvent},
    settings::save_profile,
    toolchain::Toolchain,
};
use tracing::{error, info, warn};

fn main() -> Result<()> {
    // Parse configuration and initialize logging
    let config = Config::from_args().unwrap_or_else(|e| {
        eprintln!("Configuration error: {:#}", e);
        std::process::exit(1);
    });

    match run(&config) {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Packaging failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(config: &Config) -> Result<()> {
    let mut options = config.to_options()?;

    if config.detect_imports {
        let detected = detect_imports_in_file(&options.source)?;
        let added = options.hidden_imports.extend_new(&detected);
        println!(
            "Detected {} imported modules, added {} hidden imports",
            detected.len(),
            added
        );
    }

    if options.output_name.is_none() {
        options.output_name = options.default_output_name();
    }

    if let Some(path) = &config.save_profile {
        save_profile(path, &options)?;
        println!("Saved profile: {}", path.display());
    }

    for path in command::missing_data_paths(&options) {
        warn!("Skipping missing data path: {}", path.display());
    }

    let cmd = command::build(&options)?;
    let working_dir = options.working_dir();

    if config.dry_run {
        println!("{}", cmd);
        return Ok(());
    }

    let tracker = ProgressTracker::new(!config.no_progress);

    if !config.skip_install {
        let spinner = tracker.create_spinner("Checking PyInstaller...");
        match Toolchain::new(options.tool.clone()).ensure_installed() {
            Ok(version) => {
                ProgressTracker::finish_progress(spinner, &format!("PyInstaller {}", version))
            }
            Err(e) => {
                ProgressTracker::finish_with_error(spinner, "PyInstaller unavailable");
                return Err(e.into());
            }
        }
    }

    std::fs::create_dir_all(&working_dir)
        .with_context(|| format!("Failed to create {}", working_dir.display()))?;

    let pb = tracker.create_percent_progress("Packaging");
    let mut session = ConversionRunner::start(cmd, working_dir);

    while let Some(event) = session.recv() {
        match event {
            RunEvent::Log(line) => ProgressTracker::println(&pb, &line),
            RunEvent::Progress(percent) => ProgressTracker::set_percent(&pb, percent),
            RunEvent::Done { outcome, message } => {
                info!("Packaging ended: {:?}", outcome);
                if outcome.is_success() {
                    ProgressTracker::finish_progress(pb, &message);
                    println!("{}", message);
                    return Ok(());
                }

                ProgressTracker::finish_with_error(pb, &message);
                return match outcome {
                    Outcome::Cancelled => Err(PackError::Cancelled.into()),
                    // Already formatted from the process failure or launch error
                    _ => Err(anyhow::Error::msg(message)),
                };
            }
        }
    }

    anyhow::bail!("Packaging session ended without a result")
}
