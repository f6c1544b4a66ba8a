//! Configuration management for PyBundle
//!
//! This module handles CLI argument parsing, logging setup and turning the
//! parsed arguments into [`ConversionOptions`].

use crate::options::{CompressionLevel, ConversionOptions, OptimizationLevel, ToolInvocation};
use crate::settings::load_profile;
use anyhow::{Context, Result};
use clap::builder::styling;
use clap::{value_parser, Arg, ArgAction, ArgMatches, ColorChoice, Command};
use std::path::PathBuf;
use tracing::info;

/// Build the CLI command
pub fn build_cli() -> Command {
    let styles = styling::Styles::styled()
        .header(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .usage(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .literal(styling::AnsiColor::Blue.on_default() | styling::Effects::BOLD)
        .placeholder(styling::AnsiColor::Cyan.on_default());

    Command::new("pybundle")
        .about("PyBundle - Package Python programs into standalone executables with PyInstaller")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("source")
                .help("Python entry script to package")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("profile")
                .long("profile")
                .help("Load options from a saved JSON profile; command-line options override it")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("save_profile")
                .long("save-profile")
                .help("Save the resulting options to a JSON profile")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("python")
                .long("python")
                .help("Python interpreter used to run PyInstaller (default: $PYBUNDLE_PYTHON or python3)")
                .value_parser(value_parser!(String)),
        )
        .arg(
            Arg::new("name")
                .short('n')
                .long("name")
                .help("Name of the produced executable")
                .value_parser(value_parser!(String)),
        )
        .arg(
            Arg::new("output_dir")
                .short('o')
                .long("output-dir")
                .help("Directory receiving dist/, build/ and the .spec file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("icon")
                .short('i')
                .long("icon")
                .help("Icon file for the executable")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("onefile")
                .long("onefile")
                .help("Bundle everything into a single executable (default)")
                .action(ArgAction::SetTrue)
                .overrides_with("no_onefile"),
        )
        .arg(
            Arg::new("no_onefile")
                .long("no-onefile")
                .help("Produce a folder instead of a single executable")
                .action(ArgAction::SetTrue)
                .overrides_with("onefile"),
        )
        .arg(
            Arg::new("windowed")
                .long("windowed")
                .help("Do not open a console window for GUI programs")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("noconsole")
                .long("noconsole")
                .help("Hide the console window")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("clean")
                .long("clean")
                .help("Clear PyInstaller caches before building")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("noconfirm")
                .long("noconfirm")
                .help("Replace previous output without asking (default)")
                .action(ArgAction::SetTrue)
                .overrides_with("no_noconfirm"),
        )
        .arg(
            Arg::new("no_noconfirm")
                .long("no-noconfirm")
                .help("Let PyInstaller ask before replacing previous output")
                .action(ArgAction::SetTrue)
                .overrides_with("noconfirm"),
        )
        .arg(
            Arg::new("strip")
                .long("strip")
                .help("Strip debug symbols from binaries")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("add_data")
                .long("add-data")
                .help("Extra file or folder to bundle (repeatable)")
                .value_parser(value_parser!(PathBuf))
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("hidden_import")
                .long("hidden-import")
                .help("Module PyInstaller cannot detect on its own (repeatable)")
                .value_parser(value_parser!(String))
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("detect_imports")
                .long("detect-imports")
                .help("Scan the source for imports and add them as hidden imports")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("optimize")
                .short('O')
                .long("optimize")
                .help("Bytecode optimisation level")
                .value_parser(value_parser!(u8).range(0..=OptimizationLevel::MAX as i64)),
        )
        .arg(
            Arg::new("upx")
                .long("upx")
                .help("Compress binaries with UPX")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("upx_level")
                .long("upx-level")
                .help("UPX compression level, 0 for the tool default")
                .value_parser(value_parser!(u8).range(0..=CompressionLevel::MAX as i64)),
        )
        .arg(
            Arg::new("extra_args")
                .long("extra-args")
                .help("Additional PyInstaller arguments, split on whitespace")
                .value_parser(value_parser!(String))
                .allow_hyphen_values(true),
        )
        .arg(
            Arg::new("dry_run")
                .long("dry-run")
                .help("Print the PyInstaller command without running it")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("skip_install")
                .long("skip-install")
                .help("Do not try to install PyInstaller when it is missing")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no_progress")
                .long("no-progress")
                .help("Disable progress indicators")
                .action(ArgAction::SetTrue),
        )
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Entry script, overriding the profile's
    pub source: Option<PathBuf>,

    /// Profile supplying base options
    pub profile: Option<PathBuf>,

    /// Where to save the resulting options
    pub save_profile: Option<PathBuf>,

    /// Interpreter override
    pub python: Option<String>,

    pub name: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub icon: Option<PathBuf>,

    /// Option flags; `None` leaves the profile or default value alone
    pub single_file: Option<bool>,
    pub windowed: Option<bool>,
    pub no_console: Option<bool>,
    pub clean: Option<bool>,
    pub no_confirm: Option<bool>,
    pub strip_debug: Option<bool>,

    pub add_data: Vec<PathBuf>,
    pub hidden_imports: Vec<String>,
    pub optimize: Option<u8>,
    pub upx: Option<bool>,
    pub upx_level: Option<u8>,
    pub extra_args: Option<String>,

    pub detect_imports: bool,
    pub dry_run: bool,
    pub skip_install: bool,
    pub verbose: bool,
    pub no_progress: bool,
}

impl Config {
    /// Parse process arguments and initialise logging
    pub fn from_args() -> Result<Self> {
        let matches = build_cli().get_matches();
        let config = Self::from_matches(&matches);

        init_logging(config.verbose);

        if config.verbose {
            info!("Configuration: {:?}", config);
        }

        Ok(config)
    }

    pub fn from_matches(matches: &ArgMatches) -> Self {
        let set = |id: &str| matches.get_flag(id).then_some(true);
        let either = |on: &str, off: &str| {
            if matches.get_flag(off) {
                Some(false)
            } else {
                set(on)
            }
        };

        Config {
            source: matches.get_one::<PathBuf>("source").cloned(),
            profile: matches.get_one::<PathBuf>("profile").cloned(),
            save_profile: matches.get_one::<PathBuf>("save_profile").cloned(),
            python: matches.get_one::<String>("python").cloned(),
            name: matches.get_one::<String>("name").cloned(),
            output_dir: matches.get_one::<PathBuf>("output_dir").cloned(),
            icon: matches.get_one::<PathBuf>("icon").cloned(),
            single_file: either("onefile", "no_onefile"),
            windowed: set("windowed"),
            no_console: set("noconsole"),
            clean: set("clean"),
            no_confirm: either("noconfirm", "no_noconfirm"),
            strip_debug: set("strip"),
            add_data: matches
                .get_many::<PathBuf>("add_data")
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
            hidden_imports: matches
                .get_many::<String>("hidden_import")
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
            optimize: matches.get_one::<u8>("optimize").copied(),
            upx: set("upx"),
            upx_level: matches.get_one::<u8>("upx_level").copied(),
            extra_args: matches.get_one::<String>("extra_args").cloned(),
            detect_imports: matches.get_flag("detect_imports"),
            dry_run: matches.get_flag("dry_run"),
            skip_install: matches.get_flag("skip_install"),
            verbose: matches.get_flag("verbose"),
            no_progress: matches.get_flag("no_progress"),
        }
    }

    /// Interpreter to launch PyInstaller with
    pub fn tool_invocation(&self) -> ToolInvocation {
        match &self.python {
            Some(python) => ToolInvocation::new(python.clone()),
            None => ToolInvocation::from_env(),
        }
    }

    /// Options from the profile (or defaults) with command-line values applied
    pub fn to_options(&self) -> Result<ConversionOptions> {
        let mut options = match &self.profile {
            Some(path) => load_profile(path)
                .with_context(|| format!("Failed to load profile {}", path.display()))?,
            None => ConversionOptions::default(),
        };

        if self.python.is_some() || self.profile.is_none() {
            options.tool = self.tool_invocation();
        }

        if let Some(source) = &self.source {
            options.source = source.clone();
        }
        if let Some(name) = &self.name {
            options.output_name = Some(name.clone());
        }
        if let Some(dir) = &self.output_dir {
            options.output_dir = Some(dir.clone());
        }
        if let Some(icon) = &self.icon {
            options.icon = Some(icon.clone());
        }

        let flags = [
            (self.single_file, &mut options.single_file),
            (self.windowed, &mut options.windowed),
            (self.no_console, &mut options.no_console),
            (self.clean, &mut options.clean),
            (self.no_confirm, &mut options.no_confirm),
            (self.strip_debug, &mut options.strip_debug),
            (self.upx, &mut options.compress),
        ];
        for (value, target) in flags {
            if let Some(value) = value {
                *target = value;
            }
        }

        options.extra_data.extend(self.add_data.iter().cloned());
        options.hidden_imports.extend_new(&self.hidden_imports);

        if let Some(level) = self.optimize {
            options.optimization = OptimizationLevel::try_from(level)?;
        }
        if let Some(level) = self.upx_level {
            options.compression_level = CompressionLevel::try_from(level)?;
        }
        if let Some(args) = &self.extra_args {
            options.extra_args = args.clone();
        }

        Ok(options)
    }
}

/// Set up tracing. `RUST_LOG` takes precedence over the verbose flag.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose { "info" } else { "off" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
