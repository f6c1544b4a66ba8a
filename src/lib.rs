//! PyBundle - package Python programs into standalone executables
//!
//! The library turns a [`ConversionOptions`] value into a PyInstaller command
//! line ([`command::build`]) and runs it on a worker thread
//! ([`ConversionRunner`]), streaming log lines and a progress estimate back
//! over a channel. The `pybundle` and `pybundle-gui` binaries are thin
//! front-ends over these two pieces.

pub mod command;
pub mod config;
pub mod error;
pub mod imports;
pub mod options;
pub mod output;
pub mod progress;
pub mod runner;
pub mod settings;
pub mod toolchain;

pub use command::{build, CommandLine};
pub use config::Config;
pub use error::{PackError, Result};
pub use options::{ConversionOptions, HiddenImports, ToolInvocation};
pub use runner::{ConversionRunner, Outcome, RunEvent, SessionHandle, SessionState};
