//! Log setup for the terminal client.
//!
//! Stdout belongs to the interactive view, so terminal logging goes to stderr and the
//! default destination is `./marketplace.log`.

use std::fs::File;

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

const LOG_FILE: &str = "./marketplace.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogDestination {
    /// ./marketplace.log, truncated at startup.
    #[default]
    File,
    /// stderr.
    Terminal,
    Both,
    Off,
}

impl LogDestination {
    fn wants_file(self) -> bool {
        matches!(self, LogDestination::File | LogDestination::Both)
    }

    fn wants_terminal(self) -> bool {
        matches!(self, LogDestination::Terminal | LogDestination::Both)
    }
}

/// Installs the global logger. `verbose` lowers the threshold from info to debug.
pub fn initialize(destination: LogDestination, verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let config = build_config();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    if destination.wants_terminal() {
        loggers.push(TermLogger::new(
            level,
            config.clone(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ));
    }
    if destination.wants_file() {
        match File::create(LOG_FILE) {
            Ok(file) => loggers.push(WriteLogger::new(level, config, file)),
            Err(err) => eprintln!("Warning: Could not create log file at {LOG_FILE}: {err}"),
        }
    }
    if loggers.is_empty() {
        return;
    }

    let _ = CombinedLogger::init(loggers);
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("reqwest")
        .add_filter_ignore_str("rustls")
        .build()
}
