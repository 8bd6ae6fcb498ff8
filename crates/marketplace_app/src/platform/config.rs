use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use marketplace_core::{SearchSettings, DEFAULT_DEBOUNCE, DEFAULT_PAGE_SIZE};
use marketplace_engine::ClientSettings;
use serde::{Deserialize, Serialize};

use super::logging::LogDestination;

const CONFIG_FILENAME: &str = "marketplace.ron";
const CREDENTIALS_FILENAME: &str = "marketplace_session.json";

/// Terminal client for the marketplace search API.
#[derive(Debug, Default, Parser)]
#[command(name = "marketplace", version, about)]
pub struct Cli {
    /// RON configuration file (default: ./marketplace.ron if present).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// API base URL, e.g. http://localhost:5000/api.
    #[arg(long)]
    pub base_url: Option<String>,
    /// Per-request timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
    /// Quiet period after the last filter edit before searching.
    #[arg(long)]
    pub debounce_ms: Option<u64>,
    /// Results per page.
    #[arg(long)]
    pub page_size: Option<u32>,
    /// File holding the persisted session.
    #[arg(long)]
    pub credentials: Option<PathBuf>,
    /// Initial query string, as found in a shared URL.
    #[arg(long)]
    pub query: Option<String>,
    /// Where log lines go.
    #[arg(long, value_enum)]
    pub log: Option<LogDestination>,
    /// Log at debug level.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub debounce_ms: u64,
    pub page_size: u32,
    pub credentials_path: PathBuf,
    pub initial_query: Option<String>,
    pub log: LogDestination,
    pub verbose: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let client = ClientSettings::from_env();
        Self {
            base_url: client.base_url,
            timeout_ms: duration_ms(client.timeout),
            debounce_ms: duration_ms(DEFAULT_DEBOUNCE),
            page_size: DEFAULT_PAGE_SIZE,
            credentials_path: PathBuf::from(CREDENTIALS_FILENAME),
            initial_query: None,
            log: LogDestination::default(),
            verbose: false,
        }
    }
}

impl AppConfig {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("reading config {}", path.display()))
            }
        };
        ron::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(base_url) = &cli.base_url {
            self.base_url.clone_from(base_url);
        }
        if let Some(timeout_ms) = cli.timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        if let Some(debounce_ms) = cli.debounce_ms {
            self.debounce_ms = debounce_ms;
        }
        if let Some(page_size) = cli.page_size {
            self.page_size = page_size;
        }
        if let Some(credentials) = &cli.credentials {
            self.credentials_path.clone_from(credentials);
        }
        if cli.query.is_some() {
            self.initial_query.clone_from(&cli.query);
        }
        if let Some(log) = cli.log {
            self.log = log;
        }
        self.verbose |= cli.verbose;
        self
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            base_url: self.base_url.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            ..ClientSettings::default()
        }
    }

    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            debounce: Duration::from_millis(self.debounce_ms),
            page_size: self.page_size.max(1),
        }
    }
}

pub fn resolve(cli: &Cli) -> anyhow::Result<AppConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILENAME));
    Ok(AppConfig::load(&path)?.with_overrides(cli))
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
