mod logging;

use std::path::PathBuf;

use clap::Parser;
use dbfuse_adapters::http::HttpQueryBackend;
use dbfuse_core::config::{ClientConfig, ConfigError, FileConfigStore};
use dbfuse_tui::{TuiError, TuiOptions};

#[derive(Debug, Parser)]
#[command(
    name = "dbfuse",
    version,
    about = "Run SQL through the dbfuse query service and browse paginated results"
)]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, env = "DBFUSE_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "DBFUSE_BACKEND_URL")]
    backend_url: Option<String>,
    #[arg(long, env = "DBFUSE_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,
    /// Target database; defaults to the first saved connection
    #[arg(long, short)]
    database: Option<String>,
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    page_size: Option<u32>,
    #[arg(long, env = "DBFUSE_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> Result<ClientConfig, ConfigError> {
        let store = match &self.config {
            Some(path) => FileConfigStore::load_from_path(path)?,
            None => FileConfigStore::load_default()?,
        };
        let mut config = store.into_config();

        if let Some(backend_url) = &self.backend_url {
            config.backend_url.clone_from(backend_url);
        }
        if let Some(auth_token) = &self.auth_token {
            config.auth_token = Some(auth_token.clone());
        }
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }
        Ok(config)
    }
}

fn run_app(
    cli: Cli,
    run_tui: impl FnOnce(TuiOptions, HttpQueryBackend) -> Result<(), TuiError>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.load_config()?;
    let backend = HttpQueryBackend::from_config(&config)?;
    tracing::info!(
        endpoint = backend.endpoint(),
        page_size = config.page_size,
        saved_connections = config.saved_connections.len(),
        "starting dbfuse"
    );

    run_tui(
        TuiOptions {
            config,
            database: cli.database,
        },
        backend,
    )?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let log_dir = cli.log_dir.clone().unwrap_or_else(logging::default_log_dir);
    let _log_guard = logging::init(&log_dir)?;
    run_app(cli, dbfuse_tui::run)
}
