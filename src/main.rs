use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crmserver::core::config::AppConfig;
use crmserver::core::shared::state::AppState;
use crmserver::core::shared::utils::{create_conn, run_migrations};
use crmserver::core::storage::{CrmStore, MemoryStore, PgStore};
use crmserver::email::build_notifier;
use crmserver::main_module::run_axum_server;

const USAGE: &str = "Usage: crmserver [--memory]\n\n  --memory   keep all data in process memory instead of PostgreSQL";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,crmserver=debug,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_store(config: &AppConfig, in_memory: bool) -> anyhow::Result<Arc<dyn CrmStore>> {
    if in_memory {
        warn!("Running with the in-memory store; data is lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let pool = create_conn(&config.database)?;
    run_migrations(&pool).map_err(|e| anyhow::anyhow!("{e}"))?;
    info!("Database ready (pool size {})", config.database.max_connections);
    Ok(Arc::new(PgStore::new(pool)))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut in_memory = false;
    for arg in &args {
        match arg.as_str() {
            "--memory" => in_memory = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {other}\n\n{USAGE}");
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("Unknown argument: {other}"),
                ));
            }
        }
    }

    dotenv().ok();
    init_logging();

    let config = AppConfig::load().map_err(|e| {
        error!("Configuration error: {e:#}");
        std::io::Error::other(e)
    })?;

    let store = open_store(&config, in_memory).map_err(|e| {
        error!("Failed to open store: {e:#}");
        std::io::Error::other(e)
    })?;

    let notifier = build_notifier(&config.email).map_err(|e| {
        error!("Failed to set up notifications: {e:#}");
        std::io::Error::other(e)
    })?;

    let app_state = AppState::new(config, store, notifier).map_err(|e| {
        error!("Failed to initialise application state: {e:#}");
        std::io::Error::other(e)
    })?;

    info!("Starting crmserver {}", env!("CARGO_PKG_VERSION"));
    run_axum_server(Arc::new(app_state)).await
}
