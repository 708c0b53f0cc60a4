//! `storefront` operator binary.

mod commands;

use clap::Parser;
use tracing::{error, info};

use storefront_infra::{Config, InMemoryStore, PostgresStore};

use crate::commands::Cli;

#[tokio::main]
async fn main() {
    storefront_observability::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(error = %e, "command failed");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresStore::connect(url, config.database_max_connections).await?;
            store.ensure_schema().await?;
            info!("using postgres store");
            commands::execute(store, &config, cli).await
        }
        None => {
            info!("DATABASE_URL not set, using in-memory store");
            commands::execute(InMemoryStore::arc(), &config, cli).await
        }
    }
}
