//! fieldbook-intake - inbound document intake service
//!
//! Receives field-worker submissions from the messaging gateway, extracts
//! structured receipt data through the external vision service, reconciles
//! it against projects and spend categories, and persists the result with
//! an audit trail.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fieldbook_intake::config::IntakeConfig;
use fieldbook_intake::conversation::DefaultPatterns;
use fieldbook_intake::services::{GatewayMediaFetcher, VisionExtractor};
use fieldbook_intake::AppState;

#[derive(Debug, Parser)]
#[command(name = "fieldbook-intake", about = "Fieldbook inbound intake service")]
struct Cli {
    /// Data folder holding the database and stored media
    #[arg(long)]
    data_dir: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = IntakeConfig::resolve(cli.data_dir.as_deref(), cli.port)?;

    info!("Starting fieldbook-intake");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Data folder: {}", config.data_dir.display());

    let db_path = config.database_path();
    let db_pool = fieldbook_common::db::init::init_database(&db_path).await?;
    info!("Database ready: {}", db_path.display());

    let fetcher = Arc::new(GatewayMediaFetcher::new(&config.gateway)?);
    let extractor = Arc::new(VisionExtractor::new(config.extraction.clone())?);
    let patterns = Arc::new(DefaultPatterns);

    let bind = format!("{}:{}", config.bind_host, config.bind_port);
    let state = AppState::new(db_pool, config, fetcher, extractor, patterns);
    let app = fieldbook_intake::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Listening on http://{}", bind);
    info!("Webhook: http://{}/webhook/message", bind);

    axum::serve(listener, app).await?;

    Ok(())
}
