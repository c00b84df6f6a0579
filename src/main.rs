use std::{error::Error, path::PathBuf, sync::Arc};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gridquery::data::CompiledQueryCache;
use gridquery::meta::StaticMetaStore;
use gridquery::server::{self, AppState, Config, PgExecutor};

#[derive(Parser)]
struct ServerOptions {
    #[arg(long, env, default_value_t = 8080)]
    port: u16,
    /// Path to the deployment configuration
    #[arg(long, env, default_value = "gridquery.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = ServerOptions::parse();
    let config = Config::from_file(&options.config)?;

    let executor = PgExecutor::connect(&config.database_url).await?;

    let state = AppState {
        meta: Arc::new(StaticMetaStore::new(config.models, config.views)),
        executor: Arc::new(executor),
        cache: Arc::new(CompiledQueryCache::new()),
        defaults: config.query,
    };

    let router = server::router(state);

    let address = format!("0.0.0.0:{}", options.port).parse()?;

    tracing::info!("starting server on {address}");

    axum::Server::bind(&address)
        .serve(router.into_make_service())
        .await?;

    Ok(())
}
