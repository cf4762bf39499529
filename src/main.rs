mod cli;

use anyhow::Context;
use search_intelligence::analytics::SearchAnalytics;
use search_intelligence::config::AppConfig;
use search_intelligence::database::{KvStore, SqliteStore};
use search_intelligence::logging;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    logging::init(&config.logging);

    let Some(command) = cli::parse_args() else {
        cli::print_usage();
        return Ok(());
    };

    config.prepare_storage_dir()?;
    let store: Arc<dyn KvStore> = Arc::new(
        SqliteStore::new(&config.storage.path, config.storage.pool_size, config.storage.quota_bytes)
            .with_context(|| format!("failed to open store at {}", config.storage.path.display()))?,
    );
    info!(path = %config.storage.path.display(), "storage ready");

    // Ctrl+C forces the pending analytics batch out before the process dies
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received");
            signal.cancel();
        }
    });

    let analytics = Arc::new(SearchAnalytics::with_shutdown_signal(
        store.clone(),
        config.analytics.clone(),
        shutdown,
    ));
    let engine = cli::build_engine(analytics.clone(), store, config.suggestions.clone());

    let ctx = cli::CliContext { analytics, engine };
    let result = cli::execute_cli_command(command, &ctx).await;
    let outcome = ctx.analytics.dispose();
    debug!(?outcome, "analytics disposed");

    result.map_err(Into::into)
}
