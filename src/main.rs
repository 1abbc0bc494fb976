use anyhow::Result;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use xkcd_sync_lib::infrastructure::{AppConfig, init_logging_with_config};

const CONFIG_PATH_ENV: &str = "XKCD_SYNC_CONFIG";
const RUN_ONCE_ENV: &str = "XKCD_SYNC_RUN_ONCE";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    init_logging_with_config(&config.logging)?;
    info!("Starting xkcd-sync (bucket '{}', database '{}')", config.storage.bucket, config.database.url);

    if std::env::var(RUN_ONCE_ENV).is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")) {
        return xkcd_sync_lib::run_once(config).await;
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        shutdown.cancel();
    });

    xkcd_sync_lib::run(config, cancel).await
}
