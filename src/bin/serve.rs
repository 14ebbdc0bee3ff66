use std::sync::Arc;
use std::time::Duration;

use depgit::config::AppConfig;
use depgit::control::Control;
use depgit::database::SqliteDatabase;
use depgit::serve::AppCore;
use depgit::ssh::SshServer;
use depgit::storage::ObjectStorage;
use tokio::select;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv::dotenv().ok();
    let tracing_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(tracing_level));
    tracing_subscriber::registry().with(fmt_layer).init();

    let cfg = AppConfig::load()?;
    info!(database = %cfg.database.path, "opening database");
    let database = Arc::new(SqliteDatabase::open(&cfg.database.path)?);
    let storage = Arc::new(ObjectStorage::from_config(&cfg.storage)?);
    let core = AppCore::with_sqlite(database, storage);

    let control = Control::new(cfg.server.shutdown_grace());
    if cfg.server.metrics_interval_secs > 0 {
        control.start_metrics_collection(Duration::from_secs(cfg.server.metrics_interval_secs));
    }

    let mut server = SshServer::new(core, cfg.ssh.clone(), control.clone());
    select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "ssh server failed");
                control.shutdown().await;
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received.");
        }
    }
    control.shutdown().await;
    Ok(())
}
