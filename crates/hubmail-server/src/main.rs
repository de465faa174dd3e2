use std::sync::Arc;

use hubmail_server::{api, AppState, Mail, ServerConfig};
use hubmail_store::SqliteStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,hubmail_server=debug,hubmail_store=info")),
        )
        .init();

    let config = ServerConfig::from_env();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.http_addr,
        audience = %config.service_audience,
        "hubmail server starting"
    );

    // -----------------------------------------------------------------------
    // Mail service over the SQLite document store
    // -----------------------------------------------------------------------
    let store = match &config.database_path {
        Some(path) => SqliteStore::open_at(path)?,
        None => SqliteStore::open_default()?,
    };
    let mail = Mail::new(Arc::new(store));

    let http_addr = config.http_addr;
    let state = AppState {
        mail: Arc::new(mail),
        config: Arc::new(config),
    };

    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "mail API stopped");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
        }
    }

    Ok(())
}
