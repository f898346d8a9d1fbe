use kubetcd_api::config::KubetcdConfig;
use kubetcd_api::db::Database;
use kubetcd_api::encryption::{CredentialVault, EncryptionKey};
use kubetcd_api::kubernetes::ClusterGateway;
use kubetcd_api::shutdown::ShutdownCoordinator;
use kubetcd_api::{routes, AppState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "--sample-config") {
        print!("{}", KubetcdConfig::generate_sample());
        return Ok(());
    }

    if std::env::args().any(|arg| arg == "--generate-key") {
        println!("{}", EncryptionKey::generate().encode());
        return Ok(());
    }

    let config = KubetcdConfig::load()?;
    config.validate()?;

    // Flushes the log file on drop
    let _log_guard = config
        .logging
        .init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting kubetcd API server v{}", env!("CARGO_PKG_VERSION"));

    let key = EncryptionKey::from_secret_or_generate(config.encryption.key.as_deref());
    if key.is_ephemeral() {
        warn!("Stored kubeconfigs will be unreadable after a restart");
    }
    let vault = CredentialVault::new(key);

    let database = Database::new(&config.database.url, config.database.max_connections).await?;
    database.migrate().await?;
    info!("Database ready at {}", config.database.url);

    let gateway = ClusterGateway::kube(config.etcd.connect_timeout());
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = Arc::new(AppState::new(&config, database, gateway, vault));
    let app = routes::router(state.clone());

    let shutdown_coordinator = ShutdownCoordinator::new();
    let signal_listener = shutdown_coordinator.clone();
    tokio::spawn(async move {
        signal_listener.listen_for_signals().await;
    });

    info!("Kubetcd API listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_coordinator.signal())
        .await?;

    state.database.close().await;
    info!("Shutdown complete");

    Ok(())
}
