use anyhow::Result;
use hyperion::api::client::HttpStatusApi;
use hyperion::config::Config;
use hyperion::monitor::FleetMonitor;
use hyperion::notify::LocalNotificationGateway;
use hyperion::storage::FileStore;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid config: {}", e))?;

    hyperion::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Hyperion solar fleet monitor starting up");

    let api = Arc::new(HttpStatusApi::new(&config.api)?);
    let store = Arc::new(FileStore::open(&config.storage.state_file)?);
    let gateway = Arc::new(LocalNotificationGateway::new(
        config.notifications.permission_granted,
    ));

    let mut monitor = FleetMonitor::new(config.clone(), api, store, gateway);
    let handle = monitor.handle();
    let shutdown = monitor.shutdown_handle();

    // Serve the HTTP API alongside the monitor loop
    let web_config = config.clone();
    let web_task = tokio::spawn(async move {
        if let Err(e) = hyperion::web::serve(handle, web_config).await {
            error!("Web server error: {}", e);
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            shutdown.send(()).ok();
        }
    });

    let result = monitor.run().await;
    web_task.abort();

    match result {
        Ok(()) => {
            info!("Monitor shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Monitor failed with error: {}", e);
            Err(anyhow::anyhow!("Monitor error: {}", e))
        }
    }
}
