use clap::Parser;
use linedis::config::Config;
use linedis::pool::AdmissionPool;
use linedis::server::Server;
use linedis::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let config = Config::parse();
    let server = Server::bind(config).await?;

    tokio::spawn(shutdown_on_signal(server.pool()));

    server.run().await
}

async fn shutdown_on_signal(pool: AdmissionPool) {
    wait_for_signal().await;
    info!("Shutdown signal received, stopping the admission pool");
    pool.shutdown();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            return wait_for_ctrl_c().await;
        }
    };

    tokio::select! {
        _ = wait_for_ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        // Without a handler there is nothing to wait for, never trigger a shutdown.
        std::future::pending::<()>().await;
    }
}
