use std::sync::Arc;
use tracing::{error, info};
use trikv::cli::Cli;
use trikv::config::Config;
use trikv::error::Result;
use trikv::metrics::Metrics;
use trikv::server::{Handler, HttpServer, TcpServer, UdpServer};
use trikv::storage::{MemoryStorage, StorageBackend};
use trikv::telemetry::{TelemetryConfig, TelemetryService};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_sources(&cli)?;

    let telemetry = TelemetryService::start(TelemetryConfig {
        log_level: cli.log_level().to_string(),
        enable_metrics: config.metrics.enabled,
    })?;

    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
    let metrics = Arc::new(Metrics::from_config(&config.metrics));
    let handler = Handler::new(storage, Arc::clone(&metrics));

    let server = &config.server;
    let udp = UdpServer::bind(server.udp_addr(), handler.clone(), server.read_buffer_size)
        .await
        .map_err(|e| {
            error!(addr = %server.udp_addr(), error = %e, "udp bind failed");
            e
        })?;
    let http = HttpServer::bind(server.http_addr(), handler.clone(), server.shutdown_grace())
        .await
        .map_err(|e| {
            error!(addr = %server.http_addr(), error = %e, "http bind failed");
            e
        })?;
    let tcp = TcpServer::bind(server.tcp_addr(), handler, server.read_buffer_size)
        .await
        .map_err(|e| {
            error!(addr = %server.tcp_addr(), error = %e, "tcp bind failed");
            e
        })?;

    let udp = udp.start();
    let http = http.start();
    let tcp = tcp.start();
    metrics.start();
    info!("trikv ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutting down");

    udp.stop().await;
    http.stop().await;
    tcp.stop().await;
    metrics.stop().await;
    telemetry.shutdown();

    Ok(())
}
