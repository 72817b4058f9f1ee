use clap::Parser;
use rift_dev_proxy::config::Config;
use rift_dev_proxy::proxy::{DevProxyServer, ProxyTable};
use rift_dev_proxy::retry::RetryPlugin;
use tracing::info;

/// Rift dev proxy - retries proxied requests while the upstream starts
#[derive(Parser, Debug)]
#[command(name = "rift-dev-proxy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "RIFT_DEV_PROXY_CONFIG")]
    config: String,

    /// Listen host (overrides listen.host)
    #[arg(long, env = "RIFT_DEV_PROXY_HOST")]
    host: Option<String>,

    /// Listen port (overrides listen.port)
    #[arg(short, long, env = "RIFT_DEV_PROXY_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::from_file(&args.config)?;
    if let Some(host) = args.host {
        config.listen.host = host;
    }
    if let Some(port) = args.port {
        config.listen.port = port;
    }
    info!("Loaded {} proxy routes from {}", config.proxy.len(), args.config);

    let table: ProxyTable = ProxyTable::from_config(&config)?;
    let table = RetryPlugin::new(config.retry.clone()).apply(table);
    let server = DevProxyServer::bind(&config, table).await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}
