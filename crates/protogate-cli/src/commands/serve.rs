//! Serve command

use super::{build_gateway, ConfigArgs};
use anyhow::{Context, Result};
use clap::Args;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub source: ConfigArgs,

    /// Address to listen on, overriding the config file
    #[arg(short, long, env = "PROTOGATE_LISTEN")]
    pub listen: Option<SocketAddr>,
}

pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = args.source.load()?;
    if let Some(listen) = args.listen {
        config.http.listen = listen;
    }

    // assembly errors surface before the listener is bound
    let gateway = build_gateway(&config)?;
    let routes = gateway.routes().len();

    let listener = TcpListener::bind(config.http.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.http.listen))?;
    info!(listen = %config.http.listen, routes, "protogate listening");

    axum::serve(listener, gateway.router())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("protogate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}
