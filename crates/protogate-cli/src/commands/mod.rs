pub mod gen;
pub mod routes;
pub mod serve;

use anyhow::{Context, Result};
use clap::Args;
use protogate_client::HyperConnector;
use protogate_gateway::{Assembler, CorsConfig, GatewayConfig, RestGateway, RestGatewayBuilder};
use std::path::PathBuf;
use std::sync::Arc;

/// Where the gateway configuration comes from
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// TOML config file
    #[arg(short, long, env = "PROTOGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Descriptor tree root, overriding the config file
    #[arg(short, long, env = "PROTOGATE_DESCRIPTORS_DIR")]
    pub descriptors: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn load(&self) -> Result<GatewayConfig> {
        let mut config = match &self.config {
            Some(path) => GatewayConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => GatewayConfig::default(),
        };
        if let Some(dir) = &self.descriptors {
            config.descriptors_dir = dir.clone();
        }
        Ok(config)
    }
}

/// Assemble routes and mount them
pub fn build_gateway(config: &GatewayConfig) -> Result<RestGateway> {
    let connector = HyperConnector::new(config.rpc.channel_config());
    let routes = Assembler::from_config(config, Arc::new(connector))
        .assemble()
        .with_context(|| {
            format!(
                "Failed to assemble routes from {}",
                config.descriptors_dir.display()
            )
        })?;

    let http = &config.http;
    let mut builder = RestGatewayBuilder::new(routes)
        .title(&http.title)
        .version(&http.version)
        .base_path(&http.base_path)
        .cors(CorsConfig::from_origins(http.allowed_origins.iter().cloned()));
    if let Some(description) = &http.description {
        builder = builder.description(description);
    }

    let gateway = builder.build().context("Failed to mount routes")?;
    Ok(gateway)
}
