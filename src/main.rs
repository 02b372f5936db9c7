use anyhow::{Context, Result};
use orangepay_gateway::gateway::HostServices;
use orangepay_gateway::host::memory::MemoryHost;
use orangepay_gateway::host::Order;
use orangepay_gateway::{register, settings, webhook_server};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from config.toml and the environment
    let cfg = settings::Config::load().context("loading configuration")?;

    // Logging; the gateway's debug flag opens up request/response records
    let mut filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    if cfg.gateway.debug {
        filter = filter.add_directive("orangepay=debug".parse()?);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if cfg.gateway.api_token.is_empty() {
        tracing::error!("ORANGEPAY_API_TOKEN not set; exiting");
        return Ok(());
    }
    if !cfg.gateway.testmode {
        tracing::warn!("Sandbox host running against a live account; refunds are enabled");
    }

    // In-memory host seeded with the configured sandbox orders
    let base_url = Url::parse(&cfg.sandbox.base_url)
        .with_context(|| format!("invalid sandbox base_url {:?}", cfg.sandbox.base_url))?;
    let host = Arc::new(MemoryHost::new(base_url, cfg.sandbox.currency.clone()));
    for order in &cfg.sandbox.orders {
        host.insert(Order::from(order)).await;
    }
    tracing::info!(orders = cfg.sandbox.orders.len(), "Sandbox host ready");

    let registration = register(cfg.gateway.clone(), HostServices::from_host(host))?;
    if !registration.descriptor.enabled {
        tracing::warn!(
            currency = %cfg.sandbox.currency,
            api_url = %cfg.gateway.api_url,
            "Gateway registered disabled: check the API URL and the sandbox currency"
        );
    }

    webhook_server::run_webhook_server(cfg.server_port, registration.gateway).await
}
