// ---------------------------------------------------------------------------
// serve-key-server command
// ---------------------------------------------------------------------------

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use inkwell_client::{CapabilityRegistry, ClientConfig, InMemoryPolicy, KeyService};
use inkwell_core::ibe;
use tracing::info;

pub async fn handle_serve(
    config: &ClientConfig,
    server_id: &str,
    master_key_path: &str,
    registry_path: &str,
    addr: SocketAddr,
) -> Result<()> {
    anyhow::ensure!(!config.package_id.is_empty(), "config has no package_id");

    let raw = std::fs::read_to_string(master_key_path)
        .with_context(|| format!("reading master key {master_key_path}"))?;
    let seed: [u8; 32] = hex::decode(raw.trim())
        .context("master key is not hex")?
        .try_into()
        .map_err(|_| anyhow::anyhow!("master key must be 32 bytes"))?;
    let master = ibe::keygen_from_seed(&seed);

    let registry = CapabilityRegistry::load(registry_path)?;
    info!(
        owner_caps = registry.owner_caps.len(),
        subscriptions = registry.subscriptions.len(),
        "capability registry loaded"
    );
    let policy = InMemoryPolicy::new(&config.package_id, registry);
    let service = Arc::new(KeyService::new(
        server_id,
        &config.package_id,
        master,
        Arc::new(policy),
    ));

    let public_key = service.service_info().public_key;
    let (local, handle) = inkwell_client::server::spawn(addr, service).await?;
    println!("Key server {server_id} on http://{local}");
    println!("Public key: {public_key}");

    tokio::select! {
        _ = handle => {}
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    Ok(())
}
