//! Inkwell command line.
//!
//! Commands:
//!   keygen            Generate a wallet or key-server master key
//!   address           Print the wallet address
//!   encrypt           Seal a file for the configured key servers
//!   decrypt           Fetch, collect key shares and decrypt a manifest of files
//!   serve-key-server  Run a key server over a local capability registry

mod cli;
mod decrypt;
mod serve;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use inkwell_client::{ClientConfig, LocalWallet, Wallet};
use inkwell_core::ibe;
use inkwell_core::object::{self, ObjectId, ServicePublicKey};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, KeyKind};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => {
            ClientConfig::load(path).with_context(|| format!("loading config {path}"))?
        }
        None => ClientConfig::default(),
    };

    match cli.command {
        Commands::Keygen { kind, out } => keygen(kind, &out),
        Commands::Address => {
            let wallet = LocalWallet::from_hex_file(&cli.wallet)?;
            println!("{}", wallet.address());
            Ok(())
        }
        Commands::Encrypt {
            file,
            collection,
            threshold,
            out,
        } => encrypt(&config, &file, &collection, threshold, &out),
        Commands::Decrypt {
            manifest,
            collection,
            owner_cap,
            subscription,
            payment_method,
            out_dir,
        } => {
            let wallet = LocalWallet::from_hex_file(&cli.wallet)?;
            let role = decrypt::role_from_flags(owner_cap, subscription, payment_method)?;
            decrypt::handle_decrypt(
                &config,
                &wallet,
                decrypt::DecryptArgs {
                    manifest: &manifest,
                    collection: &collection,
                    role,
                    out_dir: &out_dir,
                },
            )
            .await
        }
        Commands::ServeKeyServer {
            server_id,
            master_key,
            registry,
            listen,
        } => {
            let addr: SocketAddr = listen
                .parse()
                .with_context(|| format!("invalid listen address {listen}"))?;
            serve::handle_serve(&config, &server_id, &master_key, &registry, addr).await
        }
    }
}

fn keygen(kind: KeyKind, out: &str) -> Result<()> {
    match kind {
        KeyKind::Wallet => {
            let wallet = LocalWallet::generate();
            std::fs::write(out, wallet.secret_hex()).with_context(|| format!("writing {out}"))?;
            println!("Wallet key written to {out}");
            println!("Address: {}", wallet.address());
        }
        KeyKind::KeyServer => {
            let mut seed = [0u8; 32];
            rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut seed);
            let master = ibe::keygen_from_seed(&seed);
            std::fs::write(out, hex::encode(seed)).with_context(|| format!("writing {out}"))?;
            println!("Key-server master key written to {out}");
            println!(
                "Public key: {}",
                hex::encode(ibe::serialize_public_key(&master.pk))
            );
        }
    }
    Ok(())
}

fn encrypt(
    config: &ClientConfig,
    file: &str,
    collection: &str,
    threshold: u8,
    out: &str,
) -> Result<()> {
    anyhow::ensure!(!config.package_id.is_empty(), "config has no package_id");
    anyhow::ensure!(!config.key_servers.is_empty(), "config lists no key servers");

    let servers = config
        .key_servers
        .iter()
        .map(|ks| {
            Ok(ServicePublicKey {
                server_id: ks.server_id.clone(),
                public_key: ks.decode_public_key()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let plaintext = std::fs::read(file).with_context(|| format!("reading {file}"))?;
    let id = ObjectId::for_collection(collection)?;
    let sealed = object::seal(&config.package_id, id, threshold, &servers, &plaintext)?;
    std::fs::write(out, sealed.to_bytes()).with_context(|| format!("writing {out}"))?;

    println!("=== ENCRYPT ===");
    println!("Object id: {}", sealed.id);
    println!("Threshold: {threshold} of {}", servers.len());
    println!("Output:    {out}");
    Ok(())
}
