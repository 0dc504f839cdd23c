// ---------------------------------------------------------------------------
// decrypt command
// ---------------------------------------------------------------------------

use std::path::Path;

use anyhow::{bail, Context, Result};
use inkwell_client::{ClientConfig, FileDecryptionRecord, LocalWallet, Orchestrator, Role, SessionManager};
use tracing::info;

pub struct DecryptArgs<'a> {
    pub manifest: &'a str,
    pub collection: &'a str,
    pub role: Role,
    pub out_dir: &'a str,
}

pub fn role_from_flags(
    owner_cap: Option<String>,
    subscription: Option<String>,
    payment_method: Option<String>,
) -> Result<Role> {
    match (owner_cap, subscription, payment_method) {
        (Some(owner_cap_id), None, None) => Ok(Role::Owner { owner_cap_id }),
        (None, Some(subscription_cap_id), Some(payment_method_id)) => Ok(Role::Subscriber {
            subscription_cap_id,
            payment_method_id,
        }),
        _ => bail!("pass either --owner-cap, or --subscription with --payment-method"),
    }
}

pub async fn handle_decrypt(
    config: &ClientConfig,
    wallet: &LocalWallet,
    args: DecryptArgs<'_>,
) -> Result<()> {
    if config.package_id.is_empty() {
        bail!("config has no package_id");
    }
    let raw = std::fs::read_to_string(args.manifest)
        .with_context(|| format!("reading manifest {}", args.manifest))?;
    let files: Vec<FileDecryptionRecord> =
        serde_json::from_str(&raw).context("parsing manifest")?;
    println!("=== DECRYPT ===");
    println!("Files:   {}", files.len());
    println!("Package: {}", config.package_id);

    let orchestrator = Orchestrator::new(config.aggregator_pool(), config.threshold_client()?);
    let mut sessions = SessionManager::new(&config.package_id, config.session_ttl_minutes);
    let credential = sessions.credential_for(wallet)?;
    info!(address = %credential.owner_address(), expires_at = credential.expires_at(), "session ready");

    let policy = args.role.policy(&config.package_id, args.collection);
    let outcome = orchestrator
        .decrypt_all(files, credential, &*policy)
        .await;

    let out_dir = Path::new(args.out_dir);
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let mut written = 0;
    for file in &outcome.files {
        match &file.content {
            Some(content) => {
                let path = out_dir.join(format!("{}.md", file.file_id));
                std::fs::write(&path, content)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("  {} -> {}", file.file_id, path.display());
                written += 1;
            }
            None => println!("  {} (not decrypted)", file.file_id),
        }
    }

    if let Some(error) = outcome.error {
        bail!(
            "{} (retry {}; {:?})",
            error.user_message(),
            if error.is_retryable() { "may help" } else { "will not help" },
            error
        );
    }
    println!("Decrypted {written} of {} files", outcome.files.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_flags() {
        assert_eq!(
            role_from_flags(Some("0xcap".into()), None, None).unwrap(),
            Role::Owner {
                owner_cap_id: "0xcap".into()
            }
        );
        assert!(matches!(
            role_from_flags(None, Some("0xsub".into()), Some("0xpay".into())).unwrap(),
            Role::Subscriber { .. }
        ));
        assert!(role_from_flags(None, None, None).is_err());
        assert!(role_from_flags(None, Some("0xsub".into()), None).is_err());
    }
}
