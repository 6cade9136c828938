//! `vibe keys` - shared key pool management
//!
//! Secrets are only ever printed masked.

use anyhow::bail;
use std::sync::Arc;
use vibe_foundation::{Credential, CredentialId, CredentialStatus, Storage};
use vibe_provider::CredentialPool;

pub fn donate(storage: Arc<Storage>, key: String) -> anyhow::Result<()> {
    let pool = CredentialPool::load(storage)?;
    let credential = pool.donate(key)?;

    println!(
        "✓ Key {} ({}) is {} - {} active in pool",
        credential.id.short(),
        credential.secret.masked(),
        credential.status.as_str(),
        pool.active_count()
    );
    Ok(())
}

pub fn list(storage: Arc<Storage>) -> anyhow::Result<()> {
    let active = storage.count_credentials(CredentialStatus::Active)?;
    let exhausted = storage.count_credentials(CredentialStatus::Exhausted)?;
    let pool = CredentialPool::load(storage)?;
    let credentials = pool.snapshot();

    if credentials.is_empty() {
        println!("No keys in the pool. Add one with `vibe keys donate <KEY>`.");
        return Ok(());
    }

    println!("\n🔑 Key Pool ({} active, {} exhausted)\n", active, exhausted);
    println!("{:<10} {:<12} {:<10} {:<20}", "ID", "Key", "Status", "Last used");
    println!("{}", "-".repeat(56));

    for credential in &credentials {
        let last_used = credential
            .last_used_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());

        println!(
            "{:<10} {:<12} {:<10} {:<20}",
            credential.id.short(),
            credential.secret.masked(),
            credential.status.as_str(),
            last_used
        );
    }
    println!();

    Ok(())
}

pub fn reset(storage: Arc<Storage>, id: &str) -> anyhow::Result<()> {
    let pool = CredentialPool::load(storage)?;
    let id = resolve_id(&pool.snapshot(), id)?;
    let credential = pool.reset(&id)?;

    println!(
        "✓ Key {} ({}) is {}",
        credential.id.short(),
        credential.secret.masked(),
        credential.status.as_str()
    );
    Ok(())
}

/// Full ID or a prefix matching exactly one key
fn resolve_id(credentials: &[Credential], input: &str) -> anyhow::Result<CredentialId> {
    let input = input.trim();
    if input.is_empty() {
        bail!("Key ID is empty");
    }

    if let Some(exact) = credentials.iter().find(|c| c.id.as_str() == input) {
        return Ok(exact.id.clone());
    }

    let matches: Vec<_> = credentials
        .iter()
        .filter(|c| c.id.as_str().starts_with(input))
        .collect();
    match matches.as_slice() {
        [only] => Ok(only.id.clone()),
        [] => bail!("No key with ID {}", input),
        _ => bail!("ID prefix {} matches {} keys", input, matches.len()),
    }
}
