//! `vibe run` - propose, confirm, ship

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use vibe_agent::{PipelineOrchestrator, ProposedChange};
use vibe_core::GitHubBackend;
use vibe_foundation::{
    ChatHistory, ChatRole, Error, SessionContext, Storage, VibeConfig,
};
use vibe_provider::{CredentialPool, GeminiClient};

/// Per-invocation options of `vibe run`
#[derive(Debug, Default)]
pub struct RunOptions {
    pub branch: Option<String>,
    pub session: Option<String>,
    pub assume_yes: bool,
}

pub async fn run(
    config: &VibeConfig,
    storage: Arc<Storage>,
    instruction: &str,
    options: RunOptions,
) -> anyhow::Result<()> {
    config.validate()?;

    let backend = Arc::new(GitHubBackend::from_settings(&config.github)?);
    let model = Arc::new(GeminiClient::from_settings(&config.model)?);
    let pool = Arc::new(CredentialPool::load(storage.clone())?);
    let pipeline =
        PipelineOrchestrator::from_settings(backend, model, pool, &config.pipeline)?;

    let branch = options
        .branch
        .unwrap_or_else(|| config.github.effective_branch().to_string());
    let ctx = match options.session {
        Some(id) => SessionContext::new(id, branch),
        None => SessionContext::fresh(branch),
    };

    println!("vibeship - session {} on {}\n", short(&ctx.session_id), ctx.branch);
    storage.append(&ctx.session_id, &ctx.branch, ChatRole::User, instruction, None)?;

    let proposed = match pipeline.propose(&ctx, instruction).await {
        Ok(proposed) => proposed,
        Err(e) => return Err(record_failure(&storage, &ctx, e)),
    };

    print_proposal(&proposed);

    if !options.assume_yes && !confirm("Ship it? [y/N] ")? {
        let note = format!("Discarded change to {}", proposed.proposal().target_path());
        storage.append(&ctx.session_id, &ctx.branch, ChatRole::Assistant, &note, None)?;
        println!("{}", note);
        return Ok(());
    }

    let receipt = match pipeline.ship(&ctx, proposed).await {
        Ok(receipt) => receipt,
        Err(e) => return Err(record_failure(&storage, &ctx, e)),
    };

    storage.append(
        &ctx.session_id,
        &ctx.branch,
        ChatRole::Assistant,
        &receipt.message,
        Some(&receipt.commit_sha),
    )?;

    println!(
        "\n✓ Shipped {} to {} ({} → {})",
        receipt.target_path,
        receipt.branch,
        short(&receipt.base_sha),
        short(&receipt.commit_sha)
    );
    Ok(())
}

fn print_proposal(proposed: &ProposedChange) {
    let proposal = proposed.proposal();
    let marker = if proposed.creates_file() { " (new file)" } else { "" };

    println!("📄 {}{}", proposal.target_path(), marker);
    if !proposal.summary().is_empty() {
        println!("   {}", proposal.summary());
    }
    println!(
        "   {} lines, {} bytes\n",
        proposal.content().lines().count(),
        proposal.content().len()
    );
}

/// Store the failure in the transcript and turn it into a CLI error
fn record_failure(storage: &Storage, ctx: &SessionContext, error: Error) -> anyhow::Error {
    let note = format!("Failed: {}", error);
    if let Err(e) = storage.append(&ctx.session_id, &ctx.branch, ChatRole::System, &note, None) {
        tracing::warn!("Failed to record failure in history: {}", e);
    }

    if error.leaves_orphans() {
        tracing::debug!("Blob/tree/commit objects of this attempt stay unreferenced on the remote");
    }

    match error {
        Error::NoCredentialsAvailable => anyhow::anyhow!(
            "{}\nDonate a Gemini key with `vibe keys donate <KEY>` or re-activate one with `vibe keys reset <ID>`.",
            error
        ),
        Error::RefConflict { .. } => anyhow::anyhow!(
            "{}\nThe branch moved while shipping. Run the instruction again on the new head.",
            error
        ),
        other if other.is_user_facing() => other.into(),
        other => {
            tracing::debug!("Unexpected failure: {:?}", other);
            let hint = if other.is_retryable() {
                "vibe run failed (local storage was busy, try again)"
            } else {
                "vibe run failed (rerun with --debug for details)"
            };
            anyhow::Error::from(other).context(hint)
        }
    }
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_affirmative(&answer))
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// First 8 characters, for display
fn short(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(i, _)| &id[..i])
}
