//! Two-phase propose / ship pipeline
//!
//! ```text
//! propose(ctx, instruction)          ship(ctx, ProposedChange)
//!   snapshot ─▶ generate ─▶ token  ──[user confirms]──▶ compose ─▶ ShipReceipt
//! ```
//!
//! Nothing is written to the repository during `propose`. `ship` only
//! accepts a [`ProposedChange`], which only `propose` can build.

use crate::proposal::ChangeProposalGenerator;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use vibe_core::{CommitComposer, GitBackend, IgnoreRules, RepositorySnapshotReader};
use vibe_foundation::{ChangeProposal, Error, PipelineSettings, Result, SessionContext};
use vibe_provider::{CredentialPool, ModelClient, RotationPolicy};

/// Confirmation token produced by [`PipelineOrchestrator::propose`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedChange {
    session: SessionContext,
    proposal: ChangeProposal,
    /// Target path was absent from the snapshot
    creates_file: bool,
    proposed_at: DateTime<Utc>,
}

impl ProposedChange {
    pub(crate) fn new(session: SessionContext, proposal: ChangeProposal, creates_file: bool) -> Self {
        Self {
            session,
            proposal,
            creates_file,
            proposed_at: Utc::now(),
        }
    }

    pub fn proposal(&self) -> &ChangeProposal {
        &self.proposal
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn creates_file(&self) -> bool {
        self.creates_file
    }

    pub fn proposed_at(&self) -> DateTime<Utc> {
        self.proposed_at
    }
}

/// A shipped change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShipReceipt {
    pub commit_sha: String,
    pub base_sha: String,
    pub branch: String,
    pub target_path: String,
    pub message: String,
}

/// Snapshot → proposal → (confirmation) → commit
pub struct PipelineOrchestrator {
    reader: RepositorySnapshotReader,
    generator: ChangeProposalGenerator,
    composer: CommitComposer,
}

impl PipelineOrchestrator {
    pub fn new(
        reader: RepositorySnapshotReader,
        generator: ChangeProposalGenerator,
        composer: CommitComposer,
    ) -> Self {
        Self {
            reader,
            generator,
            composer,
        }
    }

    /// Wire every component against one backend and model
    pub fn from_settings(
        backend: Arc<dyn GitBackend>,
        model: Arc<dyn ModelClient>,
        pool: Arc<CredentialPool>,
        settings: &PipelineSettings,
    ) -> Result<Self> {
        let ignore = IgnoreRules::new(settings.effective_ignore())?;
        let reader = RepositorySnapshotReader::new(backend.clone(), ignore);
        let generator = ChangeProposalGenerator::new(model, pool)
            .with_policy(RotationPolicy::new(settings.effective_max_attempts()));
        let composer =
            CommitComposer::new(backend).with_message_prefix(settings.effective_commit_prefix());

        Ok(Self::new(reader, generator, composer))
    }

    /// Phase one: read the branch and ask the model for a change.
    pub async fn propose(&self, ctx: &SessionContext, instruction: &str) -> Result<ProposedChange> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(Error::InvalidInput("Instruction is empty".to_string()));
        }

        let snapshot = self.reader.fetch_file_list(&ctx.branch).await?;
        let proposal = self.generator.generate(instruction, snapshot.paths()).await?;
        let creates_file = !snapshot.contains(proposal.target_path());

        info!(
            "[{}] proposed change to {}{}",
            ctx.session_id,
            proposal.target_path(),
            if creates_file { " (new file)" } else { "" }
        );

        Ok(ProposedChange::new(ctx.clone(), proposal, creates_file))
    }

    /// Phase two: commit a confirmed proposal on a freshly resolved head.
    pub async fn ship(&self, ctx: &SessionContext, proposed: ProposedChange) -> Result<ShipReceipt> {
        if proposed.session != *ctx {
            return Err(Error::SessionMismatch(format!(
                "proposal belongs to session {} on {}, not session {} on {}",
                proposed.session.session_id, proposed.session.branch, ctx.session_id, ctx.branch
            )));
        }

        let outcome = self.composer.apply(&ctx.branch, &proposed.proposal).await?;

        info!(
            "[{}] shipped {} as {}",
            ctx.session_id,
            proposed.proposal.target_path(),
            outcome.commit_sha
        );

        Ok(ShipReceipt {
            commit_sha: outcome.commit_sha,
            base_sha: outcome.base_sha,
            branch: outcome.branch,
            target_path: proposed.proposal.target_path().to_string(),
            message: outcome.message,
        })
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        self.generator.pool()
    }
}
