//! Core Module - 핵심 도메인 타입
//!
//! ## 타입 계층
//!
//! - `types.rs`: Credential, SecretString, SessionContext
//! - `proposal.rs`: ChangeProposal 및 검증 에러
//!
//! ```text
//! instruction ──▶ snapshot ──▶ ChangeProposal ──[confirm]──▶ commit
//!                                    ▲
//!                     Credential ────┘ (rotating pool)
//! ```

pub mod proposal;
pub mod types;

// Proposal
pub use proposal::{ChangeProposal, ProposalError};

// Credential
pub use types::{Credential, CredentialId, CredentialStatus, SecretString};

// Session
pub use types::SessionContext;
