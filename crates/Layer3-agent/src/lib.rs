//! # vibe-agent
//!
//! Change pipeline for vibeship.
//!
//! ## 구조
//!
//! - `proposal`: prompt 생성, 모델 응답 파싱/검증, ChangeProposalGenerator
//! - `pipeline`: PipelineOrchestrator (propose → confirm → ship)

pub mod pipeline;
pub mod proposal;

pub use pipeline::{PipelineOrchestrator, ProposedChange, ShipReceipt};
pub use proposal::{build_prompt, parse_proposal, strip_code_fences, ChangeProposalGenerator};
