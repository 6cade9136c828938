//! # vibe-provider
//!
//! Model invocation layer for vibeship.
//!
//! ## Features
//! - Credential pool with least-recently-used rotation
//! - Rotation on rate-limit / invalid-key failures, bounded attempts
//! - Google Gemini client (generateContent)

pub mod error;
pub mod pool;
pub mod providers;
pub mod rotation;
pub mod r#trait;

// Core traits
pub use r#trait::ModelClient;

// Credential pool and rotation
pub use pool::{select_least_recently_used, CredentialPool, PoolTransition, TransitionKind};
pub use rotation::{with_rotation, FailureClass, RotatableError, RotationPolicy};

// Error
pub use error::ProviderError;

// Client implementations
pub use providers::gemini::GeminiClient;
