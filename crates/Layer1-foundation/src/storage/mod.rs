//! Storage module for vibeship
//!
//! - `db`: SQLite - 런타임 데이터 (credentials, 채팅 세션, 메시지)
//! - `config_store`: `config.json` 저장/로드 (글로벌, 프로젝트)
//! - `traits`: 저장소 경계 (CredentialStore, ChatHistory)

mod config_store;
mod db;
mod traits;

// SQLite Storage (런타임 데이터)
pub use db::{MessageRecord, SessionRecord, Storage};

// Config files
pub use config_store::ConfigStore;

// Storage boundaries
pub use traits::{ChatHistory, ChatRole, CredentialStore};
