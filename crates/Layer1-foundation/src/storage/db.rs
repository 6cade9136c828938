//! SQLite Storage for runtime data
//!
//! 런타임 데이터 저장:
//! - Credentials: 모델 API 키 풀 (상태, 마지막 사용 시각, CAS 버전)
//! - Sessions: 채팅 세션
//! - Messages: 메시지 기록
//!
//! 설정 데이터는 JSON (storage/json/)에서 관리
//!
//! ## Migration System
//!
//! Database schema is versioned. Migrations run automatically on startup.
//! - Version 1: Initial schema (credentials, sessions, messages)
//! - Version 2: Add commit_sha column to messages

use super::traits::{ChatHistory, ChatRole, CredentialStore};
use crate::core::{Credential, CredentialId, CredentialStatus, SecretString};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Current schema version
const CURRENT_SCHEMA_VERSION: i32 = 2;

const CREDENTIAL_COLUMNS: &str = "id, secret, status, last_used_at, version";

/// Storage service for persisting runtime data
#[derive(Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Create a new storage instance
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| Error::Storage(format!("Failed to create data directory: {}", e)))?;

        let db_path = data_dir.join("vibeship.db");
        let conn = Connection::open(&db_path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| Error::Storage(format!("Failed to set pragmas: {}", e)))?;

        Self::from_connection(conn)
    }

    /// Create an in-memory storage (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("Failed to create in-memory database: {}", e)))?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        storage.initialize_schema()?;
        storage.run_migrations()?;

        Ok(storage)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))
    }

    /// Get current schema version from database
    pub fn get_schema_version(&self) -> Result<i32> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::Storage(format!("Failed to get schema version: {}", e)))
    }

    /// Initialize database schema (base tables)
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Model API credential pool
            CREATE TABLE IF NOT EXISTS credentials (
                id TEXT PRIMARY KEY,
                secret TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL CHECK(status IN ('active', 'exhausted')),
                last_used_at TEXT,
                version INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_credentials_selection
                ON credentials(status, last_used_at);

            -- Chat sessions
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                title TEXT,
                branch TEXT NOT NULL,
                message_count INTEGER DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Messages table
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('user', 'assistant', 'system')),
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_messages_session
                ON messages(session_id, id);
            CREATE INDEX IF NOT EXISTS idx_sessions_updated
                ON sessions(updated_at DESC);

            -- Insert initial schema version if not exists
            INSERT OR IGNORE INTO schema_version (version) VALUES (1);
            "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    /// Run all pending migrations
    fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version()?;

        if current_version >= CURRENT_SCHEMA_VERSION {
            debug!(
                "Database schema is up to date (version {})",
                current_version
            );
            return Ok(());
        }

        info!(
            "Running database migrations from version {} to {}",
            current_version, CURRENT_SCHEMA_VERSION
        );

        let conn = self.conn()?;

        for version in (current_version + 1)..=CURRENT_SCHEMA_VERSION {
            match version {
                2 => Self::migrate_v2(&conn)?,
                _ => {
                    warn!("Unknown migration version: {}", version);
                }
            }

            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                params![version],
            )
            .map_err(|e| Error::Storage(format!("Failed to record migration: {}", e)))?;

            info!("Applied migration to version {}", version);
        }

        Ok(())
    }

    /// Migration to version 2: link assistant messages to the commit they shipped
    fn migrate_v2(conn: &Connection) -> Result<()> {
        conn.execute("ALTER TABLE messages ADD COLUMN commit_sha TEXT", [])
            .map_err(|e| Error::Storage(format!("Failed to migrate to v2: {}", e)))?;
        Ok(())
    }

    // ========================================================================
    // Session Operations
    // ========================================================================

    /// Get a session by ID
    pub fn get_session(&self, id: &str) -> Result<Option<SessionRecord>> {
        let conn = self.conn()?;

        conn.query_row(
            r#"
            SELECT id, title, branch, message_count, created_at, updated_at
            FROM sessions WHERE id = ?1
            "#,
            params![id],
            row_to_session,
        )
        .optional()
        .map_err(|e| Error::Storage(format!("Failed to get session: {}", e)))
    }

    /// Get recent sessions, newest first
    pub fn get_sessions(&self, limit: u32) -> Result<Vec<SessionRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, title, branch, message_count, created_at, updated_at
                FROM sessions ORDER BY updated_at DESC LIMIT ?1
                "#,
            )
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let sessions = stmt
            .query_map(params![limit], row_to_session)
            .map_err(|e| Error::Storage(format!("Failed to query sessions: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Storage(format!("Failed to read sessions: {}", e)))?;

        Ok(sessions)
    }

    /// Get messages for a session in insertion order
    pub fn get_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, session_id, role, content, commit_sha, created_at
                FROM messages
                WHERE session_id = ?1
                ORDER BY id ASC
                "#,
            )
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let messages = stmt
            .query_map(params![session_id], |row| {
                Ok(MessageRecord {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    role: row.get(2)?,
                    content: row.get(3)?,
                    commit_sha: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })
            .map_err(|e| Error::Storage(format!("Failed to query messages: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Storage(format!("Failed to read messages: {}", e)))?;

        Ok(messages)
    }

    /// Delete a session and all related data
    pub fn delete_session(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;

        conn.execute("DELETE FROM messages WHERE session_id = ?1", params![id])
            .map_err(|e| Error::Storage(format!("Failed to delete messages: {}", e)))?;
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])
            .map_err(|e| Error::Storage(format!("Failed to delete session: {}", e)))?;

        Ok(())
    }

    // ========================================================================
    // Credential Operations
    // ========================================================================

    /// Look up a credential by id
    pub fn get_credential(&self, id: &CredentialId) -> Result<Option<Credential>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!("SELECT {} FROM credentials WHERE id = ?1", CREDENTIAL_COLUMNS),
            params![id.as_str()],
            row_to_credential,
        )
        .optional()
        .map_err(|e| Error::Storage(format!("Failed to get credential: {}", e)))
    }

    /// Count credentials by status
    pub fn count_credentials(&self, status: CredentialStatus) -> Result<i64> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT COUNT(*) FROM credentials WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| Error::Storage(format!("Failed to count credentials: {}", e)))
    }
}

impl CredentialStore for Storage {
    fn list_credentials(&self) -> Result<Vec<Credential>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(&format!(
                r#"
                SELECT {} FROM credentials
                ORDER BY last_used_at IS NOT NULL, last_used_at ASC, id ASC
                "#,
                CREDENTIAL_COLUMNS
            ))
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let credentials = stmt
            .query_map([], row_to_credential)
            .map_err(|e| Error::Storage(format!("Failed to query credentials: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Storage(format!("Failed to read credentials: {}", e)))?;

        Ok(credentials)
    }

    fn insert_credential(&self, credential: &Credential) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO credentials (id, secret, status, last_used_at, version, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                credential.id.as_str(),
                credential.secret.expose(),
                credential.status.as_str(),
                credential.last_used_at.as_ref().map(format_timestamp),
                credential.version,
                format_timestamp(&Utc::now()),
            ],
        )
        .map_err(|e| Error::Storage(format!("Failed to insert credential: {}", e)))?;

        Ok(())
    }

    fn find_by_secret(&self, secret: &SecretString) -> Result<Option<Credential>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM credentials WHERE secret = ?1",
                CREDENTIAL_COLUMNS
            ),
            params![secret.expose()],
            row_to_credential,
        )
        .optional()
        .map_err(|e| Error::Storage(format!("Failed to find credential: {}", e)))
    }

    fn compare_and_swap(&self, credential: &Credential, expected_version: i64) -> Result<bool> {
        let conn = self.conn()?;

        let changed = conn
            .execute(
                r#"
                UPDATE credentials SET
                    status = ?2,
                    last_used_at = ?3,
                    version = ?4
                WHERE id = ?1 AND version = ?5
                "#,
                params![
                    credential.id.as_str(),
                    credential.status.as_str(),
                    credential.last_used_at.as_ref().map(format_timestamp),
                    credential.version,
                    expected_version,
                ],
            )
            .map_err(|e| Error::Storage(format!("Failed to update credential: {}", e)))?;

        Ok(changed == 1)
    }
}

impl ChatHistory for Storage {
    fn append(
        &self,
        session_id: &str,
        branch: &str,
        role: ChatRole,
        content: &str,
        commit_sha: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let now = format_timestamp(&Utc::now());
        let title: String = content.chars().take(30).collect();

        conn.execute(
            r#"
            INSERT OR IGNORE INTO sessions (id, title, branch, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            "#,
            params![session_id, title, branch, now],
        )
        .map_err(|e| Error::Storage(format!("Failed to create session: {}", e)))?;

        conn.execute(
            r#"
            INSERT INTO messages (session_id, role, content, commit_sha, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![session_id, role.as_str(), content, commit_sha, now],
        )
        .map_err(|e| Error::Storage(format!("Failed to save message: {}", e)))?;

        conn.execute(
            r#"
            UPDATE sessions SET
                message_count = message_count + 1,
                updated_at = ?2
            WHERE id = ?1
            "#,
            params![session_id, now],
        )
        .map_err(|e| Error::Storage(format!("Failed to update session: {}", e)))?;

        Ok(())
    }
}

/// Fixed-width UTC timestamps so that text ordering matches time ordering.
fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_credential(row: &rusqlite::Row<'_>) -> rusqlite::Result<Credential> {
    let status: String = row.get(2)?;
    let status = CredentialStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(2, "status".to_string(), rusqlite::types::Type::Text)
    })?;
    let last_used_at: Option<String> = row.get(3)?;

    Ok(Credential {
        id: CredentialId::from(row.get::<_, String>(0)?),
        secret: SecretString::new(row.get::<_, String>(1)?),
        status,
        last_used_at: last_used_at
            .as_deref()
            .map(|raw| parse_timestamp(3, raw))
            .transpose()?,
        version: row.get(4)?,
    })
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        branch: row.get(2)?,
        message_count: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

// ============================================================================
// Record Types
// ============================================================================

/// Session record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub title: Option<String>,
    pub branch: String,
    pub message_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Message record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub session_id: String,
    pub role: String,
    pub content: String,
    /// Commit produced by this exchange, if it shipped
    pub commit_sha: Option<String>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_in_memory_storage_migrated() {
        let storage = Storage::in_memory().expect("Failed to create storage");
        assert_eq!(storage.get_schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_file_storage_reopens() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = Storage::new(dir.path()).unwrap();
            storage
                .insert_credential(&Credential::new("AIza-reopen-key"))
                .unwrap();
        }
        let storage = Storage::new(dir.path()).unwrap();
        assert_eq!(storage.list_credentials().unwrap().len(), 1);
        assert_eq!(storage.get_schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_credentials_ordered_by_last_use() {
        let storage = Storage::in_memory().unwrap();
        let now = Utc::now();

        let recent = Credential::new("key-recent-000").with_last_used(now);
        let old = Credential::new("key-old-00000").with_last_used(now - Duration::hours(1));
        let never = Credential::new("key-never-0000");

        for c in [&recent, &old, &never] {
            storage.insert_credential(c).unwrap();
        }

        let ids: Vec<_> = storage
            .list_credentials()
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![never.id, old.id, recent.id]);
    }

    #[test]
    fn test_compare_and_swap() {
        let storage = Storage::in_memory().unwrap();
        let cred = Credential::new("AIza-cas-key-1");
        storage.insert_credential(&cred).unwrap();

        let mut updated = cred.clone();
        updated.status = CredentialStatus::Exhausted;
        updated.version = 1;

        assert!(storage.compare_and_swap(&updated, 0).unwrap());
        // Stale writer loses
        assert!(!storage.compare_and_swap(&updated, 0).unwrap());

        let stored = storage.get_credential(&cred.id).unwrap().unwrap();
        assert_eq!(stored.status, CredentialStatus::Exhausted);
        assert_eq!(stored.version, 1);
        assert_eq!(storage.count_credentials(CredentialStatus::Active).unwrap(), 0);
    }

    #[test]
    fn test_timestamp_round_trip() {
        let storage = Storage::in_memory().unwrap();
        let at = Utc::now();
        let cred = Credential::new("AIza-ts-key-1").with_last_used(at);
        storage.insert_credential(&cred).unwrap();

        let stored = storage.find_by_secret(&cred.secret).unwrap().unwrap();
        let delta = (stored.last_used_at.unwrap() - at).num_microseconds().unwrap();
        assert!(delta.abs() <= 1);
    }

    #[test]
    fn test_duplicate_secret_rejected() {
        let storage = Storage::in_memory().unwrap();
        storage.insert_credential(&Credential::new("AIza-dup")).unwrap();
        assert!(storage.insert_credential(&Credential::new("AIza-dup")).is_err());
    }

    #[test]
    fn test_chat_history() {
        let storage = Storage::in_memory().unwrap();

        storage
            .append("s1", "main", ChatRole::User, "rename header text to Hello", None)
            .unwrap();
        storage
            .append("s1", "main", ChatRole::Assistant, "Renamed header", Some("c0ffee"))
            .unwrap();

        let session = storage.get_session("s1").unwrap().expect("session");
        assert_eq!(session.message_count, 2);
        assert_eq!(session.title.as_deref(), Some("rename header text to Hello"));

        let messages = storage.get_messages("s1").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].commit_sha.as_deref(), Some("c0ffee"));

        assert_eq!(storage.get_sessions(10).unwrap().len(), 1);
        storage.delete_session("s1").unwrap();
        assert!(storage.get_session("s1").unwrap().is_none());
    }
}
