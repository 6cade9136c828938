//! `vibe sessions` - recorded transcripts

use anyhow::bail;
use vibe_foundation::{SessionRecord, Storage};

/// How far back a prefix lookup searches
const PREFIX_SEARCH_LIMIT: u32 = 200;

pub fn list(storage: &Storage, limit: u32) -> anyhow::Result<()> {
    let sessions = storage.get_sessions(limit)?;

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!("\n📋 Recent Sessions\n");
    println!(
        "{:<10} {:<30} {:<15} {:<10} {:<20}",
        "ID", "Title", "Branch", "Messages", "Updated"
    );
    println!("{}", "-".repeat(88));

    for session in sessions {
        let title = session
            .title
            .clone()
            .unwrap_or_else(|| "(untitled)".to_string());

        println!(
            "{:<10} {:<30} {:<15} {:<10} {:<20}",
            short(&session.id),
            truncate(&title, 28),
            truncate(&session.branch, 13),
            session.message_count,
            truncate(&session.updated_at, 19)
        );
    }

    println!("\nUse 'vibe sessions show <ID>' to read a transcript.");
    println!("Use 'vibe run --session <ID> \"...\"' to continue one.\n");

    Ok(())
}

pub fn show(storage: &Storage, id: &str) -> anyhow::Result<()> {
    let session = find_session(storage, id)?;
    let messages = storage.get_messages(&session.id)?;

    println!(
        "\nSession {} on {} ({} messages)\n",
        session.id, session.branch, session.message_count
    );

    for message in messages {
        let commit = message
            .commit_sha
            .as_deref()
            .map(|sha| format!(" [{}]", short(sha)))
            .unwrap_or_default();
        println!(
            "{} {:<9}{} {}",
            truncate(&message.created_at, 19),
            message.role,
            commit,
            message.content
        );
    }
    println!();

    Ok(())
}

pub fn delete(storage: &Storage, id: &str) -> anyhow::Result<()> {
    let session = find_session(storage, id)?;
    storage.delete_session(&session.id)?;
    println!(
        "✓ Deleted session {} ({} messages)",
        short(&session.id),
        session.message_count
    );
    Ok(())
}

fn find_session(storage: &Storage, id: &str) -> anyhow::Result<SessionRecord> {
    let id = id.trim();
    if id.is_empty() {
        bail!("Session ID is empty");
    }
    if let Some(session) = storage.get_session(id)? {
        return Ok(session);
    }

    let mut matches: Vec<_> = storage
        .get_sessions(PREFIX_SEARCH_LIMIT)?
        .into_iter()
        .filter(|s| s.id.starts_with(id))
        .collect();
    match matches.len() {
        1 => Ok(matches.remove(0)),
        0 => bail!("No session with ID {}", id),
        n => bail!("ID prefix {} matches {} sessions", id, n),
    }
}

/// First 8 characters, for display
fn short(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(i, _)| &id[..i])
}

/// Char-safe truncation for table cells
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vibe_foundation::{ChatHistory, ChatRole};

    #[test]
    fn test_find_session_by_prefix() {
        let storage = Storage::in_memory().unwrap();
        storage
            .append("a1b2c3d4-0000", "main", ChatRole::User, "make it blue", None)
            .unwrap();
        storage
            .append("a1ffffff-0000", "main", ChatRole::User, "make it red", None)
            .unwrap();

        assert_eq!(find_session(&storage, "a1b2").unwrap().id, "a1b2c3d4-0000");
        assert_eq!(
            find_session(&storage, "a1ffffff-0000").unwrap().id,
            "a1ffffff-0000"
        );
        assert!(find_session(&storage, "a1").is_err());
        assert!(find_session(&storage, "zz").is_err());
    }

    #[test]
    fn test_delete_by_prefix() {
        let storage = Storage::in_memory().unwrap();
        storage
            .append("d1d2d3d4-0000", "main", ChatRole::User, "make it blue", None)
            .unwrap();

        delete(&storage, "d1d2").unwrap();
        assert!(storage.get_session("d1d2d3d4-0000").unwrap().is_none());
        assert!(storage.get_messages("d1d2d3d4-0000").unwrap().is_empty());
        assert!(delete(&storage, "d1d2").is_err());
    }

    #[test]
    fn test_short_is_char_safe() {
        assert_eq!(short("a1b2c3d4-0000"), "a1b2c3d4");
        assert_eq!(short("작업-세션-일번-아이디"), "작업-세션-일번");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("헤더 텍스트를 Hello로 바꿔줘", 8), "헤더 텍스...");
    }
}
