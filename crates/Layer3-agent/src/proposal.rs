//! Change proposal generation
//!
//! instruction + file list → prompt → model (rotating credentials) → validated
//! [`ChangeProposal`]. A malformed reply is reported, never retried.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};
use vibe_foundation::{ChangeProposal, ProposalError, Result};
use vibe_provider::{with_rotation, CredentialPool, ModelClient, RotationPolicy};

/// Reply keys, in prompt order
const KEY_FILE: &str = "file";
const KEY_SUMMARY: &str = "summary";
const KEY_CODE: &str = "code";

// ============================================================================
// Prompt
// ============================================================================

/// Deterministic prompt: same instruction and file list, same bytes.
pub fn build_prompt(instruction: &str, files: &[String]) -> String {
    format!(
        "You are editing a web project on request.\n\
         Instruction: \"{instruction}\"\n\
         Files in the repository: [{files}]\n\
         Pick the single file that should change (or a new path to create), \
         describe the change in one sentence, and return the COMPLETE new file content.\n\
         Reply with ONE JSON object and nothing else, with exactly these keys:\n\
         {{\"{file}\": \"path/to/file\", \"{summary}\": \"one sentence\", \"{code}\": \"full file content\"}}",
        instruction = instruction.trim(),
        files = files.join(", "),
        file = KEY_FILE,
        summary = KEY_SUMMARY,
        code = KEY_CODE,
    )
}

// ============================================================================
// Reply parsing
// ============================================================================

/// Remove a surrounding markdown code fence (```` ``` ```` or ```` ```json ````).
///
/// Text without a leading fence is returned trimmed but otherwise unchanged.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Language tag such as `json`
    let tag_len = rest
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(rest.len());
    let body = &rest[tag_len..];
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a model reply into a validated proposal.
///
/// Keys other than `file`, `summary` and `code` are ignored.
pub fn parse_proposal(raw: &str) -> std::result::Result<ChangeProposal, ProposalError> {
    let body = strip_code_fences(raw);
    if body.is_empty() {
        return Err(ProposalError::Empty);
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| ProposalError::NotJson(e.to_string()))?;
    let object = value.as_object().ok_or(ProposalError::NotAnObject)?;

    ChangeProposal::new(
        string_field(object, KEY_FILE)?,
        string_field(object, KEY_SUMMARY)?,
        string_field(object, KEY_CODE)?,
    )
}

fn string_field<'a>(
    object: &'a Map<String, Value>,
    key: &'static str,
) -> std::result::Result<&'a str, ProposalError> {
    object
        .get(key)
        .ok_or(ProposalError::MissingKey(key))?
        .as_str()
        .ok_or(ProposalError::WrongType {
            key,
            expected: "string",
        })
}

// ============================================================================
// Generator
// ============================================================================

/// Turns an instruction and a file list into a [`ChangeProposal`]
pub struct ChangeProposalGenerator {
    model: Arc<dyn ModelClient>,
    pool: Arc<CredentialPool>,
    policy: RotationPolicy,
}

impl ChangeProposalGenerator {
    pub fn new(model: Arc<dyn ModelClient>, pool: Arc<CredentialPool>) -> Self {
        Self {
            model,
            pool,
            policy: RotationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RotationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    pub async fn generate(&self, instruction: &str, files: &[String]) -> Result<ChangeProposal> {
        let prompt = build_prompt(instruction, files);
        let model = self.model.as_ref();
        let prompt_ref = prompt.as_str();

        debug!(
            "Generating proposal with {} ({} files in prompt)",
            model.model_id(),
            files.len()
        );

        let raw = with_rotation(&self.pool, &self.policy, "generate_proposal", |credential| {
            async move { model.generate_content(&credential.secret, prompt_ref).await }
        })
        .await?;

        let proposal = parse_proposal(&raw)?;
        info!(
            "Model proposed a change to {}: {}",
            proposal.target_path(),
            proposal.summary()
        );
        Ok(proposal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files() -> Vec<String> {
        vec!["index.html".to_string(), "style.css".to_string()]
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let a = build_prompt("rename header text to Hello", &files());
        let b = build_prompt("rename header text to Hello", &files());
        assert_eq!(a, b);
        assert!(a.contains("\"rename header text to Hello\""));
        assert!(a.contains("[index.html, style.css]"));
        assert!(a.contains("\"file\"") && a.contains("\"summary\"") && a.contains("\"code\""));
    }

    #[test]
    fn test_strip_code_fences() {
        let json = r#"{"file":"a","summary":"b","code":"c"}"#;
        assert_eq!(strip_code_fences(json), json);
        assert_eq!(strip_code_fences(&format!("```json\n{}\n```", json)), json);
        assert_eq!(strip_code_fences(&format!("```\n{}\n```\n", json)), json);
        assert_eq!(strip_code_fences(&format!("```json {} ```", json)), json);
        assert_eq!(strip_code_fences(&format!("```{}```", json)), json);
    }

    #[test]
    fn test_fenced_reply_parses_identically() {
        let json = r#"{"file":"index.html","summary":"x","code":"<html>...</html>"}"#;
        let plain = parse_proposal(json).unwrap();
        let fenced = parse_proposal(&format!("```json {} ```", json)).unwrap();
        assert_eq!(plain, fenced);
        assert_eq!(plain.content(), "<html>...</html>");
    }

    #[test]
    fn test_code_inside_content_survives() {
        let reply = "```json\n{\"file\":\"README.md\",\"summary\":\"docs\",\"code\":\"```sh\\nrun\\n```\"}\n```";
        let proposal = parse_proposal(reply).unwrap();
        assert_eq!(proposal.content(), "```sh\nrun\n```");
    }

    #[test]
    fn test_extra_keys_tolerated() {
        let proposal =
            parse_proposal(r#"{"file":"a.css","summary":"s","code":"c","confidence":0.9}"#)
                .unwrap();
        assert_eq!(proposal.target_path(), "a.css");
    }

    #[test]
    fn test_rejections() {
        assert_eq!(parse_proposal("  ").unwrap_err(), ProposalError::Empty);
        assert_eq!(parse_proposal("```json\n```").unwrap_err(), ProposalError::Empty);
        assert!(matches!(
            parse_proposal("Sure! Here is the change"),
            Err(ProposalError::NotJson(_))
        ));
        assert_eq!(
            parse_proposal(r#"["file"]"#).unwrap_err(),
            ProposalError::NotAnObject
        );
        assert_eq!(
            parse_proposal(r#"{"file":"index.html","summary":"x"}"#).unwrap_err(),
            ProposalError::MissingKey("code")
        );
        assert_eq!(
            parse_proposal(r#"{"file":"index.html","summary":"x","code":42}"#).unwrap_err(),
            ProposalError::WrongType {
                key: "code",
                expected: "string"
            }
        );
        assert_eq!(
            parse_proposal(r#"{"file":" ","summary":"x","code":""}"#).unwrap_err(),
            ProposalError::EmptyPath
        );
        assert!(matches!(
            parse_proposal(r#"{"file":"../etc/passwd","summary":"x","code":""}"#),
            Err(ProposalError::UnsafePath(_))
        ));
    }
}
