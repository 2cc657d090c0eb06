//! Transcript record parsing
//!
//! Each JSONL line is one record. Only the envelope fields needed for
//! indexing are decoded; unknown fields are ignored so new record shapes
//! never break the indexer.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use uuid::Uuid;

/// Discriminator of a transcript record (`type` field)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    User,
    Assistant,
    System,
    Summary,
    Other(String),
}

impl RecordKind {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "user" => RecordKind::User,
            "assistant" => RecordKind::Assistant,
            "system" => RecordKind::System,
            "summary" => RecordKind::Summary,
            other => RecordKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RecordKind::User => "user",
            RecordKind::Assistant => "assistant",
            RecordKind::System => "system",
            RecordKind::Summary => "summary",
            RecordKind::Other(tag) => tag,
        }
    }
}

/// A record attributed to a session
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub kind: RecordKind,
    pub session_id: String,
    pub uuid: Option<String>,
    pub parent_uuid: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub cwd: Option<String>,
    pub git_branch: Option<String>,
    pub version: Option<String>,
}

/// A parsed transcript line
#[derive(Debug, Clone)]
pub enum TranscriptRecord {
    /// Conversation summary; carries no session id
    Summary {
        summary: String,
        leaf_uuid: Option<String>,
    },
    Message(MessageRecord),
    /// Well-formed but not attributable to any session (snapshots, etc.)
    Unattributed,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    #[serde(rename = "type")]
    kind: Option<String>,
    session_id: Option<String>,
    uuid: Option<String>,
    parent_uuid: Option<String>,
    timestamp: Option<String>,
    cwd: Option<String>,
    git_branch: Option<String>,
    version: Option<String>,
    summary: Option<String>,
    leaf_uuid: Option<String>,
}

/// Parse one line's content into a record.
pub fn parse_record(line: &[u8]) -> Result<TranscriptRecord, serde_json::Error> {
    let raw: RawRecord = serde_json::from_slice(line)?;
    let kind = raw
        .kind
        .as_deref()
        .map(RecordKind::parse)
        .unwrap_or_else(|| RecordKind::Other("unknown".to_string()));

    let record = match (kind, raw.session_id) {
        (RecordKind::Summary, None) => match raw.summary {
            Some(summary) => TranscriptRecord::Summary {
                summary,
                leaf_uuid: raw.leaf_uuid,
            },
            None => TranscriptRecord::Unattributed,
        },
        (kind, Some(session_id)) => TranscriptRecord::Message(MessageRecord {
            kind,
            session_id,
            uuid: raw.uuid,
            parent_uuid: raw.parent_uuid,
            timestamp: raw.timestamp.as_deref().and_then(parse_timestamp),
            cwd: raw.cwd.filter(|c| !c.is_empty()),
            git_branch: raw.git_branch.filter(|b| !b.is_empty()),
            version: raw.version,
        }),
        (_, None) => TranscriptRecord::Unattributed,
    };
    Ok(record)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Stable identifier for a record without a uuid, derived from where it lives.
pub fn synthetic_id(path: &Path, offset: u64) -> String {
    let name = format!("{}:{}", path.display(), offset);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}
