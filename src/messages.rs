//! On-demand message access
//!
//! Two caches, kept apart so listing a session never loads message bodies:
//!
//! - the list cache holds, per session, the ordered message summaries and
//!   where each message lives on disk. It is rebuilt from the session's
//!   files when forced, stale (TTL), or when any contributing file's mtime
//!   moved. Eviction drops the least recently built session.
//! - the body cache holds parsed messages keyed by message number, filled
//!   one line read at a time. Strict LRU by access, plus a TTL so a body is
//!   re-read once the file may have been rewritten.
//!
//! Rebuilding a session's list drops that session's bodies: message numbers
//! are positions in the list, so the two caches must agree on numbering.

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::Serialize;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::history::HistoryPromptCache;
use crate::indexer::{mtime_millis, transcript_files};
use crate::jsonl;
use crate::record::{self, TranscriptRecord};

/// Lightweight per-message metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    pub number: usize,
    pub id: String,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub message_type: String,
}

/// A session's message listing
#[derive(Debug, Clone, Serialize)]
pub struct MessageList {
    pub messages: Vec<MessageSummary>,
    pub total: usize,
    pub cached_at: DateTime<Utc>,
    pub last_user_prompt: Option<String>,
}

impl MessageList {
    /// Fingerprint of the listing; unchanged messages give an unchanged tag
    pub fn etag(&self) -> Result<String> {
        crate::etag::fingerprint(&self.messages)
    }
}

/// A message body with its number in the session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberedMessage {
    pub number: usize,
    pub message: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    project: String,
    session: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BodyKey {
    project: String,
    session: String,
    number: usize,
}

#[derive(Debug, Clone, Copy)]
struct Location {
    file: usize,
    offset: u64,
}

#[derive(Debug, Clone)]
struct SourceFile {
    path: PathBuf,
    mtime_ms: Option<i64>,
}

struct ListEntry {
    messages: Vec<MessageSummary>,
    /// Parallel to `messages`
    locations: Vec<Location>,
    files: Vec<SourceFile>,
    built_at: Instant,
    cached_at: DateTime<Utc>,
}

struct CachedBody {
    message: Value,
    fetched_at: Instant,
}

pub struct MessageAccess {
    projects_root: PathBuf,
    list_ttl: Duration,
    body_ttl: Duration,
    lists: LruCache<SessionKey, ListEntry>,
    bodies: LruCache<BodyKey, CachedBody>,
    history: Option<HistoryPromptCache>,
    disk_reads: usize,
    list_builds: usize,
}

impl MessageAccess {
    /// `projects_root` holds one directory per project.
    pub fn new(projects_root: PathBuf, config: &CacheConfig) -> Self {
        let capacity = |n: usize| NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN);
        Self {
            projects_root,
            list_ttl: config.list_ttl(),
            body_ttl: config.body_ttl(),
            lists: LruCache::new(capacity(config.max_sessions)),
            bodies: LruCache::new(capacity(config.max_messages)),
            history: None,
            disk_reads: 0,
            list_builds: 0,
        }
    }

    /// Enrich listings with the session's last prompt from this cache
    pub fn with_history(mut self, history: HistoryPromptCache) -> Self {
        self.history = Some(history);
        self
    }

    /// Message listing for a session, or `None` when it has no transcript.
    pub fn get_message_list(
        &mut self,
        project: &str,
        session: &str,
        force_refresh: bool,
    ) -> Option<MessageList> {
        let key = session_key(project, session);
        self.ensure_list(&key, force_refresh)?;

        let last_user_prompt = self.last_user_prompt(session);
        let entry = self.lists.peek(&key)?;
        Some(MessageList {
            messages: entry.messages.clone(),
            total: entry.messages.len(),
            cached_at: entry.cached_at,
            last_user_prompt,
        })
    }

    /// Body of message `number` (1-based), read from disk on a miss.
    pub fn get_message_by_number(
        &mut self,
        project: &str,
        session: &str,
        number: usize,
    ) -> Option<Value> {
        let key = session_key(project, session);
        self.ensure_list(&key, false)?;

        if let Some(message) = self.cached_body(&key, number) {
            return Some(message);
        }

        let (path, offset) = self.locate(&key, number)?;
        let message = self.read_body(&path, offset)?;
        self.store_body(&key, number, message.clone());
        Some(message)
    }

    /// Bodies for `start..=end`, clamped to the session, ordered by number.
    pub fn get_messages_by_range(
        &mut self,
        project: &str,
        session: &str,
        start: usize,
        end: usize,
    ) -> Vec<NumberedMessage> {
        let key = session_key(project, session);
        let Some(len) = self.ensure_list(&key, false) else {
            return Vec::new();
        };

        let first = start.max(1);
        let last = end.min(len);
        if first > last {
            return Vec::new();
        }

        let mut found = Vec::with_capacity(last - first + 1);
        let mut misses = Vec::new();
        for number in first..=last {
            match self.cached_body(&key, number) {
                Some(message) => found.push(NumberedMessage { number, message }),
                None => misses.push(number),
            }
        }

        for number in misses {
            let Some((path, offset)) = self.locate(&key, number) else {
                continue;
            };
            if let Some(message) = self.read_body(&path, offset) {
                self.store_body(&key, number, message.clone());
                found.push(NumberedMessage { number, message });
            }
        }

        found.sort_by_key(|m| m.number);
        found
    }

    /// Drop a session's listing and every cached body for it
    pub fn invalidate_cache(&mut self, project: &str, session: &str) {
        let key = session_key(project, session);
        self.lists.pop(&key);
        self.drop_bodies(&key);
    }

    pub fn clear(&mut self) {
        self.lists.clear();
        self.bodies.clear();
    }

    pub fn cached_lists(&self) -> usize {
        self.lists.len()
    }

    pub fn cached_bodies(&self) -> usize {
        self.bodies.len()
    }

    /// Single-line reads performed for message bodies
    pub fn disk_reads(&self) -> usize {
        self.disk_reads
    }

    /// Listings built from disk so far
    pub fn list_builds(&self) -> usize {
        self.list_builds
    }

    /// Make sure a fresh listing is cached; returns its length.
    fn ensure_list(&mut self, key: &SessionKey, force: bool) -> Option<usize> {
        if !force {
            if let Some(entry) = self.lists.peek(key) {
                if entry.built_at.elapsed() < self.list_ttl && files_unchanged(&entry.files) {
                    return Some(entry.messages.len());
                }
            }
        }

        let dir = self.projects_root.join(&key.project);
        self.list_builds += 1;
        let entry = match build_list(&dir, &key.session) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.lists.pop(key);
                self.drop_bodies(key);
                return None;
            }
            Err(e) => {
                tracing::warn!(
                    project = %key.project,
                    session = %key.session,
                    error = %e,
                    "Failed to build message list"
                );
                return None;
            }
        };

        tracing::debug!(
            project = %key.project,
            session = %key.session,
            messages = entry.messages.len(),
            files = entry.files.len(),
            "Rebuilt message list"
        );

        self.drop_bodies(key);
        let len = entry.messages.len();
        self.lists.push(key.clone(), entry);
        Some(len)
    }

    fn locate(&self, key: &SessionKey, number: usize) -> Option<(PathBuf, u64)> {
        let entry = self.lists.peek(key)?;
        if number == 0 || number > entry.locations.len() {
            return None;
        }
        let location = entry.locations[number - 1];
        let file = entry.files.get(location.file)?;
        Some((file.path.clone(), location.offset))
    }

    fn cached_body(&mut self, key: &SessionKey, number: usize) -> Option<Value> {
        let body_key = body_key(key, number);
        let body = self.bodies.get(&body_key)?;
        if body.fetched_at.elapsed() < self.body_ttl {
            return Some(body.message.clone());
        }
        self.bodies.pop(&body_key);
        None
    }

    fn store_body(&mut self, key: &SessionKey, number: usize, message: Value) {
        self.bodies.put(
            body_key(key, number),
            CachedBody {
                message,
                fetched_at: Instant::now(),
            },
        );
    }

    /// One line read and parse; failures are logged and count as a miss.
    fn read_body(&mut self, path: &Path, offset: u64) -> Option<Value> {
        self.disk_reads += 1;
        let line = match jsonl::read_line_at(path, offset) {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::warn!(path = %path.display(), offset, "Offset past end of file");
                return None;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), offset, error = %e, "Failed to read message");
                return None;
            }
        };
        match serde_json::from_slice(&line) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!(path = %path.display(), offset, error = %e, "Stale offset, message did not parse");
                None
            }
        }
    }

    fn drop_bodies(&mut self, key: &SessionKey) {
        let stale: Vec<BodyKey> = self
            .bodies
            .iter()
            .filter(|(k, _)| k.project == key.project && k.session == key.session)
            .map(|(k, _)| k.clone())
            .collect();
        for k in stale {
            self.bodies.pop(&k);
        }
    }

    fn last_user_prompt(&mut self, session: &str) -> Option<String> {
        let history = self.history.as_mut()?;
        match history.get_session_prompts(session) {
            Ok(prompts) => prompts.last().map(|p| p.prompt.clone()),
            Err(e) => {
                tracing::warn!(session = %session, error = %e, "History lookup failed");
                None
            }
        }
    }
}

fn session_key(project: &str, session: &str) -> SessionKey {
    SessionKey {
        project: project.to_string(),
        session: session.to_string(),
    }
}

fn body_key(key: &SessionKey, number: usize) -> BodyKey {
    BodyKey {
        project: key.project.clone(),
        session: key.session.clone(),
        number,
    }
}

fn file_mtime(path: &Path) -> Option<i64> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(mtime_millis)
}

fn files_unchanged(files: &[SourceFile]) -> bool {
    files.iter().all(|f| file_mtime(&f.path) == f.mtime_ms)
}

struct Collected {
    summary_id: String,
    message_type: String,
    timestamp: Option<DateTime<Utc>>,
    location: Location,
}

/// Scan every transcript in `dir` for records of `session`.
///
/// The session's own file is read first and must be readable; any other
/// file that fails to read is logged and left out. Records without a
/// timestamp take the previous record's (or, at the head of a file, the
/// file's first timestamp), so they stay next to their neighbours after the
/// chronological sort.
fn build_list(dir: &Path, session: &str) -> Result<Option<ListEntry>> {
    let own = dir.join(format!("{}.jsonl", session));
    let mut paths = vec![own.clone()];
    paths.extend(transcript_files(dir).into_iter().filter(|p| *p != own));

    let mut files = Vec::new();
    let mut collected = Vec::new();
    let mut last_seen: Option<DateTime<Utc>> = None;

    for path in paths {
        let mtime_ms = match file_mtime(&path) {
            Some(mtime) => mtime,
            None => continue,
        };
        let file_index = files.len();
        let records = match scan_file(&path, session, file_index) {
            Ok(records) => records,
            Err(e) if path == own => return Err(e.into()),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable transcript");
                continue;
            }
        };

        if records.is_empty() && path != own {
            continue;
        }
        let fallback = records.iter().find_map(|c| c.timestamp).or(last_seen);
        let mut carried = fallback;
        for mut record in records {
            match record.timestamp {
                Some(ts) => carried = Some(ts),
                None => record.timestamp = carried,
            }
            collected.push(record);
        }
        if carried.is_some() {
            last_seen = carried;
        }
        files.push(SourceFile {
            path,
            mtime_ms: Some(mtime_ms),
        });
    }

    if files.is_empty() {
        return Ok(None);
    }

    // Stable: equal timestamps keep file order
    collected.sort_by_key(|c| c.timestamp);

    let mut messages = Vec::with_capacity(collected.len());
    let mut locations = Vec::with_capacity(collected.len());
    for (i, c) in collected.into_iter().enumerate() {
        messages.push(MessageSummary {
            number: i + 1,
            id: c.summary_id,
            timestamp: c.timestamp,
            message_type: c.message_type,
        });
        locations.push(c.location);
    }

    Ok(Some(ListEntry {
        messages,
        locations,
        files,
        built_at: Instant::now(),
        cached_at: Utc::now(),
    }))
}

/// Records of `session` in one file, timestamps as written
fn scan_file(path: &Path, session: &str, file_index: usize) -> std::io::Result<Vec<Collected>> {
    let mut records = Vec::new();
    for line in jsonl::open_at(path, 0)? {
        let line = line?;
        if line.is_blank() {
            continue;
        }
        let Ok(TranscriptRecord::Message(msg)) = record::parse_record(line.content()) else {
            continue;
        };
        if msg.session_id != session {
            continue;
        }
        records.push(Collected {
            summary_id: msg
                .uuid
                .unwrap_or_else(|| record::synthetic_id(path, line.offset)),
            message_type: msg.kind.as_str().to_string(),
            timestamp: msg.timestamp,
            location: Location {
                file: file_index,
                offset: line.offset,
            },
        });
    }
    Ok(records)
}
