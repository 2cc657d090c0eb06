//! Prompt history cache
//!
//! One append-only log backs every session, so a change to its mtime clears
//! every cached session at once. A miss scans the whole log and keeps only
//! the requested session's lines; the log is small next to the transcripts,
//! so no persistent index is kept for it.

use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::indexer::mtime_millis;
use crate::jsonl;

const TITLE_MAX_CHARS: usize = 80;
/// Arguments longer than this make a slash command a meaningful title
const COMMAND_ARGS_THRESHOLD: usize = 20;

/// One logged user prompt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPrompt {
    pub prompt: String,
    /// Unix epoch milliseconds
    pub timestamp: i64,
    pub project: Option<String>,
    /// Pasted content attached to the prompt, if any
    pub attachments: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryLine {
    display: Option<String>,
    timestamp: Option<i64>,
    project: Option<String>,
    session_id: Option<String>,
    pasted_contents: Option<Value>,
}

struct CachedPrompts {
    prompts: Vec<HistoryPrompt>,
    loaded_at: Instant,
}

pub struct HistoryPromptCache {
    path: PathBuf,
    ttl: Duration,
    sessions: LruCache<String, CachedPrompts>,
    /// mtime of the log when the cached entries were loaded
    file_mtime: Option<i64>,
    scans: usize,
}

impl HistoryPromptCache {
    pub fn new(path: PathBuf, max_sessions: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_sessions).unwrap_or(NonZeroUsize::MIN);
        Self {
            path,
            ttl,
            sessions: LruCache::new(capacity),
            file_mtime: None,
            scans: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Prompts logged for `session_id`, oldest first.
    ///
    /// A missing log yields no prompts.
    pub fn get_session_prompts(&mut self, session_id: &str) -> Result<Vec<HistoryPrompt>> {
        let mtime = match std::fs::metadata(&self.path) {
            Ok(meta) => mtime_millis(meta.modified()?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.clear();
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        if self.file_mtime != Some(mtime) {
            if self.file_mtime.is_some() {
                tracing::debug!(path = %self.path.display(), "History log changed, clearing cache");
            }
            self.sessions.clear();
            self.file_mtime = Some(mtime);
        }

        if let Some(cached) = self.sessions.get(session_id) {
            if cached.loaded_at.elapsed() < self.ttl {
                return Ok(cached.prompts.clone());
            }
        }

        let prompts = self.scan(session_id)?;
        self.sessions.put(
            session_id.to_string(),
            CachedPrompts {
                prompts: prompts.clone(),
                loaded_at: Instant::now(),
            },
        );
        Ok(prompts)
    }

    fn scan(&mut self, session_id: &str) -> Result<Vec<HistoryPrompt>> {
        self.scans += 1;
        let prompts = scan_log(&self.path, |line| line.session_id.as_deref() == Some(session_id))?;
        tracing::debug!(session = %session_id, count = prompts.len(), "Scanned history log");
        Ok(prompts)
    }

    /// Distinct session ids in the log, in first-seen order.
    ///
    /// Full scan, not cached.
    pub fn all_session_ids(&self) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for_each_entry(&self.path, |entry| {
            if let Some(id) = entry.session_id {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
        })?;
        Ok(ids)
    }

    /// Every prompt logged from a project path, oldest first. Not cached.
    pub fn project_prompts(&self, project: &str) -> Result<Vec<HistoryPrompt>> {
        scan_log(&self.path, |line| line.project.as_deref() == Some(project))
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
        self.file_mtime = None;
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of full log scans performed so far
    pub fn scan_count(&self) -> usize {
        self.scans
    }
}

/// Stream the log, handing each well-formed line to `visit`
fn for_each_entry(path: &Path, mut visit: impl FnMut(HistoryLine)) -> Result<()> {
    let lines = match jsonl::open_at(path, 0) {
        Ok(lines) => lines,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for line in lines {
        let line = line?;
        if line.is_blank() {
            continue;
        }
        if let Ok(entry) = serde_json::from_slice::<HistoryLine>(line.content()) {
            visit(entry);
        }
    }
    Ok(())
}

fn scan_log(path: &Path, keep: impl Fn(&HistoryLine) -> bool) -> Result<Vec<HistoryPrompt>> {
    let mut prompts = Vec::new();
    for_each_entry(path, |entry| {
        if !keep(&entry) {
            return;
        }
        prompts.push(HistoryPrompt {
            prompt: entry.display.unwrap_or_default(),
            timestamp: entry.timestamp.unwrap_or(0),
            project: entry.project,
            attachments: entry
                .pasted_contents
                .filter(|v| !v.is_null() && v.as_object().map_or(true, |o| !o.is_empty())),
        });
    })?;
    prompts.sort_by_key(|p| p.timestamp);
    Ok(prompts)
}

/// Session title derived from its most recent prompt.
///
/// A leading slash command is dropped unless its arguments are substantial;
/// a bare command yields no title.
pub fn title_from_history(prompts: &[HistoryPrompt]) -> Option<String> {
    let last = prompts.last()?;
    let text = last.prompt.trim();

    let text = match text.strip_prefix('/') {
        Some(command) => {
            let args = command
                .split_once(char::is_whitespace)
                .map(|(_, args)| args.trim())
                .unwrap_or("");
            if args.chars().count() > COMMAND_ARGS_THRESHOLD {
                text
            } else {
                args
            }
        }
        None => text,
    };

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }

    if collapsed.chars().count() > TITLE_MAX_CHARS {
        let cut: String = collapsed.chars().take(TITLE_MAX_CHARS - 3).collect();
        Some(format!("{}...", cut.trim_end()))
    } else {
        Some(collapsed)
    }
}
