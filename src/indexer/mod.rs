//! Incremental transcript indexing
//!
//! Each `*.jsonl` transcript is indexed from its last checkpoint:
//!
//! - same mtime as the checkpoint: skipped without reading
//! - grown (larger size and newer mtime): only the appended bytes are read
//! - anything else (shrunk, rewritten, no checkpoint): the session's index
//!   rows are purged and the file is read from offset 0
//!
//! Index rows and edges for one pass are written in a single transaction,
//! then the session row, and only then the checkpoint. A crash at any point
//! replays from the previous checkpoint; all writes are keyed upserts.
//!
//! Two passes over the same file must not run concurrently; callers
//! serialize per path.

mod display_name;

pub use display_name::{display_name_for_path, display_name_from_slug, resolve_display_name};

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::error::Result;
use crate::jsonl;
use crate::record::{self, TranscriptRecord};
use crate::store::{
    FileCheckpoint, IdentityEdge, IndexStore, MessageIndexEntry, ProjectUpdate, ProviderFlags,
    SessionUpdate, PLACEHOLDER_SUMMARY,
};

/// Why a file was not indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Modification time matches the checkpoint
    Unchanged,
    /// Stat, read or store failure; the message is logged
    Error(String),
}

impl SkipReason {
    pub fn as_str(&self) -> &str {
        match self {
            SkipReason::Unchanged => "unchanged",
            SkipReason::Error(_) => "error",
        }
    }
}

/// Result of one indexing pass over a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIndexResult {
    pub session_id: String,
    /// Messages added by this pass
    pub messages_indexed: usize,
    /// Messages indexed for the session after this pass
    pub total_messages: i64,
    pub is_incremental: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    Skipped(SkipReason),
    Indexed(FileIndexResult),
}

impl IndexOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, IndexOutcome::Skipped(_))
    }
}

/// Tally of a project directory scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectScan {
    pub project_name: String,
    pub display_name: String,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub files_failed: usize,
    pub messages_indexed: usize,
    pub session_count: i64,
}

/// Running state while streaming one file
#[derive(Default)]
struct PassState {
    summary: Option<String>,
    last_activity: Option<DateTime<Utc>>,
    cwd: Option<String>,
    git_branch: Option<String>,
    cli_version: Option<String>,
    entries: Vec<MessageIndexEntry>,
    edges: Vec<IdentityEdge>,
}

pub struct Indexer<'a> {
    store: &'a IndexStore,
}

impl<'a> Indexer<'a> {
    pub fn new(store: &'a IndexStore) -> Self {
        Self { store }
    }

    /// Index one transcript file.
    ///
    /// The project is the file's parent directory name. Failures are logged
    /// and reported as `Skipped(Error)`; they never propagate.
    pub fn index_file(&self, path: &Path, provider: &str) -> IndexOutcome {
        match self.try_index_file(path, provider) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to index file");
                IndexOutcome::Skipped(SkipReason::Error(e.to_string()))
            }
        }
    }

    fn try_index_file(&self, path: &Path, provider: &str) -> Result<IndexOutcome> {
        let metadata = fs::metadata(path)?;
        let mtime_ms = mtime_millis(metadata.modified()?);
        let size = metadata.len();
        let path_key = path.to_string_lossy().to_string();

        let checkpoint = self.store.get_file_checkpoint(&path_key)?;
        if let Some(cp) = checkpoint {
            if cp.mtime_ms == mtime_ms {
                tracing::debug!(path = %path.display(), "Unchanged since last pass");
                return Ok(IndexOutcome::Skipped(SkipReason::Unchanged));
            }
        }

        let session_id = session_id_for(path);
        let project_name = project_name_for(path);

        let (start, prior_messages, is_incremental) = match checkpoint {
            Some(cp) if cp.size < size && cp.mtime_ms < mtime_ms => {
                (cp.offset, self.store.count_session_messages(&session_id)?, true)
            }
            _ => (0, 0, false),
        };

        tracing::debug!(
            path = %path.display(),
            session = %session_id,
            start,
            incremental = is_incremental,
            "Indexing file"
        );

        let mut state = PassState::default();
        let mut end_offset = start;

        for line in jsonl::open_range(path, start, size)? {
            let line = line?;
            if line.is_blank() {
                end_offset = line.end_offset();
                continue;
            }

            match record::parse_record(line.content()) {
                Ok(TranscriptRecord::Summary { summary, .. }) => {
                    state.summary = Some(summary);
                }
                Ok(TranscriptRecord::Message(msg)) if msg.session_id == session_id => {
                    let number = prior_messages + state.entries.len() as i64 + 1;
                    let message_type = msg.kind.as_str().to_string();
                    let message_id = msg
                        .uuid
                        .clone()
                        .unwrap_or_else(|| record::synthetic_id(path, line.offset));

                    state.entries.push(MessageIndexEntry {
                        session_id: session_id.clone(),
                        message_number: number,
                        message_id,
                        message_type: message_type.clone(),
                        timestamp: msg.timestamp.map(|t| t.timestamp_millis()),
                        byte_offset: line.offset,
                        file_path: path_key.clone(),
                    });

                    if let Some(uuid) = msg.uuid {
                        state.edges.push(IdentityEdge {
                            uuid,
                            session_id: session_id.clone(),
                            parent_uuid: msg.parent_uuid,
                            message_type,
                        });
                    }

                    if let Some(ts) = msg.timestamp {
                        if state.last_activity.map_or(true, |last| ts > last) {
                            state.last_activity = Some(ts);
                        }
                    }
                    if state.cwd.is_none() {
                        state.cwd = msg.cwd;
                    }
                    if state.git_branch.is_none() {
                        state.git_branch = msg.git_branch;
                    }
                    if state.cli_version.is_none() {
                        state.cli_version = msg.version;
                    }
                }
                Ok(_) => {}
                Err(_) if !line.is_terminated() => {
                    // Writer is mid-append; pick this line up next pass
                    tracing::debug!(
                        path = %path.display(),
                        offset = line.offset,
                        "Stopping at incomplete trailing line"
                    );
                    break;
                }
                Err(e) => {
                    tracing::trace!(
                        path = %path.display(),
                        offset = line.offset,
                        error = %e,
                        "Skipping malformed line"
                    );
                }
            }
            end_offset = line.end_offset();
        }

        let messages_indexed = state.entries.len();
        let total_messages = prior_messages + messages_indexed as i64;
        let purge = if is_incremental {
            None
        } else {
            Some(session_id.as_str())
        };

        self.store
            .write_file_batch(purge, &state.entries, &state.edges)?;

        self.store.upsert_session(&SessionUpdate {
            id: &session_id,
            project_name: &project_name,
            summary: state.summary.as_deref().unwrap_or(PLACEHOLDER_SUMMARY),
            message_count: total_messages,
            last_activity: state.last_activity.map(|t| t.timestamp_millis()),
            cwd: state.cwd.as_deref(),
            provider,
            git_branch: state.git_branch.as_deref(),
            cli_version: state.cli_version.as_deref(),
            file_path: Some(&path_key),
        })?;

        self.store.set_file_checkpoint(
            &path_key,
            FileCheckpoint {
                offset: end_offset,
                mtime_ms,
                size,
            },
        )?;

        Ok(IndexOutcome::Indexed(FileIndexResult {
            session_id,
            messages_indexed,
            total_messages,
            is_incremental,
        }))
    }

    /// Index every transcript in a project directory, then refresh the
    /// project row from the store's session rollup.
    pub fn index_project(&self, dir: &Path, provider: &str) -> Result<ProjectScan> {
        let project_name = dir_name(dir);
        let mut scan = ProjectScan {
            project_name: project_name.clone(),
            ..Default::default()
        };

        let files = transcript_files(dir);
        if files.is_empty() {
            return Ok(scan);
        }

        for file in &files {
            match self.index_file(file, provider) {
                IndexOutcome::Indexed(result) => {
                    scan.files_indexed += 1;
                    scan.messages_indexed += result.messages_indexed;
                }
                IndexOutcome::Skipped(SkipReason::Unchanged) => scan.files_unchanged += 1,
                IndexOutcome::Skipped(SkipReason::Error(_)) => scan.files_failed += 1,
            }
        }

        let (session_count, last_activity) = self.store.project_rollup(&project_name)?;
        let full_path = self.store.project_cwd(&project_name)?;
        let display_name = resolve_display_name(full_path.as_deref(), &project_name);

        self.store.upsert_project(&ProjectUpdate {
            name: &project_name,
            display_name: &display_name,
            full_path: full_path.as_deref(),
            session_count,
            last_activity,
            flags: ProviderFlags::for_provider(provider),
        })?;

        scan.display_name = display_name;
        scan.session_count = session_count;
        Ok(scan)
    }

    /// Scan every project directory under a source root.
    ///
    /// A project that fails to scan is logged and left out of the result.
    pub fn index_root(&self, root: &Path, provider: &str) -> Vec<ProjectScan> {
        let mut scans = Vec::new();

        for entry in WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
        {
            match self.index_project(entry.path(), provider) {
                Ok(scan) if scan.files_indexed + scan.files_unchanged + scan.files_failed > 0 => {
                    scans.push(scan)
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        project = %entry.path().display(),
                        error = %e,
                        "Failed to scan project"
                    );
                }
            }
        }

        let messages: usize = scans.iter().map(|s| s.messages_indexed).sum();
        tracing::info!(
            root = %root.display(),
            projects = scans.len(),
            messages,
            "Index pass complete"
        );
        scans
    }
}

/// Session id is the transcript's file name without extension
pub fn session_id_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn project_name_for(path: &Path) -> String {
    path.parent().map(dir_name).unwrap_or_default()
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// `*.jsonl` files directly inside `dir`, sorted by name
pub fn transcript_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map(|e| e == "jsonl").unwrap_or(false))
        .collect()
}

pub(crate) fn mtime_millis(modified: SystemTime) -> i64 {
    DateTime::<Utc>::from(modified).timestamp_millis()
}
