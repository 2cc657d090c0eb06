//! Durable index storage with SQLite
//!
//! Holds file checkpoints, project and session metadata, the message
//! byte-offset index and the uuid parentage graph. Every write is an upsert
//! or a batched insert scoped to one session, so replaying a pass after a
//! crash converges to the same rows.

mod schema;

use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;

use crate::error::Result;

pub use schema::SCHEMA;

/// Summary stored until a transcript supplies a real one
pub const PLACEHOLDER_SUMMARY: &str = "New Session";

/// Bitmask of transcript providers that contributed to a project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProviderFlags(pub u32);

impl ProviderFlags {
    pub const NONE: ProviderFlags = ProviderFlags(0);
    pub const CLAUDE: ProviderFlags = ProviderFlags(1);
    pub const CODEX: ProviderFlags = ProviderFlags(1 << 1);
    pub const CURSOR: ProviderFlags = ProviderFlags(1 << 2);

    /// Flag for a provider tag; unknown tags contribute nothing
    pub fn for_provider(tag: &str) -> Self {
        match tag {
            "claude" => Self::CLAUDE,
            "codex" => Self::CODEX,
            "cursor" => Self::CURSOR,
            _ => Self::NONE,
        }
    }

    pub fn union(self, other: Self) -> Self {
        ProviderFlags(self.0 | other.0)
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn names(self) -> Vec<&'static str> {
        [
            (Self::CLAUDE, "claude"),
            (Self::CODEX, "codex"),
            (Self::CURSOR, "cursor"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect()
    }
}

/// Indexing progress for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileCheckpoint {
    pub offset: u64,
    pub mtime_ms: i64,
    pub size: u64,
}

/// Project fields written after a directory scan
#[derive(Debug, Clone)]
pub struct ProjectUpdate<'a> {
    pub name: &'a str,
    pub display_name: &'a str,
    pub full_path: Option<&'a str>,
    pub session_count: i64,
    pub last_activity: Option<i64>,
    pub flags: ProviderFlags,
}

/// Session fields accumulated by one indexing pass
#[derive(Debug, Clone)]
pub struct SessionUpdate<'a> {
    pub id: &'a str,
    pub project_name: &'a str,
    pub summary: &'a str,
    pub message_count: i64,
    pub last_activity: Option<i64>,
    pub cwd: Option<&'a str>,
    pub provider: &'a str,
    pub git_branch: Option<&'a str>,
    pub cli_version: Option<&'a str>,
    pub file_path: Option<&'a str>,
}

/// One row of the message byte-offset index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageIndexEntry {
    pub session_id: String,
    pub message_number: i64,
    pub message_id: String,
    pub message_type: String,
    pub timestamp: Option<i64>,
    pub byte_offset: u64,
    pub file_path: String,
}

/// uuid -> session/parent mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityEdge {
    pub uuid: String,
    pub session_id: String,
    pub parent_uuid: Option<String>,
    pub message_type: String,
}

/// Filters for session listing
#[derive(Debug, Clone, Default)]
pub struct SessionFilter<'a> {
    pub project_name: Option<&'a str>,
    pub since_ms: Option<i64>,
    pub provider: Option<&'a str>,
    pub limit: i64,
    pub offset: i64,
}

pub struct IndexStore {
    conn: Connection,
}

impl IndexStore {
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ============================================
    // CHECKPOINTS
    // ============================================

    pub fn get_file_checkpoint(&self, path: &str) -> Result<Option<FileCheckpoint>> {
        let checkpoint = self
            .conn
            .query_row(
                "SELECT byte_offset, mtime_ms, file_size FROM file_checkpoints WHERE file_path = ?",
                params![path],
                |row| {
                    Ok(FileCheckpoint {
                        offset: row.get::<_, i64>(0)? as u64,
                        mtime_ms: row.get(1)?,
                        size: row.get::<_, i64>(2)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(checkpoint)
    }

    pub fn set_file_checkpoint(&self, path: &str, checkpoint: FileCheckpoint) -> Result<()> {
        self.conn.execute(
            r#"INSERT INTO file_checkpoints (file_path, byte_offset, mtime_ms, file_size, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(file_path) DO UPDATE SET
                   byte_offset = excluded.byte_offset,
                   mtime_ms = excluded.mtime_ms,
                   file_size = excluded.file_size,
                   updated_at = excluded.updated_at"#,
            params![
                path,
                checkpoint.offset as i64,
                checkpoint.mtime_ms,
                checkpoint.size as i64,
                now_ms(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_checkpoint(&self, path: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM file_checkpoints WHERE file_path = ?",
            params![path],
        )?;
        Ok(())
    }

    /// Forget all progress; the next pass reindexes every file from zero
    pub fn reset_checkpoints(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM file_checkpoints", [])?)
    }

    // ============================================
    // PROJECTS
    // ============================================

    /// Last activity only moves forward and provider flags are only ever added.
    pub fn upsert_project(&self, project: &ProjectUpdate<'_>) -> Result<()> {
        self.conn.execute(
            r#"INSERT INTO projects
               (name, display_name, full_path, session_count, last_activity, provider_flags, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(name) DO UPDATE SET
                   display_name = excluded.display_name,
                   full_path = COALESCE(excluded.full_path, projects.full_path),
                   session_count = excluded.session_count,
                   last_activity = CASE
                       WHEN projects.last_activity IS NULL THEN excluded.last_activity
                       WHEN excluded.last_activity IS NULL THEN projects.last_activity
                       ELSE MAX(projects.last_activity, excluded.last_activity)
                   END,
                   provider_flags = projects.provider_flags | excluded.provider_flags,
                   updated_at = excluded.updated_at"#,
            params![
                project.name,
                project.display_name,
                project.full_path,
                project.session_count,
                project.last_activity,
                project.flags.0 as i64,
                now_ms(),
            ],
        )?;
        Ok(())
    }

    pub fn get_project(&self, name: &str) -> Result<Option<ProjectRow>> {
        let row = self
            .conn
            .query_row(
                &format!("{} WHERE name = ?", PROJECT_SELECT),
                params![name],
                map_project,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_projects(&self) -> Result<Vec<ProjectRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} ORDER BY last_activity IS NULL, last_activity DESC, name",
            PROJECT_SELECT
        ))?;
        let rows = stmt.query_map([], map_project)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Working directory of the project's most recently active session
    pub fn project_cwd(&self, name: &str) -> Result<Option<String>> {
        let cwd = self
            .conn
            .query_row(
                r#"SELECT cwd FROM sessions
                   WHERE project_name = ? AND cwd IS NOT NULL
                   ORDER BY last_activity IS NULL, last_activity DESC
                   LIMIT 1"#,
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(cwd)
    }

    /// Session count and latest activity across a project's sessions
    pub fn project_rollup(&self, name: &str) -> Result<(i64, Option<i64>)> {
        let rollup = self.conn.query_row(
            "SELECT COUNT(*), MAX(last_activity) FROM sessions WHERE project_name = ?",
            params![name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(rollup)
    }

    // ============================================
    // SESSIONS
    // ============================================

    /// Upsert a session without ever moving its counters backwards.
    ///
    /// The summary is replaced only by a non-placeholder value; cwd, file
    /// path and grouping fields keep their first non-null value.
    pub fn upsert_session(&self, session: &SessionUpdate<'_>) -> Result<()> {
        self.conn.execute(
            r#"INSERT INTO sessions
               (id, project_name, summary, message_count, last_activity, cwd, provider,
                git_branch, cli_version, file_path, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
               ON CONFLICT(id) DO UPDATE SET
                   project_name = excluded.project_name,
                   summary = CASE
                       WHEN excluded.summary != ?12 THEN excluded.summary
                       ELSE sessions.summary
                   END,
                   message_count = MAX(sessions.message_count, excluded.message_count),
                   last_activity = CASE
                       WHEN sessions.last_activity IS NULL THEN excluded.last_activity
                       WHEN excluded.last_activity IS NULL THEN sessions.last_activity
                       ELSE MAX(sessions.last_activity, excluded.last_activity)
                   END,
                   cwd = COALESCE(sessions.cwd, excluded.cwd),
                   provider = excluded.provider,
                   git_branch = COALESCE(sessions.git_branch, excluded.git_branch),
                   cli_version = COALESCE(sessions.cli_version, excluded.cli_version),
                   file_path = COALESCE(sessions.file_path, excluded.file_path),
                   updated_at = excluded.updated_at"#,
            params![
                session.id,
                session.project_name,
                session.summary,
                session.message_count,
                session.last_activity,
                session.cwd,
                session.provider,
                session.git_branch,
                session.cli_version,
                session.file_path,
                now_ms(),
                PLACEHOLDER_SUMMARY,
            ],
        )?;
        Ok(())
    }

    pub fn get_session(&self, id: &str) -> Result<Option<SessionRow>> {
        let row = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?", SESSION_SELECT),
                params![id],
                map_session,
            )
            .optional()?;
        Ok(row)
    }

    /// Sessions newest first, optionally narrowed by project, activity and provider
    pub fn get_sessions_filtered(&self, filter: &SessionFilter<'_>) -> Result<Vec<SessionRow>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(project) = filter.project_name {
            clauses.push("project_name = ?");
            args.push(Box::new(project.to_string()));
        }
        if let Some(since) = filter.since_ms {
            clauses.push("last_activity >= ?");
            args.push(Box::new(since));
        }
        if let Some(provider) = filter.provider {
            clauses.push("provider = ?");
            args.push(Box::new(provider.to_string()));
        }

        let mut query = SESSION_SELECT.to_string();
        if !clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&clauses.join(" AND "));
        }
        query.push_str(" ORDER BY last_activity IS NULL, last_activity DESC, id LIMIT ? OFFSET ?");
        args.push(Box::new(filter.limit));
        args.push(Box::new(filter.offset));

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), map_session)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    // ============================================
    // MESSAGE INDEX
    // ============================================

    pub fn insert_message_index_batch(&self, entries: &[MessageIndexEntry]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        insert_entries(&tx, entries)?;
        tx.commit()?;
        Ok(())
    }

    pub fn insert_identity_edge_batch(&self, edges: &[IdentityEdge]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        insert_edges(&tx, edges)?;
        tx.commit()?;
        Ok(())
    }

    /// Write one file pass's index rows and edges atomically.
    ///
    /// With `purge_session`, that session's existing index rows are removed
    /// in the same transaction before the new rows land.
    pub fn write_file_batch(
        &self,
        purge_session: Option<&str>,
        entries: &[MessageIndexEntry],
        edges: &[IdentityEdge],
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        if let Some(session_id) = purge_session {
            tx.execute(
                "DELETE FROM message_index WHERE session_id = ?",
                params![session_id],
            )?;
        }
        insert_entries(&tx, entries)?;
        insert_edges(&tx, edges)?;
        tx.commit()?;
        Ok(())
    }

    pub fn delete_session_message_index(&self, session_id: &str) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM message_index WHERE session_id = ?",
            params![session_id],
        )?)
    }

    pub fn count_session_messages(&self, session_id: &str) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COALESCE(MAX(message_number), 0) FROM message_index WHERE session_id = ?",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn list_messages_by_session(&self, session_id: &str) -> Result<Vec<MessageIndexEntry>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT session_id, message_number, message_id, message_type, timestamp,
                      byte_offset, file_path
               FROM message_index
               WHERE session_id = ?
               ORDER BY message_number"#,
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok(MessageIndexEntry {
                session_id: row.get(0)?,
                message_number: row.get(1)?,
                message_id: row.get(2)?,
                message_type: row.get(3)?,
                timestamp: row.get(4)?,
                byte_offset: row.get::<_, i64>(5)? as u64,
                file_path: row.get(6)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    // ============================================
    // IDENTITY GRAPH
    // ============================================

    pub fn get_session_for_uuid(&self, uuid: &str) -> Result<Option<String>> {
        let session = self
            .conn
            .query_row(
                "SELECT session_id FROM identity_edges WHERE uuid = ?",
                params![uuid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(session)
    }

    /// Timeline roots: user messages with no parent
    pub fn get_first_user_messages(&self, project_name: Option<&str>) -> Result<Vec<RootMessage>> {
        let map_row = |row: &rusqlite::Row| -> rusqlite::Result<RootMessage> {
            Ok(RootMessage {
                uuid: row.get(0)?,
                session_id: row.get(1)?,
            })
        };

        let rows = match project_name {
            Some(project) => {
                let mut stmt = self.conn.prepare(
                    r#"SELECT e.uuid, e.session_id
                       FROM identity_edges e
                       JOIN sessions s ON s.id = e.session_id
                       WHERE e.parent_uuid IS NULL AND e.message_type = 'user'
                         AND s.project_name = ?
                       ORDER BY e.session_id, e.uuid"#,
                )?;
                let rows = stmt.query_map(params![project], map_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(
                    r#"SELECT uuid, session_id
                       FROM identity_edges
                       WHERE parent_uuid IS NULL AND message_type = 'user'
                       ORDER BY session_id, uuid"#,
                )?;
                let rows = stmt.query_map([], map_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }
}

fn insert_entries(conn: &Connection, entries: &[MessageIndexEntry]) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(
        r#"INSERT OR REPLACE INTO message_index
           (session_id, message_number, message_id, message_type, timestamp, byte_offset, file_path)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )?;
    for entry in entries {
        stmt.execute(params![
            entry.session_id,
            entry.message_number,
            entry.message_id,
            entry.message_type,
            entry.timestamp,
            entry.byte_offset as i64,
            entry.file_path,
        ])?;
    }
    Ok(())
}

fn insert_edges(conn: &Connection, edges: &[IdentityEdge]) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(
        r#"INSERT INTO identity_edges (uuid, session_id, parent_uuid, message_type)
           VALUES (?, ?, ?, ?)
           ON CONFLICT(uuid) DO UPDATE SET
               session_id = excluded.session_id,
               parent_uuid = excluded.parent_uuid,
               message_type = excluded.message_type"#,
    )?;
    for edge in edges {
        stmt.execute(params![
            edge.uuid,
            edge.session_id,
            edge.parent_uuid,
            edge.message_type,
        ])?;
    }
    Ok(())
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================
// ROW TYPES
// ============================================

const PROJECT_SELECT: &str = r#"SELECT name, display_name, full_path, session_count,
        last_activity, provider_flags, updated_at
   FROM projects"#;

const SESSION_SELECT: &str = r#"SELECT id, project_name, summary, message_count, last_activity,
        cwd, provider, git_branch, cli_version, file_path, updated_at
   FROM sessions"#;

fn map_project(row: &rusqlite::Row) -> rusqlite::Result<ProjectRow> {
    Ok(ProjectRow {
        name: row.get(0)?,
        display_name: row.get(1)?,
        full_path: row.get(2)?,
        session_count: row.get(3)?,
        last_activity: row.get(4)?,
        flags: ProviderFlags(row.get::<_, i64>(5)? as u32),
        updated_at: row.get(6)?,
    })
}

fn map_session(row: &rusqlite::Row) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        project_name: row.get(1)?,
        summary: row.get(2)?,
        message_count: row.get(3)?,
        last_activity: row.get(4)?,
        cwd: row.get(5)?,
        provider: row.get(6)?,
        git_branch: row.get(7)?,
        cli_version: row.get(8)?,
        file_path: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectRow {
    pub name: String,
    pub display_name: String,
    pub full_path: Option<String>,
    pub session_count: i64,
    pub last_activity: Option<i64>,
    pub flags: ProviderFlags,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRow {
    pub id: String,
    pub project_name: String,
    pub summary: String,
    pub message_count: i64,
    pub last_activity: Option<i64>,
    pub cwd: Option<String>,
    pub provider: String,
    pub git_branch: Option<String>,
    pub cli_version: Option<String>,
    pub file_path: Option<String>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootMessage {
    pub uuid: String,
    pub session_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session<'a>(id: &'a str, count: i64, last: Option<i64>, summary: &'a str) -> SessionUpdate<'a> {
        SessionUpdate {
            id,
            project_name: "proj",
            summary,
            message_count: count,
            last_activity: last,
            cwd: None,
            provider: "claude",
            git_branch: None,
            cli_version: None,
            file_path: None,
        }
    }

    fn entry(session: &str, number: i64, offset: u64) -> MessageIndexEntry {
        MessageIndexEntry {
            session_id: session.to_string(),
            message_number: number,
            message_id: format!("m{}", number),
            message_type: "user".to_string(),
            timestamp: Some(number * 1000),
            byte_offset: offset,
            file_path: "/tmp/s.jsonl".to_string(),
        }
    }

    #[test]
    fn test_checkpoint_roundtrip_and_reset() {
        let store = IndexStore::open_in_memory().unwrap();
        assert!(store.get_file_checkpoint("/a.jsonl").unwrap().is_none());

        let cp = FileCheckpoint {
            offset: 120,
            mtime_ms: 1_700_000_000_000,
            size: 120,
        };
        store.set_file_checkpoint("/a.jsonl", cp).unwrap();
        store
            .set_file_checkpoint(
                "/a.jsonl",
                FileCheckpoint {
                    offset: 200,
                    ..cp
                },
            )
            .unwrap();
        assert_eq!(store.get_file_checkpoint("/a.jsonl").unwrap().unwrap().offset, 200);

        store.set_file_checkpoint("/b.jsonl", cp).unwrap();
        store.delete_checkpoint("/b.jsonl").unwrap();
        assert!(store.get_file_checkpoint("/b.jsonl").unwrap().is_none());

        assert_eq!(store.reset_checkpoints().unwrap(), 1);
        assert!(store.get_file_checkpoint("/a.jsonl").unwrap().is_none());
    }

    #[test]
    fn test_session_metadata_never_regresses() {
        let store = IndexStore::open_in_memory().unwrap();
        store
            .upsert_session(&session("s1", 10, Some(5_000), "Refactor parser"))
            .unwrap();
        store
            .upsert_session(&session("s1", 3, Some(1_000), PLACEHOLDER_SUMMARY))
            .unwrap();
        store.upsert_session(&session("s1", 4, None, PLACEHOLDER_SUMMARY)).unwrap();

        let row = store.get_session("s1").unwrap().unwrap();
        assert_eq!(row.message_count, 10);
        assert_eq!(row.last_activity, Some(5_000));
        assert_eq!(row.summary, "Refactor parser");

        store.upsert_session(&session("s1", 12, Some(9_000), "New title")).unwrap();
        let row = store.get_session("s1").unwrap().unwrap();
        assert_eq!(row.message_count, 12);
        assert_eq!(row.last_activity, Some(9_000));
        assert_eq!(row.summary, "New title");
    }

    #[test]
    fn test_session_first_cwd_wins() {
        let store = IndexStore::open_in_memory().unwrap();
        let mut first = session("s1", 1, None, PLACEHOLDER_SUMMARY);
        store.upsert_session(&first).unwrap();
        first.cwd = Some("/work/one");
        first.file_path = Some("/p/s1.jsonl");
        store.upsert_session(&first).unwrap();
        first.cwd = Some("/work/two");
        first.file_path = Some("/p/other.jsonl");
        store.upsert_session(&first).unwrap();

        let row = store.get_session("s1").unwrap().unwrap();
        assert_eq!(row.cwd.as_deref(), Some("/work/one"));
        assert_eq!(row.file_path.as_deref(), Some("/p/s1.jsonl"));
    }

    #[test]
    fn test_project_flags_are_monotonic() {
        let store = IndexStore::open_in_memory().unwrap();
        let mut update = ProjectUpdate {
            name: "-work-app",
            display_name: "work/app",
            full_path: Some("/work/app"),
            session_count: 2,
            last_activity: Some(2_000),
            flags: ProviderFlags::CLAUDE,
        };
        store.upsert_project(&update).unwrap();

        update.flags = ProviderFlags::CODEX;
        update.last_activity = Some(1_000);
        update.full_path = None;
        update.session_count = 3;
        store.upsert_project(&update).unwrap();

        let row = store.get_project("-work-app").unwrap().unwrap();
        assert!(row.flags.contains(ProviderFlags::CLAUDE));
        assert!(row.flags.contains(ProviderFlags::CODEX));
        assert_eq!(row.flags.names(), vec!["claude", "codex"]);
        assert_eq!(row.last_activity, Some(2_000));
        assert_eq!(row.full_path.as_deref(), Some("/work/app"));
        assert_eq!(row.session_count, 3);
    }

    #[test]
    fn test_message_index_batch_and_purge() {
        let store = IndexStore::open_in_memory().unwrap();
        store
            .insert_message_index_batch(&[entry("s1", 1, 0), entry("s1", 2, 40), entry("s2", 1, 0)])
            .unwrap();
        // Replaying the same keys does not duplicate rows
        store.insert_message_index_batch(&[entry("s1", 2, 40)]).unwrap();

        let rows = store.list_messages_by_session("s1").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].byte_offset, 40);
        assert_eq!(store.count_session_messages("s1").unwrap(), 2);

        assert_eq!(store.delete_session_message_index("s1").unwrap(), 2);
        assert_eq!(store.count_session_messages("s1").unwrap(), 0);
        assert_eq!(store.list_messages_by_session("s2").unwrap().len(), 1);
    }

    #[test]
    fn test_identity_roots() {
        let store = IndexStore::open_in_memory().unwrap();
        store.upsert_session(&session("s1", 2, None, PLACEHOLDER_SUMMARY)).unwrap();
        let mut other = session("s2", 1, None, PLACEHOLDER_SUMMARY);
        other.project_name = "elsewhere";
        store.upsert_session(&other).unwrap();

        let edge = |uuid: &str, session: &str, parent: Option<&str>, kind: &str| IdentityEdge {
            uuid: uuid.to_string(),
            session_id: session.to_string(),
            parent_uuid: parent.map(String::from),
            message_type: kind.to_string(),
        };
        store
            .write_file_batch(
                None,
                &[],
                &[
                    edge("a", "s1", None, "user"),
                    edge("b", "s1", Some("a"), "assistant"),
                    edge("c", "s2", None, "user"),
                    edge("d", "s2", None, "system"),
                ],
            )
            .unwrap();

        let all = store.get_first_user_messages(None).unwrap();
        assert_eq!(all.len(), 2);
        let scoped = store.get_first_user_messages(Some("proj")).unwrap();
        assert_eq!(
            scoped,
            vec![RootMessage {
                uuid: "a".to_string(),
                session_id: "s1".to_string()
            }]
        );
        assert_eq!(store.get_session_for_uuid("b").unwrap().as_deref(), Some("s1"));
        assert!(store.get_session_for_uuid("zzz").unwrap().is_none());
    }

    #[test]
    fn test_identity_edge_upsert_supersedes() {
        let store = IndexStore::open_in_memory().unwrap();
        let edge = |uuid: &str, session: &str, parent: Option<&str>, kind: &str| IdentityEdge {
            uuid: uuid.to_string(),
            session_id: session.to_string(),
            parent_uuid: parent.map(String::from),
            message_type: kind.to_string(),
        };

        store
            .insert_identity_edge_batch(&[edge("u1", "s1", None, "user"), edge("u2", "s1", None, "user")])
            .unwrap();
        assert_eq!(store.get_first_user_messages(None).unwrap().len(), 2);

        // Same uuid seen again: every column takes the newer values
        store
            .insert_identity_edge_batch(&[edge("u1", "s2", Some("p"), "assistant")])
            .unwrap();
        assert_eq!(store.get_session_for_uuid("u1").unwrap().as_deref(), Some("s2"));
        assert_eq!(
            store.get_first_user_messages(None).unwrap(),
            vec![RootMessage {
                uuid: "u2".to_string(),
                session_id: "s1".to_string()
            }]
        );
    }

    #[test]
    fn test_sessions_filtered() {
        let store = IndexStore::open_in_memory().unwrap();
        store.upsert_session(&session("old", 1, Some(1_000), "a")).unwrap();
        store.upsert_session(&session("new", 1, Some(3_000), "b")).unwrap();
        let mut codex = session("cx", 1, Some(2_000), "c");
        codex.provider = "codex";
        codex.project_name = "other";
        store.upsert_session(&codex).unwrap();

        let all = store
            .get_sessions_filtered(&SessionFilter {
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        let ids: Vec<_> = all.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "cx", "old"]);

        let recent_proj = store
            .get_sessions_filtered(&SessionFilter {
                project_name: Some("proj"),
                since_ms: Some(2_000),
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(recent_proj.len(), 1);
        assert_eq!(recent_proj[0].id, "new");

        let codex_only = store
            .get_sessions_filtered(&SessionFilter {
                provider: Some("codex"),
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(codex_only.len(), 1);

        let page = store
            .get_sessions_filtered(&SessionFilter {
                limit: 1,
                offset: 1,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page[0].id, "cx");
    }

    #[test]
    fn test_project_rollup() {
        let store = IndexStore::open_in_memory().unwrap();
        assert_eq!(store.project_rollup("proj").unwrap(), (0, None));
        store.upsert_session(&session("a", 1, Some(10), "x")).unwrap();
        store.upsert_session(&session("b", 1, Some(30), "y")).unwrap();
        assert_eq!(store.project_rollup("proj").unwrap(), (2, Some(30)));
    }
}
