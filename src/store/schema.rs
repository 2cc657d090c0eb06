//! SQLite schema definition
//!
//! Timestamps are stored as Unix epoch milliseconds.

pub const SCHEMA: &str = r#"
-- ============================================
-- CHECKPOINTS
-- ============================================

-- How far into each transcript file indexing has progressed
CREATE TABLE IF NOT EXISTS file_checkpoints (
    file_path TEXT PRIMARY KEY,
    byte_offset INTEGER NOT NULL,          -- first unprocessed byte
    mtime_ms INTEGER NOT NULL,             -- modification time at last pass
    file_size INTEGER NOT NULL,            -- size at last pass
    updated_at INTEGER NOT NULL
);

-- ============================================
-- PROJECTS & SESSIONS
-- ============================================

-- One row per project directory under a source root
CREATE TABLE IF NOT EXISTS projects (
    name TEXT PRIMARY KEY,                 -- directory name (encoded path slug)
    display_name TEXT NOT NULL,
    full_path TEXT,                        -- resolved working directory
    session_count INTEGER NOT NULL DEFAULT 0,
    last_activity INTEGER,
    provider_flags INTEGER NOT NULL DEFAULT 0,  -- OR of contributing providers
    updated_at INTEGER NOT NULL
);

-- One row per conversation
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    project_name TEXT NOT NULL,
    summary TEXT NOT NULL DEFAULT 'New Session',
    message_count INTEGER NOT NULL DEFAULT 0,
    last_activity INTEGER,
    cwd TEXT,
    provider TEXT NOT NULL,
    git_branch TEXT,
    cli_version TEXT,
    file_path TEXT,
    updated_at INTEGER NOT NULL
);

-- ============================================
-- MESSAGE INDEX
-- ============================================

-- Where each message lives on disk; bodies are never stored
CREATE TABLE IF NOT EXISTS message_index (
    session_id TEXT NOT NULL,
    message_number INTEGER NOT NULL,       -- 1-based, file order
    message_id TEXT NOT NULL,              -- uuid or synthetic
    message_type TEXT NOT NULL,
    timestamp INTEGER,
    byte_offset INTEGER NOT NULL,
    file_path TEXT NOT NULL,
    PRIMARY KEY (session_id, message_number)
);

-- uuid -> owning session and parent, for timeline roots
CREATE TABLE IF NOT EXISTS identity_edges (
    uuid TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    parent_uuid TEXT,
    message_type TEXT NOT NULL
);

-- ============================================
-- INDEXES
-- ============================================

CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project_name);
CREATE INDEX IF NOT EXISTS idx_sessions_activity ON sessions(last_activity DESC);
CREATE INDEX IF NOT EXISTS idx_sessions_provider ON sessions(provider);
CREATE INDEX IF NOT EXISTS idx_edges_session ON identity_edges(session_id);
CREATE INDEX IF NOT EXISTS idx_edges_roots ON identity_edges(message_type) WHERE parent_uuid IS NULL;
"#;
