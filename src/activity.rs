//! External activity detection
//!
//! Answers "is a CLI session running outside of us right now" from a cached
//! snapshot of matching processes, multiplexer sessions and lock files.
//! Sampling the system is slow, so a snapshot is reused until its TTL runs
//! out. Failures degrade to empty lists.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{Duration, Instant};

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub command: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivitySnapshot {
    pub processes: Vec<ProcessInfo>,
    pub multiplexer_sessions: Vec<String>,
    /// File names found in the lock directory
    pub lock_files: Vec<String>,
    pub taken_at: Option<DateTime<Utc>>,
}

impl ActivitySnapshot {
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty() && self.multiplexer_sessions.is_empty() && self.lock_files.is_empty()
    }

    /// A session counts as active when a lock file is named after it or a
    /// matching process carries its id on the command line.
    pub fn mentions_session(&self, session_id: &str) -> bool {
        if session_id.is_empty() {
            return false;
        }
        self.lock_files
            .iter()
            .any(|name| lock_stem(name) == session_id)
            || self.processes.iter().any(|p| p.command.contains(session_id))
    }
}

fn lock_stem(name: &str) -> &str {
    name.strip_suffix(".lock").unwrap_or(name)
}

/// Where snapshots come from
pub trait ActivitySource {
    fn processes(&self) -> Vec<ProcessInfo>;
    fn multiplexer_sessions(&self) -> Vec<String>;
    fn lock_files(&self) -> Vec<String>;
}

/// Samples the local machine with `ps`, `tmux` and a directory listing
pub struct SystemActivitySource {
    process_pattern: String,
    lock_dir: Option<PathBuf>,
}

impl SystemActivitySource {
    pub fn new(process_pattern: impl Into<String>, lock_dir: Option<PathBuf>) -> Self {
        Self {
            process_pattern: process_pattern.into(),
            lock_dir,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.activity.process_pattern.clone(), config.lock_dir())
    }
}

impl ActivitySource for SystemActivitySource {
    fn processes(&self) -> Vec<ProcessInfo> {
        match run("ps", &["-eo", "pid=,args="]) {
            Ok(stdout) => parse_ps(&stdout, &self.process_pattern),
            Err(e) => {
                tracing::debug!(error = %e, "Process listing unavailable");
                Vec::new()
            }
        }
    }

    fn multiplexer_sessions(&self) -> Vec<String> {
        match run("tmux", &["list-sessions", "-F", "#{session_name}"]) {
            Ok(stdout) => stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            // No server running is the common case
            Err(e) => {
                tracing::trace!(error = %e, "No multiplexer sessions");
                Vec::new()
            }
        }
    }

    fn lock_files(&self) -> Vec<String> {
        let Some(dir) = &self.lock_dir else {
            return Vec::new();
        };
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "Lock directory unreadable");
                return Vec::new();
            }
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}

fn run(program: &str, args: &[&str]) -> io::Result<String> {
    let output = Command::new(program).args(args).output()?;
    if !output.status.success() {
        return Err(command_failure(program, &output));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn command_failure(program: &str, output: &Output) -> io::Error {
    let stderr = String::from_utf8_lossy(&output.stderr);
    io::Error::new(
        io::ErrorKind::Other,
        format!("{} exited with {}: {}", program, output.status, stderr.trim()),
    )
}

/// Keep `ps -eo pid=,args=` rows whose command line contains `pattern`.
fn parse_ps(stdout: &str, pattern: &str) -> Vec<ProcessInfo> {
    let own_pid = std::process::id();
    stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim_start();
            let (pid, command) = line.split_once(char::is_whitespace)?;
            let pid: u32 = pid.parse().ok()?;
            let command = command.trim();
            if pid == own_pid || !command.contains(pattern) {
                return None;
            }
            Some(ProcessInfo {
                pid,
                command: command.to_string(),
            })
        })
        .collect()
}

fn take_snapshot<S: ActivitySource>(source: &S) -> ActivitySnapshot {
    let snapshot = ActivitySnapshot {
        processes: source.processes(),
        multiplexer_sessions: source.multiplexer_sessions(),
        lock_files: source.lock_files(),
        taken_at: Some(Utc::now()),
    };
    tracing::debug!(
        processes = snapshot.processes.len(),
        multiplexer = snapshot.multiplexer_sessions.len(),
        locks = snapshot.lock_files.len(),
        "Refreshed activity snapshot"
    );
    snapshot
}

/// TTL cache in front of an [`ActivitySource`]
pub struct ActivityDetector<S = SystemActivitySource> {
    source: S,
    ttl: Duration,
    cached: Option<(Instant, ActivitySnapshot)>,
}

impl<S: ActivitySource> ActivityDetector<S> {
    pub fn new(source: S, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cached: None,
        }
    }

    /// Current snapshot, re-probing the source once the TTL has passed.
    pub fn snapshot(&mut self) -> &ActivitySnapshot {
        if self
            .cached
            .as_ref()
            .map_or(false, |(at, _)| at.elapsed() >= self.ttl)
        {
            self.cached = None;
        }
        let source = &self.source;
        &self
            .cached
            .get_or_insert_with(|| (Instant::now(), take_snapshot(source)))
            .1
    }

    pub fn is_session_active(&mut self, session_id: &str) -> bool {
        self.snapshot().mentions_session(session_id)
    }

    /// Drop the cached snapshot so the next call samples again
    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeSource {
        snapshots: Cell<usize>,
        locks: Vec<String>,
        commands: Vec<String>,
    }

    impl ActivitySource for FakeSource {
        fn processes(&self) -> Vec<ProcessInfo> {
            self.snapshots.set(self.snapshots.get() + 1);
            self.commands
                .iter()
                .enumerate()
                .map(|(i, c)| ProcessInfo {
                    pid: 100 + i as u32,
                    command: c.clone(),
                })
                .collect()
        }

        fn multiplexer_sessions(&self) -> Vec<String> {
            vec!["work".to_string()]
        }

        fn lock_files(&self) -> Vec<String> {
            self.locks.clone()
        }
    }

    #[test]
    fn test_snapshot_is_cached_within_ttl() {
        let mut detector = ActivityDetector::new(FakeSource::default(), Duration::from_secs(60));
        detector.snapshot();
        detector.snapshot();
        assert_eq!(detector.source.snapshots.get(), 1);
        assert_eq!(detector.snapshot().multiplexer_sessions, vec!["work"]);

        detector.invalidate();
        detector.snapshot();
        assert_eq!(detector.source.snapshots.get(), 2);
    }

    #[test]
    fn test_zero_ttl_always_refreshes() {
        let mut detector = ActivityDetector::new(FakeSource::default(), Duration::ZERO);
        detector.snapshot();
        detector.snapshot();
        assert_eq!(detector.source.snapshots.get(), 2);
    }

    #[test]
    fn test_session_activity_from_locks_and_processes() {
        let source = FakeSource {
            locks: vec!["abc.lock".to_string(), "other".to_string()],
            commands: vec!["claude --resume def-456".to_string()],
            ..Default::default()
        };
        let mut detector = ActivityDetector::new(source, Duration::from_secs(60));
        assert!(detector.is_session_active("abc"));
        assert!(detector.is_session_active("other"));
        assert!(detector.is_session_active("def-456"));
        assert!(!detector.is_session_active("zzz"));
        assert!(!detector.is_session_active(""));
    }

    #[test]
    fn test_parse_ps_filters_by_pattern() {
        let out = "  12 /usr/bin/claude --resume abc\n  13 bash\nbogus line\n 14 node claude-wrapper\n";
        let procs = parse_ps(out, "claude");
        let pids: Vec<u32> = procs.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![12, 14]);
        assert_eq!(procs[0].command, "/usr/bin/claude --resume abc");
    }

    #[test]
    fn test_lock_dir_listing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.lock"), "").unwrap();
        std::fs::write(dir.path().join("a.lock"), "").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let source = SystemActivitySource::new("claude", Some(dir.path().to_path_buf()));
        assert_eq!(source.lock_files(), vec!["a.lock", "b.lock"]);

        let missing = SystemActivitySource::new("claude", Some(dir.path().join("absent")));
        assert!(missing.lock_files().is_empty());
        assert!(SystemActivitySource::new("claude", None).lock_files().is_empty());
    }
}
