//! Configuration management with YAML support

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Transcript roots keyed by source name
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub activity: ActivityConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

/// A projects root holding one directory per project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Provider tag stamped on every session from this source
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default)]
    pub base_path: Option<String>,
}

/// Prompt history log settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_path")]
    pub path: String,

    #[serde(default = "default_history_max_sessions")]
    pub max_sessions: usize,

    #[serde(default = "default_history_ttl")]
    pub ttl_secs: u64,
}

/// Message access cache bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_list_ttl")]
    pub list_ttl_secs: u64,

    #[serde(default = "default_cache_max_sessions")]
    pub max_sessions: usize,

    #[serde(default = "default_body_ttl")]
    pub body_ttl_secs: u64,

    #[serde(default = "default_cache_max_messages")]
    pub max_messages: usize,
}

/// External activity detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    #[serde(default)]
    pub lock_dir: Option<String>,

    #[serde(default = "default_activity_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_process_pattern")]
    pub process_pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_database_path() -> String {
    "~/.local/share/session-index/index.db".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_provider() -> String {
    "claude".to_string()
}

fn default_history_path() -> String {
    "~/.claude/history.jsonl".to_string()
}

fn default_history_max_sessions() -> usize {
    20
}

fn default_history_ttl() -> u64 {
    60
}

fn default_list_ttl() -> u64 {
    30
}

fn default_cache_max_sessions() -> usize {
    50
}

fn default_body_ttl() -> u64 {
    30 * 60
}

fn default_cache_max_messages() -> usize {
    1000
}

fn default_activity_ttl() -> u64 {
    5
}

fn default_process_pattern() -> String {
    "claude".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
            max_sessions: default_history_max_sessions(),
            ttl_secs: default_history_ttl(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            list_ttl_secs: default_list_ttl(),
            max_sessions: default_cache_max_sessions(),
            body_ttl_secs: default_body_ttl(),
            max_messages: default_cache_max_messages(),
        }
    }
}

impl CacheConfig {
    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.list_ttl_secs)
    }

    pub fn body_ttl(&self) -> Duration {
        Duration::from_secs(self.body_ttl_secs)
    }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            lock_dir: None,
            ttl_secs: default_activity_ttl(),
            process_pattern: default_process_pattern(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// A resolved, enabled transcript source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub name: String,
    pub provider: String,
    pub base_path: PathBuf,
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./session-index.yaml (current directory)
    /// 3. ~/.config/session-index/session-index.yaml
    pub fn load(path: &str) -> Result<Self> {
        let search_paths = vec![
            expand(path),
            "session-index.yaml".to_string(),
            expand("~/.config/session-index/session-index.yaml"),
        ];

        for search_path in &search_paths {
            if std::path::Path::new(search_path).exists() {
                let content = std::fs::read_to_string(search_path)?;
                let config: Config = serde_yaml::from_str(&content)?;
                return Ok(config);
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    /// Get the database path, expanding ~ to home directory
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(expand(&self.database.path))
    }

    pub fn history_path(&self) -> PathBuf {
        PathBuf::from(expand(&self.history.path))
    }

    pub fn lock_dir(&self) -> Option<PathBuf> {
        self.activity
            .lock_dir
            .as_deref()
            .map(|p| PathBuf::from(expand(p)))
    }

    /// Enabled sources with their base paths resolved.
    ///
    /// With no sources configured, the Claude projects root is used.
    /// A source without a base path is only valid for the `claude`
    /// provider, which has a well-known default location.
    pub fn sources(&self) -> Vec<ResolvedSource> {
        if self.sources.is_empty() {
            return default_claude_root()
                .map(|base_path| ResolvedSource {
                    name: "claude".to_string(),
                    provider: default_provider(),
                    base_path,
                })
                .into_iter()
                .collect();
        }

        self.sources
            .iter()
            .filter(|(_, s)| s.enabled)
            .filter_map(|(name, s)| {
                let base_path = match &s.base_path {
                    Some(p) => Some(PathBuf::from(expand(p))),
                    None if s.provider == "claude" => default_claude_root(),
                    None => None,
                };
                if base_path.is_none() {
                    tracing::warn!(source = %name, "Source has no base_path, skipping");
                }
                base_path.map(|base_path| ResolvedSource {
                    name: name.clone(),
                    provider: s.provider.clone(),
                    base_path,
                })
            })
            .collect()
    }

    pub fn history_ttl(&self) -> Duration {
        Duration::from_secs(self.history.ttl_secs)
    }

    pub fn activity_ttl(&self) -> Duration {
        Duration::from_secs(self.activity.ttl_secs)
    }
}

fn expand(path: &str) -> String {
    shellexpand::tilde(path).to_string()
}

fn default_claude_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude/projects"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.history.max_sessions, 20);
        assert_eq!(config.cache.list_ttl_secs, 30);
        assert_eq!(config.cache.body_ttl_secs, 1800);
        assert_eq!(config.logging.level, "info");
        assert!(config.database_path().ends_with("index.db"));
    }

    #[test]
    fn test_disabled_source_is_skipped() {
        let mut config = Config::default();
        config.sources.insert(
            "old".to_string(),
            SourceConfig {
                enabled: false,
                provider: "claude".to_string(),
                base_path: Some("/tmp/old".to_string()),
            },
        );
        config.sources.insert(
            "work".to_string(),
            SourceConfig {
                enabled: true,
                provider: "codex".to_string(),
                base_path: Some("/tmp/work".to_string()),
            },
        );

        let sources = config.sources();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "work");
        assert_eq!(sources[0].provider, "codex");
        assert_eq!(sources[0].base_path, PathBuf::from("/tmp/work"));
    }

    #[test]
    fn test_non_claude_source_requires_base_path() {
        let mut config = Config::default();
        config.sources.insert(
            "cursor".to_string(),
            SourceConfig {
                enabled: true,
                provider: "cursor".to_string(),
                base_path: None,
            },
        );
        assert!(config.sources().is_empty());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
database:
  path: /var/lib/session-index/test.db

sources:
  claude:
    base_path: /data/claude/projects
  mirror:
    enabled: false
    base_path: /mnt/mirror

history:
  path: /data/claude/history.jsonl
  ttl_secs: 10

cache:
  max_messages: 64
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/session-index/test.db")
        );
        assert_eq!(config.history.ttl_secs, 10);
        assert_eq!(config.history.max_sessions, 20);
        assert_eq!(config.cache.max_messages, 64);
        assert_eq!(config.cache.max_sessions, 50);
        assert_eq!(config.cache.list_ttl(), Duration::from_secs(30));
        assert_eq!(config.cache.body_ttl(), Duration::from_secs(1800));

        let sources = config.sources();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].provider, "claude");
        assert_eq!(sources[0].base_path, PathBuf::from("/data/claude/projects"));
    }
}
