//! Human-readable project names
//!
//! Pure functions: filesystem reads only, no database access.

use serde_json::Value;
use std::path::Path;

/// Parent directories that say nothing about the project itself
const GENERIC_SEGMENTS: &[&str] = &[
    "users",
    "home",
    "repos",
    "repositories",
    "projects",
    "src",
    "code",
    "dev",
    "workspace",
    "documents",
    "desktop",
    "github",
];

/// Pick a display name for a project.
///
/// A resolved working directory wins; otherwise the encoded directory name
/// is decoded.
pub fn resolve_display_name(full_path: Option<&str>, project_name: &str) -> String {
    match full_path {
        Some(path) => display_name_for_path(Path::new(path)),
        None => display_name_from_slug(project_name),
    }
}

/// Name declared by a manifest at `path`, else the last two path segments.
pub fn display_name_for_path(path: &Path) -> String {
    manifest_name(path).unwrap_or_else(|| tail_segments(path))
}

fn manifest_name(path: &Path) -> Option<String> {
    package_json_name(path).or_else(|| cargo_toml_name(path))
}

fn package_json_name(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path.join("package.json")).ok()?;
    let json: Value = serde_json::from_str(&content).ok()?;
    json.get("name")
        .and_then(|n| n.as_str())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
}

fn cargo_toml_name(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path.join("Cargo.toml")).ok()?;
    let manifest: toml::Value = toml::from_str(&content).ok()?;
    manifest
        .get("package")
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
        .filter(|n| !n.is_empty())
        .map(String::from)
}

fn tail_segments(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let segments: Vec<&str> = raw.split(['/', '\\']).filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [] => raw.to_string(),
        [only] => only.to_string(),
        [.., parent, last] => format!("{}/{}", parent, last),
    }
}

/// Decode a dash-encoded project directory name (`-Users-me-repos-app`).
pub fn display_name_from_slug(slug: &str) -> String {
    let slashed = slug.replace('-', "/");
    let decoded = urlencoding::decode(&slashed)
        .map(|s| s.into_owned())
        .unwrap_or(slashed);

    let all: Vec<&str> = decoded.split('/').filter(|s| !s.is_empty()).collect();
    let meaningful: Vec<&str> = all
        .iter()
        .copied()
        .filter(|s| !GENERIC_SEGMENTS.contains(&s.to_ascii_lowercase().as_str()))
        .collect();

    match (meaningful.as_slice(), all.last()) {
        ([.., parent, last], _) => format!("{}/{}", parent, last),
        ([only], _) => only.to_string(),
        ([], Some(last)) => last.to_string(),
        ([], None) => slug.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_package_json_name_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("package.json"), r#"{"name": "my-web-app"}"#).unwrap();
        assert_eq!(display_name_for_path(dir.path()), "my-web-app");
    }

    #[test]
    fn test_cargo_manifest_name() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("Cargo.toml"),
            "[package]\nname = \"ledger-core\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();
        assert_eq!(display_name_for_path(dir.path()), "ledger-core");
    }

    #[test]
    fn test_broken_manifest_falls_back_to_segments() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("package.json"), "{ nope").unwrap();
        let name = display_name_for_path(dir.path());
        let expected = tail_segments(dir.path());
        assert_eq!(name, expected);
        assert!(name.contains('/'));
    }

    #[test]
    fn test_tail_segments() {
        assert_eq!(display_name_for_path(Path::new("/nonexistent/work/app")), "work/app");
        assert_eq!(display_name_for_path(Path::new("/solo")), "solo");
        assert_eq!(display_name_for_path(Path::new("/")), "/");
    }

    #[test]
    fn test_slug_decoding_strips_generic_parents() {
        assert_eq!(display_name_from_slug("-Users-alice-repos-billing"), "alice/billing");
        assert_eq!(display_name_from_slug("-home-bob-code-src-api"), "bob/api");
        assert_eq!(display_name_from_slug("-repos-projects"), "projects");
        assert_eq!(display_name_from_slug("my%20tool"), "my tool");
    }

    #[test]
    fn test_resolve_prefers_full_path() {
        assert_eq!(
            resolve_display_name(Some("/nonexistent/team/svc"), "-x-y"),
            "team/svc"
        );
        assert_eq!(resolve_display_name(None, "-Users-carol-projects-site"), "carol/site");
    }
}
