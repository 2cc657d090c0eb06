//! Session listing

use anyhow::Result;

use super::{format_millis, parse_since, truncate};
use crate::store::{IndexStore, SessionFilter};

pub struct ListArgs {
    pub project: Option<String>,
    pub provider: Option<String>,
    pub since: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

pub fn run(store: &IndexStore, args: ListArgs) -> Result<()> {
    let since_ms = args.since.as_deref().map(parse_since).transpose()?;
    let sessions = store.get_sessions_filtered(&SessionFilter {
        project_name: args.project.as_deref(),
        since_ms,
        provider: args.provider.as_deref(),
        limit: args.limit,
        offset: args.offset,
    })?;

    if sessions.is_empty() {
        println!("No sessions found. Run 'session-index index' first.");
        return Ok(());
    }

    println!(
        "{:<12} {:<38} {:<6} {:<16} {}",
        "Last active", "ID", "Msgs", "Branch", "Summary"
    );
    println!("{}", "-".repeat(110));
    for s in sessions {
        println!(
            "{:<12} {:<38} {:<6} {:<16} {}",
            format_millis(s.last_activity),
            s.id,
            s.message_count,
            truncate(s.git_branch.as_deref().unwrap_or("-"), 16),
            truncate(&s.summary, 40),
        );
    }
    Ok(())
}
