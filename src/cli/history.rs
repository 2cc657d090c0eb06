use anyhow::Result;

use super::{format_millis, truncate};
use crate::config::Config;
use crate::history::{title_from_history, HistoryPromptCache};

pub fn run(config: &Config, session: &str, title_only: bool) -> Result<()> {
    let mut cache = HistoryPromptCache::new(
        config.history_path(),
        config.history.max_sessions,
        config.history_ttl(),
    );
    let prompts = cache.get_session_prompts(session)?;

    if title_only {
        match title_from_history(&prompts) {
            Some(title) => println!("{}", title),
            None => println!("(no title)"),
        }
        return Ok(());
    }

    if prompts.is_empty() {
        println!("No prompts logged for session {}", session);
        return Ok(());
    }

    for p in &prompts {
        let marker = if p.attachments.is_some() { " 📎" } else { "" };
        println!(
            "{:<12} {}{}",
            format_millis(Some(p.timestamp)),
            truncate(&p.prompt, 90),
            marker
        );
    }
    Ok(())
}
