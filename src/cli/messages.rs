//! Message listing and reading

use anyhow::{anyhow, Result};
use serde_json::Value;

use super::{projects_root_for, truncate};
use crate::config::Config;
use crate::history::HistoryPromptCache;
use crate::messages::MessageAccess;

fn access(config: &Config, project: &str) -> Result<MessageAccess> {
    let root = projects_root_for(config, project)?;
    let history = HistoryPromptCache::new(
        config.history_path(),
        config.history.max_sessions,
        config.history_ttl(),
    );
    Ok(MessageAccess::new(root, &config.cache).with_history(history))
}

pub fn list(
    config: &Config,
    project: &str,
    session: &str,
    from: Option<usize>,
    to: Option<usize>,
) -> Result<()> {
    let mut access = access(config, project)?;
    let list = access
        .get_message_list(project, session, true)
        .ok_or_else(|| anyhow!("Session not found: {}", session))?;

    let etag = list.etag()?;
    println!("Session {} ({} messages, etag {})", session, list.total, &etag[..12]);
    if let Some(prompt) = &list.last_user_prompt {
        println!("Last prompt: {}", truncate(prompt, 80));
    }
    println!();

    let from = from.unwrap_or(1);
    let to = to.unwrap_or(list.total);
    if from == 1 && to == list.total {
        for m in &list.messages {
            let ts = m
                .timestamp
                .map(|t| t.format("%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{:>5}  {:<15} {:<10} {}", m.number, ts, m.message_type, m.id);
        }
        return Ok(());
    }

    for numbered in access.get_messages_by_range(project, session, from, to) {
        println!(
            "{:>5}  {:<10} {}",
            numbered.number,
            message_role(&numbered.message),
            truncate(&message_text(&numbered.message), 90)
        );
    }
    Ok(())
}

pub fn read(config: &Config, project: &str, session: &str, number: usize) -> Result<()> {
    let mut access = access(config, project)?;
    let message = access
        .get_message_by_number(project, session, number)
        .ok_or_else(|| anyhow!("Message {} not found in session {}", number, session))?;
    println!("{}", serde_json::to_string_pretty(&message)?);
    Ok(())
}

fn message_role(message: &Value) -> &str {
    message
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("-")
}

/// Plain text of a message: string content or the text blocks joined
fn message_text(message: &Value) -> String {
    match message.get("message").and_then(|m| m.get("content")) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}
