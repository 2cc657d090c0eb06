use anyhow::Result;

use super::format_millis;
use crate::store::IndexStore;

pub fn list(store: &IndexStore) -> Result<()> {
    let projects = store.list_projects()?;
    if projects.is_empty() {
        println!("No projects found. Run 'session-index index' first.");
        return Ok(());
    }

    println!(
        "{:<30} {:<8} {:<12} {:<16} {}",
        "Project", "Sessions", "Last active", "Providers", "Path"
    );
    println!("{}", "-".repeat(100));
    for p in projects {
        println!(
            "{:<30} {:<8} {:<12} {:<16} {}",
            p.display_name,
            p.session_count,
            format_millis(p.last_activity),
            p.flags.names().join(","),
            p.full_path.unwrap_or_else(|| p.name.clone())
        );
    }
    Ok(())
}

/// Timeline roots: user messages that start a conversation
pub fn roots(store: &IndexStore, project: Option<String>) -> Result<()> {
    let roots = store.get_first_user_messages(project.as_deref())?;
    if roots.is_empty() {
        println!("No root messages found.");
        return Ok(());
    }
    println!("{:<38} {}", "Session", "Root message");
    println!("{}", "-".repeat(76));
    for root in roots {
        println!("{:<38} {}", root.session_id, root.uuid);
    }
    Ok(())
}
