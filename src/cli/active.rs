use anyhow::Result;

use crate::activity::{ActivityDetector, SystemActivitySource};
use crate::config::Config;

pub fn run(config: &Config, session: Option<&str>) -> Result<()> {
    let mut detector =
        ActivityDetector::new(SystemActivitySource::from_config(config), config.activity_ttl());

    if let Some(session) = session {
        let state = if detector.is_session_active(session) {
            "active"
        } else {
            "idle"
        };
        println!("{} {}", session, state);
        return Ok(());
    }

    let snapshot = detector.snapshot();

    if snapshot.is_empty() {
        println!("No external activity detected.");
        return Ok(());
    }

    if !snapshot.processes.is_empty() {
        println!("Processes:");
        for p in &snapshot.processes {
            println!("   {:<8} {}", p.pid, p.command);
        }
    }
    if !snapshot.multiplexer_sessions.is_empty() {
        println!("tmux sessions:");
        for name in &snapshot.multiplexer_sessions {
            println!("   {}", name);
        }
    }
    if !snapshot.lock_files.is_empty() {
        println!("Lock files:");
        for name in &snapshot.lock_files {
            println!("   {}", name);
        }
    }
    Ok(())
}
