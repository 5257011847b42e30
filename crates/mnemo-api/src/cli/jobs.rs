//! Thread listing and maintenance commands: `threads`, `maintain`, `jobs`.

use anyhow::{Context, Result};
use chrono::Utc;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;

use mnemo_types::maintenance::MaintenanceJob;
use mnemo_types::thread::ThreadId;

use super::{hint, truncate};
use crate::state::AppState;

/// List every thread with its turn counts.
pub async fn threads(state: &AppState, json: bool) -> Result<()> {
    let threads = state.memory().threads().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&threads)?);
        return Ok(());
    }

    if threads.is_empty() {
        hint("No threads yet. Start one with `mnemo chat <thread>`.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Thread").fg(Color::White),
        Cell::new("Turns").fg(Color::White),
        Cell::new("Unindexed").fg(Color::White),
        Cell::new("Last activity").fg(Color::White),
    ]);
    for t in &threads {
        let unindexed = if t.unindexed_count > 0 {
            Cell::new(t.unindexed_count).fg(Color::Yellow)
        } else {
            Cell::new(0).fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(&t.thread_id).fg(Color::Cyan),
            Cell::new(t.turn_count).fg(Color::White),
            unindexed,
            Cell::new(t.last_turn_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!("  {} thread{}", threads.len(), if threads.len() == 1 { "" } else { "s" });
    println!();
    Ok(())
}

/// Run indexing, extraction and (if due) summarization for a thread now.
pub async fn maintain(state: &AppState, thread: &ThreadId, json: bool) -> Result<()> {
    let report = state
        .engine
        .maintain(thread)
        .await
        .with_context(|| format!("maintenance failed for thread '{thread}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("  {} Maintenance of '{}'", style("✓").green().bold(), style(thread).cyan());
    println!("  Indexed turns:     {}", report.indexed_turns);
    if report.failed_embeddings > 0 {
        println!("  Failed embeddings: {}", style(report.failed_embeddings).yellow());
    }
    println!("  Profile changes:   {}", report.profile_changes);
    println!(
        "  Summarized:        {}",
        if report.summarized { "yes" } else { "no" }
    );
    if report.pruned_turns > 0 {
        println!("  Pruned turns:      {}", report.pruned_turns);
    }
    println!();
    Ok(())
}

/// List persisted maintenance jobs.
pub async fn jobs(state: &AppState, json: bool) -> Result<()> {
    let jobs = state.queue().persisted().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    if jobs.is_empty() {
        hint("No pending maintenance jobs.");
        return Ok(());
    }

    let max_attempts = state.config.maintenance.max_attempts;
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Job").fg(Color::White),
        Cell::new("Thread").fg(Color::White),
        Cell::new("Turn").fg(Color::White),
        Cell::new("State").fg(Color::White),
        Cell::new("Attempts").fg(Color::White),
        Cell::new("Last error").fg(Color::White),
    ]);
    for job in &jobs {
        let (label, color) = job_state(job, max_attempts);
        let id = job.id.to_string();
        table.add_row(vec![
            Cell::new(&id[..8]).fg(Color::DarkGrey),
            Cell::new(&job.thread_id).fg(Color::Cyan),
            Cell::new(job.turn_id).fg(Color::White),
            Cell::new(label).fg(color),
            Cell::new(format!("{}/{max_attempts}", job.attempt_count)).fg(Color::White),
            Cell::new(truncate(job.last_error.as_deref().unwrap_or("-"), 50)).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn job_state(job: &MaintenanceJob, max_attempts: u32) -> (&'static str, Color) {
    if job.attempt_count >= max_attempts {
        ("abandoned", Color::Red)
    } else if job.attempt_count > 0 && job.next_attempt_at > Utc::now() {
        ("retrying", Color::Yellow)
    } else {
        ("pending", Color::Green)
    }
}
