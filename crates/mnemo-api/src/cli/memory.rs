//! Memory inspection commands: `search`, `profile`, `summary`.

use anyhow::{Context, Result};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;

use mnemo_types::profile::ProfileValue;
use mnemo_types::thread::ThreadId;

use super::{hint, truncate};
use crate::state::AppState;

/// Similarity search over the thread's indexed turns.
pub async fn search(state: &AppState, thread: &ThreadId, query: &str, k: usize, json: bool) -> Result<()> {
    let results = state
        .memory()
        .search_text(thread, query, k)
        .await
        .with_context(|| format!("search failed in thread '{thread}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        hint(&format!(
            "No turns in '{}' above similarity {:.2}.",
            style(thread).cyan(),
            state.config.memory.similarity_threshold
        ));
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Similarity").fg(Color::White),
        Cell::new("#").fg(Color::White),
        Cell::new("Content").fg(Color::White),
    ]);
    for r in &results {
        table.add_row(vec![
            Cell::new(format!("{:.3}", r.similarity)).fg(Color::Yellow),
            Cell::new(r.turn_id).fg(Color::DarkGrey),
            Cell::new(truncate(&r.content, 80)).fg(Color::White),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

/// Show the extracted profile of a thread.
pub async fn profile(state: &AppState, thread: &ThreadId, json: bool) -> Result<()> {
    let profile = state.memory().profile(thread).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(());
    }

    if profile.is_empty() {
        hint(&format!(
            "No profile for '{}' yet. Attributes are extracted from user turns.",
            style(thread).cyan()
        ));
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Attribute").fg(Color::White),
        Cell::new("Value").fg(Color::White),
        Cell::new("Source").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);
    for attribute in profile.attributes.values() {
        let source = attribute
            .source_turn_id
            .map(|id| format!("turn #{id}"))
            .unwrap_or_else(|| "manual".to_string());
        table.add_row(vec![
            Cell::new(&attribute.name).fg(Color::Cyan),
            Cell::new(display_value(&attribute.value)).fg(Color::White),
            Cell::new(source).fg(Color::DarkGrey),
            Cell::new(attribute.updated_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("  Profile for '{}'", style(thread).cyan().bold());
    println!();
    println!("{table}");
    println!();
    Ok(())
}

/// Show the running summary of a thread.
pub async fn summary(state: &AppState, thread: &ThreadId, json: bool) -> Result<()> {
    let summary = state.memory().summary(thread).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let Some(summary) = summary else {
        hint(&format!(
            "No summary for '{}' yet. One is written after {} active turns.",
            style(thread).cyan(),
            state.config.memory.summarize_after_turns
        ));
        return Ok(());
    };

    println!();
    println!(
        "  Summary of '{}' {}",
        style(thread).cyan().bold(),
        style(format!(
            "(covers {} turns through #{}, updated {})",
            summary.summarized_turns,
            summary.covers_through,
            summary.updated_at.format("%Y-%m-%d %H:%M")
        ))
        .dim()
    );
    println!();
    for line in summary.content.lines() {
        println!("  {line}");
    }
    println!();
    Ok(())
}

/// Strings print bare; everything else as compact JSON.
fn display_value(value: &ProfileValue) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
