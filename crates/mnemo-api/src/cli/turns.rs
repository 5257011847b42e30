//! Turn commands: `record` and `history`.

use anyhow::{Context, Result};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;

use mnemo_types::thread::ThreadId;
use mnemo_types::turn::{ConversationTurn, TurnRole};

use super::{finish_maintenance, hint, truncate};
use crate::state::AppState;

/// Record a turn and run its maintenance before exiting.
pub async fn record(
    state: &AppState,
    thread: &ThreadId,
    role: TurnRole,
    content: &str,
    json: bool,
    quiet: bool,
) -> Result<()> {
    state.recover_jobs().await?;

    let recorded = state
        .engine
        .record(thread, role, content)
        .await
        .with_context(|| format!("failed to record turn in thread '{thread}'"))?;

    finish_maintenance(state, quiet).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&recorded)?);
    } else if !quiet {
        println!();
        println!(
            "  {} Recorded {} turn #{} in '{}'",
            style("✓").green().bold(),
            recorded.turn.role,
            recorded.turn.id,
            style(thread).cyan()
        );
        println!();
    }
    Ok(())
}

/// List the turns of a thread, oldest first.
///
/// # Examples
///
/// ```bash
/// mnemo history support-42
/// mnemo history support-42 --all --limit 100 --json
/// ```
pub async fn history(state: &AppState, thread: &ThreadId, all: bool, limit: u32, json: bool) -> Result<()> {
    let turns = state.memory().history(thread, all, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&turns)?);
        return Ok(());
    }

    if turns.is_empty() {
        let message = if all {
            format!("No turns recorded in '{}'.", style(thread).cyan())
        } else {
            format!(
                "No active turns in '{}'. Use --all to include summarized turns.",
                style(thread).cyan()
            )
        };
        hint(&message);
        return Ok(());
    }

    println!();
    println!("{}", turn_table(&turns));
    println!();
    Ok(())
}

fn turn_table(turns: &[ConversationTurn]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("Role").fg(Color::White),
        Cell::new("Content").fg(Color::White),
        Cell::new("Indexed").fg(Color::White),
        Cell::new("Time").fg(Color::White),
    ]);

    for turn in turns {
        let role_cell = match turn.role {
            TurnRole::User => Cell::new("user").fg(Color::Green),
            TurnRole::Assistant => Cell::new("assistant").fg(Color::Cyan),
            TurnRole::System => Cell::new("system").fg(Color::Yellow),
        };
        let indexed = if turn.is_indexed() { "yes" } else { "-" };

        table.add_row(vec![
            Cell::new(turn.id).fg(Color::DarkGrey),
            role_cell,
            Cell::new(truncate(&turn.content, 80)).fg(Color::White),
            Cell::new(indexed).fg(Color::DarkGrey),
            Cell::new(turn.created_at.format("%Y-%m-%d %H:%M:%S").to_string()).fg(Color::DarkGrey),
        ]);
    }

    table
}
