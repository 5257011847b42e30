//! Conversation commands: the interactive `chat` loop and one-shot `say`.
//!
//! Both go through `ConversationEngine::respond`, so the reply is printed
//! before any memory maintenance runs. Pending maintenance is drained
//! before the process exits.

use anyhow::{Context, Result};
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};

use mnemo_core::conversation::engine::Reply;
use mnemo_types::thread::ThreadId;

use super::{finish_maintenance, memory};
use crate::state::AppState;

/// Send one message and print the reply.
pub async fn say(state: &AppState, thread: &ThreadId, message: &str, json: bool, quiet: bool) -> Result<()> {
    state.recover_jobs().await?;

    let reply = state
        .engine
        .respond(thread, message)
        .await
        .with_context(|| format!("failed to respond in thread '{thread}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    } else {
        print_reply(&reply, false);
    }

    finish_maintenance(state, quiet).await;
    Ok(())
}

/// Interactive loop reading one message per line from stdin.
///
/// `/profile` and `/summary` show the current memory; `/exit` or EOF ends
/// the session.
pub async fn chat(state: &AppState, thread: &ThreadId, verbose: bool, quiet: bool) -> Result<()> {
    let recovered = state.recover_jobs().await?;

    println!();
    println!(
        "  {} mnemo chat in thread '{}'",
        style("*").cyan().bold(),
        style(thread).cyan()
    );
    println!(
        "  {}",
        style("Type /profile, /summary or /exit. Ctrl+D to quit.").dim()
    );
    if recovered > 0 {
        println!(
            "  {}",
            style(format!("Resuming {recovered} pending maintenance job(s)")).dim()
        );
    }
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("{} ", style("you>").green().bold());
        let Some(line) = lines.next_line().await.context("failed to read input")? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/exit" | "/quit" => break,
            "/profile" => {
                memory::profile(state, thread, false).await?;
                continue;
            }
            "/summary" => {
                memory::summary(state, thread, false).await?;
                continue;
            }
            _ => {}
        }

        match state.engine.respond(thread, input).await {
            Ok(reply) => print_reply(&reply, verbose),
            Err(e) => {
                // The user turn may already be recorded; keep the session going.
                eprintln!("  {} {e}", style("error:").red().bold());
            }
        }
    }

    finish_maintenance(state, quiet).await;
    println!();
    Ok(())
}

fn print_reply(reply: &Reply, verbose: bool) {
    println!();
    println!("{} {}", style("mnemo>").cyan().bold(), reply.content);
    if verbose && !reply.recalled.is_empty() {
        println!();
        for r in &reply.recalled {
            println!(
                "  {} {:.2} #{} {}",
                style("recalled").dim(),
                r.similarity,
                r.turn_id,
                style(super::truncate(&r.content, 70)).dim()
            );
        }
    }
    println!();
}
