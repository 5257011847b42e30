//! System status dashboard command.

use anyhow::Result;
use console::style;

use mnemo_infra::llm::test_provider_connection;

use crate::state::AppState;

/// Display thread counts, pending maintenance and configuration.
pub async fn status(state: &AppState, check_llm: bool, json: bool) -> Result<()> {
    let threads = state.memory().threads().await?;
    let total_turns: u64 = threads.iter().map(|t| t.turn_count).sum();
    let unindexed: u64 = threads.iter().map(|t| t.unindexed_count).sum();
    let jobs = state.queue().persisted().await?;
    let max_attempts = state.config.maintenance.max_attempts;
    let abandoned = jobs.iter().filter(|j| j.attempt_count >= max_attempts).count();

    let llm_check = if check_llm {
        Some(test_provider_connection(&state.provider).await)
    } else {
        None
    };

    let embedder = state.memory().embedder();
    let limits = state.provider.capabilities();
    let memory = &state.config.memory;

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "threads": threads.len(),
            "turns": total_turns,
            "unindexed_turns": unindexed,
            "jobs": {
                "persisted": jobs.len(),
                "abandoned": abandoned,
            },
            "embedding": {
                "model": embedder.model_name(),
                "dimension": embedder.dimension(),
            },
            "llm": {
                "provider": state.provider.name(),
                "model": state.config.llm.model,
                "max_context_tokens": limits.max_context_tokens,
                "max_output_tokens": limits.max_output_tokens,
                "reachable": llm_check.as_ref().map(|r| r.is_ok()),
            },
            "memory": memory,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!("  {} mnemo v{}", style("*").cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!();

    println!("  {}", style("── Memory ──").dim());
    println!("  Threads:   {}", style(threads.len()).bold());
    println!("  Turns:     {total_turns}");
    if unindexed > 0 {
        println!("  Unindexed: {}", style(unindexed).yellow());
    }
    println!(
        "  Recall:    top {} above {:.2}",
        memory.recall_limit, memory.similarity_threshold
    );
    println!(
        "  Summary:   after {} active turns, keep {} raw, retention {}",
        memory.summarize_after_turns, memory.keep_recent_turns, memory.retention
    );
    println!();

    println!("  {}", style("── Maintenance ──").dim());
    println!("  Persisted jobs: {}", jobs.len());
    if abandoned > 0 {
        println!("  Abandoned:      {}", style(abandoned).red());
    }
    println!();

    println!("  {}", style("── Models ──").dim());
    println!(
        "  Embedding: {} ({} dims)",
        embedder.model_name(),
        embedder.dimension()
    );
    println!("  Chat:      {} via {}", state.config.llm.model, state.provider.name());
    println!(
        "  Limits:    {} context / {} output tokens",
        limits.max_context_tokens, limits.max_output_tokens
    );
    match &llm_check {
        Some(Ok(())) => println!("  Reachable: {}", style("yes").green()),
        Some(Err(e)) => println!("  Reachable: {} ({e})", style("no").red()),
        None => {}
    }
    println!();

    println!("  {}", style("── System ──").dim());
    println!("  Data dir: {}", style(state.data_dir.display()).dim());
    println!("  Database: {}", style("SQLite (WAL mode)").dim());
    println!("  Vectors:  {}", style("LanceDB (one table per thread)").dim());
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::test_state;

    #[tokio::test]
    async fn test_status_with_llm_check() {
        let (state, _dir) = test_state().await;
        assert!(status(&state, true, true).await.is_ok());
        assert!(status(&state, false, false).await.is_ok());
    }
}
