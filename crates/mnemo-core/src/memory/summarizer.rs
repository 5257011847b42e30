//! Running-summary maintenance.
//!
//! `SummaryPolicy` decides when a thread's active window has grown large
//! enough to fold into the summary; `Summarizer` asks the chat model to
//! merge the previous summary with the turns being retired.

use std::sync::Arc;

use mnemo_types::config::MemoryConfig;
use mnemo_types::llm::{CompletionRequest, LlmError, Message};
use mnemo_types::turn::ConversationTurn;

use crate::llm::box_provider::BoxLlmProvider;

const SUMMARY_SYSTEM_PROMPT: &str = r#"You maintain a running summary of a conversation between a user and an assistant.

You are given the current summary (possibly empty) and the messages that are about to leave the context window. Produce an updated summary that preserves:
1. Facts the user shared about themselves
2. Key decisions and conclusions
3. The user's current goals and open questions

Keep it under 300 words, in third person ("The user asked...", "The assistant suggested..."). Return only the summary text."#;

/// Rough token estimate used for the optional token budget (chars / 4).
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// When a thread is due for summarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryPolicy {
    pub after_turns: usize,
    pub token_budget: Option<usize>,
    pub keep_recent: usize,
}

impl SummaryPolicy {
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self {
            after_turns: config.summarize_after_turns,
            token_budget: config.summarize_token_budget,
            keep_recent: config.keep_recent_turns,
        }
    }

    /// True when the active window reached the turn count or the token budget.
    ///
    /// A window no larger than `keep_recent` is never due: there would be
    /// nothing to fold into the summary.
    pub fn should_summarize(&self, active_turns: usize, active_tokens: usize) -> bool {
        if active_turns <= self.keep_recent {
            return false;
        }
        let by_turns = self.after_turns > 0 && active_turns >= self.after_turns;
        let by_tokens = self.token_budget.is_some_and(|budget| active_tokens >= budget);
        by_turns || by_tokens
    }

    /// Evaluate the policy against a list of active turns.
    pub fn is_due(&self, active: &[ConversationTurn]) -> bool {
        let tokens = active.iter().map(|t| estimate_tokens(&t.content)).sum();
        self.should_summarize(active.len(), tokens)
    }

    /// Split active turns into `(to_summarize, to_keep)`.
    ///
    /// `to_keep` holds the newest `keep_recent` turns.
    pub fn split<'a>(
        &self,
        active: &'a [ConversationTurn],
    ) -> (&'a [ConversationTurn], &'a [ConversationTurn]) {
        if active.len() <= self.keep_recent {
            (&[], active)
        } else {
            active.split_at(active.len() - self.keep_recent)
        }
    }
}

/// LLM-backed summarizer.
pub struct Summarizer {
    provider: Arc<BoxLlmProvider>,
    model: String,
}

impl Summarizer {
    pub fn new(provider: Arc<BoxLlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Fold `turns` into `previous` and return the new summary text.
    #[tracing::instrument(
        name = "summarize_turns",
        skip(self, previous, turns),
        fields(turn_count = turns.len(), has_previous = previous.is_some())
    )]
    pub async fn summarize(
        &self,
        previous: Option<&str>,
        turns: &[ConversationTurn],
    ) -> Result<String, LlmError> {
        if turns.is_empty() {
            return Ok(previous.unwrap_or_default().to_string());
        }

        let new_messages = turns
            .iter()
            .map(|t| format!("- {}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n");
        let current = previous
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("No summary yet.");

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::user(format!(
                "CURRENT SUMMARY:\n{current}\n\nNEW MESSAGES:\n{new_messages}"
            ))],
            system: Some(SUMMARY_SYSTEM_PROMPT.to_string()),
            max_tokens: self.provider.output_budget(1024),
            temperature: Some(0.0),
            stop_sequences: None,
        };

        let response = self.provider.complete(&request).await?;
        Ok(response.content.trim().to_string())
    }
}
