//! The context handed to the chat model for one response.

use std::collections::HashSet;

use serde::Serialize;

use mnemo_types::llm::{CompletionRequest, Message, MessageRole};
use mnemo_types::profile::UserProfile;
use mnemo_types::summary::ConversationSummary;
use mnemo_types::turn::{ConversationTurn, SimilarityResult};

const ASSISTANT_SYSTEM_PROMPT: &str =
    "You are a friendly and professional conversational assistant. Use what you know about the user to personalise your answers, and say so when you don't know something.";

/// Summary, active turns, profile and recalled turns for one response.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveContext {
    pub summary: Option<ConversationSummary>,
    pub turns: Vec<ConversationTurn>,
    pub profile: UserProfile,
    pub recalled: Vec<SimilarityResult>,
}

impl ActiveContext {
    /// Render the system prompt: instructions, profile, summary and any
    /// recalled turns that are not already in the active window.
    pub fn system_prompt(&self) -> String {
        let mut prompt = ASSISTANT_SYSTEM_PROMPT.to_string();

        if !self.profile.is_empty() {
            prompt.push_str("\n\nWhat you know about the user:\n");
            prompt.push_str(&self.profile.render());
        }

        if let Some(summary) = &self.summary {
            prompt.push_str("\n\nSummary of the conversation so far:\n");
            prompt.push_str(&summary.content);
        }

        let active: HashSet<_> = self.turns.iter().map(|t| t.id).collect();
        let recalled: Vec<_> = self
            .recalled
            .iter()
            .filter(|r| !active.contains(&r.turn_id))
            .collect();
        if !recalled.is_empty() {
            prompt.push_str("\n\nRelevant earlier messages:");
            for r in recalled {
                prompt.push_str(&format!("\n- {}", r.content));
            }
        }

        prompt
    }

    /// Chat messages for the active turns, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.turns
            .iter()
            .map(|t| Message {
                role: MessageRole::from(t.role),
                content: t.content.clone(),
            })
            .collect()
    }

    pub fn to_request(&self, model: &str, max_tokens: u32, temperature: f64) -> CompletionRequest {
        CompletionRequest {
            model: model.to_string(),
            messages: self.messages(),
            system: Some(self.system_prompt()),
            max_tokens,
            temperature: Some(temperature),
            stop_sequences: None,
        }
    }
}
