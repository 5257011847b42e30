//! Entity extraction via LLM.
//!
//! `EntityExtractor` asks the chat model for the structured facts a user
//! states about themselves in a single turn (name, location, preferences...)
//! and returns them as an attribute map ready to merge into the profile.
//!
//! Unparseable output logs a warning and yields an empty map. Extraction is
//! a best-effort background stage and never fails the caller on bad JSON.

use std::sync::Arc;

use mnemo_types::llm::{CompletionRequest, LlmError, Message};
use mnemo_types::profile::{ProfileAttributes, normalize_attribute_name};

use crate::llm::box_provider::BoxLlmProvider;

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract durable facts about the user from a single message they wrote.

Rules:
1. Only extract facts the user states about themselves (name, age, location, occupation, preferences, goals, constraints)
2. Ignore questions, greetings, and facts about other people
3. Use short snake_case attribute names (e.g. "name", "location", "dietary_preference")
4. Values are strings, numbers, or arrays of strings
5. If the user corrects an earlier fact, output the corrected value

Return a single JSON object mapping attribute name to value and nothing else.
If there is nothing to extract, return {}.

Example:
Message: "I'm Sam, I moved to Madrid last year and I don't eat meat."
Output: {"name": "Sam", "location": "Madrid", "dietary_preference": "vegetarian"}"#;

/// LLM-backed extractor of user profile attributes.
pub struct EntityExtractor {
    provider: Arc<BoxLlmProvider>,
    model: String,
}

impl EntityExtractor {
    /// `model` may be empty to use the provider's default.
    pub fn new(provider: Arc<BoxLlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Extract attributes from one user-authored text.
    ///
    /// Runs at temperature 0 so that re-running on the same turn produces
    /// the same attributes.
    #[tracing::instrument(name = "extract_entities", skip(self, text), fields(text_len = text.len()))]
    pub async fn extract(&self, text: &str) -> Result<ProfileAttributes, LlmError> {
        if text.trim().is_empty() {
            return Ok(ProfileAttributes::new());
        }

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::user(format!("Message: {text}"))],
            system: Some(EXTRACTION_SYSTEM_PROMPT.to_string()),
            max_tokens: self.provider.output_budget(512),
            temperature: Some(0.0),
            stop_sequences: None,
        };

        let response = self.provider.complete(&request).await?;
        let attributes = parse_attributes(&response.content);
        if attributes.is_empty() {
            tracing::debug!("no profile attributes in turn");
        }
        Ok(attributes)
    }
}

/// Parse the model's JSON object into normalised attributes.
///
/// Tolerates a surrounding markdown code fence. `null` values and keys that
/// normalise to nothing are dropped.
pub(crate) fn parse_attributes(raw: &str) -> ProfileAttributes {
    let body = strip_code_fence(raw.trim());

    let object: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(body) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(other) => {
            tracing::warn!(
                kind = json_kind(&other),
                "Entity extraction returned non-object JSON; ignoring"
            );
            return ProfileAttributes::new();
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                content_preview = %body.chars().take(200).collect::<String>(),
                "Failed to parse entity extraction JSON; returning empty result"
            );
            return ProfileAttributes::new();
        }
    };

    object
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .filter_map(|(key, value)| {
            let name = normalize_attribute_name(&key);
            (!name.is_empty()).then_some((name, value))
        })
        .collect()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLlm;
    use serde_json::json;

    #[test]
    fn test_parse_plain_object() {
        let attrs = parse_attributes(r#"{"Name": "Sam", "home city": "Madrid", "age": 31}"#);
        assert_eq!(attrs.get("name"), Some(&json!("Sam")));
        assert_eq!(attrs.get("home_city"), Some(&json!("Madrid")));
        assert_eq!(attrs.get("age"), Some(&json!(31)));
    }

    #[test]
    fn test_parse_fenced_object() {
        let attrs = parse_attributes("```json\n{\"location\": \"New York\"}\n```");
        assert_eq!(attrs.get("location"), Some(&json!("New York")));
    }

    #[test]
    fn test_parse_malformed_is_empty() {
        assert!(parse_attributes("Sure! The user's name is Sam.").is_empty());
        assert!(parse_attributes("[\"Sam\"]").is_empty());
        assert!(parse_attributes("{}").is_empty());
    }

    #[test]
    fn test_parse_drops_nulls() {
        let attrs = parse_attributes(r#"{"name": "Sam", "age": null, "!!": "x"}"#);
        assert_eq!(attrs.len(), 1);
    }

    #[tokio::test]
    async fn test_extract_uses_deterministic_request() {
        let llm = ScriptedLlm::new(|request| {
            assert_eq!(request.temperature, Some(0.0));
            assert!(request.messages[0].content.contains("I live in New York"));
            Ok(r#"{"location": "New York"}"#.to_string())
        });
        let extractor = EntityExtractor::new(llm.boxed(), "");

        let attrs = extractor.extract("I live in New York").await.unwrap();
        assert_eq!(attrs.get("location"), Some(&json!("New York")));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_extract_caps_output_tokens_at_provider_limit() {
        let llm = ScriptedLlm::new(|request| {
            assert_eq!(request.max_tokens, 64);
            Ok("{}".to_string())
        })
        .with_output_limit(64);
        let extractor = EntityExtractor::new(llm.boxed(), "");
        assert!(extractor.extract("I am Sam").await.unwrap().is_empty());
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_extract_skips_blank_text() {
        let llm = ScriptedLlm::new(|_| Ok("{}".to_string()));
        let extractor = EntityExtractor::new(llm.boxed(), "");
        assert!(extractor.extract("   ").await.unwrap().is_empty());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_extract_propagates_provider_error() {
        let llm = ScriptedLlm::new(|_| Err(LlmError::AuthenticationFailed));
        let extractor = EntityExtractor::new(llm.boxed(), "");
        assert!(extractor.extract("I am Sam").await.is_err());
    }
}
