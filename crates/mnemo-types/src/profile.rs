//! User profile types.
//!
//! The profile is a per-thread attribute map filled in by entity
//! extraction. Merges are last-write-wins per attribute.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::thread::ThreadId;
use crate::turn::TurnId;

/// Value of a profile attribute (string, number, list of preferences...).
pub type ProfileValue = serde_json::Value;

/// Extracted attributes keyed by normalised name.
pub type ProfileAttributes = BTreeMap<String, ProfileValue>;

/// One stored profile attribute with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileAttribute {
    pub name: String,
    pub value: ProfileValue,
    /// Turn the value was extracted from (None for manual edits).
    pub source_turn_id: Option<TurnId>,
    pub updated_at: DateTime<Utc>,
}

/// The structured profile of the user behind a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub thread_id: ThreadId,
    pub attributes: BTreeMap<String, ProfileAttribute>,
}

impl UserProfile {
    pub fn empty(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            attributes: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ProfileValue> {
        self.attributes.get(name).map(|a| &a.value)
    }

    /// Merge extracted attributes, overwriting existing keys.
    ///
    /// Returns the number of attributes whose value changed.
    pub fn merge(
        &mut self,
        extracted: &ProfileAttributes,
        source_turn_id: Option<TurnId>,
        now: DateTime<Utc>,
    ) -> usize {
        let mut changed = 0;
        for (name, value) in extracted {
            let name = normalize_attribute_name(name);
            if name.is_empty() {
                continue;
            }
            let unchanged = self
                .attributes
                .get(&name)
                .is_some_and(|existing| &existing.value == value);
            if unchanged {
                continue;
            }
            self.attributes.insert(
                name.clone(),
                ProfileAttribute {
                    name,
                    value: value.clone(),
                    source_turn_id,
                    updated_at: now,
                },
            );
            changed += 1;
        }
        changed
    }

    /// Render the profile as `name: value` lines for prompt context.
    pub fn render(&self) -> String {
        self.attributes
            .values()
            .map(|a| match &a.value {
                serde_json::Value::String(s) => format!("{}: {}", a.name, s),
                other => format!("{}: {}", a.name, other),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Normalise an attribute name to lower snake case ("Home City" -> "home_city").
pub fn normalize_attribute_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}
