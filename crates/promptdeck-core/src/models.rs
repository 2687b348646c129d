//! Data models for promptdeck
//!
//! Defines the prompt record shared by every collection, the collections
//! themselves, and the form-level validation used by front ends.
//!
//! `PromptItem` replaces the two historical record shapes (prompt buttons and
//! topics). `color` and `order` are legacy fields: they are kept when a store
//! has them but nothing requires them.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Accent color used when a record has none
pub const DEFAULT_COLOR: &str = "#007AFF";

/// A configurable AI prompt button
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptItem {
    /// Unique identifier within a collection
    pub id: String,
    /// Short display label
    pub label: String,
    /// Instruction text sent along with the news context
    pub prompt: String,
    /// Display accent (legacy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Manual list position (legacy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

impl PromptItem {
    /// Create a new item with an id derived from the current time
    pub fn new(label: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::with_id(generate_id(), label, prompt)
    }

    /// Create an item with a specific ID (for loading from storage)
    pub fn with_id(
        id: impl Into<String>,
        label: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            prompt: prompt.into(),
            color: None,
            order: None,
        }
    }

    /// Builder-style color setter
    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Builder-style order setter
    pub fn order(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }

    /// Update the label
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    /// Update the prompt text
    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    /// The color to display, falling back to [`DEFAULT_COLOR`]
    pub fn effective_color(&self) -> &str {
        self.color.as_deref().unwrap_or(DEFAULT_COLOR)
    }

    /// Fill in the default color when none is set
    pub(crate) fn with_default_color(mut self) -> Self {
        if self.color.is_none() {
            self.color = Some(DEFAULT_COLOR.to_string());
        }
        self
    }
}

/// Generate a record id from the wall clock (milliseconds since the epoch)
pub fn generate_id() -> String {
    Utc::now().timestamp_millis().to_string()
}

/// The fixed set of records seeded into an empty collection
pub fn default_prompt_items() -> Vec<PromptItem> {
    vec![
        PromptItem::with_id(
            "1",
            "Summarize",
            "Please summarize the following news in one clear sentence",
        )
        .color("#007AFF")
        .order(0),
        PromptItem::with_id(
            "2",
            "Explain",
            "Please explain this news story in simple terms for better understanding",
        )
        .color("#34C759")
        .order(1),
        PromptItem::with_id(
            "3",
            "Analyze",
            "Please analyze the key implications and impact of this news",
        )
        .color("#FF9500")
        .order(2),
        PromptItem::with_id(
            "4",
            "Key Points",
            "Please extract the main key points from this news story",
        )
        .color("#AF52DE")
        .order(3),
    ]
}

/// Sort records by `order`, keeping unordered records last
///
/// The sort is stable, so records without an `order` (and records sharing
/// one) stay in the order the store returned them.
pub fn sort_by_order(items: &mut [PromptItem]) {
    items.sort_by(|a, b| match (a.order, b.order) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// A named collection of prompt records in the document store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Collection {
    /// Prompt buttons shown under each article
    #[default]
    #[serde(rename = "promptButtons")]
    PromptButtons,
    /// Topic prompts
    #[serde(rename = "topics")]
    Topics,
}

impl Collection {
    /// Collection name in the document store
    pub fn name(&self) -> &'static str {
        match self {
            Collection::PromptButtons => "promptButtons",
            Collection::Topics => "topics",
        }
    }

    /// Root segment of this collection's query keys
    pub fn query_root(&self) -> &'static str {
        match self {
            Collection::PromptButtons => "prompts",
            Collection::Topics => "topics",
        }
    }

    /// Whether an empty list read should seed the defaults
    pub fn seeds_defaults_on_read(&self) -> bool {
        matches!(self, Collection::PromptButtons)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prompts" | "promptButtons" | "prompt-buttons" => Ok(Collection::PromptButtons),
            "topics" => Ok(Collection::Topics),
            other => Err(format!(
                "Unknown collection '{}'. Use 'prompts' or 'topics'.",
                other
            )),
        }
    }
}

/// Errors raised by form validation before anything reaches a store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Label cannot be empty")]
    EmptyLabel,

    #[error("Prompt cannot be empty")]
    EmptyPrompt,
}

/// Unvalidated label/prompt input from a form
#[derive(Debug, Clone, Default)]
pub struct PromptDraft {
    pub label: String,
    pub prompt: String,
}

impl PromptDraft {
    pub fn new(label: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            prompt: prompt.into(),
        }
    }

    /// Trim both fields and reject empty ones
    ///
    /// Returns the trimmed `(label, prompt)` pair.
    pub fn validate(&self) -> Result<(String, String), ValidationError> {
        let label = self.label.trim();
        if label.is_empty() {
            return Err(ValidationError::EmptyLabel);
        }
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        Ok((label.to_string(), prompt.to_string()))
    }

    /// Validate and build a new record with a clock-derived id
    pub fn into_item(self) -> Result<PromptItem, ValidationError> {
        let (label, prompt) = self.validate()?;
        Ok(PromptItem::new(label, prompt))
    }
}
