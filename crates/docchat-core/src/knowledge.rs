//! Pluggable domain responders.
//!
//! A responder sits behind the same message-forwarding surface as the main
//! assistant and is selected by its own routing predicate, so the turn
//! router never hard-codes topic strings.

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// A responder that can answer some inputs without involving a session.
#[async_trait]
pub trait DomainResponder: Send + Sync {
    /// Name used to tag messages forwarded to the UI.
    fn name(&self) -> &str;

    /// Routing predicate: should this responder handle `input`?
    fn matches(&self, input: &str) -> bool;

    /// Produces the reply for `input`.
    async fn respond(&self, input: &str) -> Result<String>;
}

const FALLBACK_ANSWER: &str = "I'm sorry, I don't have information on that topic.";

/// Line-oriented keyword lookup over a local knowledge file.
///
/// Answers with the first line containing the prompt (case-insensitive).
/// Deliberately simple; it exists to exercise the routing seam, not to be a
/// search engine.
#[derive(Debug)]
pub struct KeywordKnowledgeResponder {
    name: String,
    triggers: Vec<String>,
    lines: Vec<String>,
}

impl KeywordKnowledgeResponder {
    /// Loads the knowledge file once, splitting it into lines.
    pub fn from_file(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        triggers: Vec<String>,
    ) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_lines(
            name,
            text.lines().map(str::to_string).collect(),
            triggers,
        ))
    }

    pub fn from_lines(name: impl Into<String>, lines: Vec<String>, triggers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            triggers: triggers.into_iter().map(|t| t.to_lowercase()).collect(),
            lines,
        }
    }
}

#[async_trait]
impl DomainResponder for KeywordKnowledgeResponder {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, input: &str) -> bool {
        let input = input.to_lowercase();
        self.triggers.iter().any(|t| input.contains(t))
    }

    async fn respond(&self, input: &str) -> Result<String> {
        let needle = input.to_lowercase();
        let answer = self
            .lines
            .iter()
            .find(|line| line.to_lowercase().contains(&needle))
            .cloned()
            .unwrap_or_else(|| FALLBACK_ANSWER.to_string());
        Ok(answer)
    }
}
