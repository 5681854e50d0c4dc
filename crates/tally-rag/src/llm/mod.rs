//! Text generation: the narrative half of every answer.

pub mod ollama;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ChatMessage, ChatRole};

pub use ollama::OllamaGenerator;

/// Opaque, possibly slow, possibly failing `prompt -> completion` function.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for a single user prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Chat completion over a message history.
    /// Default implementation flattens the transcript and calls `generate()`.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        self.generate(&render_transcript(messages)).await
    }

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}

/// Render messages as a `User:` / `Assistant:` transcript ending with an open
/// assistant turn.
pub fn render_transcript(messages: &[ChatMessage]) -> String {
    let mut parts: Vec<String> = messages
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .map(|m| match m.role {
            ChatRole::System => m.content.trim().to_string(),
            ChatRole::User => format!("User: {}", m.content.trim()),
            ChatRole::Assistant => format!("Assistant: {}", m.content.trim()),
        })
        .collect();
    parts.push("Assistant:".to_string());
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_skips_blank_turns() {
        let messages = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("   "),
            ChatMessage::user("what now?"),
        ];
        assert_eq!(
            render_transcript(&messages),
            "User: hi\nUser: what now?\nAssistant:"
        );
    }
}
