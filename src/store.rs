use std::fs;
use std::path::Path;

use crate::error::{MultiChatError, Result};
use crate::models::{ChatMessage, Role};
use crate::prompt::to_pretty_json;

/// Ordered, role-tagged conversation history.
///
/// The first message is always the system message.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationStore {
    system_prompt: String,
    messages: Vec<ChatMessage>,
}

impl ConversationStore {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            messages: vec![ChatMessage::system(system_prompt.clone())],
            system_prompt,
        }
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Replace the whole history, restoring the system message if missing
    pub fn replace_all(&mut self, mut messages: Vec<ChatMessage>) {
        if messages.first().is_none_or(|m| m.role != Role::System) {
            messages.insert(0, ChatMessage::system(self.system_prompt.clone()));
        }
        self.messages = messages;
    }

    pub fn clear(&mut self) {
        self.messages = vec![ChatMessage::system(self.system_prompt.clone())];
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        to_pretty_json(&self.messages)
    }

    /// Parse a persisted conversation. Anything but an array of
    /// `{role, content}` objects is a format error.
    pub fn parse_json(raw: &str) -> Result<Vec<ChatMessage>> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| MultiChatError::Format(format!("invalid JSON: {e}")))?;
        if !value.is_array() {
            return Err(MultiChatError::Format(
                "conversation file must contain a JSON array".to_string(),
            ));
        }
        serde_json::from_value(value)
            .map_err(|e| MultiChatError::Format(format!("invalid message record: {e}")))
    }

    /// Replace the history from JSON; on error the store is unchanged
    pub fn load_json(&mut self, raw: &str) -> Result<()> {
        let messages = Self::parse_json(raw)?;
        self.replace_all(messages);
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        tracing::info!(
            "Saved {} messages to {}",
            self.messages.len(),
            path.display()
        );
        Ok(())
    }

    pub fn load(&mut self, path: &Path) -> Result<()> {
        let raw = fs::read_to_string(path)?;
        self.load_json(&raw)?;
        tracing::info!(
            "Loaded {} messages from {}",
            self.messages.len(),
            path.display()
        );
        Ok(())
    }
}
