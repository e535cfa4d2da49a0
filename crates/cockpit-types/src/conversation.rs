use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PROCESSING_PLACEHOLDER: &str = "Processing your request...";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Set only on the transient "processing" entry.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub placeholder: bool,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            placeholder: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    fn processing() -> Self {
        Self {
            placeholder: true,
            ..Self::system(PROCESSING_PLACEHOLDER)
        }
    }
}

/// Append-only message log. The only in-place edit is removal of the
/// processing placeholder, of which there is at most one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_greeting(greeting: Option<&str>) -> Self {
        let mut conversation = Self::new();
        if let Some(text) = greeting.map(str::trim).filter(|t| !t.is_empty()) {
            conversation.messages.push(Message::assistant(text));
        }
        conversation
    }

    /// Appends a regular message. Any outstanding placeholder is removed
    /// first so it can never outlive the message that follows it.
    pub fn push(&mut self, message: Message) -> bool {
        let cleared = self.clear_processing();
        self.messages.push(message);
        cleared
    }

    /// Records a message without disturbing a pending placeholder: it is
    /// placed ahead of the placeholder when one is outstanding.
    pub fn note(&mut self, message: Message) {
        match self.messages.iter().position(|m| m.placeholder) {
            Some(at) => self.messages.insert(at, message),
            None => self.messages.push(message),
        }
    }

    /// Appends the processing placeholder unless one is already present.
    pub fn begin_processing(&mut self) -> bool {
        if self.is_processing() {
            return false;
        }
        self.messages.push(Message::processing());
        true
    }

    /// Removes the placeholder. Returns whether one was removed.
    pub fn clear_processing(&mut self) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| !m.placeholder);
        before != self.messages.len()
    }

    pub fn is_processing(&self) -> bool {
        self.messages.iter().any(|m| m.placeholder)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Assistant replies other than the greeting, i.e. the "results" view.
    pub fn results(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .skip(self.greeting_len())
            .filter(|m| m.role == Role::Assistant)
    }

    fn greeting_len(&self) -> usize {
        match self.messages.first() {
            Some(first) if first.role == Role::Assistant => 1,
            _ => 0,
        }
    }
}
