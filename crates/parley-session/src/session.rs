use chrono::{DateTime, Utc};
use parley_core::{ChatMessage, Role};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One client's conversation.
///
/// `messages[0]` is always the single `system` entry; everything after it is
/// the user/assistant exchange in completion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Store-unique number assigned at creation. A recreated session never
    /// reuses the epoch of the one it replaced.
    pub epoch: u64,
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, epoch: u64, system_prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        let system_prompt = system_prompt.into();
        Self {
            id: id.into(),
            epoch,
            messages: vec![ChatMessage::system(system_prompt.clone())],
            system_prompt,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the system prompt, rewriting the existing system entry in place.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        match self.messages.iter_mut().find(|m| m.role == Role::System) {
            Some(msg) => msg.content = prompt.clone(),
            None => self.messages.insert(0, ChatMessage::system(prompt.clone())),
        }
        self.system_prompt = prompt;
        self.updated_at = Utc::now();
    }

    /// Append a user or assistant message.
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        debug_assert!(role != Role::System, "system entry is rewritten, never appended");
        self.messages.push(ChatMessage::new(role, content));
        self.updated_at = Utc::now();
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Number of user messages submitted, including ones whose reply failed.
    pub fn turns(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session(id={}, epoch={}, messages={})", self.id, self.epoch, self.messages.len())
    }
}
