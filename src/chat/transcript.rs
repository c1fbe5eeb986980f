//! Display view of a conversation and the wire view derived from it.
//!
//! The display view is what the user sees: user and assistant turns, error
//! notices, and a transient status line while tools run. The wire view is
//! rebuilt from it on every turn and contains only what the completion
//! endpoint should read:
//!
//! | display entry            | wire view |
//! |--------------------------|-----------|
//! | user                     | `user`    |
//! | assistant                | `assistant` |
//! | assistant error notice   | omitted   |
//! | system status            | omitted   |
//!
//! The fixed system instruction is prepended. Tool-call exchanges exist only
//! in the outbound context of the turn that made them.

use serde::Serialize;

use crate::llm::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayRole {
    User,
    Assistant,
    SystemStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub role: DisplayRole,
    pub content: String,
    /// Error notices are shown but never sent.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Entry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: DisplayRole::User,
            content: content.into(),
            is_error: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: DisplayRole::Assistant,
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            role: DisplayRole::Assistant,
            content: content.into(),
            is_error: true,
        }
    }

    pub fn status(content: impl Into<String>) -> Self {
        Self {
            role: DisplayRole::SystemStatus,
            content: content.into(),
            is_error: false,
        }
    }

    /// Whether this entry belongs in the wire view.
    pub fn is_wire_visible(&self) -> bool {
        !self.is_error && self.role != DisplayRole::SystemStatus
    }
}

/// Ordered display transcript.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Replace the most recent status entry with `entry`, or append it if
    /// there is none.
    pub fn replace_status(&mut self, entry: Entry) {
        match self
            .entries
            .iter()
            .rposition(|e| e.role == DisplayRole::SystemStatus)
        {
            Some(i) => self.entries[i] = entry,
            None => self.entries.push(entry),
        }
    }

    /// Drop every status entry.
    pub fn clear_status(&mut self) {
        self.entries.retain(|e| e.role != DisplayRole::SystemStatus);
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Entry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Outbound messages for a new turn, starting with `system_prompt`.
    pub fn wire_view(&self, system_prompt: &str) -> Vec<ChatMessage> {
        std::iter::once(ChatMessage::system(system_prompt))
            .chain(
                self.entries
                    .iter()
                    .filter(|e| e.is_wire_visible())
                    .map(|e| match e.role {
                        DisplayRole::User => ChatMessage::user(&e.content),
                        _ => ChatMessage::assistant(&e.content),
                    }),
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn wire_view_skips_status_and_errors() {
        let mut t = Transcript::new();
        t.push(Entry::assistant("How can I help?"));
        t.push(Entry::user("What's my status?"));
        t.push(Entry::error("Sorry, something went wrong."));
        t.push(Entry::user("Try again"));
        t.push(Entry::status("Checking…"));

        let wire = t.wire_view("sys");
        let roles: Vec<_> = wire.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [Role::System, Role::Assistant, Role::User, Role::User]
        );
        assert_eq!(wire[0].content.as_deref(), Some("sys"));
        assert_eq!(wire[3].content.as_deref(), Some("Try again"));
    }

    #[test]
    fn replace_status_in_place() {
        let mut t = Transcript::new();
        t.push(Entry::user("q"));
        t.push(Entry::status("Checking…"));
        t.replace_status(Entry::assistant("answer"));
        assert_eq!(t.entries(), [Entry::user("q"), Entry::assistant("answer")]);

        t.replace_status(Entry::assistant("appended"));
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn clear_status_removes_only_status() {
        let mut t = Transcript::new();
        t.push(Entry::user("q"));
        t.push(Entry::status("Checking…"));
        t.clear_status();
        assert_eq!(t.entries(), [Entry::user("q")]);
    }
}
