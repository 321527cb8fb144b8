//! Conversation history for a single session: user and system turns in
//! arrival order, with a helper to render the last N for prompt
//! construction.

#[derive(Debug, Clone)]
pub enum DialogueMessage {
    User { content: String },
    System { content: String },
}

impl DialogueMessage {
    fn speaker(&self) -> &'static str {
        match self {
            DialogueMessage::User { .. } => "User",
            DialogueMessage::System { .. } => "Assistant",
        }
    }

    fn content(&self) -> &str {
        match self {
            DialogueMessage::User { content } | DialogueMessage::System { content } => content,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dialogue {
    pub session_id: String,
    messages: Vec<DialogueMessage>,
}

impl Dialogue {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(DialogueMessage::User {
            content: content.into(),
        });
    }

    pub fn push_system(&mut self, content: impl Into<String>) {
        self.messages.push(DialogueMessage::System {
            content: content.into(),
        });
    }

    pub fn messages(&self) -> &[DialogueMessage] {
        &self.messages
    }

    pub fn recent(&self, limit: usize) -> &[DialogueMessage] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }

    /// Render the last `limit` messages as a transcript suitable for
    /// embedding in a prompt.
    pub fn render_recent(&self, limit: usize) -> String {
        self.recent(limit)
            .iter()
            .map(|m| format!("{}: {}", m.speaker(), m.content()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_caps_at_the_requested_limit() {
        let mut dialogue = Dialogue::new("s1");
        for i in 0..10 {
            dialogue.push_user(format!("turn {i}"));
        }
        assert_eq!(dialogue.recent(5).len(), 5);
        assert!(dialogue.render_recent(5).contains("turn 9"));
        assert!(!dialogue.render_recent(5).contains("turn 4"));
    }
}
