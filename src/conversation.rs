//! Conversation state: an ordered, append-only list of role-tagged turns.
//!
//! [`Conversation`] has no removal or edit API: once a [`Turn`] is pushed it
//! stays where it is. The orchestrator is the only writer.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a conversation. Fields are private so a turn cannot be
/// rewritten after it is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a conversation with an optional seed system turn.
    pub fn seeded(system_prompt: Option<&str>) -> Self {
        let mut conversation = Self::new();
        if let Some(prompt) = system_prompt.filter(|p| !p.trim().is_empty()) {
            conversation.push(Turn::system(prompt));
        }
        conversation
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Render the conversation as the single prompt the model receives.
    pub fn render(&self) -> String {
        format_history(&self.turns)
    }
}

/// Render turns as `"{role}: {content}"` lines joined by `\n`, with trailing
/// whitespace trimmed. No turns render as `""`.
pub fn format_history<'a>(turns: impl IntoIterator<Item = &'a Turn>) -> String {
    let mut out = String::new();
    for turn in turns {
        out.push_str(turn.role.as_str());
        out.push_str(": ");
        out.push_str(&turn.content);
        out.push('\n');
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Turn> {
        vec![
            Turn::system("You are helpful."),
            Turn::user("hello"),
            Turn::assistant("hi there"),
        ]
    }

    #[test]
    fn empty_history_renders_empty() {
        assert_eq!(format_history(&Vec::<Turn>::new()), "");
        assert_eq!(Conversation::new().render(), "");
    }

    #[test]
    fn renders_role_prefixed_lines() {
        assert_eq!(
            format_history(&sample()),
            "system: You are helpful.\nuser: hello\nassistant: hi there"
        );
    }

    #[test]
    fn trailing_whitespace_trimmed() {
        let turns = vec![Turn::user("hello   \n\n")];
        assert_eq!(format_history(&turns), "user: hello");
    }

    #[test]
    fn formatting_is_idempotent() {
        let turns = sample();
        assert_eq!(format_history(&turns), format_history(&turns));
    }

    #[test]
    fn formatting_preserves_order() {
        let turns = sample();
        let mut reordered = turns.clone();
        reordered.swap(1, 2);
        assert_ne!(format_history(&turns), format_history(&reordered));
    }

    #[test]
    fn seeded_with_system_prompt() {
        let c = Conversation::seeded(Some("be brief"));
        assert_eq!(c.len(), 1);
        assert_eq!(c.turns()[0].role(), Role::System);
        assert_eq!(c.turns()[0].content(), "be brief");
    }

    #[test]
    fn blank_seed_is_ignored() {
        assert!(Conversation::seeded(Some("  ")).is_empty());
        assert!(Conversation::seeded(None).is_empty());
    }

    #[test]
    fn role_serialises_lowercase() {
        let json = serde_json::to_string(&Turn::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }
}
