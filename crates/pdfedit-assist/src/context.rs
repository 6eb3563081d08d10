//! Bounded conversation window
//!
//! One context per session (or per document). Only the most recent turns are
//! kept; older ones are dropped as new ones arrive.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_HISTORY_TURNS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ConversationContext {
    turns: VecDeque<ConversationTurn>,
    limit: usize,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_TURNS)
    }
}

impl ConversationContext {
    pub fn new(limit: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(limit),
            limit,
        }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        if self.limit == 0 {
            return;
        }
        while self.turns.len() >= self.limit {
            self.turns.pop_front();
        }
        self.turns.push_back(ConversationTurn {
            role,
            content: content.into(),
        });
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// "Role: content" lines, oldest first, for inclusion in a prompt
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_keeps_only_recent_turns() {
        let mut context = ConversationContext::new(3);
        for i in 0..5 {
            context.push(Role::User, format!("turn {}", i));
        }
        assert_eq!(context.len(), 3);
        let contents: Vec<&str> = context.turns().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["turn 2", "turn 3", "turn 4"]);
    }

    #[test]
    fn test_render() {
        let mut context = ConversationContext::default();
        context.push(Role::User, "What is the total?");
        context.push(Role::Assistant, "$40");
        assert_eq!(context.render(), "User: What is the total?\nAssistant: $40");
    }

    #[test]
    fn test_zero_limit_keeps_nothing() {
        let mut context = ConversationContext::new(0);
        context.push(Role::User, "hello");
        assert!(context.is_empty());
        assert_eq!(context.render(), "");
    }
}
