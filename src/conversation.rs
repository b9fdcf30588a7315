use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logging::log_debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Result of an operation, fed back to the model
    Tool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Operation that produced a tool turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn tool(name: &str, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_name: Some(name.to_string()),
        }
    }

    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_name: None,
        }
    }
}

/// Ordered turn history of one session.
///
/// The first turn is always the system turn. Everything after it is
/// append-only, except for `clear_history` which drops it all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub id: String,
    pub created_at: DateTime<Utc>,
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            turns: vec![Turn::system(system_prompt)],
        }
    }

    pub fn append(&mut self, turn: Turn) {
        log_debug(&format!(
            "Transcript {}: appending {:?} turn ({} chars)",
            self.id,
            turn.role,
            turn.content.len()
        ));
        self.turns.push(turn);
    }

    /// Swap the persona; earlier turns stay in place
    pub fn replace_system(&mut self, system_prompt: impl Into<String>) {
        self.turns[0] = Turn::system(system_prompt);
    }

    /// Forget everything except the system turn
    pub fn clear_history(&mut self) {
        self.turns.truncate(1);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn system_prompt(&self) -> &str {
        &self.turns[0].content
    }

    /// Number of turns after the system turn
    pub fn history_len(&self) -> usize {
        self.turns.len() - 1
    }

    #[cfg(test)]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}
