//! Conversation history and its compaction.
//!
//! The history only ever grows by whole user/assistant exchanges. Requests
//! never see the full history: [`compact`] keeps the most recent pairs and
//! drops the rest.

use crate::agent_api::Role;
use serde::{Deserialize, Serialize};

/// One role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
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

/// A complete user/assistant exchange, borrowed from a [`History`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pair<'a> {
    pub user: &'a str,
    pub assistant: &'a str,
}

/// Chronological list of turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished exchange.
    pub fn push_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.turns.push(Turn::user(user));
        self.turns.push(Turn::assistant(assistant));
    }

    /// Append a single turn. Normal operation goes through
    /// [`History::push_exchange`]; the compactor tolerates anything pushed here.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
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

    /// Every well-formed pair, oldest first.
    pub fn pairs(&self) -> Vec<Pair<'_>> {
        self.turns
            .chunks_exact(2)
            .filter_map(|chunk| match (&chunk[0], &chunk[1]) {
                (u, a) if u.role == Role::User && a.role == Role::Assistant => Some(Pair {
                    user: &u.content,
                    assistant: &a.content,
                }),
                _ => None,
            })
            .collect()
    }

    /// Shorthand for [`compact`].
    pub fn recent_pairs(&self, max_pairs: usize) -> Vec<Pair<'_>> {
        compact(self, max_pairs)
    }
}

/// Return at most `max_pairs` of the newest complete pairs, in chronological
/// order.
///
/// Turns are read two at a time from the start. A step that is not exactly
/// `(user, assistant)` is skipped, and an odd trailing turn is ignored.
pub fn compact(history: &History, max_pairs: usize) -> Vec<Pair<'_>> {
    let mut pairs = history.pairs();
    let skip = pairs.len().saturating_sub(max_pairs);
    if skip > 0 {
        tracing::debug!(kept = max_pairs, dropped = skip, "compacting history");
    }
    pairs.drain(..skip);
    pairs
}
