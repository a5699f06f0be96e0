//! Request assembly for both backends.
//!
//! Both builders take already-compacted pairs; the caller decides how many
//! pairs each backend gets.

use shared::agent_api::ChatMessage;
use shared::Pair;

/// Instruction given to either backend ahead of the conversation.
pub const SYSTEM_PREAMBLE: &str = "You are a helpful, concise assistant.";

/// Stop sequences that end the local model's turn.
pub const STOP_SEQUENCES: [&str; 2] = ["\nUser:", "\nAssistant:"];

/// Shown instead of an empty reply.
pub const EMPTY_REPLY: &str = "(No output.)";

/// Flat transcript prompt for the local engine, ending in an open
/// `Assistant:` cue.
pub fn build_local_prompt(pairs: &[Pair<'_>], user_text: &str) -> String {
    let mut prompt = String::with_capacity(
        SYSTEM_PREAMBLE.len()
            + user_text.len()
            + pairs
                .iter()
                .map(|p| p.user.len() + p.assistant.len() + 24)
                .sum::<usize>()
            + 24,
    );
    prompt.push_str(SYSTEM_PREAMBLE);
    prompt.push('\n');
    for pair in pairs {
        prompt.push_str("User: ");
        prompt.push_str(pair.user);
        prompt.push_str("\nAssistant: ");
        prompt.push_str(pair.assistant);
        prompt.push('\n');
    }
    prompt.push_str("User: ");
    prompt.push_str(user_text);
    prompt.push_str("\nAssistant:");
    prompt
}

/// Role-tagged message list for the remote service: system, history, new
/// user message.
pub fn build_remote_messages(pairs: &[Pair<'_>], user_text: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(pairs.len() * 2 + 2);
    messages.push(ChatMessage::system(SYSTEM_PREAMBLE));
    for pair in pairs {
        messages.push(ChatMessage::user(pair.user));
        messages.push(ChatMessage::assistant(pair.assistant));
    }
    messages.push(ChatMessage::user(user_text));
    messages
}

/// Trim a backend reply, substituting [`EMPTY_REPLY`] when nothing is left.
pub fn finish_reply(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        EMPTY_REPLY.to_string()
    } else {
        trimmed.to_string()
    }
}
