use anyhow::Result;
use async_trait::async_trait;
use shared::agent_api::ChatMessage;

/// A chat-completion request for a hosted model.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A hosted chat-completion service. Returns the first choice's content.
#[async_trait]
pub trait RemoteChat: Send + Sync {
    async fn complete(&self, request: &RemoteRequest) -> Result<String>;
}
