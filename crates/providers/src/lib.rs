//! Inference backends: an in-process engine for local model files and a
//! client for OpenAI-compatible chat-completion services.

pub mod local;
pub mod openai;
pub mod remote;

#[cfg(feature = "llama")]
pub mod llama;

pub use local::{
    default_loader, Completion, CompletionRequest, EngineLoader, FinishReason, LoadOptions,
    LocalEngine,
};
pub use openai::OpenAIClient;
pub use remote::{RemoteChat, RemoteRequest};
