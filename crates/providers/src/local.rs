//! Local engine abstraction.
//!
//! A [`LocalEngine`] turns a flat prompt into text. Engines are produced by an
//! [`EngineLoader`], which is slow and runs on a worker thread.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

/// One completion call against a loaded model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub stop: Vec<String>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
            temperature: 0.8,
            top_p: 0.95,
            repeat_penalty: 1.0,
            stop: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// A stop sequence appeared in the output.
    Stop,
    /// The token budget ran out.
    Length,
    /// The model emitted an end-of-generation token.
    EndOfText,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub finish_reason: FinishReason,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prompt_tokens: 0,
            completion_tokens: 0,
            finish_reason: FinishReason::EndOfText,
        }
    }
}

/// A loaded model. Calls block until generation finishes.
pub trait LocalEngine: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Short label for logs and the status line.
    fn describe(&self) -> String {
        "local model".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub context_size: u32,
    pub threads: u32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            context_size: 2048,
            threads: 8,
        }
    }
}

/// Builds engines from model files.
pub trait EngineLoader: Send + Sync {
    /// False when the runtime backing this loader is not part of the build.
    fn is_available(&self) -> bool {
        true
    }

    fn load(&self, path: &Path, options: &LoadOptions) -> Result<Arc<dyn LocalEngine>>;
}

/// Loader used when the crate is built without a local runtime.
pub struct UnavailableLoader;

impl EngineLoader for UnavailableLoader {
    fn is_available(&self) -> bool {
        false
    }

    fn load(&self, _path: &Path, _options: &LoadOptions) -> Result<Arc<dyn LocalEngine>> {
        Err(anyhow::anyhow!(
            "local inference is not compiled in; rebuild with `--features llama`"
        ))
    }
}

/// The loader for this build: llama.cpp when the `llama` feature is on.
pub fn default_loader() -> Arc<dyn EngineLoader> {
    #[cfg(feature = "llama")]
    {
        Arc::new(crate::llama::LlamaLoader)
    }
    #[cfg(not(feature = "llama"))]
    {
        Arc::new(UnavailableLoader)
    }
}

/// Byte offset of the earliest stop sequence in `text`, if any.
pub fn find_stop(text: &str, stops: &[String]) -> Option<usize> {
    stops
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
}
