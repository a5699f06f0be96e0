//! Routes one user message to the local engine or the remote service.

use crate::prompts::{build_local_prompt, build_remote_messages, finish_reply, STOP_SEQUENCES};
use providers::{CompletionRequest, LocalEngine, RemoteChat, RemoteRequest};
use shared::error::Result;
use shared::settings::{ChatSettings, Mode};
use shared::{compact, ChatError, History};
use std::sync::Arc;

/// Nucleus-sampling threshold for the local engine.
pub const LOCAL_TOP_P: f32 = 0.9;
/// Repetition penalty for the local engine.
pub const LOCAL_REPEAT_PENALTY: f32 = 1.1;

/// Snapshot of everything a single request needs. Built on the UI thread,
/// consumed on a worker.
#[derive(Clone)]
pub struct Dispatcher {
    settings: ChatSettings,
    engine: Option<Arc<dyn LocalEngine>>,
    remote: Option<Arc<dyn RemoteChat>>,
}

impl Dispatcher {
    pub fn new(
        settings: ChatSettings,
        engine: Option<Arc<dyn LocalEngine>>,
        remote: Option<Arc<dyn RemoteChat>>,
    ) -> Self {
        Self {
            settings,
            engine,
            remote,
        }
    }

    pub fn mode(&self) -> Mode {
        self.settings.mode
    }

    /// Produce a reply to `user_text`. Blocks until the backend answers.
    pub fn dispatch(&self, history: &History, user_text: &str) -> Result<String> {
        match self.settings.mode {
            Mode::Local => self.dispatch_local(history, user_text),
            Mode::Remote => self.dispatch_remote(history, user_text),
        }
    }

    /// The completion call the local path would make.
    pub fn local_request(&self, history: &History, user_text: &str) -> CompletionRequest {
        let pairs = compact(history, self.settings.local.max_history_pairs);
        let generation = self.settings.generation.clamped();
        CompletionRequest {
            prompt: build_local_prompt(&pairs, user_text),
            max_tokens: generation.max_tokens,
            temperature: generation.temperature,
            top_p: LOCAL_TOP_P,
            repeat_penalty: LOCAL_REPEAT_PENALTY,
            stop: STOP_SEQUENCES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// The request the remote path would send. Uses the remote backend's own
    /// temperature and token cap, not the session knobs.
    pub fn remote_request(&self, history: &History, user_text: &str) -> RemoteRequest {
        let remote = &self.settings.remote;
        let pairs = compact(history, remote.max_history_pairs);
        RemoteRequest {
            model: remote.model.clone(),
            messages: build_remote_messages(&pairs, user_text),
            temperature: remote.temperature,
            max_tokens: remote.max_tokens,
        }
    }

    fn dispatch_local(&self, history: &History, user_text: &str) -> Result<String> {
        let engine = self.engine.as_ref().ok_or_else(|| {
            ChatError::configuration(
                "No local model loaded. Click Load after selecting a .gguf file.",
            )
        })?;
        let request = self.local_request(history, user_text);
        tracing::info!(
            engine = %engine.describe(),
            prompt_chars = request.prompt.len(),
            max_tokens = request.max_tokens,
            "dispatching to local engine"
        );
        let completion = engine.complete(&request)?;
        Ok(finish_reply(&completion.text))
    }

    fn dispatch_remote(&self, history: &History, user_text: &str) -> Result<String> {
        let client = self
            .remote
            .as_ref()
            .ok_or_else(|| ChatError::configuration("No API key set. Click Set API Key."))?;
        let request = self.remote_request(history, user_text);
        tracing::info!(
            model = %request.model,
            messages = request.messages.len(),
            "dispatching to remote service"
        );
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to start async runtime: {}", e))?;
        let text = rt.block_on(client.complete(&request))?;
        Ok(finish_reply(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::EMPTY_REPLY;
    use async_trait::async_trait;
    use providers::Completion;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingEngine {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl RecordingEngine {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl LocalEngine for RecordingEngine {
        fn complete(&self, request: &CompletionRequest) -> anyhow::Result<Completion> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(Completion::text(self.reply.clone()))
        }
    }

    struct FailingEngine;

    impl LocalEngine for FailingEngine {
        fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<Completion> {
            Err(anyhow::anyhow!("llama_decode returned -1"))
        }
    }

    #[derive(Default)]
    struct RecordingRemote {
        reply: String,
        seen: Mutex<Vec<RemoteRequest>>,
    }

    #[async_trait]
    impl RemoteChat for RecordingRemote {
        async fn complete(&self, request: &RemoteRequest) -> anyhow::Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }
    }

    struct UnauthorizedRemote;

    #[async_trait]
    impl RemoteChat for UnauthorizedRemote {
        async fn complete(&self, _request: &RemoteRequest) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("openai error: 401 Unauthorized"))
        }
    }

    fn settings(mode: Mode) -> ChatSettings {
        ChatSettings {
            mode,
            ..ChatSettings::default()
        }
    }

    fn sample_history() -> History {
        let mut history = History::new();
        history.push_exchange("hi", "hello");
        history
    }

    #[test]
    fn test_local_without_engine_is_configuration_error() {
        let history = sample_history();
        let dispatcher = Dispatcher::new(settings(Mode::Local), None, None);
        let err = dispatcher.dispatch(&history, "how are you").unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_remote_without_client_is_configuration_error() {
        let history = sample_history();
        let engine = RecordingEngine::replying("unused");
        let dispatcher = Dispatcher::new(settings(Mode::Remote), Some(engine.clone()), None);
        let err = dispatcher.dispatch(&history, "how are you").unwrap_err();
        assert!(err.is_configuration());
        assert!(engine.seen.lock().unwrap().is_empty());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_local_request_parameters() {
        let engine = RecordingEngine::replying("  Doing well.  ");
        let mut config = settings(Mode::Local);
        config.generation.max_tokens = 128;
        config.generation.temperature = 0.3;
        let dispatcher = Dispatcher::new(config, Some(engine.clone()), None);

        let reply = dispatcher
            .dispatch(&sample_history(), "how are you")
            .unwrap();
        assert_eq!(reply, "Doing well.");

        let seen = engine.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(
            request.prompt,
            "You are a helpful, concise assistant.\nUser: hi\nAssistant: hello\nUser: how are you\nAssistant:"
        );
        assert_eq!(request.max_tokens, 128);
        assert!((request.temperature - 0.3).abs() < f32::EPSILON);
        assert!((request.top_p - 0.9).abs() < f32::EPSILON);
        assert!((request.repeat_penalty - 1.1).abs() < f32::EPSILON);
        assert_eq!(request.stop, vec!["\nUser:", "\nAssistant:"]);
    }

    #[test]
    fn test_local_empty_output_uses_placeholder() {
        let engine = RecordingEngine::replying("\n  ");
        let dispatcher = Dispatcher::new(settings(Mode::Local), Some(engine), None);
        let reply = dispatcher.dispatch(&History::new(), "hello?").unwrap();
        assert_eq!(reply, EMPTY_REPLY);
    }

    #[test]
    fn test_local_engine_failure_is_engine_error() {
        let dispatcher = Dispatcher::new(settings(Mode::Local), Some(Arc::new(FailingEngine)), None);
        let err = dispatcher.dispatch(&History::new(), "hello?").unwrap_err();
        assert!(err.is_engine());
        assert!(err.to_string().contains("llama_decode"));
    }

    #[test]
    fn test_remote_uses_backend_overrides() {
        let remote = Arc::new(RecordingRemote {
            reply: "Fine, thanks!".to_string(),
            ..Default::default()
        });
        let mut config = settings(Mode::Remote);
        config.generation.max_tokens = 1000;
        config.generation.temperature = 1.5;
        let dispatcher = Dispatcher::new(config, None, Some(remote.clone()));

        let reply = dispatcher
            .dispatch(&sample_history(), "how are you")
            .unwrap();
        assert_eq!(reply, "Fine, thanks!");

        let seen = remote.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.model, "gpt-4o-mini");
        assert!((request.temperature - 0.4).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, 300);
        assert_eq!(request.messages.len(), 4);
    }

    #[test]
    fn test_remote_empty_output_uses_placeholder() {
        let remote = Arc::new(RecordingRemote::default());
        let dispatcher = Dispatcher::new(settings(Mode::Remote), None, Some(remote));
        assert_eq!(
            dispatcher.dispatch(&History::new(), "hi").unwrap(),
            EMPTY_REPLY
        );
    }

    #[test]
    fn test_remote_failure_is_engine_error() {
        let dispatcher = Dispatcher::new(
            settings(Mode::Remote),
            None,
            Some(Arc::new(UnauthorizedRemote)),
        );
        let err = dispatcher.dispatch(&History::new(), "hi").unwrap_err();
        assert!(err.is_engine());
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn test_history_limits_are_independent() {
        let mut history = History::new();
        for i in 0..5 {
            history.push_exchange(format!("q{}", i), format!("a{}", i));
        }
        let mut config = settings(Mode::Local);
        config.local.max_history_pairs = 1;
        config.remote.max_history_pairs = 3;
        let dispatcher = Dispatcher::new(config, None, None);

        let local = dispatcher.local_request(&history, "next");
        assert_eq!(local.prompt.matches("User: q").count(), 1);
        assert!(local.prompt.contains("User: q4"));

        let remote = dispatcher.remote_request(&history, "next");
        assert_eq!(remote.messages.len(), 2 * 3 + 2);
        assert_eq!(remote.messages[1].content, "q2");
    }
}
