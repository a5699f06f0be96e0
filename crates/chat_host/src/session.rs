//! Session controller.
//!
//! Owns the mode, the knobs, the loaded engine and the history, and runs the
//! request lifecycle. Model loads and generations run on worker threads and
//! report back through a channel that the UI drains with [`Session::poll`].
//! At most one of them is in flight at any time.

use crate::dispatcher::Dispatcher;
use providers::{
    default_loader, CompletionRequest, EngineLoader, LoadOptions, LocalEngine, OpenAIClient,
    RemoteChat,
};
use shared::error::Result;
use shared::settings::{ChatSettings, Mode};
use shared::{ChatError, History, Operation};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use zeroize::Zeroizing;

pub const WELCOME_TIP: &str = "Tip: Local mode needs a .gguf model loaded. API mode needs a key.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Generating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: String,
}

impl TranscriptEntry {
    fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp: chrono::Local::now().format("%H:%M").to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Warning,
    Error,
}

/// Something the user has to acknowledge before carrying on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

enum WorkerEvent {
    Loaded {
        path: PathBuf,
        result: anyhow::Result<Arc<dyn LocalEngine>>,
    },
    Replied {
        user_text: String,
        result: Result<String>,
    },
}

pub struct Session {
    settings: ChatSettings,
    phase: Phase,
    history: History,
    transcript: Vec<TranscriptEntry>,
    status: String,
    notices: VecDeque<Notice>,
    engine: Option<Arc<dyn LocalEngine>>,
    remote: Option<Arc<dyn RemoteChat>>,
    credential: Option<Zeroizing<String>>,
    loader: Arc<dyn EngineLoader>,
    events_tx: Sender<WorkerEvent>,
    events_rx: Receiver<WorkerEvent>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(ChatSettings::default(), default_loader())
    }
}

impl Session {
    pub fn new(settings: ChatSettings, loader: Arc<dyn EngineLoader>) -> Self {
        let (events_tx, events_rx) = channel();
        Self {
            settings,
            phase: Phase::Idle,
            history: History::new(),
            transcript: vec![TranscriptEntry::new(Speaker::Assistant, WELCOME_TIP)],
            status: "idle".to_string(),
            notices: VecDeque::new(),
            engine: None,
            remote: None,
            credential: None,
            loader,
            events_tx,
            events_rx,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn can_submit(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn can_load(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn mode(&self) -> Mode {
        self.settings.mode
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn engine_label(&self) -> Option<String> {
        self.engine.as_ref().map(|e| e.describe())
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    pub fn next_notice(&mut self) -> Option<Notice> {
        self.notices.pop_front()
    }

    // ── Configuration ────────────────────────────────────────────────

    pub fn set_mode(&mut self, mode: Mode) {
        if self.settings.mode == mode {
            return;
        }
        self.settings.mode = mode;
        tracing::info!(mode = mode.as_str(), "mode changed");
        self.status = match mode {
            Mode::Remote => "API mode selected (needs key).".to_string(),
            Mode::Local => "Local mode selected (needs GGUF model).".to_string(),
        };
    }

    pub fn set_model_path(&mut self, path: Option<PathBuf>) {
        self.settings.local.model_path = path.filter(|p| !p.as_os_str().is_empty());
    }

    pub fn set_max_tokens(&mut self, max_tokens: u32) {
        self.settings.generation.set_max_tokens(max_tokens);
    }

    pub fn set_temperature(&mut self, temperature: f32) {
        self.settings.generation.set_temperature(temperature);
    }

    /// Store (or drop) the API key. A usable key builds the remote client and
    /// switches the session to remote mode.
    pub fn set_credential(&mut self, key: Option<&str>) {
        let key = key.map(str::trim).filter(|k| !k.is_empty());
        let Some(key) = key else {
            self.status = "API key not set.".to_string();
            return;
        };
        match OpenAIClient::new(key, self.settings.remote.base_url.as_deref()) {
            Ok(client) => self.install_remote(key, Arc::new(client)),
            Err(e) => {
                tracing::warn!("could not build remote client: {}", e);
                self.status = "API key not set.".to_string();
                self.notices.push_back(Notice {
                    level: NoticeLevel::Error,
                    title: "API key".to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    pub(crate) fn install_remote(&mut self, key: &str, client: Arc<dyn RemoteChat>) {
        self.credential = Some(Zeroizing::new(key.to_string()));
        self.remote = Some(client);
        self.settings.mode = Mode::Remote;
        self.status = "API key set. Using API mode.".to_string();
        tracing::info!("remote client configured");
    }

    // ── Operations ───────────────────────────────────────────────────

    fn ensure_idle(&self) -> Result<()> {
        match self.phase {
            Phase::Idle => Ok(()),
            Phase::Loading => Err(ChatError::Busy(Operation::Load)),
            Phase::Generating => Err(ChatError::Busy(Operation::Generation)),
        }
    }

    fn refuse_load(&mut self, level: NoticeLevel, title: &str, message: &str) -> ChatError {
        self.notices.push_back(Notice {
            level,
            title: title.to_string(),
            message: message.to_string(),
        });
        ChatError::configuration(message)
    }

    /// Start loading the configured model file on a worker thread.
    ///
    /// The session switches to local mode first, even if the load is then
    /// refused. Refusals are reported both as a [`Notice`] and as the
    /// returned error, and leave the phase and the engine untouched.
    pub fn request_load(&mut self) -> Result<()> {
        self.ensure_idle()?;
        if self.settings.mode != Mode::Local {
            self.settings.mode = Mode::Local;
        }

        if !self.loader.is_available() {
            return Err(self.refuse_load(
                NoticeLevel::Error,
                "Missing dependency",
                "Local inference is not available in this build.\n\nRebuild with:\n  cargo build --features llama",
            ));
        }
        let path = match self.settings.local.model_path.clone() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => {
                return Err(self.refuse_load(
                    NoticeLevel::Warning,
                    "Model missing",
                    "Pick a .gguf file first.",
                ))
            }
        };
        if !path.exists() {
            return Err(self.refuse_load(
                NoticeLevel::Error,
                "Not found",
                "That model file path does not exist.",
            ));
        }

        self.phase = Phase::Loading;
        self.status = "Loading model (this may take a bit)…".to_string();
        tracing::info!(path = %path.display(), "model load requested");

        let loader = self.loader.clone();
        let options = LoadOptions {
            context_size: self.settings.local.context_size,
            threads: self.settings.local.effective_threads(),
        };
        let tx = self.events_tx.clone();
        std::thread::spawn(move || {
            let worker_path = path.clone();
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(
                || -> anyhow::Result<Arc<dyn LocalEngine>> {
                    let engine = loader.load(&worker_path, &options)?;
                    engine.complete(&CompletionRequest::new("Hello", 1))?;
                    Ok(engine)
                },
            ));
            let result = outcome
                .unwrap_or_else(|_| Err(anyhow::anyhow!("the model loader crashed")));
            let _ = tx.send(WorkerEvent::Loaded { path, result });
        });
        Ok(())
    }

    /// Send a message. Returns `Ok(false)` for blank input, which is ignored.
    ///
    /// The text is echoed to the transcript immediately; the reply arrives
    /// through [`Session::poll`].
    pub fn submit(&mut self, input: &str) -> Result<bool> {
        let user_text = input.trim();
        if user_text.is_empty() {
            return Ok(false);
        }
        self.ensure_idle()?;

        let user_text = user_text.to_string();
        self.transcript
            .push(TranscriptEntry::new(Speaker::User, user_text.clone()));
        self.phase = Phase::Generating;
        self.status = "Thinking…".to_string();

        let dispatcher = Dispatcher::new(
            self.settings.clone(),
            self.engine.clone(),
            self.remote.clone(),
        );
        let history = self.history.clone();
        let tx = self.events_tx.clone();
        tracing::info!(mode = dispatcher.mode().as_str(), "generation started");
        std::thread::spawn(move || {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                dispatcher.dispatch(&history, &user_text)
            }));
            let result = outcome.unwrap_or_else(|_| {
                Err(ChatError::Engine(anyhow::anyhow!(
                    "Something went wrong while processing that request. Please try again."
                )))
            });
            let _ = tx.send(WorkerEvent::Replied { user_text, result });
        });
        Ok(true)
    }

    /// Reset the conversation. The loaded model and key are kept.
    pub fn clear(&mut self) {
        self.history.clear();
        self.transcript.clear();
        self.transcript
            .push(TranscriptEntry::new(Speaker::Assistant, "Chat cleared."));
        tracing::info!("chat cleared");
    }

    /// Apply finished worker results. Call once per UI frame. Returns true if
    /// anything changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        loop {
            match self.events_rx.try_recv() {
                Ok(event) => {
                    self.apply(event);
                    changed = true;
                }
                Err(TryRecvError::Empty) => break,
                // Never happens while `self` holds a sender.
                Err(TryRecvError::Disconnected) => break,
            }
        }
        changed
    }

    fn apply(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Loaded { path, result } => {
                self.phase = Phase::Idle;
                match result {
                    Ok(engine) => {
                        tracing::info!(path = %path.display(), "model ready");
                        self.engine = Some(engine);
                        self.status = "Model loaded. Ready (Local).".to_string();
                        self.transcript.push(TranscriptEntry::new(
                            Speaker::Assistant,
                            "Local model loaded. Ask me anything.",
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "model load failed: {:#}", e);
                        self.status = "Model load failed.".to_string();
                        self.notices.push_back(Notice {
                            level: NoticeLevel::Error,
                            title: "Load failed".to_string(),
                            message: format!("{:#}", e),
                        });
                    }
                }
            }
            WorkerEvent::Replied { user_text, result } => {
                self.phase = Phase::Idle;
                match result {
                    Ok(reply) => {
                        self.transcript
                            .push(TranscriptEntry::new(Speaker::Assistant, reply.clone()));
                        self.history.push_exchange(user_text, reply);
                        self.status = "Ready.".to_string();
                    }
                    Err(e) => {
                        tracing::warn!("generation failed: {}", e);
                        self.transcript
                            .push(TranscriptEntry::new(Speaker::Error, format!("⚠ Error: {}", e)));
                        self.status = "Error.".to_string();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use providers::{Completion, LoadOptions, RemoteRequest};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use tempfile::NamedTempFile;

    struct EchoEngine {
        calls: AtomicUsize,
    }

    impl LocalEngine for EchoEngine {
        fn complete(&self, request: &CompletionRequest) -> anyhow::Result<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Completion::text(format!(" echo {} ", request.prompt.len())))
        }
    }

    /// Blocks every call until the test sends on the gate.
    struct GatedEngine {
        gate: Mutex<Receiver<()>>,
    }

    impl LocalEngine for GatedEngine {
        fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<Completion> {
            let _ = self.gate.lock().unwrap().recv();
            Ok(Completion::text("done"))
        }
    }

    struct FakeLoader {
        engine: Option<Arc<dyn LocalEngine>>,
        loads: AtomicUsize,
    }

    impl FakeLoader {
        fn with(engine: Arc<dyn LocalEngine>) -> Arc<Self> {
            Arc::new(Self {
                engine: Some(engine),
                loads: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                engine: None,
                loads: AtomicUsize::new(0),
            })
        }
    }

    impl EngineLoader for FakeLoader {
        fn load(&self, _path: &Path, _options: &LoadOptions) -> anyhow::Result<Arc<dyn LocalEngine>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.engine
                .clone()
                .ok_or_else(|| anyhow::anyhow!("invalid magic number in GGUF header"))
        }
    }

    struct CannedRemote(&'static str);

    #[async_trait]
    impl RemoteChat for CannedRemote {
        async fn complete(&self, _request: &RemoteRequest) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn echo_engine() -> Arc<EchoEngine> {
        Arc::new(EchoEngine {
            calls: AtomicUsize::new(0),
        })
    }

    fn model_file() -> NamedTempFile {
        tempfile::Builder::new().suffix(".gguf").tempfile().unwrap()
    }

    fn wait_idle(session: &mut Session) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.is_busy() {
            session.poll();
            assert!(Instant::now() < deadline, "session never became idle");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn loaded_session(engine: Arc<dyn LocalEngine>) -> (Session, NamedTempFile) {
        let file = model_file();
        let mut session = Session::new(ChatSettings::default(), FakeLoader::with(engine));
        session.set_model_path(Some(file.path().to_path_buf()));
        session.request_load().unwrap();
        wait_idle(&mut session);
        assert!(session.has_engine());
        (session, file)
    }

    #[test]
    fn test_new_session_shows_tip() {
        let session = Session::new(ChatSettings::default(), FakeLoader::failing());
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript()[0].text, WELCOME_TIP);
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_blank_input_is_ignored() {
        let mut session = Session::new(ChatSettings::default(), FakeLoader::failing());
        assert!(!session.submit("   \n").unwrap());
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.transcript().len(), 1);
    }

    #[test]
    fn test_load_without_path_is_refused() {
        let mut session = Session::new(ChatSettings::default(), FakeLoader::failing());
        session.set_mode(Mode::Remote);
        let err = session.request_load().unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(session.mode(), Mode::Local);
        assert_eq!(session.phase(), Phase::Idle);
        let notice = session.next_notice().unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert_eq!(notice.message, "Pick a .gguf file first.");
    }

    #[test]
    fn test_load_missing_file_is_refused() {
        let mut session = Session::new(ChatSettings::default(), FakeLoader::failing());
        session.set_model_path(Some(PathBuf::from("/definitely/not/here/model.gguf")));
        assert!(session.request_load().unwrap_err().is_configuration());
        assert_eq!(session.next_notice().unwrap().title, "Not found");
    }

    #[test]
    fn test_load_without_runtime_is_refused() {
        let file = model_file();
        let mut session = Session::new(
            ChatSettings::default(),
            Arc::new(providers::local::UnavailableLoader),
        );
        session.set_model_path(Some(file.path().to_path_buf()));
        assert!(session.request_load().unwrap_err().is_configuration());
        assert_eq!(session.next_notice().unwrap().title, "Missing dependency");
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[test]
    fn test_load_warms_up_and_installs_engine() {
        let engine = echo_engine();
        let (session, _file) = loaded_session(engine.clone());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.status(), "Model loaded. Ready (Local).");
        assert_eq!(
            session.transcript().last().unwrap().text,
            "Local model loaded. Ask me anything."
        );
    }

    #[test]
    fn test_failed_load_raises_notice_and_returns_to_idle() {
        let file = model_file();
        let loader = FakeLoader::failing();
        let mut session = Session::new(ChatSettings::default(), loader.clone());
        session.set_model_path(Some(file.path().to_path_buf()));
        session.request_load().unwrap();
        assert_eq!(session.phase(), Phase::Loading);
        wait_idle(&mut session);

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert!(!session.has_engine());
        assert_eq!(session.status(), "Model load failed.");
        let notice = session.next_notice().unwrap();
        assert_eq!(notice.title, "Load failed");
        assert!(notice.message.contains("GGUF"));
        assert!(session.can_submit());
    }

    #[test]
    fn test_local_submit_without_engine_reports_inline() {
        let mut session = Session::new(ChatSettings::default(), FakeLoader::failing());
        assert!(session.submit("hello").unwrap());
        wait_idle(&mut session);

        assert!(session.history().is_empty());
        let last = session.transcript().last().unwrap();
        assert_eq!(last.speaker, Speaker::Error);
        assert!(last.text.starts_with("⚠ Error: No local model loaded"));
        assert_eq!(session.status(), "Error.");
        assert!(session.can_submit());
    }

    #[test]
    fn test_remote_submit_without_key_reports_inline() {
        let mut session = Session::new(ChatSettings::default(), FakeLoader::failing());
        session.set_mode(Mode::Remote);
        session.submit("hello").unwrap();
        wait_idle(&mut session);
        assert!(session.history().is_empty());
        assert!(session
            .transcript()
            .last()
            .unwrap()
            .text
            .contains("No API key set"));
    }

    #[test]
    fn test_successful_exchange_appends_pair() {
        let (mut session, _file) = loaded_session(echo_engine());
        session.submit("  hi  ").unwrap();
        let echoed = &session.transcript()[session.transcript().len() - 1];
        assert_eq!(echoed.speaker, Speaker::User);
        assert_eq!(echoed.text, "hi");
        wait_idle(&mut session);

        let pairs = session.history().pairs();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].user, "hi");
        assert!(pairs[0].assistant.starts_with("echo "));
        assert_eq!(session.status(), "Ready.");
    }

    #[test]
    fn test_generation_blocks_second_submit_and_load() {
        let (release, gate) = channel();
        let engine = Arc::new(GatedEngine {
            gate: Mutex::new(gate),
        });
        // The warm-up call needs one release as well.
        release.send(()).unwrap();
        let (mut session, _file) = loaded_session(engine);

        session.submit("first").unwrap();
        assert_eq!(session.phase(), Phase::Generating);
        assert!(!session.can_submit());
        assert!(!session.can_load());
        assert!(matches!(
            session.submit("second"),
            Err(ChatError::Busy(Operation::Generation))
        ));
        assert!(matches!(
            session.request_load(),
            Err(ChatError::Busy(Operation::Generation))
        ));

        release.send(()).unwrap();
        wait_idle(&mut session);
        assert_eq!(session.history().pairs().len(), 1);
        assert_eq!(session.history().pairs()[0].user, "first");
    }

    #[test]
    fn test_loading_blocks_submit() {
        let (release, gate) = channel();
        let engine = Arc::new(GatedEngine {
            gate: Mutex::new(gate),
        });
        let file = model_file();
        let mut session = Session::new(ChatSettings::default(), FakeLoader::with(engine));
        session.set_model_path(Some(file.path().to_path_buf()));
        session.request_load().unwrap();

        assert!(matches!(
            session.submit("too early"),
            Err(ChatError::Busy(Operation::Load))
        ));
        assert!(matches!(
            session.request_load(),
            Err(ChatError::Busy(Operation::Load))
        ));

        release.send(()).unwrap();
        wait_idle(&mut session);
        assert!(session.has_engine());
    }

    #[test]
    fn test_credential_switches_to_remote() {
        let mut session = Session::new(ChatSettings::default(), FakeLoader::failing());
        session.set_credential(Some("   "));
        assert!(!session.has_credential());
        assert_eq!(session.status(), "API key not set.");

        session.set_credential(Some(" sk-test "));
        assert!(session.has_credential());
        assert_eq!(session.mode(), Mode::Remote);
        assert_eq!(session.status(), "API key set. Using API mode.");
    }

    #[test]
    fn test_remote_exchange_and_clear() {
        let mut session = Session::new(ChatSettings::default(), FakeLoader::failing());
        session.install_remote("sk-test", Arc::new(CannedRemote(" Hello! ")));
        session.submit("hi").unwrap();
        wait_idle(&mut session);
        assert_eq!(session.history().pairs()[0].assistant, "Hello!");

        session.clear();
        assert!(session.history().is_empty());
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript()[0].text, "Chat cleared.");
        assert!(session.history().recent_pairs(6).is_empty());
    }

    #[test]
    fn test_knobs_are_clamped() {
        let mut session = Session::new(ChatSettings::default(), FakeLoader::failing());
        session.set_max_tokens(4096);
        session.set_temperature(9.0);
        assert_eq!(session.settings().generation.max_tokens, 1024);
        assert_eq!(session.settings().generation.temperature, 2.0);
    }
}
