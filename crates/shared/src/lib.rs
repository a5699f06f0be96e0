pub mod error;
pub mod history;

pub use error::{ChatError, Operation};
pub use history::{compact, History, Pair, Turn};

pub mod settings {
    use serde::{Deserialize, Serialize};
    use std::path::PathBuf;

    /// Smallest and largest values the max-tokens knob accepts.
    pub const MIN_MAX_TOKENS: u32 = 32;
    pub const MAX_MAX_TOKENS: u32 = 1024;

    /// Temperature knob range.
    pub const MIN_TEMPERATURE: f32 = 0.0;
    pub const MAX_TEMPERATURE: f32 = 2.0;

    /// Which backend answers the next message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Mode {
        #[default]
        Local,
        Remote,
    }

    impl Mode {
        pub fn as_str(&self) -> &'static str {
            match self {
                Mode::Local => "local",
                Mode::Remote => "remote",
            }
        }
    }

    /// User-facing generation knobs.
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct GenerationSettings {
        pub max_tokens: u32,
        pub temperature: f32,
    }

    impl Default for GenerationSettings {
        fn default() -> Self {
            Self {
                max_tokens: 220,
                temperature: 0.7,
            }
        }
    }

    impl GenerationSettings {
        pub fn set_max_tokens(&mut self, max_tokens: u32) {
            self.max_tokens = max_tokens.clamp(MIN_MAX_TOKENS, MAX_MAX_TOKENS);
        }

        pub fn set_temperature(&mut self, temperature: f32) {
            self.temperature = if temperature.is_nan() {
                MIN_TEMPERATURE
            } else {
                temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)
            };
        }

        /// Copy with every field pulled back into its allowed range.
        pub fn clamped(mut self) -> Self {
            self.set_max_tokens(self.max_tokens);
            self.set_temperature(self.temperature);
            self
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LocalSettings {
        pub model_path: Option<PathBuf>,
        /// Context window handed to the engine, in tokens.
        pub context_size: u32,
        /// Worker threads for the engine; `None` means one per available core.
        pub threads: Option<u32>,
        pub max_history_pairs: usize,
    }

    impl Default for LocalSettings {
        fn default() -> Self {
            Self {
                model_path: None,
                context_size: 2048,
                threads: None,
                max_history_pairs: 6,
            }
        }
    }

    impl LocalSettings {
        pub fn effective_threads(&self) -> u32 {
            self.threads.unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get() as u32)
                    .unwrap_or(8)
            })
        }
    }

    /// Remote backend parameters. `temperature` and `max_tokens` are
    /// backend-specific and do not follow [`GenerationSettings`].
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RemoteSettings {
        pub model: String,
        pub base_url: Option<String>,
        pub temperature: f32,
        pub max_tokens: u32,
        pub max_history_pairs: usize,
    }

    impl Default for RemoteSettings {
        fn default() -> Self {
            Self {
                model: "gpt-4o-mini".into(),
                base_url: None,
                temperature: 0.4,
                max_tokens: 300,
                max_history_pairs: 6,
            }
        }
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct ChatSettings {
        pub mode: Mode,
        pub generation: GenerationSettings,
        pub local: LocalSettings,
        pub remote: RemoteSettings,
    }
}

pub mod agent_api {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        System,
        User,
        Assistant,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: Role,
        pub content: String,
    }

    impl ChatMessage {
        pub fn new(role: Role, content: impl Into<String>) -> Self {
            Self {
                role,
                content: content.into(),
            }
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
    }
}
