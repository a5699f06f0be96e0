//! llama.cpp engine for GGUF model files.

use crate::local::{
    find_stop, Completion, CompletionRequest, EngineLoader, FinishReason, LoadOptions,
    LocalEngine,
};
use anyhow::{anyhow, bail, Result};
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::LlamaModel;
use llama_cpp_2::sampling::LlamaSampler;
use parking_lot::Mutex;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

/// llama.cpp may only be initialised once per process. Engines hold strong
/// references; the backend is freed after the last engine is dropped.
static BACKEND: Mutex<Weak<LlamaBackend>> = parking_lot::const_mutex(Weak::new());

fn shared_backend() -> Result<Arc<LlamaBackend>> {
    let mut guard = BACKEND.lock();
    if let Some(backend) = guard.upgrade() {
        return Ok(backend);
    }
    let backend = Arc::new(
        LlamaBackend::init().map_err(|e| anyhow!("failed to initialise llama backend: {}", e))?,
    );
    *guard = Arc::downgrade(&backend);
    Ok(backend)
}

pub struct LlamaLoader;

impl EngineLoader for LlamaLoader {
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<Arc<dyn LocalEngine>> {
        Ok(Arc::new(LlamaEngine::load(path, *options)?))
    }
}

/// A loaded GGUF model. `model` is declared before `backend` so it is dropped
/// first.
pub struct LlamaEngine {
    model: LlamaModel,
    backend: Arc<LlamaBackend>,
    options: LoadOptions,
    path: PathBuf,
}

impl LlamaEngine {
    pub fn load(path: &Path, options: LoadOptions) -> Result<Self> {
        let backend = shared_backend()?;
        tracing::info!(
            path = %path.display(),
            context = options.context_size,
            threads = options.threads,
            "loading GGUF model"
        );
        let params = LlamaModelParams::default();
        let model = LlamaModel::load_from_file(&backend, path, &params)
            .map_err(|e| anyhow!("failed to load model: {}", e))?;
        tracing::info!("model loaded");
        Ok(Self {
            model,
            backend,
            options,
            path: path.to_path_buf(),
        })
    }

    fn new_context(&self) -> Result<LlamaContext<'_>> {
        let threads = self.options.threads.max(1) as i32;
        let params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(self.options.context_size))
            .with_n_threads(threads)
            .with_n_threads_batch(threads);
        self.model
            .new_context(&self.backend, params)
            .map_err(|e| anyhow!("failed to create context: {}", e))
    }
}

/// Tokens the repetition penalty looks back over.
const PENALTY_LAST_N: i32 = 64;

fn build_sampler(request: &CompletionRequest, n_vocab: i32) -> LlamaSampler {
    let mut samplers = Vec::new();
    if request.repeat_penalty != 1.0 {
        samplers.push(LlamaSampler::penalties(
            n_vocab,
            PENALTY_LAST_N,
            request.repeat_penalty,
            0.0,
            0.0,
        ));
    }
    if request.temperature <= 0.0 {
        samplers.push(LlamaSampler::greedy());
    } else {
        samplers.push(LlamaSampler::top_p(request.top_p, 1));
        samplers.push(LlamaSampler::temp(request.temperature));
        samplers.push(LlamaSampler::dist(0));
    }
    LlamaSampler::chain_simple(samplers)
}

/// Append a token's bytes, holding back incomplete UTF-8 sequences until the
/// next piece completes them.
fn push_piece(decoder: &mut encoding_rs::Decoder, bytes: &[u8], out: &mut String) {
    if let Some(needed) = decoder.max_utf8_buffer_length(bytes.len()) {
        out.reserve(needed);
    }
    let _ = decoder.decode_to_string(bytes, out, false);
}

impl LocalEngine for LlamaEngine {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let vocab = self.model.vocab();
        let tokens = vocab.tokenize(request.prompt.as_bytes(), true, false);
        if tokens.is_empty() {
            bail!("prompt produced no tokens");
        }
        let n_ctx = self.options.context_size as usize;
        if tokens.len() >= n_ctx {
            bail!(
                "prompt is {} tokens but the context window is {}",
                tokens.len(),
                n_ctx
            );
        }
        let budget = (request.max_tokens as usize).min(n_ctx - tokens.len());

        let mut ctx = self.new_context()?;
        let n_batch = (ctx.n_batch() as usize).max(1);
        for chunk in tokens.chunks(n_batch) {
            let mut batch = LlamaBatch::get_one(chunk)
                .map_err(|e| anyhow!("failed to create batch: {}", e))?;
            ctx.decode(&mut batch)
                .map_err(|e| anyhow!("prefill decode failed: {}", e))?;
        }

        let mut sampler = build_sampler(request, self.model.n_vocab());
        // The penalty window covers the prompt too.
        sampler.accept_many(&tokens);
        let mut decoder = encoding_rs::UTF_8.new_decoder();
        let mut text = String::new();
        let mut generated = 0usize;
        let mut finish = FinishReason::Length;

        while generated < budget {
            // `sample` also feeds the token to the penalty window.
            let token = sampler.sample(&ctx, -1);
            if vocab.is_eog(token) {
                finish = FinishReason::EndOfText;
                break;
            }
            generated += 1;

            let piece = vocab.token_to_piece(token, false, None);
            push_piece(&mut decoder, &piece, &mut text);
            if let Some(at) = find_stop(&text, &request.stop) {
                text.truncate(at);
                finish = FinishReason::Stop;
                break;
            }

            let next = [token];
            let mut batch =
                LlamaBatch::get_one(&next).map_err(|e| anyhow!("failed to create batch: {}", e))?;
            ctx.decode(&mut batch)
                .map_err(|e| anyhow!("decode failed: {}", e))?;
        }

        tracing::debug!(
            prompt_tokens = tokens.len(),
            completion_tokens = generated,
            ?finish,
            "local completion finished"
        );
        Ok(Completion {
            text,
            prompt_tokens: tokens.len(),
            completion_tokens: generated,
            finish_reason: finish,
        })
    }

    fn describe(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}
