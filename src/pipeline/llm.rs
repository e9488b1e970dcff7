//! LLM access: one request in, one text out.
//!
//! Every model interaction in the pipeline (OCR of a page, extraction,
//! translation, labeling) goes through [`LlmClient::complete`]. Stage code
//! builds an [`LlmRequest`] and validates the returned text; transport
//! concerns (timeouts, retry with backoff) live in [`ProviderClient`] only.
//!
//! ## Retry Strategy
//!
//! Local inference servers drop connections while swapping models and cloud
//! APIs return 429/503 under load. Transport failures and timeouts are
//! retried with exponential backoff (`retry_backoff_ms * 2^attempt`, capped at
//! one minute). A
//! response that arrives but does not validate is never retried here; that
//! decision belongs to the stage and the answer is always "fail the document".

use crate::config::{Language, PipelineConfig};
use crate::error::{LlmError, MrtpError};
use edgequake_llm::{
    ChatMessage, CompletionOptions, ImageData, LLMProvider, LLMResponse, ProviderFactory,
};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// What a request is for. Used for logging and by scripted test clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Transcription of one page (1-based).
    Ocr { page: usize },
    Extraction,
    Translation(Language),
    Labeling,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Ocr { page } => write!(f, "ocr[page {page}]"),
            RequestKind::Extraction => f.write_str("extraction"),
            RequestKind::Translation(lang) => write!(f, "translation[{}]", lang.code()),
            RequestKind::Labeling => f.write_str("labeling"),
        }
    }
}

/// A single chat-completion request.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub kind: RequestKind,
    pub system: Option<String>,
    pub prompt: String,
    pub images: Vec<ImageData>,
    pub max_tokens: usize,
}

impl LlmRequest {
    /// Text-only request with a system prompt.
    pub fn text(
        kind: RequestKind,
        system: impl Into<String>,
        prompt: impl Into<String>,
        max_tokens: usize,
    ) -> Self {
        Self {
            kind,
            system: Some(system.into()),
            prompt: prompt.into(),
            images: Vec::new(),
            max_tokens,
        }
    }

    /// Vision request: instruction plus one image, no system prompt.
    pub fn vision(kind: RequestKind, prompt: impl Into<String>, image: ImageData, max_tokens: usize) -> Self {
        Self {
            kind,
            system: None,
            prompt: prompt.into(),
            images: vec![image],
            max_tokens,
        }
    }
}

/// The unit of external effect: `request -> text | LlmError`.
pub trait LlmClient: Send + Sync {
    fn complete(
        &self,
        request: &LlmRequest,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;
}

/// [`LlmClient`] over an `edgequake-llm` provider.
#[derive(Clone)]
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_retries: u32,
    retry_backoff_ms: u64,
    timeout: Duration,
}

impl fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderClient")
            .field("provider", &"<dyn LLMProvider>")
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderClient {
    /// Wrap a pre-built provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Create a named provider (`lmstudio`, `ollama`, `openai`, …) for `model`.
    ///
    /// API keys and host overrides are read from the environment by
    /// [`ProviderFactory`] (`OPENAI_API_KEY`, `LMSTUDIO_HOST`, …).
    pub fn from_factory(
        provider_name: &str,
        model: &str,
        config: &PipelineConfig,
    ) -> Result<Self, MrtpError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            MrtpError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, config))
    }

    fn build_messages(request: &LlmRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(ChatMessage::system(system.as_str()));
        }
        if request.images.is_empty() {
            messages.push(ChatMessage::user(request.prompt.as_str()));
        } else {
            messages.push(ChatMessage::user_with_images(
                request.prompt.as_str(),
                request.images.clone(),
            ));
        }
        messages
    }
}

impl LlmClient for ProviderClient {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let start = Instant::now();
        let messages = Self::build_messages(request);
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = with_retries(
            request.kind,
            self.max_retries,
            self.retry_backoff_ms,
            self.timeout,
            || self.provider.chat(&messages, Some(&options)),
        )
        .await?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            request.kind,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// Longest wait between two attempts.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Delay before retry number `attempt` (1-based).
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

/// Run `call` until it yields a non-empty answer, a non-transient error, or
/// the retry budget is spent.
async fn with_retries<F, Fut>(
    kind: RequestKind,
    max_retries: u32,
    backoff_ms: u64,
    limit: Duration,
    call: F,
) -> Result<LLMResponse, LlmError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = edgequake_llm::Result<LLMResponse>>,
{
    let mut attempt = 0;
    loop {
        let err = match timeout(limit, call()).await {
            Ok(Ok(response)) if response.content.trim().is_empty() => LlmError::EmptyResponse,
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(e)) => {
                warn!("{}: attempt {} failed: {}", kind, attempt + 1, e);
                LlmError::Transport {
                    attempts: attempt + 1,
                    detail: e.to_string(),
                }
            }
            Err(_) => {
                warn!("{}: attempt {} timed out after {:?}", kind, attempt + 1, limit);
                LlmError::Timeout {
                    secs: limit.as_secs(),
                }
            }
        };
        if !err.is_transient() || attempt >= max_retries {
            return Err(err);
        }

        attempt += 1;
        let delay = backoff_delay(backoff_ms, attempt);
        warn!("{}: retry {}/{} after {:?}", kind, attempt, max_retries, delay);
        sleep(delay).await;
    }
}

/// Health-check URL for providers that run as a local server.
///
/// Cloud providers return `None`; their credentials are checked when the
/// provider is created.
pub fn health_url(provider_name: &str) -> Option<String> {
    let (env_var, default_host, path) = match provider_name.to_ascii_lowercase().as_str() {
        "lmstudio" | "lm_studio" | "lm-studio" => {
            ("LMSTUDIO_HOST", "http://localhost:1234", "/v1/models")
        }
        "ollama" => ("OLLAMA_HOST", "http://localhost:11434", "/api/tags"),
        _ => return None,
    };
    let host = std::env::var(env_var)
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| default_host.to_string());
    Some(format!("{}{}", host.trim_end_matches('/'), path))
}

/// Probe a local inference server before any document is processed.
///
/// Returns the probed URL, or `None` when the provider has no probe.
pub async fn probe_endpoint(
    provider_name: &str,
    timeout_secs: u64,
) -> Result<Option<String>, MrtpError> {
    let Some(url) = health_url(provider_name) else {
        return Ok(None);
    };

    let unreachable = |reason: String| MrtpError::EndpointUnreachable {
        url: url.clone(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| unreachable(e.to_string()))?;

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| unreachable(e.to_string()))?;

    if !response.status().is_success() {
        return Err(unreachable(format!("HTTP {}", response.status())));
    }

    debug!("LLM endpoint {} is reachable", url);
    Ok(Some(url))
}
