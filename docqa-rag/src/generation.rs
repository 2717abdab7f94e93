//! Generation backends: turn a fully assembled prompt into answer text.
//!
//! [`GenerationBackend`] is the seam between the query engine and a language
//! model. Two HTTP implementations are provided:
//!
//! - [`OllamaBackend`]: a local Ollama server (`POST /api/generate`)
//! - [`OpenAIChatBackend`]: any OpenAI-compatible `/v1/chat/completions` endpoint
//!
//! Both send one non-streaming request per call and forward the caller's
//! temperature unchanged.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{RagError, Result};

/// A language model that completes a prompt.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate a completion for `prompt` at the given `temperature`
    /// (0.0 = near-deterministic, 1.0 = most varied).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GenerationBackendError`] if the call fails or times out.
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String>;

    /// Short backend name used in logs and errors.
    fn name(&self) -> &str;
}

/// The default Ollama server address.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// The default Ollama generation model.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";

/// The default OpenAI-compatible API base.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The default OpenAI chat model.
pub const DEFAULT_OPENAI_CHAT_MODEL: &str = "gpt-3.5-turbo";

fn backend_error(backend: &str, message: String) -> RagError {
    RagError::GenerationBackendError { backend: backend.to_string(), message }
}

/// Describe a `reqwest` failure, calling out timeouts explicitly.
fn describe_request_error(e: &reqwest::Error) -> String {
    if e.is_timeout() { format!("request timed out: {e}") } else { format!("request failed: {e}") }
}

fn http_client(timeout: Duration, backend: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| backend_error(backend, format!("failed to build HTTP client: {e}")))
}

// ── Ollama ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct OllamaErrorResponse {
    error: String,
}

/// A [`GenerationBackend`] backed by a local Ollama server.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::OllamaBackend;
///
/// let backend = OllamaBackend::new("http://localhost:11434", "llama3", timeout)?;
/// let answer = backend.generate("Why is the sky blue?", 0.7).await?;
/// ```
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    /// Create a backend for `model` on the server at `base_url`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout, "Ollama")?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    fn request_body<'a>(&'a self, prompt: &'a str, temperature: f32) -> OllamaGenerateRequest<'a> {
        OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaOptions { temperature },
        }
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(backend = "Ollama", model = %self.model, temperature, prompt_len = prompt.len(), "generating");

        let response = self
            .client
            .post(&url)
            .json(&self.request_body(prompt, temperature))
            .send()
            .await
            .map_err(|e| {
                error!(backend = "Ollama", url = %url, error = %e, "request failed");
                backend_error("Ollama", describe_request_error(&e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<OllamaErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            error!(backend = "Ollama", %status, "API error");
            return Err(backend_error("Ollama", format!("API returned {status}: {detail}")));
        }

        let parsed: OllamaGenerateResponse = response.json().await.map_err(|e| {
            error!(backend = "Ollama", error = %e, "failed to parse response");
            backend_error("Ollama", format!("failed to parse response: {e}"))
        })?;
        Ok(parsed.response)
    }

    fn name(&self) -> &str {
        "Ollama"
    }
}

// ── OpenAI-compatible chat completions ─────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// A [`GenerationBackend`] backed by an OpenAI-compatible chat completions API.
///
/// The prompt is sent as a single user message.
pub struct OpenAIChatBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAIChatBackend {
    /// Create a backend for `model` at `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(backend_error("OpenAI", "API key must not be empty".into()));
        }
        Ok(Self {
            client: http_client(timeout, "OpenAI")?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    fn request_body<'a>(&'a self, prompt: &'a str, temperature: f32) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            temperature,
        }
    }
}

#[async_trait]
impl GenerationBackend for OpenAIChatBackend {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(backend = "OpenAI", model = %self.model, temperature, prompt_len = prompt.len(), "generating");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt, temperature))
            .send()
            .await
            .map_err(|e| {
                error!(backend = "OpenAI", error = %e, "request failed");
                backend_error("OpenAI", describe_request_error(&e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail =
                serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
            error!(backend = "OpenAI", %status, "API error");
            return Err(backend_error("OpenAI", format!("API returned {status}: {detail}")));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            error!(backend = "OpenAI", error = %e, "failed to parse response");
            backend_error("OpenAI", format!("failed to parse response: {e}"))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| backend_error("OpenAI", "API returned no completion".into()))
    }

    fn name(&self) -> &str {
        "OpenAI"
    }
}
