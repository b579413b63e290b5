//! Chat backend for the prompt chains.
//!
//! The debate engine depends only on the [`ChatBackend`] trait; the bundled
//! implementation speaks the OpenAI-compatible DashScope endpoint over
//! synchronous HTTP. Rate limits are retried with exponential backoff up to
//! the configured cap; timeouts are not retried. Structured responses stay
//! plain text at this layer: chains parse them against their own schemas.

pub mod chains;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Shared sink for chain parse incidents.
///
/// Chains record the raw response whenever they fall back to a conservative
/// default; the orchestrator drains the entries into the per-claim log.
#[derive(Debug, Clone, Default)]
pub struct ChainLog(Arc<Mutex<Vec<String>>>);

impl ChainLog {
    pub fn record(&self, entry: String) {
        if let Ok(mut entries) = self.0.lock() {
            entries.push(entry);
        }
    }

    /// Take all entries recorded since the last drain.
    pub fn drain(&self) -> Vec<String> {
        self.0.lock().map(|mut entries| std::mem::take(&mut *entries)).unwrap_or_default()
    }
}

/// Errors from the LLM subsystem.
#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("LLM endpoint unusable at {url}")]
    #[diagnostic(
        code(elenchus::llm::unavailable),
        help("Check the endpoint URL and the API key.")
    )]
    Unavailable { url: String },

    #[error("LLM rate limited after {attempts} attempts")]
    #[diagnostic(
        code(elenchus::llm::rate_limited),
        help("Raise max_retries, or slow the batch down.")
    )]
    RateLimited { attempts: u32 },

    #[error("LLM request failed: {message}")]
    #[diagnostic(
        code(elenchus::llm::request_failed),
        help("Check connectivity and that the model name is valid for the endpoint.")
    )]
    RequestFailed { message: String },

    #[error("LLM request timed out after {timeout_secs}s")]
    #[diagnostic(
        code(elenchus::llm::timeout),
        help("Increase llm_timeout_s or use a faster model.")
    )]
    Timeout { timeout_secs: u64 },

    #[error("failed to parse LLM response: {message}")]
    #[diagnostic(
        code(elenchus::llm::parse_error),
        help("The model returned an unexpected response shape.")
    )]
    ParseError { message: String },
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// A chat message for multi-turn conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant".
    pub role: String,
    /// Message content.
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Web-search augmentation strategy offered by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Auto,
    Max,
}

/// One chat call: messages plus per-call options.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the backend to augment with its own web search.
    pub enable_search: bool,
    pub forced_search: bool,
    pub search_strategy: SearchStrategy,
    /// Backend "thinking" mode.
    pub enable_thinking: bool,
    /// Ask the backend for a JSON object response.
    pub json_mode: bool,
}

impl Default for ChatRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            temperature: 0.7,
            max_tokens: 4000,
            enable_search: false,
            forced_search: false,
            search_strategy: SearchStrategy::Auto,
            enable_thinking: false,
            json_mode: false,
        }
    }
}

impl ChatRequest {
    /// A request with a system prompt and a single user message.
    pub fn with_prompts(system: &str, user: &str) -> Self {
        Self {
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            ..Default::default()
        }
    }
}

/// Contract for a chat backend: messages + options in, text out.
pub trait ChatBackend: Send + Sync {
    fn chat(&self, request: &ChatRequest) -> LlmResult<String>;
}

// ---------------------------------------------------------------------------
// DashScope client
// ---------------------------------------------------------------------------

/// Configuration for the DashScope (OpenAI-compatible) chat client.
#[derive(Debug, Clone)]
pub struct DashScopeConfig {
    /// Base URL of the compatible-mode API.
    pub base_url: String,
    /// API key, sent as a bearer token.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Retry cap for rate-limited calls.
    pub max_retries: u32,
}

impl Default for DashScopeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".into(),
            api_key: String::new(),
            model: "qwen-plus".into(),
            timeout: Duration::from_secs(60),
            max_retries: 3,
        }
    }
}

/// Client for an OpenAI-compatible chat-completions endpoint.
pub struct DashScopeClient {
    config: DashScopeConfig,
}

impl DashScopeClient {
    pub fn new(config: DashScopeConfig) -> Self {
        Self { config }
    }

    /// The model name being used.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn build_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        if request.enable_thinking {
            body["enable_thinking"] = serde_json::Value::Bool(true);
        }
        if request.enable_search {
            body["enable_search"] = serde_json::Value::Bool(true);
            body["search_options"] = serde_json::json!({
                "forced_search": request.forced_search,
                "search_strategy": request.search_strategy,
            });
        }
        if request.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        body
    }

    fn call_once(&self, request: &ChatRequest) -> LlmResult<String> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let agent = ureq::AgentBuilder::new().timeout(self.config.timeout).build();

        let body = self.build_body(request);
        let body_str = serde_json::to_string(&body).map_err(|e| LlmError::RequestFailed {
            message: format!("JSON serialize error: {e}"),
        })?;

        let response = agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.config.api_key))
            .set("Content-Type", "application/json")
            .send_string(&body_str);

        let resp = match response {
            Ok(resp) => resp,
            Err(ureq::Error::Status(429, _)) => {
                return Err(LlmError::RateLimited { attempts: 1 });
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                let preview: String = body.chars().take(200).collect();
                return Err(LlmError::RequestFailed {
                    message: format!("status {code}: {preview}"),
                });
            }
            Err(ureq::Error::Transport(t)) => {
                let message = t.to_string();
                return if message.contains("timed out") {
                    Err(LlmError::Timeout {
                        timeout_secs: self.config.timeout.as_secs(),
                    })
                } else {
                    Err(LlmError::RequestFailed { message })
                };
            }
        };

        let resp_str = resp.into_string().map_err(|e| LlmError::ParseError {
            message: e.to_string(),
        })?;
        let json: serde_json::Value =
            serde_json::from_str(&resp_str).map_err(|e| LlmError::ParseError {
                message: e.to_string(),
            })?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| LlmError::ParseError {
                message: "missing choices[0].message.content".into(),
            })
    }
}

impl ChatBackend for DashScopeClient {
    fn chat(&self, request: &ChatRequest) -> LlmResult<String> {
        let mut attempt = 0;
        loop {
            match self.call_once(request) {
                Ok(text) => {
                    debug!(chars = text.len(), "chat complete");
                    return Ok(text);
                }
                Err(LlmError::RateLimited { .. }) if attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * (1 << attempt));
                    warn!(?delay, attempt, "LLM rate limited, backing off");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(LlmError::RateLimited { .. }) => {
                    return Err(LlmError::RateLimited { attempts: attempt + 1 });
                }
                Err(e) => return Err(e),
            }
        }
    }
}
