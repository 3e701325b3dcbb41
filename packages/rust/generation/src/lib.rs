//! Chat-completion client for the text-generation provider.
//!
//! Blueprint generation makes exactly one call per request: one system
//! message, one user message, one bounded wait. There is no retry here;
//! callers turn failures into a persisted draft state.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use servicecraft_shared::{GenerationSettings, Result, ServiceCraftError};
use tracing::{debug, info, instrument, warn};

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("ServiceCraft/", env!("CARGO_PKG_VERSION"));

/// How much of an error body to keep in the error message.
const ERROR_BODY_EXCERPT: usize = 500;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
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

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<TokenUsage>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// A completed generation call.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Raw completion text; empty when the provider sent no content.
    pub content: String,
    /// Model that served the request, as reported by the provider.
    pub model: String,
    pub usage: TokenUsage,
    pub latency: Duration,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Provider client bound to one configuration and API key.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: Client,
    settings: GenerationSettings,
    api_key: String,
}

impl ChatClient {
    pub fn new(settings: GenerationSettings, api_key: impl Into<String>) -> Result<Self> {
        let http = build_client(&settings)?;
        Ok(Self {
            http,
            settings,
            api_key: api_key.into(),
        })
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Full URL of the chat-completions endpoint.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.as_str().trim_end_matches('/')
        )
    }

    /// Send one chat-completion request and wait for the answer.
    ///
    /// Transport failures (including the timeout) map to
    /// [`ServiceCraftError::Network`]; a non-success status or an
    /// undecodable body maps to [`ServiceCraftError::Provider`].
    #[instrument(skip_all, fields(model = %self.settings.model, messages = messages.len()))]
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion> {
        let url = self.endpoint();
        let body = ChatRequest {
            model: &self.settings.model,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            messages,
        };

        debug!(%url, max_tokens = body.max_tokens, "sending completion request");
        let started = Instant::now();

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.settings.referer)
            .header("X-Title", &self.settings.app_title)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;
        let latency = started.elapsed();

        if !status.is_success() {
            warn!(%status, "provider returned an error status");
            return Err(ServiceCraftError::Provider(format!(
                "HTTP {status}: {}",
                excerpt(&text, ERROR_BODY_EXCERPT)
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            ServiceCraftError::Provider(format!("undecodable completion body: {e}"))
        })?;

        if parsed.choices.is_empty() {
            if let Some(err) = parsed.error {
                return Err(ServiceCraftError::Provider(format!(
                    "provider error: {}",
                    excerpt(&err.to_string(), ERROR_BODY_EXCERPT)
                )));
            }
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .unwrap_or_default();
        let usage = parsed.usage.unwrap_or_default();
        let model = parsed.model.unwrap_or_else(|| self.settings.model.clone());

        info!(
            %model,
            tokens = usage.total_tokens,
            duration_ms = latency.as_millis() as u64,
            chars = content.len(),
            "completion received"
        );

        Ok(Completion {
            content,
            model,
            usage,
            latency,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> ServiceCraftError {
        if e.is_timeout() {
            ServiceCraftError::Network(format!(
                "request timed out after {}s",
                self.settings.timeout_secs
            ))
        } else {
            ServiceCraftError::Network(e.to_string())
        }
    }
}

/// Build a reqwest client with the configured timeout.
fn build_client(settings: &GenerationSettings) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(settings.timeout_secs))
        .build()
        .map_err(|e| ServiceCraftError::Network(format!("failed to build HTTP client: {e}")))
}

fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
