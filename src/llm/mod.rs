use std::{env, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
pub mod testing;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENROUTER_CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Enumerates the supported LLM backends behind the shared gateway.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LlmProvider {
    OpenAi,
    OpenRouter,
}

impl LlmProvider {
    fn credential_var(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "OPENAI_API_KEY",
            LlmProvider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::OpenAi => write!(f, "openai"),
            LlmProvider::OpenRouter => write!(f, "openrouter"),
        }
    }
}

/// Failures surfaced by a completion call.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("model call failed: {0}")]
    Upstream(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Upstream(err.to_string())
    }
}

/// Sampling knobs forwarded with every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub seed: Option<u64>,
    pub json_mode: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 800,
            seed: None,
            json_mode: false,
        }
    }
}

/// Defines the shape of a chat-style interaction with an LLM.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub params: GenerationParams,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            params: GenerationParams::default(),
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }
}

/// Individual chat message, compatible with OpenAI compliant providers.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub text: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, text)
    }
}

/// Supported chat roles passed to providers.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    /// Roles a client may replay as conversation history.
    pub fn from_history_role(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(MessageRole::User),
            "assistant" | "ai" | "bot" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

/// Captures basic token usage metrics associated with a call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub response_tokens: usize,
    pub total_tokens: usize,
}

/// Full response surface returned to callers.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub token_usage: TokenUsage,
    pub model: String,
}

/// The remote text-generation capability handlers depend on.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, GatewayError>;
}

pub type SharedGateway = Arc<dyn CompletionGateway>;

/// Main entry point for invoking providers over HTTP.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

#[derive(Clone, Default)]
struct LlmConfig {
    openai_api_key: Option<String>,
    openrouter_api_key: Option<String>,
    openai_base_url: Option<String>,
    openrouter_referer: Option<String>,
    openrouter_title: Option<String>,
}

impl LlmClient {
    /// Build a client using environment variables. Credentials are checked per call.
    pub fn from_env(timeout: Duration) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GatewayError::Configuration(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            config: LlmConfig {
                openai_api_key: non_empty_var("OPENAI_API_KEY"),
                openrouter_api_key: non_empty_var("OPENROUTER_API_KEY"),
                openai_base_url: non_empty_var("OPENAI_BASE_URL"),
                openrouter_referer: non_empty_var("OPENROUTER_HTTP_REFERER"),
                openrouter_title: non_empty_var("OPENROUTER_X_TITLE"),
            },
        })
    }

    /// Whether the credential for `model`'s provider is present.
    pub fn has_credential_for(&self, model: &str) -> bool {
        parse_model_provider(model)
            .map(|(provider, _)| self.api_key(provider).is_some())
            .unwrap_or(false)
    }

    fn api_key(&self, provider: LlmProvider) -> Option<&String> {
        match provider {
            LlmProvider::OpenAi => self.config.openai_api_key.as_ref(),
            LlmProvider::OpenRouter => self.config.openrouter_api_key.as_ref(),
        }
    }

    fn endpoint(&self, provider: LlmProvider) -> String {
        match provider {
            LlmProvider::OpenAi => self
                .config
                .openai_base_url
                .as_ref()
                .map(|base| format!("{}/chat/completions", base.trim_end_matches('/')))
                .unwrap_or_else(|| OPENAI_CHAT_URL.to_string()),
            LlmProvider::OpenRouter => OPENROUTER_CHAT_URL.to_string(),
        }
    }

    /// Execute a request against the provider encoded in the model name.
    pub async fn execute(&self, request: LlmRequest) -> Result<LlmResponse, GatewayError> {
        let (provider, model) = parse_model_provider(&request.model)?;

        let Some(api_key) = self.api_key(provider) else {
            return Err(GatewayError::Configuration(format!(
                "{} is not configured but required for {} requests",
                provider.credential_var(),
                provider
            )));
        };

        let payload = build_payload(model, &request);

        let mut req_builder = self
            .http
            .post(self.endpoint(provider))
            .bearer_auth(api_key)
            .json(&payload);

        if provider == LlmProvider::OpenRouter {
            if let Some(referer) = &self.config.openrouter_referer {
                req_builder = req_builder.header("HTTP-Referer", referer);
            }
            if let Some(title) = &self.config.openrouter_title {
                req_builder = req_builder.header("X-Title", title);
            }
        }

        let response = req_builder.send().await?;
        let status = response.status();
        let response_text = response.text().await?;
        let body: serde_json::Value = serde_json::from_str(&response_text).map_err(|_| {
            GatewayError::Upstream(format!(
                "failed to parse {provider} response as JSON. Response body: {}",
                preview(&response_text)
            ))
        })?;
        if !status.is_success() {
            return Err(GatewayError::Upstream(format!(
                "{provider} call failed with status {status}: {}",
                upstream_message(&body)
            )));
        }

        let (text, usage) = extract_text_and_usage(&body).ok_or_else(|| {
            GatewayError::Upstream(format!("unexpected {provider} response payload: {body}"))
        })?;

        let prompt_tokens = approximate_token_count(
            &request
                .messages
                .iter()
                .map(|m| m.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        );
        let mut token_usage = usage.unwrap_or_default();
        if token_usage.prompt_tokens == 0 {
            token_usage.prompt_tokens = prompt_tokens;
        }
        if token_usage.response_tokens == 0 {
            token_usage.response_tokens = approximate_token_count(&text);
        }
        token_usage.total_tokens = token_usage.prompt_tokens + token_usage.response_tokens;

        debug!(%provider, model, total_tokens = token_usage.total_tokens, "completion received");

        Ok(LlmResponse {
            text,
            token_usage,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl CompletionGateway for LlmClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, GatewayError> {
        self.execute(request).await
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn build_payload(model: &str, request: &LlmRequest) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = request
        .messages
        .iter()
        .map(|msg| {
            serde_json::json!({
                "role": msg.role.as_str(),
                "content": msg.text,
            })
        })
        .collect();

    let mut payload = serde_json::json!({
        "model": model,
        "messages": messages,
        "temperature": request.params.temperature,
        "max_tokens": request.params.max_tokens,
    });

    if let Some(seed) = request.params.seed {
        payload["seed"] = serde_json::json!(seed);
    }
    if request.params.json_mode {
        payload["response_format"] = serde_json::json!({ "type": "json_object" });
    }

    payload
}

fn preview(body: &str) -> String {
    if body.chars().count() > 500 {
        format!("{}...", body.chars().take(500).collect::<String>())
    } else {
        body.to_string()
    }
}

fn upstream_message(body: &serde_json::Value) -> String {
    body.pointer("/error/message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

/// Extract assistant text and optional usage metrics from a Chat Completions payload.
fn extract_text_and_usage(value: &serde_json::Value) -> Option<(String, Option<TokenUsage>)> {
    let chat = serde_json::from_value::<ChatCompletionPayload>(value.clone()).ok()?;
    if chat.choices.is_empty() {
        return None;
    }

    let text = chat
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .unwrap_or_default();

    let usage = chat.usage.map(|usage| TokenUsage {
        prompt_tokens: usage.prompt_tokens.unwrap_or_default(),
        response_tokens: usage.completion_tokens.unwrap_or_default(),
        total_tokens: usage.total_tokens.unwrap_or_default(),
    });

    Some((text, usage))
}

fn parse_model_provider(model: &str) -> Result<(LlmProvider, &str), GatewayError> {
    let (provider, name) = model.split_once('/').ok_or_else(|| {
        GatewayError::Configuration(
            "model must be prefixed with provider, e.g. 'openai/gpt-4'".to_string(),
        )
    })?;

    if name.trim().is_empty() {
        return Err(GatewayError::Configuration(
            "model name is required after provider prefix".to_string(),
        ));
    }

    match provider {
        "openai" => Ok((LlmProvider::OpenAi, name)),
        "openrouter" => Ok((LlmProvider::OpenRouter, name)),
        other => Err(GatewayError::Configuration(format!(
            "unsupported provider prefix: {other}"
        ))),
    }
}

fn approximate_token_count(input: &str) -> usize {
    input.split_whitespace().count()
}

#[derive(Debug, Deserialize)]
struct ChatCompletionPayload {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: Option<usize>,
    #[serde(default)]
    completion_tokens: Option<usize>,
    #[serde(default)]
    total_tokens: Option<usize>,
}
