use std::fmt;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use research_core::TokenUsage;
use serde::{Deserialize, Serialize};

/// One model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// `None` when the backend does not report usage.
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceError {
    pub kind: InferenceFailureKind,
    pub message: String,
}

impl InferenceError {
    pub fn new(kind: InferenceFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for InferenceError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferenceFailureKind {
    Timeout,
    HttpStatus(u16),
    RateLimited,
    Network,
    InvalidResponse,
    InvalidConfig,
    /// Failure reported by a non-HTTP backend.
    Backend,
}

impl fmt::Display for InferenceFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceFailureKind::Timeout => write!(f, "timeout"),
            InferenceFailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            InferenceFailureKind::RateLimited => write!(f, "rate limited by backend"),
            InferenceFailureKind::Network => write!(f, "network error"),
            InferenceFailureKind::InvalidResponse => write!(f, "invalid response"),
            InferenceFailureKind::InvalidConfig => write!(f, "invalid configuration"),
            InferenceFailureKind::Backend => write!(f, "backend error"),
        }
    }
}

/// Submit a prompt, receive text plus token usage.
#[async_trait::async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Completion, InferenceError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpInferenceSettings {
    /// Full chat-completions URL.
    pub endpoint: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    /// Transport-level ceiling; the per-call research timeout is applied on top.
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    pub max_output_tokens: u32,
}

impl Default for HttpInferenceSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/v1/chat/completions".to_string(),
            model: "default".to_string(),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(300),
            max_output_tokens: 1024,
        }
    }
}

/// Client for OpenAI-compatible chat-completions endpoints.
#[derive(Debug, Clone)]
pub struct HttpInferenceClient {
    settings: HttpInferenceSettings,
    client: reqwest::Client,
}

impl HttpInferenceClient {
    pub fn new(settings: HttpInferenceSettings) -> Result<Self, InferenceError> {
        reqwest::Url::parse(&settings.endpoint).map_err(|err| {
            InferenceError::new(
                InferenceFailureKind::InvalidConfig,
                format!("endpoint {}: {err}", settings.endpoint),
            )
        })?;
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| InferenceError::new(InferenceFailureKind::Network, err.to_string()))?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &HttpInferenceSettings {
        &self.settings
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[async_trait::async_trait]
impl InferenceBackend for HttpInferenceClient {
    async fn complete(&self, prompt: &str) -> Result<Completion, InferenceError> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.settings.max_output_tokens,
        };
        let body = serde_json::to_string(&request)
            .map_err(|err| InferenceError::new(InferenceFailureKind::InvalidConfig, err.to_string()))?;

        let mut builder = self
            .client
            .post(&self.settings.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(key) = &self.settings.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(InferenceError::new(
                InferenceFailureKind::RateLimited,
                status.to_string(),
            ));
        }
        if !status.is_success() {
            return Err(InferenceError::new(
                InferenceFailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        let parsed: ChatResponse = serde_json::from_slice(&bytes).map_err(|err| {
            InferenceError::new(InferenceFailureKind::InvalidResponse, err.to_string())
        })?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                InferenceError::new(InferenceFailureKind::InvalidResponse, "no choices in response")
            })?;
        let usage = parsed
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens));

        Ok(Completion { text, usage })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> InferenceError {
    if err.is_timeout() {
        return InferenceError::new(InferenceFailureKind::Timeout, err.to_string());
    }
    InferenceError::new(InferenceFailureKind::Network, err.to_string())
}

pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
