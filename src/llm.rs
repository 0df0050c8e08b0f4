use crate::{config::LlmConfig, models::Segment};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Service Unavailable: {0}")]
    Unavailable(String),
    #[error("LLM API HTTP Status Error: {status}")]
    UpstreamHttp { status: u16, detail: Value },
    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self { Self { role: "system".into(), content: content.into() } }
    pub fn user(content: impl Into<String>) -> Self { Self { role: "user".into(), content: content.into() } }
}

/// Which pipeline step a call belongs to. Drives logging, sampling defaults and mock payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Summary,
    Profiles { count: usize },
    /// `segment` is `None` for the legacy flat layout.
    Questions { segment: Option<Segment>, count: usize },
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Summary => write!(f, "summary"),
            Stage::Profiles { count } => write!(f, "profiles(x{count})"),
            Stage::Questions { segment: Some(s), count } => write!(f, "{s} questions(x{count})"),
            Stage::Questions { segment: None, count } => write!(f, "questions(x{count})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub stage: Stage,
    pub messages: Vec<ChatMessage>,
    /// Overrides the configured default model.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn for_stage(stage: Stage, messages: Vec<ChatMessage>) -> Self {
        let (temperature, max_tokens) = match stage {
            Stage::Summary => (0.7, 500),
            Stage::Profiles { count } => (0.8, 400 * count.max(1) as u32),
            Stage::Questions { count, .. } => (0.7, 100 * count.max(1) as u32),
        };
        Self { stage, messages, model: None, temperature, max_tokens }
    }
}

/// One chat-completion round trip, returning the first choice's content.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn call(&self, request: ChatRequest) -> Result<String, LlmError>;
}

enum Backend {
    Live { url: String, api_key: String },
    Mock,
}

pub struct LlmClient {
    client: Client,
    backend: Backend,
    default_model: String,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
            .map_err(|e| LlmError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        let backend = match (&config.api_url, &config.api_key) {
            (Some(url), Some(key)) => Backend::Live { url: url.clone(), api_key: key.clone() },
            _ => {
                warn!("⚠️ EXTERNAL_API_URL or EXTERNAL_API_KEY not configured, every LLM call will return mock data");
                Backend::Mock
            }
        };

        Ok(Self { client, backend, default_model: config.default_model.clone() })
    }

    pub fn is_mock(&self) -> bool { matches!(self.backend, Backend::Mock) }

    async fn perform_api_call(&self, url: &str, api_key: &str, request: &ChatRequest) -> Result<String, LlmError> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        let body = json!({
            "model": model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": false,
            "response_format": {"type": "json_object"}
        });

        info!("🔗 [{}] calling {} with model {}", request.stage, url, model);

        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("❌ [{}] LLM request failed: {}", request.stage, e);
                LlmError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        info!("📥 [{}] response status: {}", request.stage, status);

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let detail = error_detail(status.as_u16(), &error_body);
            error!("❌ [{}] LLM API error: {}", request.stage, detail);
            return Err(LlmError::UpstreamHttp { status: status.as_u16(), detail });
        }

        let response_text = response.text().await.map_err(|e| LlmError::Unavailable(e.to_string()))?;
        let content = extract_content(&response_text)?;
        info!("📥 [{}] content ({} chars): {}", request.stage, content.len(), preview(&content, 200));
        Ok(content)
    }
}

#[async_trait]
impl ChatGateway for LlmClient {
    async fn call(&self, request: ChatRequest) -> Result<String, LlmError> {
        match &self.backend {
            Backend::Live { url, api_key } => self.perform_api_call(url, api_key, &request).await,
            Backend::Mock => {
                warn!("📦 [{}] LLM not configured, returning mock payload", request.stage);
                Ok(mock_payload(request.stage))
            }
        }
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn extract_content(response_text: &str) -> Result<String, LlmError> {
    let parsed: CompletionResponse = serde_json::from_str(response_text).map_err(|e| {
        LlmError::MalformedResponse(format!("response is not a chat completion: {e}: {}", preview(response_text, 200)))
    })?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::MalformedResponse("LLM response missing 'choices' field.".into()))?;
    choice
        .message
        .and_then(|m| m.content)
        .ok_or_else(|| LlmError::MalformedResponse("LLM response missing 'content' in message.".into()))
}

/// Builds the `detail` object forwarded to the caller for a non-2xx backend response.
fn error_detail(status: u16, body: &str) -> Value {
    let mut detail = serde_json::Map::new();
    detail.insert("error".into(), json!(format!("LLM API HTTP Status Error: {status}")));
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => detail.extend(map),
        Ok(other) => {
            detail.insert("raw_response_text".into(), json!(other.to_string()));
        }
        Err(_) => {
            detail.insert("raw_response_text".into(), json!(body));
        }
    }
    Value::Object(detail)
}

fn mock_payload(stage: Stage) -> String {
    let value = match stage {
        Stage::Summary => json!({
            "product_summary": "Mock product summary: the LLM API is not configured, so this text stands in for the analyst's summary."
        }),
        Stage::Profiles { count } => Value::Array(
            (1..=count)
                .map(|i| {
                    json!({
                        "name": format!("Mock Profile {i} (LLM Config Missing)"),
                        "description": "Mock data due to missing API key.",
                        "country_region": "N/A",
                        "occupation": "N/A",
                        "cognitive_level": "N/A",
                        "main_concerns": ["Configuration"],
                        "potential_needs": "N/A",
                        "cultural_background_summary": "N/A"
                    })
                })
                .collect(),
        ),
        Stage::Questions { segment, count } => {
            let label = segment.map(|s| format!("{s} ")).unwrap_or_default();
            Value::Array(
                (1..=count)
                    .map(|i| json!({"text": format!("Mock {label}question {i}: LLM not configured.")}))
                    .collect(),
            )
        }
    };
    value.to_string()
}

/// Char-safe prefix for log lines and sentinel messages.
pub fn preview(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
