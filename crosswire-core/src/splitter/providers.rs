// LLM-backed splitter implementations: Anthropic, OpenAI, and custom
// HTTP endpoints speaking the OpenAI chat format.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::{ConfigError, SplitterError};

use super::{SplitRequest, SplitResponse, Splitter};

/// Instructions prepended to every split request. The model must answer
/// with nothing but the JSON payload.
const SPLIT_INSTRUCTIONS: &str = "You are a code analyzer that extracts external integration \
points (HTTP endpoints called or served, message-queue publishes and consumes, RPC handlers) \
from code snippets. For each snippet, report every integration point as a connection with: \
source_index (index of the snippet it came from), direction (\"incoming\" if the code serves \
the integration point, \"outgoing\" if it calls out), start_line and end_line (absolute line \
numbers in the file), code_snippet (the exact lines, verbatim), description (one sentence), \
and technology_name (e.g. \"HTTP/GET\", \"AMQP\", \"gRPC\"). When a snippet carries a \
prior_description, it previously contained that integration point; re-derive it from the \
current code. Respond with ONLY a JSON object: {\"connections\": [...]}.";

/// Assemble the user-facing prompt for a split request.
fn build_prompt(request: &SplitRequest) -> Result<String, SplitterError> {
    let payload = serde_json::to_string_pretty(request)
        .map_err(|e| SplitterError::Permanent(format!("request serialization: {e}")))?;
    let mut prompt = String::from(SPLIT_INSTRUCTIONS);
    prompt.push_str("\n\n");
    prompt.push_str(&payload);
    Ok(prompt)
}

/// Parse the model's reply into a split response. Tolerates a fenced code
/// block around the JSON, nothing else.
fn parse_reply(text: &str) -> Result<SplitResponse, SplitterError> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(body).map_err(|e| SplitterError::Parse(e.to_string()))
}

/// Map an HTTP status to the splitter error taxonomy: rate limits and
/// server errors are transient, everything else is permanent.
fn classify_status(status: u16, body: String) -> SplitterError {
    if status == 429 || status >= 500 {
        SplitterError::Transient(format!("HTTP {status}: {body}"))
    } else {
        SplitterError::Permanent(format!("HTTP {status}: {body}"))
    }
}

fn classify_transport(err: &reqwest::Error) -> SplitterError {
    if err.is_timeout() || err.is_connect() {
        SplitterError::Transient(err.to_string())
    } else {
        SplitterError::Permanent(err.to_string())
    }
}

// ── Anthropic ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct AnthropicSplitter {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicSplitter {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: "https://api.anthropic.com".to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: String,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl Splitter for AnthropicSplitter {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn split(&self, request: &SplitRequest) -> Result<SplitResponse, SplitterError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: 4096,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: build_prompt(request)?,
            }],
        };

        debug!(model = %self.model, snippets = request.snippets.len(), "Calling Anthropic splitter");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, text));
        }

        let result: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| SplitterError::Parse(e.to_string()))?;
        let text = result
            .content
            .first()
            .map(|c| c.text.clone())
            .unwrap_or_default();
        parse_reply(&text)
    }
}

// ── OpenAI-compatible ──────────────────────────────────────────────

#[derive(Debug)]
pub struct OpenAiSplitter {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiSplitter {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: "https://api.openai.com".to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<OpenAiMessage>,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    content: String,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl Splitter for OpenAiSplitter {
    fn name(&self) -> &str {
        "openai"
    }

    async fn split(&self, request: &SplitRequest) -> Result<SplitResponse, SplitterError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = OpenAiRequest {
            model: self.model.clone(),
            max_tokens: 4096,
            messages: vec![OpenAiMessage {
                role: "user".to_string(),
                content: build_prompt(request)?,
            }],
        };

        debug!(model = %self.model, snippets = request.snippets.len(), "Calling OpenAI splitter");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, text));
        }

        let result: OpenAiResponse = resp
            .json()
            .await
            .map_err(|e| SplitterError::Parse(e.to_string()))?;
        let text = result
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();
        parse_reply(&text)
    }
}

// ── Factory ────────────────────────────────────────────────────────

/// Create a splitter from configuration.
pub fn create_splitter(
    provider: &str,
    model: &str,
    api_key: &str,
    base_url: Option<&str>,
) -> Result<Arc<dyn Splitter>, ConfigError> {
    match provider {
        "anthropic" => {
            let mut s = AnthropicSplitter::new(api_key.to_string(), model.to_string());
            if let Some(url) = base_url {
                s = s.with_base_url(url.to_string());
            }
            Ok(Arc::new(s))
        }
        "openai" | "custom" => {
            let mut s = OpenAiSplitter::new(api_key.to_string(), model.to_string());
            if let Some(url) = base_url {
                s = s.with_base_url(url.to_string());
            }
            Ok(Arc::new(s))
        }
        other => Err(ConfigError::UnknownProvider(other.to_string())),
    }
}

// ── Tests ──────────────────────────────────────────────────────────
