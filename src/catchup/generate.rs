use crate::catchup::prompt::Prompt;
use crate::error::CatchupError;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;

pub const GEMINI_DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const OPENAI_COMPAT_DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    OpenAiCompatible,
}

impl Provider {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "gemini" => Some(Self::Gemini),
            "openai" | "openai-compatible" | "compat" => Some(Self::OpenAiCompatible),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAiCompatible => "openai-compatible",
        }
    }
}

/// Everything the client needs, passed in explicitly. Core code never
/// reads the environment; the command layer resolves credentials and hands
/// them over here.
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

/// Seam between the coordinator and the network. Contract: one attempt per
/// call, no hidden retry loop; retrying is a user-visible action.
pub trait Generator {
    fn generate(&self, prompt: &Prompt) -> Result<String, CatchupError>;
}

pub struct HttpGenerator {
    config: GenerateConfig,
}

impl HttpGenerator {
    pub fn new(config: GenerateConfig) -> Result<Self, CatchupError> {
        if config.api_key.trim().is_empty() {
            return Err(CatchupError::Auth(
                "no API key; set GEMINI_API_KEY or CATCHUP_API_KEY".to_string(),
            ));
        }
        if config.model.trim().is_empty() {
            return Err(CatchupError::Service("model id cannot be empty".to_string()));
        }
        Ok(Self { config })
    }

    fn client(&self) -> Result<Client, CatchupError> {
        Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|err| CatchupError::Service(err.to_string()))
    }

    fn base_url(&self, default: &str) -> String {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    fn map_send_error(&self, err: reqwest::Error) -> CatchupError {
        if err.is_timeout() {
            return CatchupError::Timeout(self.config.timeout_secs);
        }
        CatchupError::Service(err.to_string())
    }

    fn generate_gemini(&self, prompt: &Prompt) -> Result<String, CatchupError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url(GEMINI_DEFAULT_BASE_URL),
            self.config.model,
            self.config.api_key
        );
        let payload = serde_json::json!({
            "contents": [
                {
                    "parts": [
                        {"text": prompt.text()}
                    ]
                }
            ]
        });

        let response = self
            .client()?
            .post(&url)
            .json(&payload)
            .send()
            .map_err(|err| self.map_send_error(err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_http_failure(status, "gemini"));
        }

        let json: Value = response
            .json()
            .map_err(|err| CatchupError::Service(err.to_string()))?;
        extract_gemini_text(&json)
            .ok_or_else(|| CatchupError::Service("gemini response missing text content".to_string()))
    }

    fn generate_openai_compatible(&self, prompt: &Prompt) -> Result<String, CatchupError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.base_url(OPENAI_COMPAT_DEFAULT_BASE_URL)
        );
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "user", "content": prompt.text()}
            ],
            "temperature": 0.2
        });

        let response = self
            .client()?
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .map_err(|err| self.map_send_error(err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_http_failure(status, "openai-compatible"));
        }

        let json: Value = response
            .json()
            .map_err(|err| CatchupError::Service(err.to_string()))?;
        extract_openai_compatible_text(&json).ok_or_else(|| {
            CatchupError::Service("openai-compatible response missing text content".to_string())
        })
    }
}

impl Generator for HttpGenerator {
    fn generate(&self, prompt: &Prompt) -> Result<String, CatchupError> {
        match self.config.provider {
            Provider::Gemini => self.generate_gemini(prompt),
            Provider::OpenAiCompatible => self.generate_openai_compatible(prompt),
        }
    }
}

fn map_http_failure(status: StatusCode, provider: &str) -> CatchupError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CatchupError::Auth(format!("{provider} returned {status}"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            CatchupError::RateLimited(format!("{provider} returned {status}"))
        }
        _ => CatchupError::Service(format!("{provider} call failed with status {status}")),
    }
}

fn extract_gemini_text(json: &Value) -> Option<String> {
    let text = json
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|v| v.get("content"))
        .and_then(|v| v.get("parts"))
        .and_then(Value::as_array)
        .and_then(|parts| parts.first())
        .and_then(|v| v.get("text"))
        .and_then(Value::as_str)?;
    Some(text.to_string())
}

fn extract_openai_compatible_text(json: &Value) -> Option<String> {
    let choices = json.get("choices").and_then(Value::as_array)?;
    let first = choices.first()?;
    let content = first.get("message")?.get("content")?;
    match content {
        Value::String(s) => Some(s.to_string()),
        Value::Array(parts) => {
            let mut chunks = Vec::new();
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    chunks.push(text.to_string());
                }
            }
            if chunks.is_empty() {
                None
            } else {
                Some(chunks.join("\n"))
            }
        }
        _ => None,
    }
}
