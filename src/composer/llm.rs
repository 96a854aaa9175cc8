// SPDX-License-Identifier: MIT OR Apache-2.0

//! Completion service seam and the Gemini REST client.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;

/// One prompt-to-completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl CompletionRequest {
    pub fn new(config: &LlmConfig, prompt: impl Into<String>) -> Self {
        Self {
            model: config.model().to_string(),
            prompt: prompt.into(),
            temperature: config.temperature(),
            max_output_tokens: config.max_output_tokens(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("API key not set (expected in ${0})")]
    MissingApiKey(String),

    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed response: {0}")]
    InvalidResponse(String),
}

impl CompletionError {
    /// Timeouts, connection failures, 429 and 5xx may succeed on a second try.
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Timeout | CompletionError::Connect(_) => true,
            CompletionError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CompletionError::Timeout
        } else if err.is_connect() {
            CompletionError::Connect(err.to_string())
        } else if err.is_decode() {
            CompletionError::InvalidResponse(err.to_string())
        } else {
            CompletionError::Request(err.to_string())
        }
    }
}

/// Anything that turns a prompt into a completion.
pub trait CompletionService: Send + Sync {
    fn generate(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

/// Client for the Generative Language `generateContent` endpoint.
pub struct GeminiClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    max_retries: u32,
}

impl GeminiClient {
    /// Builds a client; the API key is read from the configured variable.
    pub fn from_config(config: &LlmConfig) -> Result<Self, CompletionError> {
        let api_key = std::env::var(config.api_key_env())
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| CompletionError::MissingApiKey(config.api_key_env().to_string()))?;
        Self::new(
            config.endpoint(),
            api_key,
            Duration::from_secs(config.timeout_secs()),
            config.max_retries(),
        )
    }

    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, CompletionError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_retries,
        })
    }

    fn url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, model)
    }

    fn send(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![Part {
                    text: Some(request.prompt.clone()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        };

        let response = self
            .http
            .post(self.url(&request.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CompletionError::Http {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: GenerateResponse = response.json()?;
        Ok(parsed.text())
    }
}

impl CompletionService for GeminiClient {
    fn generate(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let mut attempt = 0;
        loop {
            match self.send(request) {
                Ok(text) => return Ok(text),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!("Completion attempt {} failed ({}), retrying", attempt, err);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize, Default)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

impl GenerateResponse {
    /// Text parts of the first candidate, concatenated. Empty when the
    /// model returned nothing (e.g. a safety block).
    fn text(&self) -> String {
        self.candidates
            .first()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(CompletionError::Timeout.is_retryable());
        assert!(CompletionError::Connect("refused".into()).is_retryable());
        assert!(CompletionError::Http { status: 429, body: String::new() }.is_retryable());
        assert!(CompletionError::Http { status: 503, body: String::new() }.is_retryable());
        assert!(!CompletionError::Http { status: 400, body: String::new() }.is_retryable());
        assert!(!CompletionError::MissingApiKey("GEMINI_API_KEY".into()).is_retryable());
    }

    #[test]
    fn request_body_uses_camel_case() {
        let body = GenerateRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![Part { text: Some("hi".into()) }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.5,
                max_output_tokens: 800,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 800);
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
    }

    #[test]
    fn response_text_concatenates_parts() {
        let parsed: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello "},{"text":"there"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.text(), "Hello there");

        let blocked: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert_eq!(blocked.text(), "");
    }

    #[test]
    fn missing_api_key_is_reported() {
        let config: LlmConfig = toml::from_str(r#"api_key_env = "DOCRAG_TEST_UNSET_KEY""#).unwrap();
        let err = GeminiClient::from_config(&config).err().unwrap();
        assert!(matches!(err, CompletionError::MissingApiKey(name) if name == "DOCRAG_TEST_UNSET_KEY"));
    }

    #[test]
    fn connection_refused_is_retried_then_reported() {
        let client = GeminiClient::new("http://127.0.0.1:9", "key", Duration::from_secs(2), 1).unwrap();
        let request = CompletionRequest {
            model: "m".into(),
            prompt: "p".into(),
            temperature: 0.2,
            max_output_tokens: 10,
        };
        let err = client.generate(&request).unwrap_err();
        assert!(err.is_retryable());
    }
}
