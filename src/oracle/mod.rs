//! Categorization oracle — one prompt in, one text label out.
//!
//! The production implementation talks to the Gemini `generateContent`
//! endpoint with deterministic decoding (temperature zero). Retry and
//! fallback policy live in the classifier, not here: transport errors
//! propagate up and are converted to the `Uncategorized` sentinel.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::OracleError;

/// Token cap for the oracle reply; category names are short.
const MAX_OUTPUT_TOKENS: u32 = 50;

/// Text-classification oracle consumed by the classifier.
#[async_trait]
pub trait CategoryOracle: Send + Sync {
    /// Send one prompt and return the raw response text.
    async fn complete(&self, prompt: &str) -> Result<String, OracleError>;
}

/// Gemini REST client.
pub struct GeminiOracle {
    api_key: SecretString,
    model: String,
    client: reqwest::Client,
}

impl GeminiOracle {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            api_key,
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        )
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl CategoryOracle for GeminiOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 0,
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
            },
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::RequestFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(OracleError::RequestFailed {
                reason: format!("HTTP {status}: {detail}"),
            });
        }

        let parsed: GenerateResponse =
            response
                .json()
                .await
                .map_err(|e| OracleError::InvalidResponse {
                    reason: e.to_string(),
                })?;

        let text: String = parsed
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(OracleError::InvalidResponse {
                reason: "response contained no candidate text".into(),
            });
        }

        debug!(model = %self.model, "Oracle responded");
        Ok(text)
    }
}
