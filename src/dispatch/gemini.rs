//! Google Gemini `generateContent` backend

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{GenerativeBackend, Prompt};
use crate::config::DispatchConfig;
use crate::conversation::Role;
use crate::error::DispatchError;

/// Harm categories filtered at high severity
const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent<'a>>,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

/// Gemini REST client
pub struct GeminiBackend {
    client: Client,
    api_base: String,
    model: String,
    api_key: String,
}

impl GeminiBackend {
    /// Create a backend from configuration
    #[must_use]
    pub fn new(client: Client, config: &DispatchConfig) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.resolve_api_key(),
        }
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    fn build_request(prompt: &Prompt) -> GeminiRequest<'_> {
        let mut contents: Vec<GeminiContent<'_>> = prompt
            .history
            .iter()
            .map(|m| GeminiContent {
                role: Some(convert_role(m.role)),
                parts: vec![TextPart { text: &m.text }],
            })
            .collect();
        contents.push(GeminiContent {
            role: Some("user"),
            parts: vec![TextPart {
                text: &prompt.user_text,
            }],
        });

        let system_instruction = (!prompt.system_instruction.is_empty()).then(|| GeminiContent {
            role: None,
            parts: vec![TextPart {
                text: &prompt.system_instruction,
            }],
        });

        GeminiRequest {
            contents,
            system_instruction,
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: "BLOCK_ONLY_HIGH",
                })
                .collect(),
        }
    }

    /// Pull the reply text out of a successful response
    fn extract_text(response: GeminiResponse) -> Result<String, DispatchError> {
        if let Some(error) = response.error {
            return Err(DispatchError::Unknown(error.message));
        }

        let text: String = response
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(DispatchError::Malformed(
                "no text in backend response".to_string(),
            ));
        }
        Ok(text)
    }
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, DispatchError> {
        let request = Self::build_request(prompt);

        debug!(model = %self.model, history = prompt.history.len(), "Sending request to Gemini");

        let response = self
            .client
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            error!(status = %status, "Gemini API error");
            return Err(map_status(status, &body));
        }

        let parsed: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
            DispatchError::Malformed(format!("Failed to parse backend response: {e}"))
        })?;

        Self::extract_text(parsed)
    }
}

const fn convert_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

fn map_transport_error(e: reqwest::Error) -> DispatchError {
    if e.is_timeout() || e.is_connect() || e.is_body() {
        DispatchError::ServiceUnavailable(format!("HTTP request failed: {e}"))
    } else {
        DispatchError::Unknown(format!("HTTP request failed: {e}"))
    }
}

/// Classify a non-success status
fn map_status(status: StatusCode, body: &str) -> DispatchError {
    let message = serde_json::from_str::<GeminiResponse>(body)
        .ok()
        .and_then(|r| r.error)
        .map_or_else(|| body.to_string(), |e| e.message);

    match status {
        StatusCode::TOO_MANY_REQUESTS => DispatchError::RateLimited(message),
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => DispatchError::ServiceUnavailable(format!("HTTP {status}: {message}")),
        _ => DispatchError::Unknown(format!("HTTP {status}: {message}")),
    }
}
