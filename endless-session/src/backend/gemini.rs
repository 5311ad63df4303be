//! Gemini REST backend.

use super::{GenerationBackend, GenerationOptions, GEMINI_PROVIDER_KEY};
use crate::error::{BackendError, CredentialError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Backend that calls the Gemini `generateContent` endpoint directly.
#[derive(Clone)]
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Points the backend at another host, such as a local proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn provider_key(&self) -> &str {
        GEMINI_PROVIDER_KEY
    }

    /// Lists models with the key; any success status means the key is usable.
    async fn validate_credential(&self) -> Result<(), CredentialError> {
        let url = format!("{}/models?pageSize=1", self.base_url);
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, self.api_key.as_str())
            .send()
            .await
            .map_err(|err| CredentialError::Transport(transport_message(err)))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!("gemini credential accepted");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_credential_error(status, &body))
    }

    async fn generate_content(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, options.model);
        let body = GenerateContentRequest::new(prompt, options);

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|err| BackendError::Transport(transport_message(err)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|err| BackendError::Decode(transport_message(err)))?;
        extract_text(parsed)
    }
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    fn new(prompt: &str, options: &GenerationOptions) -> Self {
        Self {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

/// Concatenates the text parts of the first candidate.
fn extract_text(response: GenerateContentResponse) -> Result<String, BackendError> {
    let text: String = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(BackendError::EmptyResponse);
    }
    Ok(text)
}

/// Error text without the request URL. Errors end up in logs and on screen.
fn transport_message(err: reqwest::Error) -> String {
    err.without_url().to_string()
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| {
            let status = wrapper.error.status.unwrap_or_default();
            let message = wrapper.error.message.unwrap_or_else(|| body.to_string());
            if status.is_empty() {
                message
            } else {
                format!("{}: {}", status, message)
            }
        })
        .unwrap_or_else(|_| body.to_string())
}

fn map_credential_error(status: StatusCode, body: &str) -> CredentialError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => CredentialError::RateLimited,
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CredentialError::Invalid(error_message(body))
        }
        other => CredentialError::Transport(format!("status {}: {}", other.as_u16(), error_message(body))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let options = GenerationOptions {
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.5,
            max_tokens: 100,
        };
        let body = serde_json::to_value(GenerateContentRequest::new("hi", &options)).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
                "generationConfig": {"temperature": 0.5, "maxOutputTokens": 100}
            })
        );
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "<h1>"}, {"text": "Hi</h1>"}]}}]
        }))
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "<h1>Hi</h1>");
    }

    #[test]
    fn test_extract_text_empty() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({"candidates": []})).unwrap();
        assert_eq!(extract_text(response), Err(BackendError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_unreachable_host_errors_omit_api_key() {
        let backend = GeminiBackend::new("SECRET-KEY-123").with_base_url("http://127.0.0.1:1/");
        let options = GenerationOptions {
            model: "m".to_string(),
            temperature: 1.0,
            max_tokens: 10,
        };

        let err = backend.generate_content("hi", &options).await.unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
        assert!(!err.to_string().contains("SECRET-KEY-123"), "{}", err);

        let err = backend.validate_credential().await.unwrap_err();
        assert!(matches!(err, CredentialError::Transport(_)));
        assert!(!err.to_string().contains("SECRET-KEY-123"), "{}", err);
    }

    #[test]
    fn test_credential_error_mapping() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(
            map_credential_error(StatusCode::BAD_REQUEST, body),
            CredentialError::Invalid("INVALID_ARGUMENT: API key not valid".to_string())
        );
        assert_eq!(
            map_credential_error(StatusCode::TOO_MANY_REQUESTS, ""),
            CredentialError::RateLimited
        );
        assert!(matches!(
            map_credential_error(StatusCode::BAD_GATEWAY, "oops"),
            CredentialError::Transport(_)
        ));
    }
}
