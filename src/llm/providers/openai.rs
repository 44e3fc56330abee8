// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! OpenAI-compatible chat completion provider implementation
//!
//! Plain chat completion with no native search grounding; any web
//! augmentation happens upstream before this adapter is invoked. A
//! configurable base URL makes this adapter reachable for third-party
//! OpenAI-compatible backends.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ColloquyError, Result};
use crate::llm::message::{Message, Role};
use crate::llm::provider::{
    ChatProvider, FragmentStream, GenerationRequest, GenerationResponse, ModelInfo, RawFragment,
};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat completion provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    /// Create a new provider against the default OpenAI endpoint
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_API_URL.to_string(),
        }
    }

    /// Create with a custom base URL (for compatible third-party backends)
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    /// Convert internal messages to the OpenAI chat format
    fn convert_messages(messages: &[Message]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|m| OpenAiMessage {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                }
                .to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    /// Build the request body
    fn build_request(&self, request: &GenerationRequest, stream: bool) -> OpenAiRequest {
        OpenAiRequest {
            model: request.model.clone(),
            messages: Self::convert_messages(&request.messages),
            max_tokens: Some(request.max_output_tokens),
            temperature: Some(request.temperature),
            stream: Some(stream),
        }
    }

    /// Parse an error response
    fn parse_error(&self, status: u16, body: &str) -> ColloquyError {
        if let Ok(error_response) = serde_json::from_str::<OpenAiError>(body) {
            let message = error_response.error.message;
            let code = error_response.error.code.as_deref().unwrap_or("");

            match code {
                "invalid_api_key" | "authentication_error" | "permission_denied" => {
                    ColloquyError::Api(ApiError::PermissionDenied)
                }
                "model_not_found" => ColloquyError::Api(ApiError::ModelNotFound(message)),
                "insufficient_quota" => ColloquyError::Api(ApiError::QuotaExceeded),
                "rate_limit_exceeded" => ColloquyError::Api(ApiError::RateLimited(60)),
                _ => match status {
                    401 | 403 => ColloquyError::Api(ApiError::PermissionDenied),
                    404 => ColloquyError::Api(ApiError::ModelNotFound(message)),
                    429 => {
                        if message.to_lowercase().contains("quota") {
                            ColloquyError::Api(ApiError::QuotaExceeded)
                        } else {
                            ColloquyError::Api(ApiError::RateLimited(60))
                        }
                    }
                    _ => ColloquyError::Api(ApiError::ServerError { status, message }),
                },
            }
        } else {
            ColloquyError::Api(ApiError::ServerError {
                status,
                message: body.to_string(),
            })
        }
    }
}

/// Parse the data payload of one SSE line into a text fragment
fn parse_sse_data(event_str: &str) -> Option<RawFragment> {
    let mut payload = None;
    for line in event_str.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            payload = Some(rest.trim_start().to_string());
        }
    }

    let payload = payload?;
    if payload == "[DONE]" {
        return None;
    }

    let chunk: OpenAiStreamChunk = serde_json::from_str(&payload).ok()?;
    let delta = chunk.choices.into_iter().next()?.delta;
    let text = delta.content?;
    if text.is_empty() {
        return None;
    }
    Some(RawFragment::text(text))
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo {
                id: "gpt-4o".to_string(),
                display_name: "GPT-4o".to_string(),
                context_window: 128_000,
                max_output_tokens: 16_384,
            },
            ModelInfo {
                id: "gpt-4o-mini".to_string(),
                display_name: "GPT-4o mini".to_string(),
                context_window: 128_000,
                max_output_tokens: 16_384,
            },
        ]
    }

    /// Compatible backends host arbitrary model ids; the server decides.
    fn supports_model(&self, _model: &str) -> bool {
        true
    }

    fn supports_native_search(&self) -> bool {
        false
    }

    async fn complete(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        let body = self.build_request(&request, false);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status, &body));
        }

        let api_response: OpenAiResponse = response.json().await?;

        let text = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.map(|m| m.content))
            .unwrap_or_default();

        // Plain chat completion never carries citations
        Ok(GenerationResponse {
            text,
            sources: vec![],
        })
    }

    async fn complete_stream(&self, request: GenerationRequest) -> Result<FragmentStream> {
        let body = self.build_request(&request, true);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status, &body));
        }

        let byte_stream = response.bytes_stream();

        let fragment_stream = byte_stream
            .map(|result| {
                result.map_err(|e| ColloquyError::Api(ApiError::StreamError(e.to_string())))
            })
            .scan(String::new(), |buffer, result| {
                let chunk = match result {
                    Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
                    Err(e) => return futures::future::ready(Some(vec![Err(e)])),
                };

                buffer.push_str(&chunk.replace("\r\n", "\n"));

                let mut fragments = Vec::new();

                while let Some(pos) = buffer.find("\n\n") {
                    let event_str = buffer[..pos].to_string();
                    *buffer = buffer[pos + 2..].to_string();

                    if let Some(fragment) = parse_sse_data(&event_str) {
                        fragments.push(Ok(fragment));
                    }
                }

                futures::future::ready(Some(fragments))
            })
            .flat_map(futures::stream::iter);

        let fragment_stream: FragmentStream = Box::pin(fragment_stream);
        Ok(fragment_stream)
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    message: Option<OpenAiMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_new() {
        let provider = OpenAiProvider::new("test-key");
        assert_eq!(provider.api_key, "test-key");
        assert_eq!(provider.base_url, OPENAI_API_URL);
    }

    #[test]
    fn test_provider_with_base_url() {
        let provider = OpenAiProvider::with_base_url("test-key", "https://llm.internal/v1");
        assert_eq!(provider.base_url, "https://llm.internal/v1");
    }

    #[test]
    fn test_provider_name_and_capability() {
        let provider = OpenAiProvider::new("test-key");
        assert_eq!(provider.name(), "openai");
        assert!(!provider.supports_native_search());
    }

    #[test]
    fn test_supports_any_model() {
        let provider = OpenAiProvider::new("test-key");
        assert!(provider.supports_model("gpt-4o"));
        assert!(provider.supports_model("some-local-model"));
    }

    #[test]
    fn test_convert_messages_roles() {
        let messages = vec![
            Message::system("Be brief"),
            Message::user("Hello"),
            Message::assistant("Hi"),
        ];

        let converted = OpenAiProvider::convert_messages(&messages);

        assert_eq!(converted.len(), 3);
        assert_eq!(converted[0].role, "system");
        assert_eq!(converted[1].role, "user");
        assert_eq!(converted[2].role, "assistant");
    }

    #[test]
    fn test_build_request_basic() {
        let provider = OpenAiProvider::new("test-key");
        let request = GenerationRequest::new("gpt-4o-mini", vec![Message::user("Hello")]);

        let built = provider.build_request(&request, false);

        assert_eq!(built.model, "gpt-4o-mini");
        assert_eq!(built.messages.len(), 1);
        assert_eq!(built.stream, Some(false));
    }

    #[test]
    fn test_build_request_stream_flag() {
        let provider = OpenAiProvider::new("test-key");
        let request = GenerationRequest::new("gpt-4o-mini", vec![Message::user("Hello")]);

        let built = provider.build_request(&request, true);
        assert_eq!(built.stream, Some(true));
    }

    #[test]
    fn test_parse_error_authentication() {
        let provider = OpenAiProvider::new("test-key");
        let body = r#"{"error": {"message": "Invalid API key", "code": "invalid_api_key"}}"#;

        let error = provider.parse_error(401, body);
        assert!(matches!(
            error,
            ColloquyError::Api(ApiError::PermissionDenied)
        ));
    }

    #[test]
    fn test_parse_error_model_not_found() {
        let provider = OpenAiProvider::new("test-key");
        let body =
            r#"{"error": {"message": "The model gpt-99 does not exist", "code": "model_not_found"}}"#;

        let error = provider.parse_error(404, body);
        match error {
            ColloquyError::Api(ApiError::ModelNotFound(msg)) => assert!(msg.contains("gpt-99")),
            _ => panic!("Expected ModelNotFound"),
        }
    }

    #[test]
    fn test_parse_error_quota() {
        let provider = OpenAiProvider::new("test-key");
        let body = r#"{"error": {"message": "You exceeded your quota", "code": "insufficient_quota"}}"#;

        let error = provider.parse_error(429, body);
        assert!(matches!(error, ColloquyError::Api(ApiError::QuotaExceeded)));
    }

    #[test]
    fn test_parse_error_rate_limit() {
        let provider = OpenAiProvider::new("test-key");
        let body =
            r#"{"error": {"message": "Too many requests", "code": "rate_limit_exceeded"}}"#;

        let error = provider.parse_error(429, body);
        match error {
            ColloquyError::Api(ApiError::RateLimited(secs)) => assert_eq!(secs, 60),
            _ => panic!("Expected RateLimited"),
        }
    }

    #[test]
    fn test_parse_error_status_fallback_permission() {
        let provider = OpenAiProvider::new("test-key");
        let body = r#"{"error": {"message": "Forbidden"}}"#;

        let error = provider.parse_error(403, body);
        assert!(matches!(
            error,
            ColloquyError::Api(ApiError::PermissionDenied)
        ));
    }

    #[test]
    fn test_parse_error_status_fallback_quota_by_message() {
        let provider = OpenAiProvider::new("test-key");
        let body = r#"{"error": {"message": "Monthly quota reached"}}"#;

        let error = provider.parse_error(429, body);
        assert!(matches!(error, ColloquyError::Api(ApiError::QuotaExceeded)));
    }

    #[test]
    fn test_parse_error_server_error() {
        let provider = OpenAiProvider::new("test-key");
        let body = r#"{"error": {"message": "Internal error"}}"#;

        let error = provider.parse_error(500, body);
        match error {
            ColloquyError::Api(ApiError::ServerError { status, .. }) => assert_eq!(status, 500),
            _ => panic!("Expected ServerError"),
        }
    }

    #[test]
    fn test_parse_error_invalid_json() {
        let provider = OpenAiProvider::new("test-key");

        let error = provider.parse_error(500, "not json");
        match error {
            ColloquyError::Api(ApiError::ServerError { message, .. }) => {
                assert_eq!(message, "not json");
            }
            _ => panic!("Expected ServerError with body as message"),
        }
    }

    #[test]
    fn test_parse_sse_data_delta() {
        let event = r#"data: {"choices": [{"delta": {"content": "Hello"}}]}"#;

        let fragment = parse_sse_data(event).unwrap();
        assert_eq!(fragment.text.as_deref(), Some("Hello"));
        assert!(fragment.sources.is_empty());
    }

    #[test]
    fn test_parse_sse_data_done() {
        assert!(parse_sse_data("data: [DONE]").is_none());
    }

    #[test]
    fn test_parse_sse_data_role_only_delta() {
        // The first chunk often carries only the role
        let event = r#"data: {"choices": [{"delta": {"role": "assistant"}}]}"#;
        assert!(parse_sse_data(event).is_none());
    }

    #[test]
    fn test_parse_sse_data_empty_content() {
        let event = r#"data: {"choices": [{"delta": {"content": ""}}]}"#;
        assert!(parse_sse_data(event).is_none());
    }

    #[test]
    fn test_parse_sse_data_invalid_json() {
        assert!(parse_sse_data("data: {oops").is_none());
    }
}
