// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Google Gemini API provider implementation
//!
//! Chat completion with native search grounding: when a request asks for web
//! search, the `google_search` tool is attached and the backend returns
//! citation metadata inline with the generated text.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ColloquyError, Result};
use crate::llm::message::{Message, Role, Source};
use crate::llm::provider::{
    ChatProvider, FragmentStream, GenerationRequest, GenerationResponse, ModelInfo, RawFragment,
};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini provider
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    /// Create a new Gemini provider
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: GEMINI_API_URL.to_string(),
        }
    }

    /// Create with a custom base URL
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    /// Convert internal messages to Gemini format
    ///
    /// System messages become the systemInstruction; multiple system turns
    /// are joined in order.
    fn convert_messages(
        messages: &[Message],
    ) -> (Option<GeminiSystemInstruction>, Vec<GeminiContent>) {
        let mut system_parts: Vec<String> = Vec::new();
        let mut contents = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_parts.push(msg.content.clone()),
                Role::User => contents.push(GeminiContent {
                    role: "user".to_string(),
                    parts: vec![GeminiPart {
                        text: msg.content.clone(),
                    }],
                }),
                Role::Assistant => contents.push(GeminiContent {
                    role: "model".to_string(),
                    parts: vec![GeminiPart {
                        text: msg.content.clone(),
                    }],
                }),
            }
        }

        let system_instruction = if system_parts.is_empty() {
            None
        } else {
            Some(GeminiSystemInstruction {
                parts: vec![GeminiPart {
                    text: system_parts.join("\n\n"),
                }],
            })
        };

        (system_instruction, contents)
    }

    /// Build the request body
    fn build_request(&self, request: &GenerationRequest) -> GeminiRequest {
        let (system_instruction, contents) = Self::convert_messages(&request.messages);

        GeminiRequest {
            contents,
            system_instruction,
            tools: if request.web_search {
                Some(vec![GeminiTool {
                    google_search: GeminiGoogleSearch {},
                }])
            } else {
                None
            },
            generation_config: Some(GeminiGenerationConfig {
                max_output_tokens: request.max_output_tokens,
                temperature: Some(request.temperature),
            }),
        }
    }

    /// Extract Retry-After header value (numeric seconds only)
    fn extract_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
        headers
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
    }

    /// Parse an error response
    fn parse_error(&self, status: u16, body: &str, retry_after: Option<u64>) -> ColloquyError {
        if let Ok(error_response) = serde_json::from_str::<GeminiError>(body) {
            let detail = error_response.error;
            match detail.status.as_deref().unwrap_or("") {
                "UNAUTHENTICATED" | "PERMISSION_DENIED" => {
                    ColloquyError::Api(ApiError::PermissionDenied)
                }
                "NOT_FOUND" => ColloquyError::Api(ApiError::ModelNotFound(detail.message)),
                "RESOURCE_EXHAUSTED" => {
                    // Quota exhaustion and rate limiting share a status; the
                    // message tells them apart.
                    if detail.message.to_lowercase().contains("quota") {
                        ColloquyError::Api(ApiError::QuotaExceeded)
                    } else {
                        let retry_secs = retry_after.unwrap_or(10) as u32;
                        ColloquyError::Api(ApiError::RateLimited(retry_secs))
                    }
                }
                "INVALID_ARGUMENT" => {
                    ColloquyError::Api(ApiError::InvalidResponse(detail.message))
                }
                _ => ColloquyError::Api(ApiError::ServerError {
                    status,
                    message: detail.message,
                }),
            }
        } else {
            ColloquyError::Api(ApiError::ServerError {
                status,
                message: body.to_string(),
            })
        }
    }

    fn endpoint(&self, model: &str, operation: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, model, operation)
    }
}

/// Convert one streamed response chunk into normalized fragments
fn convert_chunk(response: GeminiResponse) -> Vec<RawFragment> {
    let mut fragments = Vec::new();

    let Some(candidate) = response.candidates.into_iter().next() else {
        return fragments;
    };

    for part in candidate.content.parts {
        if !part.text.is_empty() {
            fragments.push(RawFragment::text(part.text));
        }
    }

    if let Some(grounding) = candidate.grounding_metadata {
        let sources = extract_sources(&grounding);
        if !sources.is_empty() {
            fragments.push(RawFragment::sources(sources));
        }
    }

    fragments
}

/// Extract Source records from grounding metadata
fn extract_sources(grounding: &GeminiGroundingMetadata) -> Vec<Source> {
    grounding
        .grounding_chunks
        .iter()
        .filter_map(|chunk| {
            let web = chunk.web.as_ref()?;
            Some(Source::new(
                web.title.clone().unwrap_or_default(),
                web.uri.clone(),
            ))
        })
        .collect()
}

/// Parse the data payload of one SSE event
fn parse_sse_data(event_str: &str) -> Option<Vec<RawFragment>> {
    let mut payload_lines = Vec::new();
    for line in event_str.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            payload_lines.push(rest.trim_start().to_string());
        }
    }

    if payload_lines.is_empty() {
        return None;
    }
    let payload = payload_lines.join("\n");
    if payload == "[DONE]" {
        return None;
    }

    let response: GeminiResponse = serde_json::from_str(&payload).ok()?;
    Some(convert_chunk(response))
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo {
                id: "gemini-2.0-flash".to_string(),
                display_name: "Gemini 2.0 Flash".to_string(),
                context_window: 1_048_576,
                max_output_tokens: 8_192,
            },
            ModelInfo {
                id: "gemini-2.5-flash".to_string(),
                display_name: "Gemini 2.5 Flash".to_string(),
                context_window: 1_048_576,
                max_output_tokens: 65_536,
            },
            ModelInfo {
                id: "gemini-2.5-pro".to_string(),
                display_name: "Gemini 2.5 Pro".to_string(),
                context_window: 1_048_576,
                max_output_tokens: 65_536,
            },
        ]
    }

    fn supports_native_search(&self) -> bool {
        true
    }

    async fn complete(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        let body = self.build_request(&request);

        let response = self
            .client
            .post(self.endpoint(&request.model, "generateContent"))
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();

        if !response.status().is_success() {
            let retry_after = Self::extract_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status, &body, retry_after));
        }

        let api_response: GeminiResponse = response.json().await?;

        let mut text = String::new();
        let mut sources = Vec::new();
        if let Some(candidate) = api_response.candidates.into_iter().next() {
            for part in candidate.content.parts {
                text.push_str(&part.text);
            }
            if let Some(grounding) = candidate.grounding_metadata {
                sources = extract_sources(&grounding);
            }
        }

        Ok(GenerationResponse { text, sources })
    }

    async fn complete_stream(&self, request: GenerationRequest) -> Result<FragmentStream> {
        let body = self.build_request(&request);

        let response = self
            .client
            .post(format!(
                "{}?alt=sse",
                self.endpoint(&request.model, "streamGenerateContent")
            ))
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();

        if !response.status().is_success() {
            let retry_after = Self::extract_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status, &body, retry_after));
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

                // Parse SSE events from buffer
                while let Some(pos) = buffer.find("\n\n") {
                    let event_str = buffer[..pos].to_string();
                    *buffer = buffer[pos + 2..].to_string();

                    if let Some(parsed) = parse_sse_data(&event_str) {
                        fragments.extend(parsed.into_iter().map(Ok));
                    }
                }

                futures::future::ready(Some(fragments))
            })
            .flat_map(futures::stream::iter);

        let fragment_stream: FragmentStream = Box::pin(fragment_stream);
        Ok(fragment_stream)
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiTool {
    #[serde(rename = "google_search")]
    google_search: GeminiGoogleSearch,
}

#[derive(Debug, Serialize)]
struct GeminiGoogleSearch {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiContentResponse,
    #[serde(default)]
    grounding_metadata: Option<GeminiGroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GeminiGroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GeminiGroundingChunk {
    #[serde(default)]
    web: Option<GeminiGroundingWeb>,
}

#[derive(Debug, Deserialize)]
struct GeminiGroundingWeb {
    uri: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: Option<String>,
}
