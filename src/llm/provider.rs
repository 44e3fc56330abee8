// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider trait and related types
//!
//! Defines the abstraction layer over the heterogeneous generation backends.
//! Each adapter translates its backend's native streaming shape into the
//! common [`RawFragment`] form, so all backend-specific parsing stays here
//! and in the `providers` submodules.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;
use crate::llm::message::{Message, Source};

/// A pinned, boxed stream of raw fragments from a provider
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<RawFragment>> + Send>>;

/// Main trait for generation providers
///
/// Two capability sets exist: chat completion with native search grounding
/// (the backend searches the web itself and returns citations inline) and
/// plain chat completion (web augmentation, if requested, happens upstream
/// before the adapter is invoked).
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Get the provider name (e.g., "gemini", "openai")
    fn name(&self) -> &str;

    /// List available models
    fn available_models(&self) -> Vec<ModelInfo>;

    /// Check if a specific model is supported
    fn supports_model(&self, model: &str) -> bool {
        self.available_models().iter().any(|m| m.id == model)
    }

    /// Whether the backend performs web search itself when asked to
    fn supports_native_search(&self) -> bool;

    /// Non-streaming completion: full text plus any citations in one batch
    async fn complete(&self, request: GenerationRequest) -> Result<GenerationResponse>;

    /// Streaming completion
    async fn complete_stream(&self, request: GenerationRequest) -> Result<FragmentStream>;
}

/// Request for one generation call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Model to use
    pub model: String,

    /// Context window messages, in chronological order
    pub messages: Vec<Message>,

    /// Maximum tokens in response
    pub max_output_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Ask the backend to ground the answer with its own web search.
    /// Only honored by adapters with native search; ignored otherwise.
    pub web_search: bool,
}

impl GenerationRequest {
    /// Create a new generation request
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_output_tokens: 8192,
            temperature: 0.7,
            web_search: false,
        }
    }

    /// Set max output tokens
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Request native web-search grounding
    pub fn with_web_search(mut self, web_search: bool) -> Self {
        self.web_search = web_search;
        self
    }
}

/// Response from a non-streaming completion
#[derive(Debug, Clone, Default)]
pub struct GenerationResponse {
    /// Full generated text
    pub text: String,

    /// Citations, in backend order (may contain duplicate URIs; the merger
    /// deduplicates)
    pub sources: Vec<Source>,
}

/// One incremental unit of a streamed response, normalized across backends
///
/// A fragment may carry a text delta, citation metadata, or both. The
/// sequence ends when the backend's stream ends; there is no final "done"
/// fragment.
#[derive(Debug, Clone, Default)]
pub struct RawFragment {
    /// Text delta, if any
    pub text: Option<String>,

    /// Sources extracted from backend-specific grounding metadata
    pub sources: Vec<Source>,
}

impl RawFragment {
    /// Fragment carrying only a text delta
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            text: Some(delta.into()),
            sources: vec![],
        }
    }

    /// Fragment carrying only sources
    pub fn sources(sources: Vec<Source>) -> Self {
        Self {
            text: None,
            sources,
        }
    }

    /// Whether the fragment carries neither text nor sources
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.sources.is_empty()
    }
}

/// A merged fragment as yielded to the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseFragment {
    /// Text delta, if any
    pub text: Option<String>,

    /// Newly seen sources (deduplicated by URI within one call), if any
    pub sources: Option<Vec<Source>>,
}

/// Which backend family a provider configuration points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Gemini API: chat completion with native search grounding
    Gemini,
    /// Any OpenAI-compatible chat completion endpoint
    #[serde(rename = "openai")]
    OpenAiCompatible,
}

/// Configuration for one provider backend
///
/// Owned by configuration storage; the orchestrator only reads it.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Backend family
    pub kind: ProviderKind,

    /// API key
    pub api_key: String,

    /// Override the default API endpoint (required for third-party
    /// OpenAI-compatible backends)
    pub base_url: Option<String>,
}

/// The active model/provider binding for one generation call
///
/// Captured by the caller before invoking the orchestrator and stable for
/// the duration of that call; changing the caller's selection mid-call has
/// no effect on calls already in flight.
#[derive(Clone)]
pub struct ModelSelection {
    /// Model identifier
    pub model_id: String,

    /// The adapter constructed for this provider's configuration
    pub provider: Arc<dyn ChatProvider>,
}

impl ModelSelection {
    /// Create a new selection
    pub fn new(model_id: impl Into<String>, provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            model_id: model_id.into(),
            provider,
        }
    }
}

impl std::fmt::Debug for ModelSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSelection")
            .field("model_id", &self.model_id)
            .field("provider", &self.provider.name())
            .finish()
    }
}

/// Information about a model
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Model identifier
    pub id: String,

    /// Human-readable name
    pub display_name: String,

    /// Maximum context window in tokens
    pub context_window: u32,

    /// Maximum output tokens
    pub max_output_tokens: u32,
}
