// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock provider for testing
//!
//! A configurable, scriptable implementation of the `ChatProvider` trait for
//! unit and integration tests: queued stream scripts with per-fragment fault
//! injection, queued completion outcomes, and call counters.

use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{ApiError, ColloquyError, Result};
use crate::llm::message::Source;
use crate::llm::provider::{
    ChatProvider, FragmentStream, GenerationRequest, GenerationResponse, ModelInfo, RawFragment,
};

/// One scripted item in a mock stream
#[derive(Clone, Debug)]
pub enum ScriptedFragment {
    /// Yield a text delta
    Text(String),
    /// Yield a batch of sources
    Sources(Vec<Source>),
    /// Raise a stream error at this point
    Error(String),
}

/// One scripted streaming attempt
#[derive(Clone, Debug)]
pub enum StreamScript {
    /// Open the stream and play these items
    Play(Vec<ScriptedFragment>),
    /// Fail before any fragment is produced
    FailToOpen(String),
    /// Reject the request (classified, not a transport failure)
    RejectOpen(String),
    /// Open the stream but never produce a fragment
    Hang,
}

/// One scripted non-streaming outcome
#[derive(Clone, Debug)]
pub enum CompletionScript {
    /// Succeed with this text and these sources
    Respond {
        text: String,
        sources: Vec<Source>,
    },
    /// Fail with a server error
    Fail(String),
}

/// A mock provider for testing
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    native_search: bool,
    stream_scripts: Arc<Mutex<VecDeque<StreamScript>>>,
    completion_scripts: Arc<Mutex<VecDeque<CompletionScript>>>,
    stream_calls: Arc<AtomicUsize>,
    complete_calls: Arc<AtomicUsize>,
    recorded_requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a new mock provider without native search
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            native_search: false,
            stream_scripts: Arc::new(Mutex::new(VecDeque::new())),
            completion_scripts: Arc::new(Mutex::new(VecDeque::new())),
            stream_calls: Arc::new(AtomicUsize::new(0)),
            complete_calls: Arc::new(AtomicUsize::new(0)),
            recorded_requests: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Create a mock provider with a custom name
    pub fn with_name(name: impl Into<String>) -> Self {
        let mut provider = Self::new();
        provider.name = name.into();
        provider
    }

    /// Toggle native search grounding capability
    pub fn with_native_search(mut self, native_search: bool) -> Self {
        self.native_search = native_search;
        self
    }

    /// Queue a stream script (played in queue order)
    pub fn queue_stream(&self, items: Vec<ScriptedFragment>) {
        self.stream_scripts
            .lock()
            .unwrap()
            .push_back(StreamScript::Play(items));
    }

    /// Queue a stream that fails before producing anything
    pub fn queue_stream_open_failure(&self, message: impl Into<String>) {
        self.stream_scripts
            .lock()
            .unwrap()
            .push_back(StreamScript::FailToOpen(message.into()));
    }

    /// Queue a classified rejection (model not found) at stream open
    pub fn queue_stream_open_rejection(&self, model: impl Into<String>) {
        self.stream_scripts
            .lock()
            .unwrap()
            .push_back(StreamScript::RejectOpen(model.into()));
    }

    /// Queue a stream that opens but never produces a fragment
    pub fn queue_stream_hang(&self) {
        self.stream_scripts
            .lock()
            .unwrap()
            .push_back(StreamScript::Hang);
    }

    /// Queue a non-streaming completion
    pub fn queue_completion(&self, text: impl Into<String>, sources: Vec<Source>) {
        self.completion_scripts
            .lock()
            .unwrap()
            .push_back(CompletionScript::Respond {
                text: text.into(),
                sources,
            });
    }

    /// Queue a non-streaming failure
    pub fn queue_completion_failure(&self, message: impl Into<String>) {
        self.completion_scripts
            .lock()
            .unwrap()
            .push_back(CompletionScript::Fail(message.into()));
    }

    /// Number of times `complete_stream` was called
    pub fn stream_call_count(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// Number of times `complete` was called
    pub fn complete_call_count(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    /// All recorded requests, in call order
    pub fn recorded_requests(&self) -> Vec<GenerationRequest> {
        self.recorded_requests.lock().unwrap().clone()
    }

    /// The most recent request
    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.recorded_requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".to_string(),
            display_name: "Mock Model".to_string(),
            context_window: 128_000,
            max_output_tokens: 8_192,
        }]
    }

    fn supports_native_search(&self) -> bool {
        self.native_search
    }

    async fn complete(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.recorded_requests.lock().unwrap().push(request);

        let script = self.completion_scripts.lock().unwrap().pop_front();
        match script {
            Some(CompletionScript::Respond { text, sources }) => {
                Ok(GenerationResponse { text, sources })
            }
            Some(CompletionScript::Fail(message)) => {
                Err(ColloquyError::Api(ApiError::ServerError {
                    status: 500,
                    message,
                }))
            }
            None => Ok(GenerationResponse {
                text: "Mock response".to_string(),
                sources: vec![],
            }),
        }
    }

    async fn complete_stream(&self, request: GenerationRequest) -> Result<FragmentStream> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.recorded_requests.lock().unwrap().push(request);

        let script = self
            .stream_scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                StreamScript::Play(vec![ScriptedFragment::Text("Mock response".to_string())])
            });

        match script {
            StreamScript::FailToOpen(message) => {
                Err(ColloquyError::Api(ApiError::StreamError(message)))
            }
            StreamScript::RejectOpen(model) => {
                Err(ColloquyError::Api(ApiError::ModelNotFound(model)))
            }
            StreamScript::Hang => Ok(Box::pin(stream::pending())),
            StreamScript::Play(items) => {
                let results: Vec<Result<RawFragment>> = items
                    .into_iter()
                    .map(|item| match item {
                        ScriptedFragment::Text(text) => Ok(RawFragment::text(text)),
                        ScriptedFragment::Sources(sources) => Ok(RawFragment::sources(sources)),
                        ScriptedFragment::Error(message) => {
                            Err(ColloquyError::Api(ApiError::StreamError(message)))
                        }
                    })
                    .collect();
                Ok(Box::pin(stream::iter(results)))
            }
        }
    }
}
