// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Response generation orchestration
//!
//! Drives one generation call end to end: context window selection, optional
//! search augmentation, the provider's streaming API, fragment merging, and
//! the single non-streaming fallback on streaming failure.
//!
//! The orchestrator is stateless across calls. The model/provider binding is
//! an explicit per-call parameter, captured at invocation; the caller owns
//! history and appends the merged assistant message itself.

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::chat::merge::{merge_fragment, SourceTracker};
use crate::config::GenerationConfig;
use crate::context::select_window;
use crate::error::{ApiError, ColloquyError, Result};
use crate::llm::message::Message;
use crate::llm::provider::{GenerationRequest, ModelSelection, ResponseFragment};
use crate::search::{augment, SearchProvider};

/// Output token cap for title generation
const TITLE_MAX_TOKENS: u32 = 64;

/// The caller-facing stream of merged response fragments
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<ResponseFragment>> + Send>>;

/// Response generation orchestrator
pub struct Orchestrator {
    config: GenerationConfig,
    search: Option<Arc<dyn SearchProvider>>,
}

impl Orchestrator {
    /// Create an orchestrator with no search capability
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            config,
            search: None,
        }
    }

    /// Attach a search provider for upstream augmentation
    pub fn with_search(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(provider);
        self
    }

    /// Generate a response to `new_user_text` given prior `history`.
    ///
    /// Yields merged `{text, sources}` fragments as they arrive. On a
    /// streaming failure the identical request is reissued once through the
    /// provider's non-streaming operation; classified backend rejections and
    /// final failures surface as `Err` items. Text already yielded is never
    /// retracted. Dropping the stream cancels consumption; the backend call
    /// may continue server-side and its results are discarded.
    pub fn generate(
        &self,
        history: &[Message],
        new_user_text: &str,
        use_web_search: bool,
        selection: &ModelSelection,
    ) -> ResponseStream {
        let config = self.config.clone();
        let search = self.search.clone();
        let selection = selection.clone();
        let query = new_user_text.to_string();

        let mut messages: Vec<Message> = history.to_vec();
        messages.push(Message::user(new_user_text));

        Box::pin(try_stream! {
            let budget = config.token_budget(&selection.model_id);
            let mut window = select_window(&messages, budget);
            tracing::debug!(
                target: "colloquy.chat",
                model = %selection.model_id,
                history_len = messages.len(),
                window_len = window.len(),
                budget,
                "selected context window"
            );

            let native_search = selection.provider.supports_native_search();
            if use_web_search && !native_search {
                match &search {
                    Some(provider) => {
                        window = augment(window, &query, provider.as_ref()).await;
                    }
                    None => {
                        tracing::warn!(
                            target: "colloquy.chat",
                            "web search requested but no search provider configured"
                        );
                    }
                }
            }

            let request = GenerationRequest::new(&selection.model_id, window)
                .with_max_output_tokens(config.max_output_tokens)
                .with_temperature(config.temperature)
                .with_web_search(use_web_search && native_search);

            let mut tracker = SourceTracker::new();
            let timeout = Duration::from_secs(config.stream_timeout_secs);

            // Streaming attempt. The timeout bounds the wait for the first
            // sign of stream activity; after that the backend sets the pace.
            let mut stream_failure: Option<ColloquyError> = None;
            let open = tokio::time::timeout(
                timeout,
                selection.provider.complete_stream(request.clone()),
            )
            .await;

            match open {
                Err(_) => stream_failure = Some(ApiError::Timeout.into()),
                Ok(Err(e)) => stream_failure = Some(e),
                Ok(Ok(mut stream)) => {
                    let mut first = true;
                    loop {
                        let next = if first {
                            match tokio::time::timeout(timeout, stream.next()).await {
                                Err(_) => {
                                    stream_failure = Some(ApiError::Timeout.into());
                                    break;
                                }
                                Ok(next) => next,
                            }
                        } else {
                            stream.next().await
                        };
                        first = false;

                        match next {
                            None => break,
                            Some(Err(e)) => {
                                stream_failure = Some(e);
                                break;
                            }
                            Some(Ok(raw)) => {
                                if let Some(fragment) = merge_fragment(raw, &mut tracker) {
                                    yield fragment;
                                }
                            }
                        }
                    }
                }
            }

            let Some(failure) = stream_failure else {
                return;
            };

            // A classified rejection would fail identically on the fallback
            // path; surface it directly.
            let rejection =
                matches!(&failure, ColloquyError::Api(api_error) if api_error.is_rejection());
            if rejection {
                tracing::warn!(
                    target: "colloquy.chat",
                    model = %selection.model_id,
                    error = %failure,
                    "backend rejected the request"
                );
                Err(failure)?;
            } else {
                // Single non-streaming fallback with the identical request.
                tracing::warn!(
                    target: "colloquy.chat",
                    model = %selection.model_id,
                    error = %failure,
                    "streaming failed; falling back to non-streaming completion"
                );

                let response = selection.provider.complete(request).await.map_err(|e| {
                    tracing::error!(
                        target: "colloquy.chat",
                        model = %selection.model_id,
                        error = %e,
                        "non-streaming fallback failed"
                    );
                    e
                })?;

                if !response.text.is_empty() {
                    yield ResponseFragment {
                        text: Some(response.text),
                        sources: None,
                    };
                }
                let sources = tracker.filter_new(response.sources);
                if !sources.is_empty() {
                    yield ResponseFragment {
                        text: None,
                        sources: Some(sources),
                    };
                }
            }
        })
    }

    /// Generate a short conversation title for `user_text`.
    ///
    /// A single non-streaming call through the same provider adapter, with
    /// no search augmentation. Failure propagates; falling back to a
    /// truncated title is caller policy.
    pub async fn generate_title(
        &self,
        user_text: &str,
        selection: &ModelSelection,
    ) -> Result<String> {
        let prompt = format!(
            "Generate a concise title (at most six words) for a conversation \
             that starts with the message below. Reply with the title only, \
             without quotes.\n\n{user_text}"
        );

        let request = GenerationRequest::new(&selection.model_id, vec![Message::user(prompt)])
            .with_max_output_tokens(TITLE_MAX_TOKENS)
            .with_temperature(self.config.temperature);

        let response = selection.provider.complete(request).await?;
        Ok(response.text.trim().trim_matches('"').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::llm::message::{Role, Source};
    use crate::llm::mock_provider::{MockProvider, ScriptedFragment};
    use crate::search::SearchResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Search provider that counts calls
    struct CountingSearch {
        calls: AtomicUsize,
        results: Vec<SearchResult>,
    }

    impl CountingSearch {
        fn new(results: Vec<SearchResult>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                results,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchProvider for CountingSearch {
        async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.results.clone())
        }

        fn provider_name(&self) -> &'static str {
            "counting"
        }
    }

    fn selection(provider: &MockProvider) -> ModelSelection {
        ModelSelection::new("mock-model", Arc::new(provider.clone()))
    }

    async fn drain(mut stream: ResponseStream) -> (String, Vec<Source>, Option<ColloquyError>) {
        let mut text = String::new();
        let mut sources = vec![];
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    if let Some(t) = fragment.text {
                        text.push_str(&t);
                    }
                    if let Some(s) = fragment.sources {
                        sources.extend(s);
                    }
                }
                Err(e) => return (text, sources, Some(e)),
            }
        }
        (text, sources, None)
    }

    #[tokio::test]
    async fn test_generate_simple_exchange() {
        let provider = MockProvider::new();
        provider.queue_stream(vec![ScriptedFragment::Text("4".to_string())]);

        let orchestrator = Orchestrator::new(GenerationConfig::default());
        let history = vec![Message::assistant("Hi")];
        let stream = orchestrator.generate(&history, "What's 2+2?", false, &selection(&provider));

        let (text, sources, error) = drain(stream).await;
        assert_eq!(text, "4");
        assert!(sources.is_empty());
        assert!(error.is_none());

        // The window carried the prior turn and the appended user turn
        let request = provider.last_request().unwrap();
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::Assistant);
        assert_eq!(request.messages[0].content, "Hi");
        assert_eq!(request.messages[1].role, Role::User);
        assert_eq!(request.messages[1].content, "What's 2+2?");
        assert!(!request.web_search);
    }

    #[tokio::test]
    async fn test_generate_dedups_sources_across_fragments() {
        let provider = MockProvider::new();
        provider.queue_stream(vec![
            ScriptedFragment::Sources(vec![Source::new("X", "http://a").with_snippet("s")]),
            ScriptedFragment::Text("answer".to_string()),
            ScriptedFragment::Sources(vec![Source::new("X", "http://a").with_snippet("s")]),
        ]);

        let orchestrator = Orchestrator::new(GenerationConfig::default());
        let stream = orchestrator.generate(&[], "question", false, &selection(&provider));

        let (text, sources, error) = drain(stream).await;
        assert_eq!(text, "answer");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].uri, "http://a");
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn test_fallback_exactly_once_on_stream_failure() {
        let provider = MockProvider::new();
        provider.queue_stream_open_failure("connection reset");
        provider.queue_completion("ok", vec![]);

        let orchestrator = Orchestrator::new(GenerationConfig::default());
        let stream = orchestrator.generate(&[], "question", false, &selection(&provider));

        let (text, _, error) = drain(stream).await;
        assert_eq!(text, "ok");
        assert!(error.is_none());
        assert_eq!(provider.stream_call_count(), 1);
        assert_eq!(provider.complete_call_count(), 1);
    }

    #[tokio::test]
    async fn test_fallback_after_partial_stream_keeps_partial_text() {
        let provider = MockProvider::new();
        provider.queue_stream(vec![
            ScriptedFragment::Text("partial ".to_string()),
            ScriptedFragment::Error("connection reset".to_string()),
        ]);
        provider.queue_completion("complete answer", vec![]);

        let orchestrator = Orchestrator::new(GenerationConfig::default());
        let stream = orchestrator.generate(&[], "question", false, &selection(&provider));

        let (text, _, error) = drain(stream).await;
        // Partial text stays visible; the fallback text follows it
        assert_eq!(text, "partial complete answer");
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn test_fallback_sources_pass_dedup() {
        let provider = MockProvider::new();
        provider.queue_stream(vec![
            ScriptedFragment::Sources(vec![Source::new("A", "http://a")]),
            ScriptedFragment::Error("connection reset".to_string()),
        ]);
        provider.queue_completion(
            "text",
            vec![Source::new("A", "http://a"), Source::new("B", "http://b")],
        );

        let orchestrator = Orchestrator::new(GenerationConfig::default());
        let stream = orchestrator.generate(&[], "question", false, &selection(&provider));

        let (_, sources, error) = drain(stream).await;
        assert!(error.is_none());
        let uris: Vec<_> = sources.iter().map(|s| s.uri.as_str()).collect();
        assert_eq!(uris, vec!["http://a", "http://b"]);
    }

    #[tokio::test]
    async fn test_final_failure_when_fallback_fails() {
        let provider = MockProvider::new();
        provider.queue_stream_open_failure("connection reset");
        provider.queue_completion_failure("backend down");

        let orchestrator = Orchestrator::new(GenerationConfig::default());
        let stream = orchestrator.generate(&[], "question", false, &selection(&provider));

        let (_, _, error) = drain(stream).await;
        assert!(error.is_some());
        // Exactly one fallback attempt, no retry loop
        assert_eq!(provider.stream_call_count(), 1);
        assert_eq!(provider.complete_call_count(), 1);
    }

    #[tokio::test]
    async fn test_rejection_skips_fallback() {
        let provider = MockProvider::new();
        provider.queue_stream_open_rejection("mock-model-99");

        let orchestrator = Orchestrator::new(GenerationConfig::default());
        let stream = orchestrator.generate(&[], "question", false, &selection(&provider));

        let (_, _, error) = drain(stream).await;
        match error {
            Some(ColloquyError::Api(ApiError::ModelNotFound(_))) => {}
            other => panic!("Expected ModelNotFound, got {other:?}"),
        }
        assert_eq!(provider.complete_call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_triggers_fallback() {
        let provider = MockProvider::new();
        provider.queue_stream_hang();
        provider.queue_completion("recovered", vec![]);

        let orchestrator = Orchestrator::new(GenerationConfig::default());
        let stream = orchestrator.generate(&[], "question", false, &selection(&provider));

        let (text, _, error) = drain(stream).await;
        assert_eq!(text, "recovered");
        assert!(error.is_none());
        assert_eq!(provider.complete_call_count(), 1);
    }

    #[tokio::test]
    async fn test_search_skipped_for_native_grounding() {
        let provider = MockProvider::new().with_native_search(true);
        provider.queue_stream(vec![ScriptedFragment::Text("grounded".to_string())]);
        let search = Arc::new(CountingSearch::new(vec![SearchResult {
            title: "X".to_string(),
            url: "http://a".to_string(),
            snippet: "s".to_string(),
            published_date: None,
        }]));

        let orchestrator =
            Orchestrator::new(GenerationConfig::default()).with_search(search.clone());
        let stream = orchestrator.generate(&[], "question", true, &selection(&provider));

        let (text, _, error) = drain(stream).await;
        assert_eq!(text, "grounded");
        assert!(error.is_none());

        // Native grounding: the external search capability is never invoked
        assert_eq!(search.call_count(), 0);
        // and the backend is asked to ground the answer itself
        assert!(provider.last_request().unwrap().web_search);
    }

    #[tokio::test]
    async fn test_search_augments_plain_provider() {
        let provider = MockProvider::new();
        provider.queue_stream(vec![ScriptedFragment::Text("answer".to_string())]);
        let search = Arc::new(CountingSearch::new(vec![SearchResult {
            title: "X".to_string(),
            url: "http://a".to_string(),
            snippet: "s".to_string(),
            published_date: None,
        }]));

        let orchestrator =
            Orchestrator::new(GenerationConfig::default()).with_search(search.clone());
        let stream = orchestrator.generate(&[], "question", true, &selection(&provider));

        let (_, _, error) = drain(stream).await;
        assert!(error.is_none());
        assert_eq!(search.call_count(), 1);

        let request = provider.last_request().unwrap();
        // Synthetic system message sits before the final user turn
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert!(request.messages[0].content.contains("http://a"));
        assert_eq!(request.messages[1].role, Role::User);
        // Upstream augmentation, not native grounding
        assert!(!request.web_search);
    }

    #[tokio::test]
    async fn test_search_not_called_when_disabled() {
        let provider = MockProvider::new();
        let search = Arc::new(CountingSearch::new(vec![]));

        let orchestrator =
            Orchestrator::new(GenerationConfig::default()).with_search(search.clone());
        let stream = orchestrator.generate(&[], "question", false, &selection(&provider));

        let (_, _, error) = drain(stream).await;
        assert!(error.is_none());
        assert_eq!(search.call_count(), 0);
    }

    #[tokio::test]
    async fn test_generate_respects_token_budget() {
        let provider = MockProvider::new();
        let mut config = GenerationConfig::default();
        config
            .token_budgets
            .insert("mock-model".to_string(), 30);

        let orchestrator = Orchestrator::new(config);
        let history = vec![
            Message::user(&"a".repeat(400)),
            Message::assistant(&"b".repeat(40)), // 10 tokens
        ];
        let stream = orchestrator.generate(&history, "short q", false, &selection(&provider));

        let (_, _, error) = drain(stream).await;
        assert!(error.is_none());

        // The 100-token first message falls out of the 30-token budget
        let request = provider.last_request().unwrap();
        assert_eq!(request.messages.len(), 2);
        assert!(request.messages[0].content.starts_with('b'));
    }

    #[tokio::test]
    async fn test_generate_title() {
        let provider = MockProvider::new();
        provider.queue_completion("\" Rust Questions \"", vec![]);

        let orchestrator = Orchestrator::new(GenerationConfig::default());
        let title = orchestrator
            .generate_title("How do lifetimes work?", &selection(&provider))
            .await
            .unwrap();

        assert_eq!(title, "Rust Questions");
        assert_eq!(provider.complete_call_count(), 1);
        assert_eq!(provider.stream_call_count(), 0);

        let request = provider.last_request().unwrap();
        assert_eq!(request.max_output_tokens, TITLE_MAX_TOKENS);
        assert!(!request.web_search);
    }

    #[tokio::test]
    async fn test_generate_title_failure_propagates() {
        let provider = MockProvider::new();
        provider.queue_completion_failure("backend down");

        let orchestrator = Orchestrator::new(GenerationConfig::default());
        let result = orchestrator
            .generate_title("How do lifetimes work?", &selection(&provider))
            .await;

        assert!(result.is_err());
    }
}
