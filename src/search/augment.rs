// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Search augmentation
//!
//! Injects web search results as a synthetic system message before
//! generation, for providers without native search grounding. Search
//! failure never aborts generation; it degrades to an ungrounded response.

use chrono::Utc;

use crate::llm::message::Message;
use crate::search::{SearchProvider, SearchResult};

/// Maximum number of results injected into the context
pub const MAX_SEARCH_RESULTS: usize = 5;

/// Augment `messages` with web search results for `query`.
///
/// Performs one search call and, on success with non-empty results, inserts
/// one synthetic system message immediately before the final user message.
/// On empty results or search failure the input is returned unchanged.
///
/// Must not be called for providers with native grounding; the orchestrator
/// skips this step entirely in that case.
pub async fn augment(
    messages: Vec<Message>,
    query: &str,
    provider: &dyn SearchProvider,
) -> Vec<Message> {
    let results = match provider.search(query, MAX_SEARCH_RESULTS).await {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!(
                target: "colloquy.search",
                provider = provider.provider_name(),
                error = %e,
                "search failed; continuing without web context"
            );
            return messages;
        }
    };

    if results.is_empty() {
        tracing::debug!(
            target: "colloquy.search",
            provider = provider.provider_name(),
            "search returned no results; continuing without web context"
        );
        return messages;
    }

    insert_context_message(messages, build_context_message(query, &results))
}

/// Build the synthetic system message embedding the search results
fn build_context_message(query: &str, results: &[SearchResult]) -> Message {
    let mut content = format!(
        "Today's date is {}.\n\
         Web search was performed for the user's question and the results \
         below are current and authoritative. Use them to answer, and prefer \
         them over prior knowledge when they disagree.\n\n\
         Search query: {query}\n\nResults:\n",
        Utc::now().format("%Y-%m-%d")
    );

    for (i, result) in results.iter().enumerate() {
        content.push_str(&format!("{}. {}\n", i + 1, result.title));
        if !result.snippet.is_empty() {
            content.push_str(&format!("   {}\n", result.snippet));
        }
        content.push_str(&format!("   {}\n", result.url));
    }

    Message::system(content)
}

/// Insert the context message immediately before the final user message
///
/// Falls back to appending when no user message exists (the window always
/// ends with the new user turn in practice).
fn insert_context_message(mut messages: Vec<Message>, context: Message) -> Vec<Message> {
    use crate::llm::message::Role;

    let position = messages
        .iter()
        .rposition(|m| m.role == Role::User)
        .unwrap_or(messages.len());
    messages.insert(position, context);
    messages
}
