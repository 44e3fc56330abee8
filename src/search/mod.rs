// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Web search capability
//!
//! A black-box search interface plus the augmentation step that injects
//! results into a conversation before generation. Used only when the
//! selected provider lacks native search grounding.

pub mod augment;
pub mod brave;

pub use augment::augment;
pub use brave::BraveSearch;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::llm::message::Source;

/// A single web search result
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResult {
    /// Title of the search result
    pub title: String,
    /// URL of the result
    pub url: String,
    /// Snippet/description of the result
    pub snippet: String,
    /// Publication date, if available
    pub published_date: Option<String>,
}

impl From<SearchResult> for Source {
    fn from(result: SearchResult) -> Self {
        Source {
            title: result.title,
            uri: result.url,
            snippet: if result.snippet.is_empty() {
                None
            } else {
                Some(result.snippet)
            },
        }
    }
}

/// Trait for search providers
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Execute a search query, returning at most `max_results` results
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;

    /// Get the provider name for logging
    fn provider_name(&self) -> &'static str;
}
