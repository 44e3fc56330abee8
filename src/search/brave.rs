// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Brave Search API provider
//!
//! Requires an API key from <https://brave.com/search/api/>.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{ColloquyError, Result};
use crate::search::{SearchProvider, SearchResult};

const BRAVE_API_URL: &str = "https://api.search.brave.com/res/v1/web/search";

/// Brave Search API provider
#[derive(Clone)]
pub struct BraveSearch {
    client: Client,
    api_key: String,
    base_url: String,
}

impl BraveSearch {
    /// Create a new Brave Search provider
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: BRAVE_API_URL.to_string(),
        }
    }

    /// Create with a custom endpoint
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

/// Brave Search API response structures
mod brave_api {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct BraveSearchResponse {
        pub web: Option<BraveWebResults>,
    }

    #[derive(Debug, Deserialize)]
    pub struct BraveWebResults {
        #[serde(default)]
        pub results: Vec<BraveWebResult>,
    }

    #[derive(Debug, Deserialize)]
    pub struct BraveWebResult {
        pub title: String,
        pub url: String,
        pub description: Option<String>,
        pub age: Option<String>,
    }
}

#[async_trait]
impl SearchProvider for BraveSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .get(&self.base_url)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[
                ("q", query),
                ("count", &max_results.to_string()),
                ("text_decorations", "false"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ColloquyError::Search(format!(
                "Brave Search API error: {status} - {body}"
            )));
        }

        let brave_response: brave_api::BraveSearchResponse = response
            .json()
            .await
            .map_err(|e| ColloquyError::Search(format!("invalid Brave response: {e}")))?;

        let results = brave_response
            .web
            .map(|web| {
                web.results
                    .into_iter()
                    .take(max_results)
                    .map(|r| SearchResult {
                        title: r.title,
                        url: r.url,
                        snippet: r.description.unwrap_or_default(),
                        published_date: r.age,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(results)
    }

    fn provider_name(&self) -> &'static str {
        "brave"
    }
}
