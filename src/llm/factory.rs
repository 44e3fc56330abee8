// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider factory
//!
//! Maps a provider configuration to its adapter. The mapping is total over
//! `ProviderKind` and runs once at configuration time; generation calls never
//! re-branch on the provider kind.

use std::sync::Arc;

use crate::error::{ColloquyError, Result};
use crate::llm::provider::{ChatProvider, ProviderConfig, ProviderKind};
use crate::llm::providers::{GeminiProvider, OpenAiProvider};

/// Factory for creating chat providers
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create the adapter for a provider configuration
    ///
    /// # Returns
    /// An Arc-wrapped adapter instance
    pub fn create(config: &ProviderConfig) -> Result<Arc<dyn ChatProvider>> {
        if config.api_key.is_empty() {
            return Err(ColloquyError::Config(format!(
                "No API key configured for provider {:?}",
                config.kind
            )));
        }

        let provider: Arc<dyn ChatProvider> = match config.kind {
            ProviderKind::Gemini => match &config.base_url {
                Some(base_url) => Arc::new(GeminiProvider::with_base_url(&config.api_key, base_url)),
                None => Arc::new(GeminiProvider::new(&config.api_key)),
            },
            ProviderKind::OpenAiCompatible => match &config.base_url {
                Some(base_url) => Arc::new(OpenAiProvider::with_base_url(&config.api_key, base_url)),
                None => Arc::new(OpenAiProvider::new(&config.api_key)),
            },
        };

        Ok(provider)
    }

    /// List all supported provider kinds
    pub fn supported_kinds() -> &'static [ProviderKind] {
        &[ProviderKind::Gemini, ProviderKind::OpenAiCompatible]
    }
}
