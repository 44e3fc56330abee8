// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Application settings
//!
//! Loaded from `settings.toml` in the user config directory, with API keys
//! resolvable from environment variables. The orchestrator reads provider
//! configuration; it never persists anything here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{ColloquyError, Result};
use crate::llm::provider::{ProviderConfig, ProviderKind};

/// Top-level application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Default provider/model selection
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Provider credentials and endpoints
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Web search credentials
    #[serde(default)]
    pub search: SearchSettings,

    /// Generation tuning
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Default provider and model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Provider name: "gemini" or "openai"
    #[serde(default = "default_provider")]
    pub provider: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
        }
    }
}

/// Per-provider settings blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "ProviderSettings::gemini_defaults")]
    pub gemini: ProviderSettings,

    #[serde(default = "ProviderSettings::openai_defaults")]
    pub openai: ProviderSettings,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            gemini: ProviderSettings::gemini_defaults(),
            openai: ProviderSettings::openai_defaults(),
        }
    }
}

/// Settings for one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// API key stored directly in the settings file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable to read the API key from when not stored
    pub api_key_env: String,

    /// Override the default API endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model used when the caller does not pick one
    pub default_model: String,
}

impl ProviderSettings {
    fn gemini_defaults() -> Self {
        Self {
            api_key: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: None,
            default_model: "gemini-2.0-flash".to_string(),
        }
    }

    fn openai_defaults() -> Self {
        Self {
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            default_model: "gpt-4o-mini".to_string(),
        }
    }

    /// Resolve the API key: explicit value first, then environment
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.is_empty())
    }
}

/// Web search credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// API key stored directly in the settings file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable to read the API key from when not stored
    #[serde(default = "default_search_api_key_env")]
    pub api_key_env: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_search_api_key_env(),
        }
    }
}

impl SearchSettings {
    /// Resolve the API key: explicit value first, then environment
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.is_empty())
    }
}

/// Generation tuning and per-model token budget policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum tokens in a generated response
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Wall-clock bound on the streaming attempt, to the first sign of
    /// stream activity
    #[serde(default = "default_stream_timeout_secs")]
    pub stream_timeout_secs: u64,

    /// Context budget used when a model has no specific entry
    #[serde(default = "default_token_budget")]
    pub default_token_budget: u32,

    /// Per-model context budget overrides
    #[serde(default)]
    pub token_budgets: HashMap<String, u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
            stream_timeout_secs: default_stream_timeout_secs(),
            default_token_budget: default_token_budget(),
            token_budgets: HashMap::new(),
        }
    }
}

/// Built-in budgets for known model families, matched by prefix.
/// Large-context models get a larger window; everything else falls back to
/// the conservative default.
const FAMILY_BUDGETS: &[(&str, u32)] = &[
    ("gemini-2", 500_000),
    ("gemini-1.5", 500_000),
    ("gpt-4o", 100_000),
];

impl GenerationConfig {
    /// The context token budget for a model
    ///
    /// Explicit override first, then the built-in family table, then the
    /// conservative default.
    pub fn token_budget(&self, model: &str) -> u32 {
        if let Some(budget) = self.token_budgets.get(model) {
            return *budget;
        }
        for (prefix, budget) in FAMILY_BUDGETS {
            if model.starts_with(prefix) {
                return *budget;
            }
        }
        self.default_token_budget
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_search_api_key_env() -> String {
    "BRAVE_SEARCH_API_KEY".to_string()
}

fn default_max_output_tokens() -> u32 {
    8192
}

fn default_temperature() -> f32 {
    0.7
}

fn default_stream_timeout_secs() -> u64 {
    30
}

fn default_token_budget() -> u32 {
    30_000
}

impl Settings {
    /// Path to the settings file
    pub fn config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| ColloquyError::Config("No config directory found".to_string()))?;
        Ok(dir.join("colloquy").join("settings.toml"))
    }

    /// Load settings from the config file, or defaults when absent
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load settings from a specific path, or defaults when absent
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&contents)?;
        Ok(settings)
    }

    /// Save settings to a specific path
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Build the provider configuration for a provider kind
    pub fn provider_config(&self, kind: ProviderKind) -> Result<ProviderConfig> {
        let settings = match kind {
            ProviderKind::Gemini => &self.providers.gemini,
            ProviderKind::OpenAiCompatible => &self.providers.openai,
        };

        let api_key = settings.resolve_api_key().ok_or_else(|| {
            ColloquyError::Config(format!(
                "No API key found for {kind:?}. Set {} or add it to settings.toml.",
                settings.api_key_env
            ))
        })?;

        Ok(ProviderConfig {
            kind,
            api_key,
            base_url: settings.base_url.clone(),
        })
    }
}
