// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Colloquy
//!
//! This module defines all error types used throughout the application.

use thiserror::Error;

/// Main error type for Colloquy operations
#[derive(Error, Debug)]
pub enum ColloquyError {
    /// API-related errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Search-related errors
    #[error("Search error: {0}")]
    Search(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// API-specific error types
///
/// Backend rejections (authentication, unknown model, quota, rate limit) are
/// never retried by the orchestrator; transport failures mid-stream trigger
/// the single non-streaming fallback.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Authentication or authorization rejected by the backend
    #[error("Permission denied: invalid or unauthorized API key")]
    PermissionDenied,

    /// Requested model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Plan or billing quota exhausted
    #[error("Quota exceeded for this API key")]
    QuotaExceeded,

    /// Rate limited by the API
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u32),

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// API returned an error
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Timeout waiting for stream activity
    #[error("Request timed out")]
    Timeout,

    /// Streaming error
    #[error("Streaming error: {0}")]
    StreamError(String),
}

impl ApiError {
    /// Whether this error is a classified backend rejection that a fallback
    /// attempt cannot change.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ApiError::PermissionDenied
                | ApiError::ModelNotFound(_)
                | ApiError::QuotaExceeded
                | ApiError::RateLimited(_)
        )
    }
}

/// Result type alias for Colloquy operations
pub type Result<T> = std::result::Result<T, ColloquyError>;

impl From<toml::de::Error> for ColloquyError {
    fn from(err: toml::de::Error) -> Self {
        ColloquyError::Toml(err.to_string())
    }
}

impl From<toml::ser::Error> for ColloquyError {
    fn from(err: toml::ser::Error) -> Self {
        ColloquyError::Toml(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_search() {
        let err = ColloquyError::Search("provider unreachable".to_string());
        assert!(err.to_string().contains("Search error"));
        assert!(err.to_string().contains("provider unreachable"));
    }

    #[test]
    fn test_error_config() {
        let err = ColloquyError::Config("bad config".to_string());
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_toml() {
        let err = ColloquyError::Toml("parse error".to_string());
        assert!(err.to_string().contains("TOML error"));
    }

    #[test]
    fn test_error_invalid_input() {
        let err = ColloquyError::InvalidInput("bad input".to_string());
        assert!(err.to_string().contains("Invalid input"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ColloquyError = io_err.into();
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_api_error_permission_denied() {
        let err = ApiError::PermissionDenied;
        assert!(err.to_string().contains("Permission denied"));
    }

    #[test]
    fn test_api_error_model_not_found() {
        let err = ApiError::ModelNotFound("gpt-99".to_string());
        assert!(err.to_string().contains("Model not found"));
        assert!(err.to_string().contains("gpt-99"));
    }

    #[test]
    fn test_api_error_quota_exceeded() {
        let err = ApiError::QuotaExceeded;
        assert!(err.to_string().contains("Quota exceeded"));
    }

    #[test]
    fn test_api_error_rate_limited() {
        let err = ApiError::RateLimited(30);
        assert!(err.to_string().contains("Rate limited"));
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn test_api_error_network() {
        let err = ApiError::Network("connection refused".to_string());
        assert!(err.to_string().contains("Network error"));
    }

    #[test]
    fn test_api_error_server_error() {
        let err = ApiError::ServerError {
            status: 500,
            message: "internal server error".to_string(),
        };
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("internal server error"));
    }

    #[test]
    fn test_api_error_timeout() {
        let err = ApiError::Timeout;
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_api_error_stream_error() {
        let err = ApiError::StreamError("stream closed".to_string());
        assert!(err.to_string().contains("Streaming error"));
    }

    #[test]
    fn test_is_rejection() {
        assert!(ApiError::PermissionDenied.is_rejection());
        assert!(ApiError::ModelNotFound("m".to_string()).is_rejection());
        assert!(ApiError::QuotaExceeded.is_rejection());
        assert!(ApiError::RateLimited(10).is_rejection());

        assert!(!ApiError::Network("down".to_string()).is_rejection());
        assert!(!ApiError::Timeout.is_rejection());
        assert!(!ApiError::StreamError("eof".to_string()).is_rejection());
        assert!(!ApiError::ServerError {
            status: 500,
            message: "oops".to_string()
        }
        .is_rejection());
    }

    #[test]
    fn test_error_from_api_error() {
        let api_err = ApiError::PermissionDenied;
        let err: ColloquyError = api_err.into();
        assert!(err.to_string().contains("API error"));
    }

    #[test]
    fn test_result_type_alias() {
        fn test_fn() -> Result<i32> {
            Ok(42)
        }

        assert_eq!(test_fn().unwrap(), 42);
    }
}
