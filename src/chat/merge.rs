// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming response merging
//!
//! Normalizes the raw fragment stream for the caller: text deltas pass
//! through immediately and unbuffered, sources are deduplicated by URI
//! within one generation call. Fragments keep the backend's production
//! order; text and sources may interleave either way.

use std::collections::HashSet;

use crate::llm::message::Source;
use crate::llm::provider::{RawFragment, ResponseFragment};

/// Tracks source URIs already yielded during one generation call.
///
/// Reset at the start of every call, never shared across calls or sessions.
#[derive(Debug, Default)]
pub struct SourceTracker {
    seen: HashSet<String>,
}

impl SourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter out sources whose URI has already been yielded this call
    pub fn filter_new(&mut self, sources: Vec<Source>) -> Vec<Source> {
        sources
            .into_iter()
            .filter(|s| self.seen.insert(s.uri.clone()))
            .collect()
    }

    /// Number of distinct URIs yielded so far
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Merge one raw fragment into the caller-facing form.
///
/// Returns `None` when the fragment reduces to nothing (empty, or all of its
/// sources were already yielded).
pub fn merge_fragment(raw: RawFragment, tracker: &mut SourceTracker) -> Option<ResponseFragment> {
    let text = raw.text.filter(|t| !t.is_empty());

    let sources = if raw.sources.is_empty() {
        None
    } else {
        let new = tracker.filter_new(raw.sources);
        if new.is_empty() {
            None
        } else {
            Some(new)
        }
    };

    if text.is_none() && sources.is_none() {
        return None;
    }

    Some(ResponseFragment { text, sources })
}
