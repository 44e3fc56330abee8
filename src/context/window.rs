// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Context window selection
//!
//! Bounds the conversation history sent to a backend under a per-model token
//! budget. Pure functions; the budget itself is a policy input chosen by the
//! caller (see `config::Settings::token_budget`).

use crate::llm::message::Message;

/// Estimate the token cost of a message from its character length.
///
/// Uses the ~4 characters per token approximation, rounded up. Sources are
/// not counted; they are emitted alongside responses, never sent back.
pub fn estimate_tokens(message: &Message) -> u32 {
    message.content.len().div_ceil(4) as u32
}

/// Select the suffix of `history` that fits within `max_tokens`.
///
/// Walks from the most recent message backward, accumulating estimated cost,
/// and stops before adding a message that would exceed the budget. The single
/// most recent message is always kept, even when it alone exceeds the budget,
/// so a non-empty history always yields a non-empty window. Messages are
/// returned in their original chronological order.
pub fn select_window(history: &[Message], max_tokens: u32) -> Vec<Message> {
    let mut kept: Vec<Message> = Vec::new();
    let mut total = 0_u32;

    for message in history.iter().rev() {
        let cost = estimate_tokens(message);
        if !kept.is_empty() && total + cost > max_tokens {
            break;
        }
        total += cost;
        kept.push(message.clone());
    }

    kept.reverse();
    kept
}
