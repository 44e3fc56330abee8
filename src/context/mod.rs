// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Context management for generation calls

pub mod window;

pub use window::{estimate_tokens, select_window};
