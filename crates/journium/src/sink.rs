// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde_json::{Map, Value};

/// Receives events derived by the pageview tracker and autocapture engine.
///
/// The client implements this by routing into its own `track`, so derived
/// events go through staging and identity stamping like any other.
pub trait EventSink: Send + Sync {
	fn capture(&self, event: &str, properties: Map<String, Value>);
}
