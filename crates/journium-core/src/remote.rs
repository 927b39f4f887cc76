// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Response payload of the remote configuration endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error codes after which retrying the fetch is pointless.
pub const FATAL_ERROR_CODES: &[&str] = &["invalid_ingestion_key", "ingestion_key_not_found"];

/// `GET /v1/configs` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteOptionsResponse {
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub config: Option<Map<String, Value>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timestamp: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<String>,
}

impl RemoteOptionsResponse {
	/// Returns true if the server rejected the project key outright.
	pub fn is_fatal(&self) -> bool {
		!self.success
			&& self
				.code
				.as_deref()
				.is_some_and(|code| FATAL_ERROR_CODES.contains(&code))
	}

	/// The usable config layer, if the fetch succeeded.
	pub fn into_config(self) -> Option<Map<String, Value>> {
		if self.success {
			Some(self.config.unwrap_or_default())
		} else {
			None
		}
	}
}
