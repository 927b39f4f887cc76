// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event types sent to the ingestion endpoint.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Names starting with this marker are generated by the SDK itself.
pub const RESERVED_EVENT_PREFIX: &str = "$";
pub const PAGEVIEW_EVENT: &str = "$pageview";
pub const AUTOCAPTURE_EVENT: &str = "$autocapture";
pub const IDENTIFY_EVENT: &str = "$identify";

/// A single captured event, as queued and as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourniumEvent {
	pub uuid: String,
	pub ingestion_key: String,
	/// Capture time, ISO-8601.
	pub client_timestamp: String,
	pub event: String,
	#[serde(default)]
	pub properties: Map<String, Value>,
}

impl JourniumEvent {
	pub fn new(
		ingestion_key: impl Into<String>,
		event: impl Into<String>,
		properties: Map<String, Value>,
		captured_at: DateTime<Utc>,
	) -> Self {
		Self {
			uuid: Uuid::now_v7().to_string(),
			ingestion_key: ingestion_key.into(),
			client_timestamp: captured_at.to_rfc3339_opts(SecondsFormat::Millis, true),
			event: event.into(),
			properties,
		}
	}

}

/// Request body for the ingestion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestPayload {
	pub events: Vec<JourniumEvent>,
}
