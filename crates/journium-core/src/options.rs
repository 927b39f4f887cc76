// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SDK options and the three-layer merge.
//!
//! Effective options are computed from built-in defaults, the remote
//! (server-fetched) configuration and the caller's local configuration.
//! For any key present in more than one layer, local beats remote and remote
//! beats defaults. Object values present in both layers merge one level deep;
//! scalars and arrays are replaced wholesale.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};

/// Default event-count threshold that triggers a flush.
pub const DEFAULT_FLUSH_AT: usize = 20;
/// Default flush timer period.
pub const DEFAULT_FLUSH_INTERVAL_MS: i64 = 10_000;
/// Default idle time after which a session rotates.
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 30 * 60 * 1000;

/// Per-category autocapture switches, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocaptureOptions {
	pub capture_clicks: bool,
	pub capture_form_submits: bool,
	pub capture_form_changes: bool,
	pub capture_text_selection: bool,
	pub capture_content_text: bool,
	pub ignore_classes: Vec<String>,
	pub ignore_elements: Vec<String>,
}

impl Default for AutocaptureOptions {
	fn default() -> Self {
		Self {
			capture_clicks: true,
			capture_form_submits: true,
			capture_form_changes: true,
			capture_text_selection: false,
			capture_content_text: true,
			ignore_classes: vec!["journium-ignore".to_string(), "journium-no-capture".to_string()],
			ignore_elements: vec!["script".to_string(), "style".to_string(), "noscript".to_string()],
		}
	}
}

impl AutocaptureOptions {
	/// Every category switched off.
	pub fn disabled() -> Self {
		Self {
			capture_clicks: false,
			capture_form_submits: false,
			capture_form_changes: false,
			capture_text_selection: false,
			..Self::default()
		}
	}

	/// Returns true if at least one listener category is enabled.
	pub fn any_enabled(&self) -> bool {
		self.capture_clicks
			|| self.capture_form_submits
			|| self.capture_form_changes
			|| self.capture_text_selection
	}
}

/// Partial autocapture configuration, as supplied remotely or locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocaptureConfig {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub capture_clicks: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub capture_form_submits: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub capture_form_changes: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub capture_text_selection: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub capture_content_text: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ignore_classes: Option<Vec<String>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ignore_elements: Option<Vec<String>>,
}

impl AutocaptureConfig {
	/// Fills unset keys from [`AutocaptureOptions::default`].
	pub fn resolve(&self) -> AutocaptureOptions {
		let defaults = AutocaptureOptions::default();
		AutocaptureOptions {
			capture_clicks: self.capture_clicks.unwrap_or(defaults.capture_clicks),
			capture_form_submits: self
				.capture_form_submits
				.unwrap_or(defaults.capture_form_submits),
			capture_form_changes: self
				.capture_form_changes
				.unwrap_or(defaults.capture_form_changes),
			capture_text_selection: self
				.capture_text_selection
				.unwrap_or(defaults.capture_text_selection),
			capture_content_text: self
				.capture_content_text
				.unwrap_or(defaults.capture_content_text),
			ignore_classes: self.ignore_classes.clone().unwrap_or(defaults.ignore_classes),
			ignore_elements: self
				.ignore_elements
				.clone()
				.unwrap_or(defaults.ignore_elements),
		}
	}
}

/// The `autocapture` option: a master switch or per-category settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AutocaptureSetting {
	Enabled(bool),
	Custom(AutocaptureConfig),
}

impl Default for AutocaptureSetting {
	fn default() -> Self {
		AutocaptureSetting::Enabled(true)
	}
}

impl AutocaptureSetting {
	pub fn resolve(&self) -> AutocaptureOptions {
		match self {
			AutocaptureSetting::Enabled(true) => AutocaptureOptions::default(),
			AutocaptureSetting::Enabled(false) => AutocaptureOptions::disabled(),
			AutocaptureSetting::Custom(config) => config.resolve(),
		}
	}
}

impl From<bool> for AutocaptureSetting {
	fn from(enabled: bool) -> Self {
		AutocaptureSetting::Enabled(enabled)
	}
}

impl From<AutocaptureConfig> for AutocaptureSetting {
	fn from(config: AutocaptureConfig) -> Self {
		AutocaptureSetting::Custom(config)
	}
}

/// Effective options governing runtime behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JourniumOptions {
	pub debug: bool,
	/// Event-count threshold that triggers an immediate flush.
	pub flush_at: usize,
	/// Flush timer period in millis. Zero or negative disables the timer.
	pub flush_interval: i64,
	pub autocapture: AutocaptureSetting,
	pub auto_track_pageviews: bool,
	/// Session idle timeout in millis.
	pub session_timeout: u64,
}

impl Default for JourniumOptions {
	fn default() -> Self {
		Self {
			debug: false,
			flush_at: DEFAULT_FLUSH_AT,
			flush_interval: DEFAULT_FLUSH_INTERVAL_MS,
			autocapture: AutocaptureSetting::default(),
			auto_track_pageviews: true,
			session_timeout: DEFAULT_SESSION_TIMEOUT_MS,
		}
	}
}

impl JourniumOptions {
	/// Serializes the options into a merge layer.
	pub fn to_layer(&self) -> Map<String, Value> {
		match serde_json::to_value(self) {
			Ok(Value::Object(map)) => map,
			_ => Map::new(),
		}
	}

	/// Rejects configurations the SDK cannot run with.
	pub fn validate(&self) -> Result<()> {
		if self.flush_at == 0 {
			return Err(CoreError::InvalidOptions("flushAt must be at least 1".to_string()));
		}
		if self.session_timeout == 0 {
			return Err(CoreError::InvalidOptions(
				"sessionTimeout must be positive".to_string(),
			));
		}
		Ok(())
	}

	pub fn autocapture_options(&self) -> AutocaptureOptions {
		self.autocapture.resolve()
	}

	pub fn flush_timer_enabled(&self) -> bool {
		self.flush_interval > 0
	}
}

/// Caller-supplied options. Only keys that are set take part in the merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalOptions {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub debug: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub flush_at: Option<usize>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub flush_interval: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub autocapture: Option<AutocaptureSetting>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub auto_track_pageviews: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_timeout: Option<u64>,
}

impl LocalOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn debug(mut self, debug: bool) -> Self {
		self.debug = Some(debug);
		self
	}

	pub fn flush_at(mut self, flush_at: usize) -> Self {
		self.flush_at = Some(flush_at);
		self
	}

	pub fn flush_interval(mut self, flush_interval_ms: i64) -> Self {
		self.flush_interval = Some(flush_interval_ms);
		self
	}

	pub fn autocapture(mut self, setting: impl Into<AutocaptureSetting>) -> Self {
		self.autocapture = Some(setting.into());
		self
	}

	pub fn auto_track_pageviews(mut self, enabled: bool) -> Self {
		self.auto_track_pageviews = Some(enabled);
		self
	}

	pub fn session_timeout(mut self, timeout_ms: u64) -> Self {
		self.session_timeout = Some(timeout_ms);
		self
	}

	/// Serializes the set keys into a merge layer.
	pub fn to_layer(&self) -> Map<String, Value> {
		match serde_json::to_value(self) {
			Ok(Value::Object(map)) => map,
			_ => Map::new(),
		}
	}
}

/// Merges `defaults < remote < local`.
pub fn merge_layers(
	defaults: &Map<String, Value>,
	remote: &Map<String, Value>,
	local: &Map<String, Value>,
) -> Map<String, Value> {
	let mut merged = defaults.clone();
	for layer in [remote, local] {
		for (key, value) in layer {
			match (merged.get_mut(key), value) {
				(Some(Value::Object(existing)), Value::Object(incoming)) => {
					for (inner_key, inner_value) in incoming {
						existing.insert(inner_key.clone(), inner_value.clone());
					}
				}
				_ => {
					merged.insert(key.clone(), value.clone());
				}
			}
		}
	}
	merged
}

/// Computes effective options from an optional remote layer and local options.
///
/// A remote layer whose values do not fit the option types is an error; the
/// caller decides whether to retry without it.
pub fn resolve_options(
	remote: Option<&Map<String, Value>>,
	local: &LocalOptions,
) -> Result<JourniumOptions> {
	let empty = Map::new();
	let merged = merge_layers(
		&JourniumOptions::default().to_layer(),
		remote.unwrap_or(&empty),
		&local.to_layer(),
	);
	let options: JourniumOptions = serde_json::from_value(Value::Object(merged))?;
	Ok(options)
}
