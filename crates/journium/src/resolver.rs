// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Remote configuration fetch and reconciliation with local options.
//!
//! The remote layer is fetched once per load with a bounded retry, cached in
//! storage per project, and merged under the caller's local options. Every
//! failure here degrades to "no remote layer"; only an unusable merged
//! configuration is reported back.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use journium_core::{resolve_options, CoreError, JourniumOptions, LocalOptions, RemoteOptionsResponse};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::logger::{sdk_debug, sdk_warn, Logger};
use crate::storage::Storage;
use crate::transport::Transport;

/// Path of the remote configuration endpoint.
pub const CONFIG_PATH: &str = "/v1/configs";

/// Storage key for the cached remote configuration of a project.
pub fn config_cache_key(namespace: &str) -> String {
	format!("journium_config_{namespace}")
}

/// Retry behavior for the remote configuration fetch.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
	/// Total attempts, including the first.
	pub max_attempts: u32,
	/// Deadline for each attempt.
	pub attempt_timeout: Duration,
	/// Fixed wait between attempts.
	pub backoff: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 2,
			attempt_timeout: Duration::from_secs(15),
			backoff: Duration::from_secs(1),
		}
	}
}

/// Builds `{api_host}/v1/configs?ingestion_key={key}`.
pub fn config_url(api_host: &str, project_key: &str) -> Option<String> {
	let mut url = Url::parse(&format!("{}{CONFIG_PATH}", api_host.trim_end_matches('/'))).ok()?;
	url.query_pairs_mut().append_pair("ingestion_key", project_key);
	Some(url.into())
}

/// Issues one GET to the config endpoint.
///
/// Returns `None` on network or parse failure. Auth-style statuses are
/// always reported as a fatal unknown-key response.
pub async fn fetch_remote(
	transport: &dyn Transport,
	api_host: &str,
	project_key: &str,
) -> Option<RemoteOptionsResponse> {
	let url = config_url(api_host, project_key)?;
	let response = transport.get(&url).await.ok()?;

	let parsed = serde_json::from_str::<RemoteOptionsResponse>(&response.body);
	if matches!(response.status, 401 | 403 | 404) {
		return Some(match parsed {
			Ok(parsed) if parsed.is_fatal() => parsed,
			_ => RemoteOptionsResponse {
				success: false,
				error: Some(format!("config endpoint returned {}", response.status)),
				code: Some("invalid_ingestion_key".to_string()),
				..Default::default()
			},
		});
	}
	match parsed {
		Ok(parsed) if response.is_success() || !parsed.success => Some(parsed),
		Ok(_) => Some(RemoteOptionsResponse {
			success: false,
			error: Some(format!("config endpoint returned {}", response.status)),
			..Default::default()
		}),
		Err(_) => None,
	}
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedConfig {
	config: Map<String, Value>,
	fetched_at: String,
}

/// Reconciles remote and local configuration for one project.
pub struct OptionsResolver {
	api_host: String,
	project_key: String,
	transport: Arc<dyn Transport>,
	storage: Option<Arc<dyn Storage>>,
	policy: RetryPolicy,
	logger: Logger,
}

impl OptionsResolver {
	pub fn new(
		api_host: impl Into<String>,
		project_key: impl Into<String>,
		transport: Arc<dyn Transport>,
		storage: Option<Arc<dyn Storage>>,
		logger: Logger,
	) -> Self {
		Self {
			api_host: api_host.into(),
			project_key: project_key.into(),
			transport,
			storage,
			policy: RetryPolicy::default(),
			logger,
		}
	}

	pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
		self.policy = policy;
		self
	}

	pub async fn fetch_remote(&self) -> Option<RemoteOptionsResponse> {
		fetch_remote(self.transport.as_ref(), &self.api_host, &self.project_key).await
	}

	/// Fetches the remote layer, retrying transient failures.
	///
	/// A fatal error code stops immediately. A successful fetch is cached.
	pub async fn fetch_with_retry(&self) -> Option<Map<String, Value>> {
		let attempts = self.policy.max_attempts.max(1);
		for attempt in 1..=attempts {
			sdk_debug!(self.logger, attempt, "Fetching remote options");

			match tokio::time::timeout(self.policy.attempt_timeout, self.fetch_remote()).await {
				Ok(Some(response)) if response.success => {
					let config = response.into_config().unwrap_or_default();
					sdk_debug!(self.logger, keys = config.len(), "Remote options fetched");
					self.store_cached(&config);
					return Some(config);
				}
				Ok(Some(response)) if response.is_fatal() => {
					sdk_warn!(
						self.logger,
						code = ?response.code,
						error = ?response.error,
						"Remote options rejected the project key, not retrying"
					);
					return None;
				}
				Ok(Some(response)) => {
					sdk_debug!(self.logger, attempt, error = ?response.error, "Remote options fetch unsuccessful");
				}
				Ok(None) => {
					sdk_debug!(self.logger, attempt, "Remote options fetch failed");
				}
				Err(_) => {
					sdk_debug!(self.logger, attempt, "Remote options fetch timed out");
				}
			}

			if attempt < attempts {
				tokio::time::sleep(self.policy.backoff).await;
			}
		}
		sdk_warn!(self.logger, attempts, "Giving up on remote options");
		None
	}

	/// Last successfully fetched remote layer, if any.
	pub fn load_cached(&self) -> Option<Map<String, Value>> {
		let storage = self.storage.as_deref()?;
		let raw = match storage.get_item(&config_cache_key(&self.project_key)) {
			Ok(raw) => raw?,
			Err(e) => {
				sdk_debug!(self.logger, error = %e, "Failed to read cached options");
				return None;
			}
		};
		match serde_json::from_str::<CachedConfig>(&raw) {
			Ok(cached) => Some(cached.config),
			Err(e) => {
				sdk_debug!(self.logger, error = %e, "Cached options are malformed");
				None
			}
		}
	}

	fn store_cached(&self, config: &Map<String, Value>) {
		let Some(storage) = self.storage.as_deref() else {
			return;
		};
		let cached = CachedConfig {
			config: config.clone(),
			fetched_at: Utc::now().to_rfc3339(),
		};
		let result = serde_json::to_string(&cached)
			.map_err(|e| e.to_string())
			.and_then(|json| {
				storage
					.set_item(&config_cache_key(&self.project_key), &json)
					.map_err(|e| e.to_string())
			});
		if let Err(e) = result {
			sdk_debug!(self.logger, error = %e, "Failed to cache remote options");
		}
	}

	/// Computes effective options, dropping a remote layer that does not fit.
	pub fn merge(
		&self,
		remote: Option<&Map<String, Value>>,
		local: &LocalOptions,
	) -> Result<JourniumOptions, CoreError> {
		let options = match resolve_options(remote, local) {
			Ok(options) => options,
			Err(e) => {
				sdk_warn!(self.logger, error = %e, "Remote options are malformed, ignoring them");
				resolve_options(None, local)?
			}
		};
		options.validate()?;
		Ok(options)
	}
}
