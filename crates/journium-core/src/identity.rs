// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The persisted identity bundle for a single browser.
//!
//! A record is minted once per storage namespace. `device_id` never changes
//! after creation; `distinct_id` changes on identify and reset; `session_id`
//! rotates when the session has been idle longer than the timeout.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether the current distinct id belongs to a known user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
	Anonymous,
	Identified,
}

impl UserState {
	pub fn as_str(&self) -> &'static str {
		match self {
			UserState::Anonymous => "anonymous",
			UserState::Identified => "identified",
		}
	}
}

impl std::fmt::Display for UserState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// Identity state persisted to local storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
	pub distinct_id: String,
	pub device_id: String,
	pub session_id: String,
	/// Last activity, epoch millis.
	pub session_timestamp: i64,
	pub user_state: UserState,
}

/// Generates a time-ordered identifier.
pub fn new_id() -> String {
	Uuid::now_v7().to_string()
}

impl IdentityRecord {
	/// Mints a fresh anonymous identity.
	///
	/// One generated value seeds all three identifiers; they only need to be
	/// unique, not related.
	pub fn fresh(now_ms: i64) -> Self {
		let id = new_id();
		Self {
			distinct_id: id.clone(),
			device_id: id.clone(),
			session_id: id,
			session_timestamp: now_ms,
			user_state: UserState::Anonymous,
		}
	}

	/// Returns true if the session has been idle longer than `timeout_ms`.
	pub fn is_session_expired(&self, now_ms: i64, timeout_ms: u64) -> bool {
		let elapsed = now_ms.saturating_sub(self.session_timestamp);
		elapsed > i64::try_from(timeout_ms).unwrap_or(i64::MAX)
	}

	/// Starts a new session; user and device identity survive.
	pub fn rotate_session(&mut self, now_ms: i64) {
		self.session_id = new_id();
		self.session_timestamp = now_ms;
	}

	/// Links the current identity to a known user, returning the previous id.
	///
	/// Identifying as the current distinct id changes nothing, including the
	/// user state.
	pub fn identify(&mut self, distinct_id: impl Into<String>) -> String {
		let distinct_id = distinct_id.into();
		if distinct_id == self.distinct_id {
			return distinct_id;
		}
		let previous = std::mem::replace(&mut self.distinct_id, distinct_id);
		self.user_state = UserState::Identified;
		previous
	}

	/// Forgets the known user. The device id is kept.
	pub fn reset(&mut self, now_ms: i64) {
		self.distinct_id = new_id();
		self.user_state = UserState::Anonymous;
		self.rotate_session(now_ms);
	}

	pub fn is_identified(&self) -> bool {
		self.user_state == UserState::Identified
	}
}
