// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity and session lifecycle, persisted per project.

use std::sync::Arc;

use chrono::Utc;
use journium_core::{IdentityRecord, UserAgentInfo};

use crate::logger::{sdk_debug, sdk_warn, Logger};
use crate::storage::Storage;

/// Storage key for the identity record of a project.
pub fn identity_storage_key(namespace: &str) -> String {
	format!("journium_identity_{namespace}")
}

/// Owns the identity record and keeps storage in sync with it.
///
/// Storage failures never propagate: the manager keeps working from memory
/// and logs a warning.
pub struct IdentityManager {
	record: IdentityRecord,
	storage: Option<Arc<dyn Storage>>,
	storage_key: String,
	session_timeout_ms: u64,
	logger: Logger,
}

impl IdentityManager {
	/// Loads or mints the identity for `namespace`.
	pub fn initialize(
		storage: Option<Arc<dyn Storage>>,
		namespace: &str,
		session_timeout_ms: u64,
		logger: Logger,
	) -> Self {
		Self::initialize_at(
			storage,
			namespace,
			session_timeout_ms,
			logger,
			Utc::now().timestamp_millis(),
		)
	}

	pub(crate) fn initialize_at(
		storage: Option<Arc<dyn Storage>>,
		namespace: &str,
		session_timeout_ms: u64,
		logger: Logger,
		now_ms: i64,
	) -> Self {
		let storage_key = identity_storage_key(namespace);
		if storage.is_none() {
			sdk_warn!(logger, "No storage available, identity will not persist across loads");
		}

		let record = match storage.as_deref().and_then(|s| load_record(s, &storage_key, &logger)) {
			Some(mut record) => {
				if record.is_session_expired(now_ms, session_timeout_ms) {
					sdk_debug!(logger, previous_session = %record.session_id, "Session expired, rotating");
					record.rotate_session(now_ms);
				}
				record
			}
			None => {
				let record = IdentityRecord::fresh(now_ms);
				sdk_debug!(logger, device_id = %record.device_id, "Minted new identity");
				record
			}
		};

		let manager = Self {
			record,
			storage,
			storage_key,
			session_timeout_ms,
			logger,
		};
		manager.persist();
		manager
	}

	pub fn identity(&self) -> &IdentityRecord {
		&self.record
	}

	/// Replaces the distinct id and returns the previous one.
	pub fn identify(&mut self, distinct_id: &str) -> String {
		let previous = self.record.identify(distinct_id);
		sdk_debug!(self.logger, previous = %previous, distinct_id = %distinct_id, "Identified user");
		self.persist();
		previous
	}

	/// Reverts to a fresh anonymous distinct id, keeping the device id.
	pub fn reset(&mut self) {
		self.reset_at(Utc::now().timestamp_millis());
	}

	pub(crate) fn reset_at(&mut self, now_ms: i64) {
		self.record.reset(now_ms);
		sdk_debug!(self.logger, distinct_id = %self.record.distinct_id, "Identity reset");
		self.persist();
	}

	/// Records activity: rotates an expired session and bumps the timestamp.
	pub fn touch(&mut self) {
		self.touch_at(Utc::now().timestamp_millis());
	}

	pub(crate) fn touch_at(&mut self, now_ms: i64) {
		if self.record.is_session_expired(now_ms, self.session_timeout_ms) {
			self.record.rotate_session(now_ms);
			sdk_debug!(self.logger, session_id = %self.record.session_id, "Session expired, rotated");
		} else {
			self.record.session_timestamp = now_ms;
		}
		self.persist();
	}

	/// Changes the timeout used by future expiry checks only.
	pub fn update_session_timeout(&mut self, timeout_ms: u64) {
		self.session_timeout_ms = timeout_ms;
	}

	pub fn session_timeout_ms(&self) -> u64 {
		self.session_timeout_ms
	}

	pub fn user_agent_info(&self, user_agent: &str) -> UserAgentInfo {
		UserAgentInfo::parse(user_agent)
	}

	fn persist(&self) {
		let Some(storage) = self.storage.as_deref() else {
			return;
		};
		let json = match serde_json::to_string(&self.record) {
			Ok(json) => json,
			Err(e) => {
				sdk_warn!(self.logger, error = %e, "Failed to serialize identity");
				return;
			}
		};
		if let Err(e) = storage.set_item(&self.storage_key, &json) {
			sdk_warn!(self.logger, error = %e, "Failed to persist identity");
		}
	}
}

fn load_record(storage: &dyn Storage, key: &str, logger: &Logger) -> Option<IdentityRecord> {
	let raw = match storage.get_item(key) {
		Ok(raw) => raw?,
		Err(e) => {
			sdk_warn!(logger, error = %e, "Failed to read identity from storage");
			return None;
		}
	};
	match serde_json::from_str(&raw) {
		Ok(record) => Some(record),
		Err(e) => {
			sdk_warn!(logger, error = %e, "Stored identity is malformed, minting a new one");
			None
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::storage::{MemoryStorage, UnavailableStorage};
	use journium_core::UserState;

	const TIMEOUT: u64 = 30 * 60 * 1000;
	const NOW: i64 = 1_700_000_000_000;

	fn memory() -> Arc<MemoryStorage> {
		Arc::new(MemoryStorage::new())
	}

	fn stored(storage: &MemoryStorage) -> IdentityRecord {
		let raw = storage
			.get_item(&identity_storage_key("pk_test"))
			.unwrap()
			.unwrap();
		serde_json::from_str(&raw).unwrap()
	}

	#[test]
	fn fresh_identity_is_persisted() {
		let storage = memory();
		let manager =
			IdentityManager::initialize_at(Some(storage.clone()), "pk_test", TIMEOUT, Logger::default(), NOW);

		assert_eq!(manager.identity().user_state, UserState::Anonymous);
		assert_eq!(&stored(&storage), manager.identity());
	}

	#[test]
	fn reload_within_timeout_reuses_record() {
		let storage = memory();
		let first =
			IdentityManager::initialize_at(Some(storage.clone()), "pk_test", TIMEOUT, Logger::default(), NOW);
		let second = IdentityManager::initialize_at(
			Some(storage.clone()),
			"pk_test",
			TIMEOUT,
			Logger::default(),
			NOW + 1_000,
		);

		assert_eq!(first.identity(), second.identity());
	}

	#[test]
	fn expired_session_rotates_on_load() {
		let storage = memory();
		let mut record = IdentityRecord::fresh(NOW);
		record.identify("user_42");
		record.session_timestamp = NOW - i64::try_from(TIMEOUT).unwrap() - 1;
		storage
			.set_item(
				&identity_storage_key("pk_test"),
				&serde_json::to_string(&record).unwrap(),
			)
			.unwrap();

		let manager =
			IdentityManager::initialize_at(Some(storage.clone()), "pk_test", TIMEOUT, Logger::default(), NOW);

		assert_ne!(manager.identity().session_id, record.session_id);
		assert_eq!(manager.identity().device_id, record.device_id);
		assert_eq!(manager.identity().distinct_id, "user_42");
		assert_eq!(manager.identity().user_state, UserState::Identified);
		assert_eq!(manager.identity().session_timestamp, NOW);
		assert_eq!(&stored(&storage), manager.identity());
	}

	#[test]
	fn malformed_record_is_replaced() {
		let storage = memory();
		storage
			.set_item(&identity_storage_key("pk_test"), "{not json")
			.unwrap();

		let manager =
			IdentityManager::initialize_at(Some(storage.clone()), "pk_test", TIMEOUT, Logger::default(), NOW);

		assert_eq!(&stored(&storage), manager.identity());
	}

	#[test]
	fn namespaces_do_not_collide() {
		let storage = memory();
		let a = IdentityManager::initialize_at(Some(storage.clone()), "pk_a", TIMEOUT, Logger::default(), NOW);
		let b = IdentityManager::initialize_at(Some(storage.clone()), "pk_b", TIMEOUT, Logger::default(), NOW);
		assert_ne!(a.identity().device_id, b.identity().device_id);
		assert_eq!(storage.len(), 2);
	}

	#[test]
	fn unavailable_storage_degrades_to_memory() {
		let mut manager = IdentityManager::initialize_at(
			Some(Arc::new(UnavailableStorage)),
			"pk_test",
			TIMEOUT,
			Logger::new(true),
			NOW,
		);
		let previous = manager.identify("user_42");
		assert_ne!(previous, "user_42");
		assert_eq!(manager.identity().distinct_id, "user_42");
	}

	#[test]
	fn no_storage_still_mints_identity() {
		let manager = IdentityManager::initialize_at(None, "pk_test", TIMEOUT, Logger::default(), NOW);
		assert!(!manager.identity().device_id.is_empty());
	}

	#[test]
	fn identify_and_reset_persist() {
		let storage = memory();
		let mut manager =
			IdentityManager::initialize_at(Some(storage.clone()), "pk_test", TIMEOUT, Logger::default(), NOW);
		let device = manager.identity().device_id.clone();

		manager.identify("user_42");
		assert_eq!(stored(&storage).distinct_id, "user_42");

		manager.reset_at(NOW + 10);
		let after = stored(&storage);
		assert_ne!(after.distinct_id, "user_42");
		assert_eq!(after.device_id, device);
		assert_eq!(after.user_state, UserState::Anonymous);
	}

	#[test]
	fn touch_rotates_only_after_timeout() {
		let mut manager = IdentityManager::initialize_at(None, "pk_test", TIMEOUT, Logger::default(), NOW);
		let session = manager.identity().session_id.clone();

		manager.touch_at(NOW + 1_000);
		assert_eq!(manager.identity().session_id, session);
		assert_eq!(manager.identity().session_timestamp, NOW + 1_000);

		manager.update_session_timeout(500);
		manager.touch_at(NOW + 2_000);
		assert_ne!(manager.identity().session_id, session);
	}

	#[test]
	fn update_timeout_does_not_reevaluate_current_session() {
		let mut manager = IdentityManager::initialize_at(None, "pk_test", TIMEOUT, Logger::default(), NOW);
		let session = manager.identity().session_id.clone();
		manager.update_session_timeout(1);
		assert_eq!(manager.identity().session_id, session);
		assert_eq!(manager.session_timeout_ms(), 1);
	}
}
