// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Key-value persistence standing in for browser local storage.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

/// Storage backend errors. Callers degrade to in-memory state on any of them.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Storage is disabled or absent (private browsing, non-browser host).
	#[error("storage unavailable")]
	Unavailable,

	#[error("storage I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("storage contents corrupt: {0}")]
	Corrupt(String),
}

/// Synchronous string storage, shaped like `window.localStorage`.
pub trait Storage: Send + Sync {
	fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
	fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
	fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local storage. Contents live as long as the value.
#[derive(Debug, Default)]
pub struct MemoryStorage {
	items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl Storage for MemoryStorage {
	fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
		let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
		Ok(items.get(key).cloned())
	}

	fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
		let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
		items.insert(key.to_string(), value.to_string());
		Ok(())
	}

	fn remove_item(&self, key: &str) -> Result<(), StorageError> {
		let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
		items.remove(key);
		Ok(())
	}
}

/// Storage persisted as a single JSON object file, for non-browser hosts.
#[derive(Debug)]
pub struct FileStorage {
	path: PathBuf,
	lock: Mutex<()>,
}

impl FileStorage {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			lock: Mutex::new(()),
		}
	}

	fn read_all(&self) -> Result<HashMap<String, String>, StorageError> {
		match std::fs::read_to_string(&self.path) {
			Ok(content) if content.trim().is_empty() => Ok(HashMap::new()),
			Ok(content) => {
				serde_json::from_str(&content).map_err(|e| StorageError::Corrupt(e.to_string()))
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
			Err(e) => Err(StorageError::Io(e)),
		}
	}

	fn write_all(&self, items: &HashMap<String, String>) -> Result<(), StorageError> {
		if let Some(parent) = self.path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let content =
			serde_json::to_string_pretty(items).map_err(|e| StorageError::Corrupt(e.to_string()))?;
		std::fs::write(&self.path, content)?;
		Ok(())
	}
}

impl Storage for FileStorage {
	fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
		let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
		Ok(self.read_all()?.remove(key))
	}

	fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
		let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
		// A corrupt file is overwritten rather than left blocking every write.
		let mut items = self.read_all().unwrap_or_default();
		items.insert(key.to_string(), value.to_string());
		self.write_all(&items)
	}

	fn remove_item(&self, key: &str) -> Result<(), StorageError> {
		let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
		let mut items = self.read_all()?;
		if items.remove(key).is_some() {
			self.write_all(&items)?;
		}
		Ok(())
	}
}

/// Storage that refuses every operation, as in a locked-down browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStorage;

impl Storage for UnavailableStorage {
	fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
		Err(StorageError::Unavailable)
	}

	fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
		Err(StorageError::Unavailable)
	}

	fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
		Err(StorageError::Unavailable)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn memory_storage_roundtrip() {
		let storage = MemoryStorage::new();
		assert!(storage.get_item("k").unwrap().is_none());

		storage.set_item("k", "v").unwrap();
		assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v"));
		assert_eq!(storage.len(), 1);

		storage.remove_item("k").unwrap();
		assert!(storage.is_empty());
	}

	#[test]
	fn file_storage_roundtrip() {
		let temp_dir = tempfile::tempdir().unwrap();
		let path = temp_dir.path().join("nested").join("storage.json");
		let storage = FileStorage::new(&path);

		assert!(storage.get_item("missing").unwrap().is_none());
		storage.set_item("journium_identity_pk", "{}").unwrap();
		assert!(path.exists());

		let reopened = FileStorage::new(&path);
		assert_eq!(
			reopened.get_item("journium_identity_pk").unwrap().as_deref(),
			Some("{}")
		);

		reopened.remove_item("journium_identity_pk").unwrap();
		assert!(reopened.get_item("journium_identity_pk").unwrap().is_none());
	}

	#[test]
	fn file_storage_reports_corruption() {
		let temp_dir = tempfile::tempdir().unwrap();
		let path = temp_dir.path().join("storage.json");
		std::fs::write(&path, "not json").unwrap();
		let storage = FileStorage::new(&path);

		assert!(matches!(storage.get_item("k"), Err(StorageError::Corrupt(_))));

		storage.set_item("k", "v").unwrap();
		assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v"));
	}

	#[test]
	fn unavailable_storage_always_fails() {
		let storage = UnavailableStorage;
		assert!(matches!(storage.get_item("k"), Err(StorageError::Unavailable)));
		assert!(storage.set_item("k", "v").is_err());
		assert!(storage.remove_item("k").is_err());
	}
}
