// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for Journium core operations.

use thiserror::Error;

/// Errors raised while resolving or validating core data.
#[derive(Debug, Error)]
pub enum CoreError {
	/// The merged configuration cannot drive the SDK.
	#[error("invalid options: {0}")]
	InvalidOptions(String),

	/// A value could not be converted to or from JSON.
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
