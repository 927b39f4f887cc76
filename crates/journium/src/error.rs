// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the Journium SDK.

use thiserror::Error;

/// Journium SDK errors.
#[derive(Debug, Error)]
pub enum JourniumError {
	/// No publishable key was supplied at construction.
	#[error("publishable key is required")]
	MissingPublishableKey,

	/// API host is missing or not a URL.
	#[error("invalid API host: {0}")]
	InvalidApiHost(String),

	/// HTTP request failed.
	#[error("HTTP request failed: {0}")]
	RequestFailed(#[from] reqwest::Error),

	/// An injected transport failed before producing a response.
	#[error("transport error: {0}")]
	Transport(String),

	/// Server returned a non-success response.
	#[error("server error ({status}): {message}")]
	ServerError { status: u16, message: String },

	/// The request did not complete in time.
	#[error("request timed out")]
	Timeout,

	/// Client has been destroyed.
	#[error("client has been shut down")]
	ClientShutdown,

	/// Serialization error.
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, JourniumError>;
