// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP capability used for remote config and event ingestion.
//!
//! Hosts inject their own [`Transport`]; [`ReqwestTransport`] is the default.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::Result;

/// SDK version for identification.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
/// SDK name for identification.
pub const SDK_NAME: &str = "journium-rust";

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
	pub status: u16,
	pub body: String,
}

impl TransportResponse {
	pub fn new(status: u16, body: impl Into<String>) -> Self {
		Self {
			status,
			body: body.into(),
		}
	}

	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// The host's HTTP client.
///
/// Implementations return `Err` only when no response was produced; any
/// status code, including errors, comes back as a [`TransportResponse`].
#[async_trait]
pub trait Transport: Send + Sync {
	async fn get(&self, url: &str) -> Result<TransportResponse>;

	async fn post_json(
		&self,
		url: &str,
		bearer_token: &str,
		body: &serde_json::Value,
	) -> Result<TransportResponse>;
}

/// Returns the User-Agent the SDK sends: `journium-rust/{version}`.
pub fn user_agent() -> String {
	format!("{SDK_NAME}/{SDK_VERSION}")
}

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
	client: Client,
}

impl ReqwestTransport {
	pub fn new(request_timeout: Duration) -> Result<Self> {
		let client = Client::builder()
			.user_agent(user_agent())
			.timeout(request_timeout)
			.build()?;
		Ok(Self { client })
	}

	pub fn with_client(client: Client) -> Self {
		Self { client }
	}
}

#[async_trait]
impl Transport for ReqwestTransport {
	async fn get(&self, url: &str) -> Result<TransportResponse> {
		let response = self.client.get(url).send().await?;
		let status = response.status().as_u16();
		let body = response.text().await?;
		Ok(TransportResponse { status, body })
	}

	async fn post_json(
		&self,
		url: &str,
		bearer_token: &str,
		body: &serde_json::Value,
	) -> Result<TransportResponse> {
		let response = self
			.client
			.post(url)
			.header("Authorization", format!("Bearer {bearer_token}"))
			.json(body)
			.send()
			.await?;
		let status = response.status().as_u16();
		let body = response.text().await.unwrap_or_default();
		Ok(TransportResponse { status, body })
	}
}
