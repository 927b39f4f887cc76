// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The Journium client.
//!
//! Calls made before initialization completes are staged in order and
//! replayed once effective options and identity are known, so every queued
//! event carries the identity snapshot taken at that moment.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use journium_core::{
	resolve_options, IdentityRecord, JourniumEvent, JourniumOptions, LocalOptions, UserAgentInfo,
	IDENTIFY_EVENT,
};
use serde_json::{Map, Value};
use tokio::sync::watch;
use url::Url;

use crate::autocapture::AutocaptureEngine;
use crate::error::{JourniumError, Result};
use crate::host::{host_of, Window};
use crate::identity::IdentityManager;
use crate::logger::{sdk_debug, sdk_info, sdk_warn, Logger};
use crate::pageview::PageviewTracker;
use crate::queue::{EventQueue, FlushTimer, IngestSender, DEFAULT_MAX_QUEUE_SIZE};
use crate::resolver::{OptionsResolver, RetryPolicy};
use crate::sink::EventSink;
use crate::storage::Storage;
use crate::transport::{ReqwestTransport, Transport, SDK_NAME, SDK_VERSION};

/// Default ingestion host.
pub const DEFAULT_API_HOST: &str = "https://events.journium.app";

/// Upper bound on the final flush performed by [`Journium::destroy`].
pub const DESTROY_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
	/// Constructed; `initialize` not yet called.
	Uninitialized,
	/// Waiting on remote options.
	Fetching,
	/// Effective options and identity are known.
	Ready,
	/// The merged configuration is unusable.
	Failed,
}

/// Transport-level settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Timeout for HTTP requests made by the default transport.
	pub request_timeout: Duration,
	/// Retry behavior for the remote options fetch.
	pub retry_policy: RetryPolicy,
	/// Events buffered before the oldest are dropped.
	pub max_queue_size: usize,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			request_timeout: Duration::from_secs(30),
			retry_policy: RetryPolicy::default(),
			max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
		}
	}
}

/// Builder for constructing a [`Journium`] client.
pub struct JourniumBuilder {
	publishable_key: Option<String>,
	api_host: Option<String>,
	options: LocalOptions,
	transport: Option<Arc<dyn Transport>>,
	storage: Option<Arc<dyn Storage>>,
	window: Option<Arc<Window>>,
	config: ClientConfig,
}

impl JourniumBuilder {
	pub fn new() -> Self {
		Self {
			publishable_key: None,
			api_host: None,
			options: LocalOptions::default(),
			transport: None,
			storage: None,
			window: None,
			config: ClientConfig::default(),
		}
	}

	/// Sets the project's publishable key. Required.
	pub fn publishable_key(mut self, key: impl Into<String>) -> Self {
		self.publishable_key = Some(key.into());
		self
	}

	/// Sets the ingestion host.
	///
	/// Example: `https://events.journium.app`
	pub fn api_host(mut self, host: impl Into<String>) -> Self {
		self.api_host = Some(host.into());
		self
	}

	/// Sets the local option layer, which wins over remote configuration.
	pub fn options(mut self, options: LocalOptions) -> Self {
		self.options = options;
		self
	}

	/// Replaces the default reqwest transport.
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);
		self
	}

	/// Sets the storage used for identity and cached configuration.
	///
	/// Without one, identity lives in memory for the life of the client.
	pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
		self.storage = Some(storage);
		self
	}

	/// Attaches a browser window, enabling pageview and autocapture.
	pub fn window(mut self, window: Arc<Window>) -> Self {
		self.window = Some(window);
		self
	}

	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.config.request_timeout = timeout;
		self
	}

	pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
		self.config.retry_policy = policy;
		self
	}

	pub fn max_queue_size(mut self, max: usize) -> Self {
		self.config.max_queue_size = max;
		self
	}

	/// Builds the client without contacting the server.
	///
	/// Call [`Journium::initialize`] afterwards, or use
	/// [`JourniumBuilder::build_async`] which does both.
	pub fn build(self) -> Result<Journium> {
		let publishable_key = self
			.publishable_key
			.map(|key| key.trim().to_string())
			.filter(|key| !key.is_empty())
			.ok_or(JourniumError::MissingPublishableKey)?;

		let api_host = self
			.api_host
			.unwrap_or_else(|| DEFAULT_API_HOST.to_string())
			.trim_end_matches('/')
			.to_string();
		Url::parse(&api_host).map_err(|e| JourniumError::InvalidApiHost(format!("{api_host}: {e}")))?;

		let transport: Arc<dyn Transport> = match self.transport {
			Some(transport) => transport,
			None => Arc::new(ReqwestTransport::new(self.config.request_timeout)?),
		};

		let initial = resolve_options(None, &self.options).unwrap_or_default();
		let logger = Logger::new(initial.debug);

		let resolver = OptionsResolver::new(
			api_host.clone(),
			publishable_key.clone(),
			Arc::clone(&transport),
			self.storage.clone(),
			logger.clone(),
		)
		.with_retry_policy(self.config.retry_policy.clone());

		let sender = Arc::new(IngestSender::new(transport, &api_host, publishable_key.clone()));
		let queue = Arc::new(
			EventQueue::new(sender, initial.flush_at, logger.clone())
				.with_max_queue_size(self.config.max_queue_size),
		);

		let (options_tx, _) = watch::channel(initial.clone());
		let window = self.window;
		let storage = self.storage;
		let local = self.options;

		let inner = Arc::new_cyclic(|weak: &Weak<JourniumInner>| {
			let sink: Weak<dyn EventSink> = weak.clone();
			JourniumInner {
				publishable_key,
				api_host,
				platform: if window.is_some() { "web" } else { "server" },
				user_agent: window
					.as_ref()
					.map(|w| UserAgentInfo::parse(w.user_agent())),
				pageviews: PageviewTracker::new(window.clone(), sink.clone(), logger.clone()),
				autocapture: AutocaptureEngine::new(
					window.clone(),
					sink,
					initial.autocapture_options(),
					logger.clone(),
				),
				window,
				storage,
				resolver,
				queue,
				timer: Mutex::new(FlushTimer::new()),
				runtime: Mutex::new(Runtime {
					state: ClientState::Uninitialized,
					identity: None,
					staged: Vec::new(),
					options: initial,
					remote: None,
					local,
				}),
				options_tx,
				capture_requested: AtomicBool::new(false),
				closed: AtomicBool::new(false),
				logger,
			}
		});

		sdk_info!(inner.logger, api_host = %inner.api_host, "Journium client created");
		Ok(Journium { inner })
	}

	/// Builds the client and waits for initialization to finish.
	pub async fn build_async(self) -> Result<Journium> {
		let client = self.build()?;
		client.initialize().await;
		Ok(client)
	}
}

impl Default for JourniumBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// A call received before the client was ready.
#[derive(Debug, Clone)]
enum StagedCall {
	Track {
		event: String,
		properties: Map<String, Value>,
		captured_at: DateTime<Utc>,
	},
	Identify {
		distinct_id: String,
		attributes: Option<Map<String, Value>>,
	},
	Reset,
}

struct Runtime {
	state: ClientState,
	identity: Option<IdentityManager>,
	staged: Vec<StagedCall>,
	options: JourniumOptions,
	remote: Option<Map<String, Value>>,
	local: LocalOptions,
}

struct JourniumInner {
	publishable_key: String,
	api_host: String,
	platform: &'static str,
	user_agent: Option<UserAgentInfo>,
	window: Option<Arc<Window>>,
	storage: Option<Arc<dyn Storage>>,
	resolver: OptionsResolver,
	queue: Arc<EventQueue>,
	timer: Mutex<FlushTimer>,
	runtime: Mutex<Runtime>,
	options_tx: watch::Sender<JourniumOptions>,
	pageviews: PageviewTracker,
	autocapture: AutocaptureEngine,
	// Set by start_autocapture; options changes only restart capture when on.
	capture_requested: AtomicBool,
	closed: AtomicBool,
	logger: Logger,
}

impl JourniumInner {
	fn runtime(&self) -> MutexGuard<'_, Runtime> {
		self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn timer(&self) -> MutexGuard<'_, FlushTimer> {
		self.timer.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	async fn initialize(&self) {
		let cached = {
			let mut runtime = self.runtime();
			if runtime.state != ClientState::Uninitialized {
				return;
			}
			runtime.state = ClientState::Fetching;
			self.resolver.load_cached()
		};

		if let Some(cached) = &cached {
			self.apply_remote_layer(Some(cached.clone()));
			sdk_debug!(self.logger, keys = cached.len(), "Applied cached remote options");
		}
		if self.window.is_some() {
			self.start_autocapture();
		}

		let remote = match self.resolver.fetch_with_retry().await {
			Some(fresh) => Some(fresh),
			None => {
				if cached.is_some() {
					sdk_debug!(self.logger, "Falling back to cached remote options");
				}
				cached
			}
		};

		let merged = {
			let mut runtime = self.runtime();
			runtime.remote = remote;
			self.resolver.merge(runtime.remote.as_ref(), &runtime.local)
		};

		let options = match merged {
			Ok(options) => options,
			Err(e) => {
				let mut runtime = self.runtime();
				runtime.state = ClientState::Failed;
				runtime.staged.clear();
				drop(runtime);
				self.capture_requested.store(false, Ordering::SeqCst);
				sdk_warn!(self.logger, error = %e, "Configuration is unusable, client disabled");
				self.stop_capture();
				return;
			}
		};

		{
			let mut runtime = self.runtime();
			if self.is_closed() {
				return;
			}
			runtime.identity = Some(IdentityManager::initialize(
				self.storage.clone(),
				&self.publishable_key,
				options.session_timeout,
				self.logger.clone(),
			));
			runtime.options = options.clone();
			runtime.state = ClientState::Ready;
			self.logger.set_debug(options.debug);
			self.queue.set_flush_at(options.flush_at);
			self.timer()
				.arm(Arc::clone(&self.queue), options.flush_interval, self.logger.clone());

			let staged = std::mem::take(&mut runtime.staged);
			let replayed = staged.len();
			for call in staged {
				self.apply(&mut runtime, call);
			}
			sdk_info!(self.logger, replayed, "Journium initialized");
		}

		self.publish_options(&options);
	}

	/// Re-merges with a new remote layer and publishes the result.
	fn apply_remote_layer(&self, remote: Option<Map<String, Value>>) {
		let merged = {
			let mut runtime = self.runtime();
			runtime.remote = remote;
			self.resolver.merge(runtime.remote.as_ref(), &runtime.local)
		};
		match merged {
			Ok(options) => {
				self.runtime().options = options.clone();
				self.publish_options(&options);
			}
			Err(e) => {
				sdk_debug!(self.logger, error = %e, "Provisional options unusable, keeping defaults");
			}
		}
	}

	/// Pushes effective options to every component that depends on them.
	fn publish_options(&self, options: &JourniumOptions) {
		let ready = {
			let mut runtime = self.runtime();
			if runtime.state == ClientState::Failed {
				return;
			}
			if let Some(identity) = runtime.identity.as_mut() {
				identity.update_session_timeout(options.session_timeout);
			}
			runtime.state == ClientState::Ready
		};
		self.logger.set_debug(options.debug);
		self.queue.set_flush_at(options.flush_at);
		if ready && !self.is_closed() {
			self.timer()
				.arm(Arc::clone(&self.queue), options.flush_interval, self.logger.clone());
		}
		self.options_tx.send_replace(options.clone());
		self.apply_capture_options(options);
	}

	fn apply_capture_options(&self, options: &JourniumOptions) {
		if !self.capture_requested.load(Ordering::SeqCst) || self.is_closed() {
			return;
		}
		let autocapture = options.autocapture_options();
		if autocapture.any_enabled() {
			if self.autocapture.options() != autocapture {
				self.autocapture.update_options(autocapture);
			}
			self.autocapture.start();
		} else {
			self.autocapture.stop();
			self.autocapture.update_options(autocapture);
		}
		if options.auto_track_pageviews {
			self.pageviews.start_auto_capture();
		} else {
			self.pageviews.stop_auto_capture();
		}
	}

	fn start_autocapture(&self) {
		if self.is_closed() || self.runtime().state == ClientState::Failed {
			return;
		}
		self.capture_requested.store(true, Ordering::SeqCst);
		let options = self.runtime().options.clone();
		self.apply_capture_options(&options);
	}

	fn stop_capture(&self) {
		self.autocapture.stop();
		self.pageviews.stop_auto_capture();
	}

	fn track(&self, event: &str, properties: Option<Map<String, Value>>) {
		if self.is_closed() {
			return;
		}
		let call = StagedCall::Track {
			event: event.to_string(),
			properties: properties.unwrap_or_default(),
			captured_at: Utc::now(),
		};
		let mut runtime = self.runtime();
		match runtime.state {
			ClientState::Ready => self.apply(&mut runtime, call),
			ClientState::Failed => {
				sdk_warn!(self.logger, event = %event, "Client failed to initialize, dropping event");
			}
			ClientState::Uninitialized | ClientState::Fetching => {
				sdk_debug!(self.logger, event = %event, "Staging event until initialized");
				runtime.staged.push(call);
			}
		}
	}

	fn identify(&self, distinct_id: &str, attributes: Option<Map<String, Value>>) {
		if self.is_closed() {
			return;
		}
		let distinct_id = distinct_id.trim();
		if distinct_id.is_empty() {
			sdk_warn!(self.logger, "identify called with an empty distinct id");
			return;
		}
		let call = StagedCall::Identify {
			distinct_id: distinct_id.to_string(),
			attributes,
		};
		self.dispatch_identity_call(call, "identify");
	}

	fn reset(&self) {
		if self.is_closed() {
			return;
		}
		self.dispatch_identity_call(StagedCall::Reset, "reset");
	}

	fn dispatch_identity_call(&self, call: StagedCall, operation: &str) {
		let mut runtime = self.runtime();
		match runtime.state {
			ClientState::Ready => self.apply(&mut runtime, call),
			ClientState::Failed => {
				sdk_warn!(self.logger, operation, "Client failed to initialize, ignoring call");
			}
			ClientState::Uninitialized | ClientState::Fetching => {
				runtime.staged.push(call);
			}
		}
	}

	fn apply(&self, runtime: &mut Runtime, call: StagedCall) {
		let Some(identity) = runtime.identity.as_mut() else {
			return;
		};
		match call {
			StagedCall::Track {
				event,
				properties,
				captured_at,
			} => self.enqueue(identity, &event, properties, captured_at),
			StagedCall::Identify {
				distinct_id,
				attributes,
			} => {
				let previous = identity.identify(&distinct_id);
				if previous == distinct_id {
					return;
				}
				let mut properties = Map::new();
				properties.insert("$anon_distinct_id".into(), previous.into());
				if let Some(attributes) = attributes {
					properties.insert("$set".into(), Value::Object(attributes));
				}
				self.enqueue(identity, IDENTIFY_EVENT, properties, Utc::now());
			}
			StagedCall::Reset => identity.reset(),
		}
	}

	fn enqueue(
		&self,
		identity: &mut IdentityManager,
		event: &str,
		properties: Map<String, Value>,
		captured_at: DateTime<Utc>,
	) {
		identity.touch();
		let properties = self.stamp(identity.identity(), properties);
		sdk_debug!(self.logger, event = %event, "Tracked event");
		self.queue.enqueue(JourniumEvent::new(
			self.publishable_key.as_str(),
			event,
			properties,
			captured_at,
		));
	}

	/// Adds identity, environment and library properties.
	///
	/// Identity and library keys overwrite caller keys. Environment keys
	/// already present (derived events record them at capture time) are kept.
	fn stamp(&self, identity: &IdentityRecord, mut properties: Map<String, Value>) -> Map<String, Value> {
		properties.insert("$device_id".into(), identity.device_id.clone().into());
		properties.insert("distinct_id".into(), identity.distinct_id.clone().into());
		properties.insert("$session_id".into(), identity.session_id.clone().into());
		properties.insert("$is_identified".into(), identity.is_identified().into());

		if let Some(window) = &self.window {
			let location = window.location();
			properties
				.entry("$current_url")
				.or_insert_with(|| location.as_str().into());
			properties
				.entry("$host")
				.or_insert_with(|| host_of(&location).into());
			properties
				.entry("$pathname")
				.or_insert_with(|| location.path().into());
		}
		if let Some(user_agent) = &self.user_agent {
			properties.insert("$browser".into(), user_agent.browser_name().into());
			properties.insert("$os".into(), user_agent.os_name().into());
			properties.insert("$device_type".into(), user_agent.device_type_name().into());
		}

		properties.insert("$lib".into(), SDK_NAME.into());
		properties.insert("$lib_version".into(), SDK_VERSION.into());
		properties.insert("$platform".into(), self.platform.into());
		properties
	}

	async fn destroy(&self) -> Result<()> {
		if self.closed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}
		self.timer().cancel();
		self.stop_capture();
		self.capture_requested.store(false, Ordering::SeqCst);
		sdk_debug!(self.logger, pending = self.queue.len(), "Destroying client");

		match tokio::time::timeout(DESTROY_FLUSH_TIMEOUT, self.queue.flush()).await {
			Ok(result) => result,
			Err(_) => {
				sdk_warn!(self.logger, "Final flush timed out");
				Err(JourniumError::Timeout)
			}
		}
	}
}

impl EventSink for JourniumInner {
	fn capture(&self, event: &str, properties: Map<String, Value>) {
		self.track(event, Some(properties));
	}
}

/// Client for capturing analytics events.
///
/// # Example
///
/// ```ignore
/// use journium::{Journium, LocalOptions};
///
/// let client = Journium::builder()
///     .publishable_key("pk_live_xxx")
///     .options(LocalOptions::new().flush_at(10))
///     .build_async()
///     .await?;
///
/// client.track("signup", None);
/// client.identify("user_42", None);
/// client.flush().await?;
/// client.destroy().await?;
/// ```
#[derive(Clone)]
pub struct Journium {
	inner: Arc<JourniumInner>,
}

impl Journium {
	pub fn builder() -> JourniumBuilder {
		JourniumBuilder::new()
	}

	/// Fetches remote options, loads identity and replays staged calls.
	///
	/// Never fails: an unreachable config endpoint falls back to cached or
	/// local options, and an unusable configuration moves the client to
	/// [`ClientState::Failed`]. Calling it again is a no-op.
	pub async fn initialize(&self) {
		self.inner.initialize().await;
	}

	/// Records an event. Staged until the client is ready.
	pub fn track(&self, event: &str, properties: Option<Map<String, Value>>) {
		self.inner.track(event, properties);
	}

	/// Associates subsequent events with `distinct_id` and emits `$identify`.
	///
	/// Ignored on a failed client.
	pub fn identify(&self, distinct_id: &str, attributes: Option<Map<String, Value>>) {
		self.inner.identify(distinct_id, attributes);
	}

	/// Reverts to a new anonymous identity and session. Ignored on a failed client.
	pub fn reset(&self) {
		self.inner.reset();
	}

	/// Sends all queued events now.
	pub async fn flush(&self) -> Result<()> {
		if self.inner.is_closed() {
			return Err(JourniumError::ClientShutdown);
		}
		self.inner.queue.flush().await
	}

	/// Emits a `$pageview` for the current page.
	pub fn capture_pageview(&self, properties: Option<Map<String, Value>>) {
		if self.inner.is_closed() {
			return;
		}
		self.inner.pageviews.capture_pageview(properties);
	}

	/// Starts autocapture and pageview tracking as currently configured.
	///
	/// Effective options are read at call time, and later option changes
	/// restart capture to match.
	pub fn start_autocapture(&self) {
		self.inner.start_autocapture();
	}

	pub fn stop_autocapture(&self) {
		self.inner.capture_requested.store(false, Ordering::SeqCst);
		self.inner.stop_capture();
	}

	/// Replaces the local option layer and applies the result.
	///
	/// An unusable result is rejected and the current options stay in effect.
	pub fn update_options(&self, options: LocalOptions) {
		if self.inner.is_closed() {
			return;
		}
		let merged = {
			let runtime = self.inner.runtime();
			if runtime.state == ClientState::Failed {
				drop(runtime);
				sdk_warn!(self.inner.logger, "Client failed to initialize, ignoring options update");
				return;
			}
			self.inner.resolver.merge(runtime.remote.as_ref(), &options)
		};
		match merged {
			Ok(effective) => {
				{
					let mut runtime = self.inner.runtime();
					runtime.local = options;
					runtime.options = effective.clone();
				}
				self.inner.publish_options(&effective);
			}
			Err(e) => {
				sdk_warn!(self.inner.logger, error = %e, "Rejected unusable options");
			}
		}
	}

	/// Effective options as they change.
	pub fn subscribe_options(&self) -> watch::Receiver<JourniumOptions> {
		self.inner.options_tx.subscribe()
	}

	pub fn options(&self) -> JourniumOptions {
		self.inner.runtime().options.clone()
	}

	pub fn state(&self) -> ClientState {
		self.inner.runtime().state
	}

	/// Current identity, once initialized.
	pub fn identity(&self) -> Option<IdentityRecord> {
		self.inner
			.runtime()
			.identity
			.as_ref()
			.map(|identity| identity.identity().clone())
	}

	/// Events waiting to be sent, oldest first.
	pub fn pending_events(&self) -> Vec<JourniumEvent> {
		self.inner.queue.pending()
	}

	/// Number of calls staged before initialization.
	pub fn staged_len(&self) -> usize {
		self.inner.runtime().staged.len()
	}

	/// Stops timers and capture, then makes one bounded final flush.
	pub async fn destroy(&self) -> Result<()> {
		self.inner.destroy().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dom::{DomEvent, DomEventKind};
	use crate::resolver::config_cache_key;
	use crate::storage::MemoryStorage;
	use crate::transport::TransportResponse;
	use async_trait::async_trait;
	use journium_core::AutocaptureSetting;
	use serde_json::json;
	use tokio::sync::Notify;

	struct MockTransport {
		config: Mutex<Option<TransportResponse>>,
		posts: Mutex<Vec<Value>>,
		fail_posts: AtomicBool,
		posted: Notify,
	}

	impl MockTransport {
		fn offline() -> Arc<Self> {
			Arc::new(Self {
				config: Mutex::new(None),
				posts: Mutex::new(Vec::new()),
				fail_posts: AtomicBool::new(false),
				posted: Notify::new(),
			})
		}

		fn with_config(body: Value) -> Arc<Self> {
			let transport = Self::offline();
			*transport.config.lock().unwrap() = Some(TransportResponse::new(200, body.to_string()));
			transport
		}

		fn posted_events(&self) -> Vec<Value> {
			self.posts
				.lock()
				.unwrap()
				.iter()
				.flat_map(|body| body["events"].as_array().cloned().unwrap_or_default())
				.collect()
		}
	}

	#[async_trait]
	impl Transport for MockTransport {
		async fn get(&self, _url: &str) -> Result<TransportResponse> {
			self.config
				.lock()
				.unwrap()
				.clone()
				.ok_or_else(|| JourniumError::Transport("offline".to_string()))
		}

		async fn post_json(&self, _url: &str, bearer_token: &str, body: &Value) -> Result<TransportResponse> {
			assert_eq!(bearer_token, "pk_test");
			if self.fail_posts.load(Ordering::SeqCst) {
				return Ok(TransportResponse::new(503, "unavailable"));
			}
			self.posts.lock().unwrap().push(body.clone());
			self.posted.notify_one();
			Ok(TransportResponse::new(200, "{}"))
		}
	}

	fn builder(transport: Arc<MockTransport>) -> JourniumBuilder {
		Journium::builder()
			.publishable_key("pk_test")
			.api_host("https://events.example.com/")
			.transport(transport)
			.retry_policy(RetryPolicy {
				max_attempts: 1,
				..RetryPolicy::default()
			})
			.options(LocalOptions::new().flush_interval(0))
	}

	fn props(value: Value) -> Option<Map<String, Value>> {
		value.as_object().cloned()
	}

	#[test]
	fn build_requires_publishable_key() {
		let missing = Journium::builder().transport(MockTransport::offline()).build();
		assert!(matches!(missing, Err(JourniumError::MissingPublishableKey)));

		let blank = Journium::builder()
			.publishable_key("   ")
			.transport(MockTransport::offline())
			.build();
		assert!(matches!(blank, Err(JourniumError::MissingPublishableKey)));
	}

	#[test]
	fn build_rejects_invalid_api_host() {
		let result = builder(MockTransport::offline()).api_host("not a host").build();
		assert!(matches!(result, Err(JourniumError::InvalidApiHost(_))));
	}

	#[tokio::test]
	async fn calls_before_ready_are_staged_then_backfilled() {
		let client = builder(MockTransport::offline()).build().unwrap();

		client.track("early", props(json!({ "plan": "pro" })));
		assert_eq!(client.state(), ClientState::Uninitialized);
		assert_eq!(client.staged_len(), 1);
		assert!(client.pending_events().is_empty());
		assert!(client.identity().is_none());

		client.initialize().await;

		assert_eq!(client.state(), ClientState::Ready);
		assert_eq!(client.staged_len(), 0);
		let identity = client.identity().unwrap();
		let pending = client.pending_events();
		assert_eq!(pending.len(), 1);
		assert_eq!(pending[0].event, "early");
		assert_eq!(pending[0].properties["plan"], "pro");
		assert_eq!(pending[0].properties["$device_id"], identity.device_id.as_str());
		assert_eq!(pending[0].properties["$session_id"], identity.session_id.as_str());
		assert_eq!(pending[0].properties["$platform"], "server");
		assert_eq!(pending[0].properties["$lib"], SDK_NAME);
	}

	#[tokio::test]
	async fn staged_identify_applies_in_order() {
		let client = builder(MockTransport::offline()).build().unwrap();

		client.track("before", None);
		client.identify("user_1", props(json!({ "email_domain": "example.com" })));
		client.track("after", None);
		client.initialize().await;

		let pending = client.pending_events();
		let names: Vec<&str> = pending.iter().map(|e| e.event.as_str()).collect();
		assert_eq!(names, vec!["before", "$identify", "after"]);
		assert_eq!(pending[0].properties["$is_identified"], false);
		assert_eq!(pending[1].properties["distinct_id"], "user_1");
		assert_eq!(pending[1].properties["$set"]["email_domain"], "example.com");
		assert_eq!(pending[2].properties["$is_identified"], true);
	}

	#[tokio::test]
	async fn local_options_override_remote() {
		let transport = MockTransport::with_config(json!({
			"success": true,
			"config": { "flushAt": 7, "debug": true, "sessionTimeout": 60000 }
		}));
		let client = builder(transport)
			.options(LocalOptions::new().flush_at(3).flush_interval(0))
			.build_async()
			.await
			.unwrap();

		let options = client.options();
		assert_eq!(options.flush_at, 3);
		assert!(options.debug);
		assert_eq!(options.session_timeout, 60_000);
		assert_eq!(*client.subscribe_options().borrow(), options);
	}

	#[tokio::test]
	async fn unusable_config_fails_and_rejects_calls() {
		let client = builder(MockTransport::offline())
			.options(LocalOptions::new().flush_at(0))
			.build()
			.unwrap();
		client.track("staged", None);

		client.initialize().await;

		assert_eq!(client.state(), ClientState::Failed);
		assert_eq!(client.staged_len(), 0);
		client.identify("user_1", None);
		client.reset();
		client.track("dropped", None);
		assert!(client.identity().is_none());
		assert!(client.pending_events().is_empty());
	}

	#[tokio::test]
	async fn identify_is_idempotent() {
		let client = builder(MockTransport::offline()).build_async().await.unwrap();
		let anonymous = client.identity().unwrap().distinct_id;

		client.identify("user_9", None);
		client.identify("user_9", None);

		let pending = client.pending_events();
		assert_eq!(pending.len(), 1);
		assert_eq!(pending[0].properties["$anon_distinct_id"], anonymous.as_str());
		assert!(client.identity().unwrap().is_identified());
	}

	#[tokio::test]
	async fn identify_as_current_anonymous_id_changes_nothing() {
		let client = builder(MockTransport::offline()).build_async().await.unwrap();
		let anonymous = client.identity().unwrap().distinct_id;

		client.identify(&anonymous, None);

		assert!(client.pending_events().is_empty());
		assert!(!client.identity().unwrap().is_identified());
	}

	#[tokio::test]
	async fn reset_mints_new_anonymous_identity_and_session() {
		let client = builder(MockTransport::offline()).build_async().await.unwrap();
		client.identify("user_9", None);
		let before = client.identity().unwrap();

		client.reset();

		let after = client.identity().unwrap();
		assert_eq!(after.device_id, before.device_id);
		assert_ne!(after.distinct_id, "user_9");
		assert_ne!(after.session_id, before.session_id);
		assert!(!after.is_identified());
	}

	#[tokio::test]
	async fn threshold_sends_a_batch() {
		let transport = MockTransport::offline();
		let client = builder(transport.clone())
			.options(LocalOptions::new().flush_at(2).flush_interval(0))
			.build_async()
			.await
			.unwrap();

		client.track("one", None);
		client.track("two", None);
		tokio::time::timeout(Duration::from_secs(1), transport.posted.notified())
			.await
			.unwrap();

		let sent = transport.posted_events();
		assert_eq!(sent.len(), 2);
		assert_eq!(sent[0]["event"], "one");
		assert_eq!(sent[0]["ingestion_key"], "pk_test");
		assert!(client.pending_events().is_empty());
	}

	#[tokio::test]
	async fn failed_flush_keeps_events_for_retry() {
		let transport = MockTransport::offline();
		let client = builder(transport.clone()).build_async().await.unwrap();
		transport.fail_posts.store(true, Ordering::SeqCst);

		client.track("kept", None);
		let result = client.flush().await;

		assert!(matches!(result, Err(JourniumError::ServerError { status: 503, .. })));
		assert_eq!(client.pending_events().len(), 1);

		transport.fail_posts.store(false, Ordering::SeqCst);
		client.flush().await.unwrap();
		assert_eq!(transport.posted_events().len(), 1);
	}

	#[tokio::test]
	async fn destroy_flushes_and_closes() {
		let transport = MockTransport::offline();
		let client = builder(transport.clone())
			.options(LocalOptions::new().flush_interval(60_000))
			.build_async()
			.await
			.unwrap();
		assert!(client.inner.timer().is_running());
		client.track("last", None);

		client.destroy().await.unwrap();

		assert!(!client.inner.timer().is_running());
		assert_eq!(transport.posted_events().len(), 1);
		client.track("ignored", None);
		assert!(client.pending_events().is_empty());
		assert!(matches!(client.flush().await, Err(JourniumError::ClientShutdown)));
		client.destroy().await.unwrap();
	}

	#[tokio::test]
	async fn cached_config_is_fallback_when_fetch_fails() {
		let storage = Arc::new(MemoryStorage::new());
		storage
			.set_item(
				&config_cache_key("pk_test"),
				&json!({
					"config": { "flushAt": 4 },
					"fetched_at": "2025-01-01T00:00:00Z"
				})
				.to_string(),
			)
			.unwrap();

		let client = builder(MockTransport::offline())
			.storage(storage)
			.build_async()
			.await
			.unwrap();

		assert_eq!(client.options().flush_at, 4);
	}

	fn window() -> Arc<Window> {
		Arc::new(
			Window::new("https://shop.example.com/")
				.unwrap()
				.with_user_agent(
					"Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
					 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
				),
		)
	}

	#[tokio::test]
	async fn browser_host_tracks_pageviews_and_clicks() {
		let window = window();
		let button = window.document().write(|tree| {
			let button = tree.append_element(tree.body(), "button");
			tree.append_text(button, "Add to cart");
			button
		});
		let client = builder(MockTransport::offline())
			.window(window.clone())
			.build_async()
			.await
			.unwrap();

		window
			.document()
			.dispatch(DomEvent::new(DomEventKind::Click, button));

		let pending = client.pending_events();
		let names: Vec<&str> = pending.iter().map(|e| e.event.as_str()).collect();
		assert_eq!(names, vec!["$pageview", "$autocapture"]);
		assert_eq!(pending[0].properties["$platform"], "web");
		assert_eq!(pending[0].properties["$browser"], "Safari");
		assert_eq!(pending[0].properties["$os"], "macOS");
		assert_eq!(pending[1].properties["$element_text"], "Add to cart");
		assert_eq!(pending[1].properties["$is_identified"], false);
	}

	#[tokio::test]
	async fn options_change_restarts_capture() {
		let window = window();
		let client = builder(MockTransport::offline())
			.window(window.clone())
			.build_async()
			.await
			.unwrap();
		assert_eq!(window.document().listener_count(), 3);
		assert_eq!(window.history().popstate_listener_count(), 1);

		client.update_options(
			LocalOptions::new()
				.flush_interval(0)
				.autocapture(AutocaptureSetting::Enabled(false))
				.auto_track_pageviews(false),
		);

		assert_eq!(window.document().listener_count(), 0);
		assert_eq!(window.history().popstate_listener_count(), 0);
		assert!(!client.options().auto_track_pageviews);
	}

	#[tokio::test]
	async fn stop_autocapture_survives_options_change() {
		let window = window();
		let client = builder(MockTransport::offline())
			.window(window.clone())
			.build_async()
			.await
			.unwrap();

		client.stop_autocapture();
		client.update_options(LocalOptions::new().flush_interval(0).debug(true));

		assert_eq!(window.document().listener_count(), 0);
		assert!(client.options().debug);
	}

	#[tokio::test]
	async fn failed_client_never_rearms_capture() {
		let window = window();
		let original_push = window.history().push_state_fn();
		let client = builder(MockTransport::offline())
			.window(window.clone())
			.options(LocalOptions::new().flush_interval(0).session_timeout(0))
			.build_async()
			.await
			.unwrap();
		assert_eq!(client.state(), ClientState::Failed);
		assert_eq!(window.document().listener_count(), 0);

		client.update_options(LocalOptions::new().flush_interval(0));
		client.start_autocapture();

		assert_eq!(client.state(), ClientState::Failed);
		assert_eq!(window.document().listener_count(), 0);
		assert_eq!(window.history().popstate_listener_count(), 0);
		assert!(Arc::ptr_eq(&window.history().push_state_fn(), &original_push));
		assert_eq!(client.options().session_timeout, 0);
	}

	#[tokio::test]
	async fn unusable_update_is_rejected() {
		let client = builder(MockTransport::offline()).build_async().await.unwrap();

		client.update_options(LocalOptions::new().session_timeout(0));

		assert_eq!(client.options().session_timeout, journium_core::DEFAULT_SESSION_TIMEOUT_MS);
	}
}
