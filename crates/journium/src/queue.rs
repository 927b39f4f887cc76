// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event buffering and flush scheduling.
//!
//! Events accumulate in an ordered buffer. A flush swaps the buffer out
//! before sending, so events enqueued during the round-trip land in a fresh
//! buffer; a failed batch is put back in front of them. At most one send is
//! in flight per queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use journium_core::{IngestPayload, JourniumEvent};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::{JourniumError, Result};
use crate::logger::{sdk_debug, sdk_warn, Logger};
use crate::transport::Transport;

/// Path of the ingestion endpoint.
pub const INGEST_PATH: &str = "/v1/ingest_event";

/// Default maximum number of events buffered before dropping the oldest.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;

/// Delivers one batch of events.
#[async_trait]
pub trait BatchSender: Send + Sync {
	async fn send_batch(&self, events: &[JourniumEvent]) -> Result<()>;
}

/// Posts batches to `{api_host}/v1/ingest_event` with the project key as bearer.
pub struct IngestSender {
	transport: Arc<dyn Transport>,
	url: String,
	ingestion_key: String,
}

impl IngestSender {
	pub fn new(transport: Arc<dyn Transport>, api_host: &str, ingestion_key: impl Into<String>) -> Self {
		Self {
			transport,
			url: format!("{}{INGEST_PATH}", api_host.trim_end_matches('/')),
			ingestion_key: ingestion_key.into(),
		}
	}
}

#[async_trait]
impl BatchSender for IngestSender {
	async fn send_batch(&self, events: &[JourniumEvent]) -> Result<()> {
		let payload = serde_json::to_value(IngestPayload {
			events: events.to_vec(),
		})?;
		let response = self
			.transport
			.post_json(&self.url, &self.ingestion_key, &payload)
			.await?;
		if !response.is_success() {
			return Err(JourniumError::ServerError {
				status: response.status,
				message: response.body,
			});
		}
		Ok(())
	}
}

/// Ordered event buffer with threshold and explicit flushes.
pub struct EventQueue {
	buffer: Mutex<Vec<JourniumEvent>>,
	sender: Arc<dyn BatchSender>,
	flush_at: AtomicUsize,
	max_queue_size: usize,
	// Held for the whole send, so flushes never overlap.
	in_flight: Arc<tokio::sync::Mutex<()>>,
	logger: Logger,
}

impl EventQueue {
	pub fn new(sender: Arc<dyn BatchSender>, flush_at: usize, logger: Logger) -> Self {
		Self {
			buffer: Mutex::new(Vec::new()),
			sender,
			flush_at: AtomicUsize::new(flush_at.max(1)),
			max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
			in_flight: Arc::new(tokio::sync::Mutex::new(())),
			logger,
		}
	}

	pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
		self.max_queue_size = max_queue_size.max(1);
		self
	}

	pub fn set_flush_at(&self, flush_at: usize) {
		self.flush_at.store(flush_at.max(1), Ordering::SeqCst);
	}

	pub fn flush_at(&self) -> usize {
		self.flush_at.load(Ordering::SeqCst)
	}

	pub fn len(&self) -> usize {
		self.buffer().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Snapshot of buffered events, oldest first.
	pub fn pending(&self) -> Vec<JourniumEvent> {
		self.buffer().clone()
	}

	/// Appends an event; reaching the threshold starts a flush right away.
	///
	/// The batch is swapped out before this returns. The send itself runs on
	/// the current tokio runtime; without one the events wait for the next
	/// explicit or timer flush.
	pub fn enqueue(self: &Arc<Self>, event: JourniumEvent) {
		let reached = {
			let mut buffer = self.buffer();
			while buffer.len() >= self.max_queue_size {
				let dropped = buffer.remove(0);
				sdk_warn!(self.logger, event = %dropped.event, "Dropped event due to queue overflow");
			}
			buffer.push(event);
			buffer.len() >= self.flush_at()
		};
		if reached {
			self.flush_in_background();
		}
	}

	/// Sends everything buffered as one batch.
	///
	/// Waits for an in-flight send to finish first. On failure the batch is
	/// restored ahead of newer events and the error is returned.
	pub async fn flush(self: &Arc<Self>) -> Result<()> {
		let result = {
			let _in_flight = self.in_flight.lock().await;
			let batch = self.take_batch();
			self.send(batch).await
		};
		if result.is_ok() {
			self.flush_if_due();
		}
		result
	}

	/// Starts a background flush if the buffer is at the threshold.
	///
	/// Every send re-checks once it releases `in_flight`, so a threshold
	/// reached while it was running is never lost.
	fn flush_if_due(self: &Arc<Self>) {
		if self.len() >= self.flush_at() {
			self.flush_in_background();
		}
	}

	fn flush_in_background(self: &Arc<Self>) {
		let Ok(handle) = Handle::try_current() else {
			sdk_debug!(self.logger, "No async runtime, deferring threshold flush");
			return;
		};
		let Ok(guard) = Arc::clone(&self.in_flight).try_lock_owned() else {
			// The running send re-checks the threshold when it releases the lock.
			sdk_debug!(self.logger, "Flush already in flight, coalescing");
			return;
		};
		let batch = self.take_batch();
		let queue = Arc::clone(self);
		handle.spawn(async move {
			let result = queue.send(batch).await;
			drop(guard);
			match result {
				Ok(()) => queue.flush_if_due(),
				Err(e) => {
					sdk_debug!(queue.logger, error = %e, "Background flush failed, events requeued");
				}
			}
		});
	}

	fn take_batch(&self) -> Vec<JourniumEvent> {
		std::mem::take(&mut *self.buffer())
	}

	async fn send(&self, batch: Vec<JourniumEvent>) -> Result<()> {
		if batch.is_empty() {
			return Ok(());
		}
		let count = batch.len();
		sdk_debug!(self.logger, count, "Flushing event batch");
		match self.sender.send_batch(&batch).await {
			Ok(()) => {
				sdk_debug!(self.logger, count, "Event batch delivered");
				Ok(())
			}
			Err(e) => {
				sdk_debug!(self.logger, count, error = %e, "Event batch failed, requeueing");
				self.requeue_front(batch);
				Err(e)
			}
		}
	}

	fn requeue_front(&self, mut batch: Vec<JourniumEvent>) {
		let mut buffer = self.buffer();
		batch.append(&mut buffer);
		*buffer = batch;
	}

	fn buffer(&self) -> MutexGuard<'_, Vec<JourniumEvent>> {
		self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

/// Recurring flush timer owned by the client.
#[derive(Default)]
pub struct FlushTimer {
	handle: Option<JoinHandle<()>>,
	interval_ms: i64,
}

impl FlushTimer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Starts or re-arms the timer. A non-positive interval stops it.
	pub fn arm(&mut self, queue: Arc<EventQueue>, interval_ms: i64, logger: Logger) {
		if self.is_running() && self.interval_ms == interval_ms {
			return;
		}
		self.cancel();
		self.interval_ms = interval_ms;
		if interval_ms <= 0 {
			sdk_debug!(logger, "Flush timer disabled");
			return;
		}
		let Ok(handle) = Handle::try_current() else {
			sdk_debug!(logger, "No async runtime, flush timer not started");
			return;
		};
		let period = Duration::from_millis(interval_ms.unsigned_abs());
		sdk_debug!(logger, interval_ms, "Flush timer armed");
		self.handle = Some(handle.spawn(async move {
			let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
			loop {
				ticker.tick().await;
				if let Err(e) = queue.flush().await {
					sdk_debug!(logger, error = %e, "Timer flush failed");
				}
			}
		}));
	}

	/// Stops the timer synchronously.
	pub fn cancel(&mut self) {
		if let Some(handle) = self.handle.take() {
			handle.abort();
		}
	}

	pub fn is_running(&self) -> bool {
		self.handle.as_ref().is_some_and(|h| !h.is_finished())
	}
}

impl Drop for FlushTimer {
	fn drop(&mut self) {
		self.cancel();
	}
}
