// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client runtime for Journium event tracking.
//!
//! A [`Journium`] client resolves its effective options from built-in
//! defaults, the project's remote configuration and caller overrides, keeps a
//! persistent anonymous identity with idle-timeout sessions, and batches
//! events to the ingestion endpoint. Attached to a [`Window`], it also tracks
//! pageviews on client-side navigation and captures DOM interactions.
//!
//! # Overview
//!
//! - Calls made before initialization finishes are staged and replayed with
//!   the identity available once the client is ready
//! - Events flush when the buffer reaches `flushAt` or every `flushInterval`
//! - Failed batches go back to the front of the buffer for the next flush
//! - Without a window the client runs as a server host and skips DOM capture
//!
//! # Example
//!
//! ```ignore
//! use journium::{Journium, LocalOptions, MemoryStorage};
//! use std::sync::Arc;
//!
//! let client = Journium::builder()
//!     .publishable_key("pk_live_xxx")
//!     .storage(Arc::new(MemoryStorage::new()))
//!     .options(LocalOptions::new().flush_at(10).debug(true))
//!     .build_async()
//!     .await?;
//!
//! client.track("checkout_started", None);
//! client.identify("user_42", None);
//! client.destroy().await?;
//! ```

pub mod autocapture;
pub mod client;
pub mod dom;
pub mod error;
pub mod host;
pub mod identity;
pub mod logger;
pub mod pageview;
pub mod queue;
pub mod resolver;
pub mod sink;
pub mod storage;
pub mod transport;

pub use autocapture::AutocaptureEngine;
pub use client::{ClientConfig, ClientState, Journium, JourniumBuilder, DEFAULT_API_HOST};
pub use dom::{DomEvent, DomEventKind, DomTree, Document, NodeId, Rect};
pub use error::{JourniumError, Result};
pub use host::{History, Window};
pub use identity::IdentityManager;
pub use logger::Logger;
pub use pageview::PageviewTracker;
pub use queue::{BatchSender, EventQueue, IngestSender};
pub use resolver::{OptionsResolver, RetryPolicy};
pub use sink::EventSink;
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use transport::{ReqwestTransport, Transport, TransportResponse};

pub use journium_core::{
	AutocaptureConfig, AutocaptureOptions, AutocaptureSetting, IdentityRecord, JourniumEvent,
	JourniumOptions, LocalOptions, UserState,
};
