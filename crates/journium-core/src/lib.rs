// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Journium event-tracking SDK.
//!
//! This crate holds the data model shared by the client runtime:
//!
//! - [`IdentityRecord`]: the persisted per-browser identity bundle
//! - [`JourniumOptions`] and [`LocalOptions`]: effective and caller-supplied
//!   configuration, plus the defaults < remote < local merge
//! - [`JourniumEvent`]: the wire shape of a queued event
//! - [`UserAgentInfo`]: coarse browser/OS/device classification
//! - [`RemoteOptionsResponse`]: the remote configuration endpoint payload

pub mod error;
pub mod event;
pub mod identity;
pub mod options;
pub mod remote;
pub mod user_agent;

pub use error::{CoreError, Result};
pub use event::{
	IngestPayload, JourniumEvent, AUTOCAPTURE_EVENT, IDENTIFY_EVENT, PAGEVIEW_EVENT,
	RESERVED_EVENT_PREFIX,
};
pub use identity::{new_id, IdentityRecord, UserState};
pub use options::{
	merge_layers, resolve_options, AutocaptureConfig, AutocaptureOptions, AutocaptureSetting,
	JourniumOptions, LocalOptions, DEFAULT_FLUSH_AT, DEFAULT_FLUSH_INTERVAL_MS,
	DEFAULT_SESSION_TIMEOUT_MS,
};
pub use remote::{RemoteOptionsResponse, FATAL_ERROR_CODES};
pub use user_agent::{Browser, DeviceType, Os, UserAgentInfo};
