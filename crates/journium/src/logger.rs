// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-instance diagnostics gate.
//!
//! Each client owns a [`Logger`]; its debug flag decides whether the SDK
//! emits anything at all. Several clients on one page never see each other's
//! flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Debug-gated logging capability shared by a client's components.
#[derive(Debug, Clone, Default)]
pub struct Logger {
	debug: Arc<AtomicBool>,
}

impl Logger {
	pub fn new(debug: bool) -> Self {
		Self {
			debug: Arc::new(AtomicBool::new(debug)),
		}
	}

	pub fn is_debug(&self) -> bool {
		self.debug.load(Ordering::Relaxed)
	}

	pub fn set_debug(&self, debug: bool) {
		self.debug.store(debug, Ordering::Relaxed);
	}
}

macro_rules! sdk_debug {
	($logger:expr, $($arg:tt)+) => {
		if $logger.is_debug() {
			tracing::debug!(target: "journium", $($arg)+);
		}
	};
}

macro_rules! sdk_info {
	($logger:expr, $($arg:tt)+) => {
		if $logger.is_debug() {
			tracing::info!(target: "journium", $($arg)+);
		}
	};
}

macro_rules! sdk_warn {
	($logger:expr, $($arg:tt)+) => {
		if $logger.is_debug() {
			tracing::warn!(target: "journium", $($arg)+);
		}
	};
}

pub(crate) use {sdk_debug, sdk_info, sdk_warn};
