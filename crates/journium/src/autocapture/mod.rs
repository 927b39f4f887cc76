// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! DOM interaction capture.
//!
//! The engine registers document-level listeners for each enabled category
//! and turns raw DOM events into `$autocapture` events with an `$event_type`
//! discriminator.

pub mod descriptor;
pub mod filter;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use journium_core::{AutocaptureOptions, AUTOCAPTURE_EVENT};
use serde_json::{Map, Value};

use crate::dom::{DomEvent, DomEventKind, DomListener, DomTree, ListenerId, ListenerPhase, NodeId};
use crate::host::{host_of, Window};
use crate::logger::{sdk_debug, Logger};
use crate::sink::EventSink;

pub use descriptor::ElementsChain;
pub use filter::should_ignore;

/// `$event_type` values.
pub const EVENT_TYPE_CLICK: &str = "click";
pub const EVENT_TYPE_SUBMIT: &str = "submit";
pub const EVENT_TYPE_CHANGE: &str = "change";
pub const EVENT_TYPE_TEXT_SELECTION: &str = "text_selection";

struct EngineState {
	options: AutocaptureOptions,
	listeners: Vec<ListenerId>,
	active: bool,
}

pub struct AutocaptureEngine {
	window: Option<Arc<Window>>,
	sink: Weak<dyn EventSink>,
	logger: Logger,
	state: Mutex<EngineState>,
}

impl AutocaptureEngine {
	pub fn new(
		window: Option<Arc<Window>>,
		sink: Weak<dyn EventSink>,
		options: AutocaptureOptions,
		logger: Logger,
	) -> Self {
		Self {
			window,
			sink,
			logger,
			state: Mutex::new(EngineState {
				options,
				listeners: Vec::new(),
				active: false,
			}),
		}
	}

	/// Registers listeners for the enabled categories.
	///
	/// No-op without a window or when already active.
	pub fn start(&self) {
		let Some(window) = &self.window else {
			return;
		};
		let mut state = self.state();
		if state.active {
			return;
		}
		state.listeners = self.register(window, &state.options);
		state.active = true;
		sdk_debug!(
			self.logger,
			listeners = state.listeners.len(),
			"autocapture started"
		);
	}

	pub fn stop(&self) {
		let Some(window) = &self.window else {
			return;
		};
		let mut state = self.state();
		if !state.active {
			return;
		}
		for id in state.listeners.drain(..) {
			window.document().remove_event_listener(id);
		}
		state.active = false;
		sdk_debug!(self.logger, "autocapture stopped");
	}

	pub fn is_active(&self) -> bool {
		self.state().active
	}

	pub fn options(&self) -> AutocaptureOptions {
		self.state().options.clone()
	}

	/// Replaces the options, restarting if active so the listener set
	/// matches the new categories.
	pub fn update_options(&self, options: AutocaptureOptions) {
		let was_active = self.is_active();
		if was_active {
			self.stop();
		}
		self.state().options = options;
		if was_active {
			self.start();
		}
	}

	fn register(&self, window: &Arc<Window>, options: &AutocaptureOptions) -> Vec<ListenerId> {
		let document = window.document();
		let categories = [
			(options.capture_clicks, DomEventKind::Click, ListenerPhase::Capture),
			(options.capture_form_submits, DomEventKind::Submit, ListenerPhase::Capture),
			(options.capture_form_changes, DomEventKind::Change, ListenerPhase::Capture),
			(options.capture_text_selection, DomEventKind::MouseUp, ListenerPhase::Bubble),
		];
		categories
			.into_iter()
			.filter(|(enabled, ..)| *enabled)
			.map(|(_, kind, phase)| {
				let handler = Handler {
					window: Arc::downgrade(window),
					sink: self.sink.clone(),
					options: options.clone(),
				};
				let listener: DomListener =
					Arc::new(move |event: &DomEvent, tree: &DomTree| handler.handle(event, tree));
				document.add_event_listener(kind, phase, listener)
			})
			.collect()
	}

	fn state(&self) -> MutexGuard<'_, EngineState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

impl Drop for AutocaptureEngine {
	fn drop(&mut self) {
		self.stop();
	}
}

struct Handler {
	window: Weak<Window>,
	sink: Weak<dyn EventSink>,
	options: AutocaptureOptions,
}

impl Handler {
	fn handle(&self, event: &DomEvent, tree: &DomTree) {
		let (Some(window), Some(sink)) = (self.window.upgrade(), self.sink.upgrade()) else {
			return;
		};
		let Some(target) = tree.element_or_parent(event.target) else {
			return;
		};
		if should_ignore(tree, target, &self.options) {
			return;
		}
		let location = window.location();

		let properties = match event.kind {
			DomEventKind::Click => {
				let mut props = self.base(tree, target, &location);
				props.insert("$event_type".into(), EVENT_TYPE_CLICK.into());
				props
			}
			DomEventKind::Submit => {
				let mut props = self.base(tree, target, &location);
				props.extend(descriptor::form_properties(tree, target, &location));
				props.insert("$event_type".into(), EVENT_TYPE_SUBMIT.into());
				props
			}
			DomEventKind::Change => {
				if !tree.element(target).is_some_and(descriptor::is_form_control) {
					return;
				}
				let mut props = self.base(tree, target, &location);
				props.extend(descriptor::input_properties(tree, target));
				props.insert("$event_type".into(), EVENT_TYPE_CHANGE.into());
				props
			}
			DomEventKind::MouseUp => {
				let Some(mut props) = descriptor::selection_properties(&window.selection_text()) else {
					return;
				};
				props.insert("$current_url".into(), location.as_str().into());
				props.insert("$host".into(), host_of(&location).into());
				props.insert("$pathname".into(), location.path().into());
				props.insert("$event_type".into(), EVENT_TYPE_TEXT_SELECTION.into());
				props
			}
		};
		sink.capture(AUTOCAPTURE_EVENT, properties);
	}

	fn base(&self, tree: &DomTree, target: NodeId, location: &url::Url) -> Map<String, Value> {
		descriptor::element_properties(tree, target, self.options.capture_content_text, location)
	}
}
