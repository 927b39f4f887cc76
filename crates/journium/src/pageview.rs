// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pageview capture, on demand and on client-side navigation.
//!
//! Auto-capture wraps the window's `pushState`/`replaceState` primitives and
//! listens for `popstate`. The original primitives are kept in the tracker
//! and put back by [`PageviewTracker::stop_auto_capture`].

use std::sync::{Arc, Mutex, PoisonError, Weak};

use journium_core::PAGEVIEW_EVENT;
use serde_json::{Map, Value};
use tokio::runtime::Handle;

use crate::dom::ListenerId;
use crate::host::{host_of, search_of, NavigationFn, Window};
use crate::logger::{sdk_debug, Logger};
use crate::sink::EventSink;

struct PatchedNavigation {
	original_push: NavigationFn,
	original_replace: NavigationFn,
	popstate: ListenerId,
}

pub struct PageviewTracker {
	window: Option<Arc<Window>>,
	sink: Weak<dyn EventSink>,
	logger: Logger,
	patched: Mutex<Option<PatchedNavigation>>,
}

impl PageviewTracker {
	pub fn new(window: Option<Arc<Window>>, sink: Weak<dyn EventSink>, logger: Logger) -> Self {
		Self {
			window,
			sink,
			logger,
			patched: Mutex::new(None),
		}
	}

	/// Emits a `$pageview` for the current location. Caller properties win.
	///
	/// No-op without a window.
	pub fn capture_pageview(&self, properties: Option<Map<String, Value>>) {
		let Some(window) = &self.window else {
			return;
		};
		emit_pageview(window, &self.sink, properties);
	}

	/// Captures the current page, then a pageview after every navigation.
	pub fn start_auto_capture(&self) {
		let Some(window) = &self.window else {
			return;
		};
		let mut patched = self.patched();
		if patched.is_some() {
			return;
		}

		self.capture_pageview(None);

		let history = window.history();
		let weak_window = Arc::downgrade(window);

		let original_push = history.push_state_fn();
		history.set_push_state(wrap_navigation(
			Arc::clone(&original_push),
			weak_window.clone(),
			self.sink.clone(),
		));

		let original_replace = history.replace_state_fn();
		history.set_replace_state(wrap_navigation(
			Arc::clone(&original_replace),
			weak_window.clone(),
			self.sink.clone(),
		));

		let sink = self.sink.clone();
		let popstate = history.add_popstate_listener(Arc::new(move || {
			schedule_pageview(weak_window.clone(), sink.clone());
		}));

		*patched = Some(PatchedNavigation {
			original_push,
			original_replace,
			popstate,
		});
		sdk_debug!(self.logger, "pageview auto-capture started");
	}

	/// Restores the original navigation primitives and drops the listener.
	pub fn stop_auto_capture(&self) {
		let Some(window) = &self.window else {
			return;
		};
		let Some(patched) = self.patched().take() else {
			return;
		};
		let history = window.history();
		history.set_push_state(patched.original_push);
		history.set_replace_state(patched.original_replace);
		history.remove_popstate_listener(patched.popstate);
		sdk_debug!(self.logger, "pageview auto-capture stopped");
	}

	pub fn is_auto_capturing(&self) -> bool {
		self.patched().is_some()
	}

	fn patched(&self) -> std::sync::MutexGuard<'_, Option<PatchedNavigation>> {
		self.patched.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

impl Drop for PageviewTracker {
	fn drop(&mut self) {
		self.stop_auto_capture();
	}
}

fn wrap_navigation(
	original: NavigationFn,
	window: Weak<Window>,
	sink: Weak<dyn EventSink>,
) -> NavigationFn {
	Arc::new(move |url: &str| {
		original(url);
		schedule_pageview(window.clone(), sink.clone());
	})
}

/// Captures on the next runtime tick so the location has settled; inline
/// when no runtime is available.
fn schedule_pageview(window: Weak<Window>, sink: Weak<dyn EventSink>) {
	let capture = move || {
		if let Some(window) = window.upgrade() {
			emit_pageview(&window, &sink, None);
		}
	};
	match Handle::try_current() {
		Ok(handle) => {
			handle.spawn(async move { capture() });
		}
		Err(_) => capture(),
	}
}

fn emit_pageview(window: &Window, sink: &Weak<dyn EventSink>, extra: Option<Map<String, Value>>) {
	let Some(sink) = sink.upgrade() else {
		return;
	};
	let mut properties = pageview_properties(window);
	if let Some(extra) = extra {
		properties.extend(extra);
	}
	sink.capture(PAGEVIEW_EVENT, properties);
}

pub(crate) fn pageview_properties(window: &Window) -> Map<String, Value> {
	let location = window.location();
	let mut properties = Map::new();
	properties.insert("$current_url".into(), location.as_str().into());
	properties.insert("$host".into(), host_of(&location).into());
	properties.insert("$pathname".into(), location.path().into());
	properties.insert("$search".into(), search_of(&location).into());
	properties.insert("$title".into(), window.title().into());
	properties.insert("$referrer".into(), window.referrer().into());
	properties
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sink::testing::RecordingSink;
	use serde_json::json;

	fn window() -> Arc<Window> {
		Arc::new(
			Window::new("https://shop.example.com/products?page=2")
				.unwrap()
				.with_title("Products")
				.with_referrer("https://search.example.org/"),
		)
	}

	async fn settle() {
		for _ in 0..5 {
			tokio::task::yield_now().await;
		}
	}

	#[test]
	fn pageview_carries_location_fields() {
		let sink = RecordingSink::new();
		let tracker = PageviewTracker::new(Some(window()), sink.weak(), Logger::new(false));

		tracker.capture_pageview(None);

		let (event, props) = sink.last().unwrap();
		assert_eq!(event, "$pageview");
		assert_eq!(props["$current_url"], "https://shop.example.com/products?page=2");
		assert_eq!(props["$host"], "shop.example.com");
		assert_eq!(props["$pathname"], "/products");
		assert_eq!(props["$search"], "?page=2");
		assert_eq!(props["$title"], "Products");
		assert_eq!(props["$referrer"], "https://search.example.org/");
	}

	#[test]
	fn caller_properties_win() {
		let sink = RecordingSink::new();
		let tracker = PageviewTracker::new(Some(window()), sink.weak(), Logger::new(false));

		let extra = json!({ "$title": "Override", "campaign": "fall" });
		tracker.capture_pageview(extra.as_object().cloned());

		let (_, props) = sink.last().unwrap();
		assert_eq!(props["$title"], "Override");
		assert_eq!(props["campaign"], "fall");
	}

	#[test]
	fn no_window_is_a_no_op() {
		let sink = RecordingSink::new();
		let tracker = PageviewTracker::new(None, sink.weak(), Logger::new(false));

		tracker.capture_pageview(None);
		tracker.start_auto_capture();

		assert_eq!(sink.len(), 0);
		assert!(!tracker.is_auto_capturing());
	}

	#[tokio::test]
	async fn navigation_triggers_deferred_capture() {
		let window = window();
		let sink = RecordingSink::new();
		let tracker = PageviewTracker::new(Some(window.clone()), sink.weak(), Logger::new(false));

		tracker.start_auto_capture();
		assert_eq!(sink.len(), 1);

		window.history().push_state("/checkout");
		settle().await;
		window.history().replace_state("/checkout?step=2");
		settle().await;
		window.history().back();
		settle().await;

		let paths: Vec<String> = sink
			.events()
			.iter()
			.map(|(_, props)| props["$pathname"].as_str().unwrap().to_string())
			.collect();
		assert_eq!(paths, vec!["/products", "/checkout", "/checkout", "/products"]);
		assert_eq!(sink.events()[2].1["$search"], "?step=2");
	}

	#[tokio::test]
	async fn stop_restores_original_primitives() {
		let window = window();
		let original = window.history().push_state_fn();
		let sink = RecordingSink::new();
		let tracker = PageviewTracker::new(Some(window.clone()), sink.weak(), Logger::new(false));

		tracker.start_auto_capture();
		assert!(!Arc::ptr_eq(&window.history().push_state_fn(), &original));

		tracker.stop_auto_capture();
		assert!(Arc::ptr_eq(&window.history().push_state_fn(), &original));
		assert_eq!(window.history().popstate_listener_count(), 0);

		window.history().push_state("/after-stop");
		settle().await;
		assert_eq!(sink.len(), 1);
		assert_eq!(window.location().path(), "/after-stop");
	}

	#[test]
	fn start_is_idempotent() {
		let window = window();
		let sink = RecordingSink::new();
		let tracker = PageviewTracker::new(Some(window.clone()), sink.weak(), Logger::new(false));

		tracker.start_auto_capture();
		tracker.start_auto_capture();

		assert_eq!(sink.len(), 1);
		assert_eq!(window.history().popstate_listener_count(), 1);
	}

	#[test]
	fn navigation_without_runtime_captures_inline() {
		let window = window();
		let sink = RecordingSink::new();
		let tracker = PageviewTracker::new(Some(window.clone()), sink.weak(), Logger::new(false));

		tracker.start_auto_capture();
		window.history().push_state("/inline");

		assert_eq!(sink.len(), 2);
		assert_eq!(sink.last().unwrap().1["$pathname"], "/inline");
	}
}
