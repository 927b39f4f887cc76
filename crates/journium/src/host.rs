// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Browser host surface: location, history, document and selection.
//!
//! A client constructed without a [`Window`] runs as a non-browser host and
//! skips pageview and autocapture wiring.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use url::Url;

use crate::dom::{Document, ListenerId};

/// A navigation primitive: receives the (possibly relative) target URL.
pub type NavigationFn = Arc<dyn Fn(&str) + Send + Sync>;

pub type PopStateListener = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug)]
struct NavState {
	entries: Vec<Url>,
	index: usize,
}

impl NavState {
	fn current(&self) -> &Url {
		&self.entries[self.index]
	}

	fn resolve(&self, target: &str) -> Option<Url> {
		self.current().join(target).ok()
	}
}

fn nav(state: &Mutex<NavState>) -> MutexGuard<'_, NavState> {
	state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `location.host`: hostname plus an explicit port.
pub(crate) fn host_of(url: &Url) -> String {
	let host = url.host_str().unwrap_or_default();
	match url.port() {
		Some(port) => format!("{host}:{port}"),
		None => host.to_string(),
	}
}

/// `location.search`: the query with its leading `?`, or empty.
pub(crate) fn search_of(url: &Url) -> String {
	url.query().map(|q| format!("?{q}")).unwrap_or_default()
}

/// Session history with replaceable `pushState`/`replaceState` primitives.
pub struct History {
	state: Arc<Mutex<NavState>>,
	push_state: RwLock<NavigationFn>,
	replace_state: RwLock<NavigationFn>,
	popstate: Mutex<Vec<(ListenerId, PopStateListener)>>,
}

impl History {
	fn new(state: Arc<Mutex<NavState>>) -> Self {
		let push_target = Arc::clone(&state);
		let push_state: NavigationFn = Arc::new(move |target: &str| {
			let mut nav = nav(&push_target);
			if let Some(url) = nav.resolve(target) {
				let next = nav.index + 1;
				nav.entries.truncate(next);
				nav.entries.push(url);
				nav.index = next;
			}
		});

		let replace_target = Arc::clone(&state);
		let replace_state: NavigationFn = Arc::new(move |target: &str| {
			let mut nav = nav(&replace_target);
			if let Some(url) = nav.resolve(target) {
				let index = nav.index;
				nav.entries[index] = url;
			}
		});

		Self {
			state,
			push_state: RwLock::new(push_state),
			replace_state: RwLock::new(replace_state),
			popstate: Mutex::new(Vec::new()),
		}
	}

	/// Invokes the current `pushState` primitive.
	pub fn push_state(&self, url: &str) {
		let primitive = self.push_state_fn();
		primitive(url);
	}

	/// Invokes the current `replaceState` primitive.
	pub fn replace_state(&self, url: &str) {
		let primitive = self.replace_state_fn();
		primitive(url);
	}

	pub fn push_state_fn(&self) -> NavigationFn {
		Arc::clone(&self.push_state.read().unwrap_or_else(PoisonError::into_inner))
	}

	pub fn replace_state_fn(&self) -> NavigationFn {
		Arc::clone(&self.replace_state.read().unwrap_or_else(PoisonError::into_inner))
	}

	/// Installs a new `pushState` primitive, returning the one it replaced.
	pub fn set_push_state(&self, primitive: NavigationFn) -> NavigationFn {
		let mut slot = self.push_state.write().unwrap_or_else(PoisonError::into_inner);
		std::mem::replace(&mut *slot, primitive)
	}

	/// Installs a new `replaceState` primitive, returning the one it replaced.
	pub fn set_replace_state(&self, primitive: NavigationFn) -> NavigationFn {
		let mut slot = self.replace_state.write().unwrap_or_else(PoisonError::into_inner);
		std::mem::replace(&mut *slot, primitive)
	}

	pub fn add_popstate_listener(&self, listener: PopStateListener) -> ListenerId {
		let id = ListenerId::next();
		self.listeners().push((id, listener));
		id
	}

	pub fn remove_popstate_listener(&self, id: ListenerId) -> bool {
		let mut listeners = self.listeners();
		let before = listeners.len();
		listeners.retain(|(existing, _)| *existing != id);
		listeners.len() != before
	}

	pub fn popstate_listener_count(&self) -> usize {
		self.listeners().len()
	}

	/// Steps back one entry and fires `popstate`. No-op at the first entry.
	pub fn back(&self) {
		self.go(-1);
	}

	/// Steps forward one entry and fires `popstate`. No-op at the last entry.
	pub fn forward(&self) {
		self.go(1);
	}

	pub fn len(&self) -> usize {
		nav(&self.state).entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn go(&self, delta: isize) {
		{
			let mut nav = nav(&self.state);
			let Some(index) = nav.index.checked_add_signed(delta) else {
				return;
			};
			if index >= nav.entries.len() {
				return;
			}
			nav.index = index;
		}
		let listeners: Vec<PopStateListener> = self
			.listeners()
			.iter()
			.map(|(_, listener)| Arc::clone(listener))
			.collect();
		for listener in listeners {
			listener();
		}
	}

	fn listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, PopStateListener)>> {
		self.popstate.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

/// The browser window the SDK observes.
pub struct Window {
	state: Arc<Mutex<NavState>>,
	title: RwLock<String>,
	referrer: String,
	user_agent: String,
	selection: RwLock<String>,
	document: Document,
	history: History,
}

impl Window {
	pub fn new(url: &str) -> Result<Self, url::ParseError> {
		let state = Arc::new(Mutex::new(NavState {
			entries: vec![Url::parse(url)?],
			index: 0,
		}));
		Ok(Self {
			history: History::new(Arc::clone(&state)),
			state,
			title: RwLock::new(String::new()),
			referrer: String::new(),
			user_agent: String::new(),
			selection: RwLock::new(String::new()),
			document: Document::new(),
		})
	}

	pub fn with_title(self, title: impl Into<String>) -> Self {
		self.set_title(title);
		self
	}

	pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
		self.referrer = referrer.into();
		self
	}

	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = user_agent.into();
		self
	}

	pub fn with_document(mut self, document: Document) -> Self {
		self.document = document;
		self
	}

	pub fn location(&self) -> Url {
		nav(&self.state).current().clone()
	}

	pub fn title(&self) -> String {
		self.title.read().unwrap_or_else(PoisonError::into_inner).clone()
	}

	pub fn set_title(&self, title: impl Into<String>) {
		*self.title.write().unwrap_or_else(PoisonError::into_inner) = title.into();
	}

	pub fn referrer(&self) -> &str {
		&self.referrer
	}

	pub fn user_agent(&self) -> &str {
		&self.user_agent
	}

	pub fn document(&self) -> &Document {
		&self.document
	}

	pub fn history(&self) -> &History {
		&self.history
	}

	/// Text of the current selection, empty when nothing is selected.
	pub fn selection_text(&self) -> String {
		self.selection.read().unwrap_or_else(PoisonError::into_inner).clone()
	}

	pub fn set_selection(&self, text: impl Into<String>) {
		*self.selection.write().unwrap_or_else(PoisonError::into_inner) = text.into();
	}
}

impl std::fmt::Debug for Window {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Window")
			.field("location", &self.location().as_str())
			.field("title", &self.title())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	fn window() -> Window {
		Window::new("https://shop.example.com/home").unwrap()
	}

	#[test]
	fn push_state_resolves_relative_urls() {
		let window = window();
		window.history().push_state("/cart?step=2");
		assert_eq!(
			window.location().as_str(),
			"https://shop.example.com/cart?step=2"
		);
		assert_eq!(window.history().len(), 2);
	}

	#[test]
	fn replace_state_keeps_length() {
		let window = window();
		window.history().replace_state("/landing");
		assert_eq!(window.location().path(), "/landing");
		assert_eq!(window.history().len(), 1);
	}

	#[test]
	fn back_fires_popstate() {
		let window = window();
		let fired = Arc::new(AtomicUsize::new(0));
		let counter = fired.clone();
		window
			.history()
			.add_popstate_listener(Arc::new(move || {
				counter.fetch_add(1, Ordering::SeqCst);
			}));

		window.history().push_state("/a");
		window.history().back();
		assert_eq!(window.location().path(), "/home");
		window.history().back();

		assert_eq!(fired.load(Ordering::SeqCst), 1);
		window.history().forward();
		assert_eq!(window.location().path(), "/a");
	}

	#[test]
	fn push_after_back_truncates_forward_entries() {
		let window = window();
		window.history().push_state("/a");
		window.history().push_state("/b");
		window.history().back();
		window.history().push_state("/c");
		assert_eq!(window.history().len(), 3);
		window.history().forward();
		assert_eq!(window.location().path(), "/c");
	}

	#[test]
	fn replaced_primitive_can_be_restored() {
		let window = window();
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = calls.clone();
		let original = window.history().push_state_fn();
		let inner = original.clone();
		window.history().set_push_state(Arc::new(move |url: &str| {
			inner(url);
			counter.fetch_add(1, Ordering::SeqCst);
		}));

		window.history().push_state("/wrapped");
		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert_eq!(window.location().path(), "/wrapped");

		window.history().set_push_state(original);
		window.history().push_state("/plain");
		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert_eq!(window.location().path(), "/plain");
	}

	#[test]
	fn host_includes_explicit_port() {
		let url = Url::parse("http://localhost:3000/x?a=1").unwrap();
		assert_eq!(host_of(&url), "localhost:3000");
		assert_eq!(search_of(&url), "?a=1");
		let url = Url::parse("https://example.com/").unwrap();
		assert_eq!(host_of(&url), "example.com");
		assert_eq!(search_of(&url), "");
	}

	#[test]
	fn selection_round_trips() {
		let window = window();
		assert_eq!(window.selection_text(), "");
		window.set_selection("hello world");
		assert_eq!(window.selection_text(), "hello world");
	}
}
