// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Arena-backed document model consumed by autocapture.
//!
//! Nodes live in a flat arena addressed by [`NodeId`]; parent and child links
//! are indices. The [`Document`] wraps the tree with document-level event
//! listener registration and dispatch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Index of a node in its [`DomTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Bounding box, CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
	pub x: f64,
	pub y: f64,
	pub width: f64,
	pub height: f64,
}

impl Rect {
	pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
		Self {
			x,
			y,
			width,
			height,
		}
	}
}

/// An element node's own data.
#[derive(Debug, Clone, Default)]
pub struct Element {
	tag: String,
	attributes: Vec<(String, String)>,
	rect: Rect,
	value: Option<String>,
	checked: bool,
}

impl Element {
	fn new(tag: &str) -> Self {
		Self {
			tag: tag.to_ascii_lowercase(),
			..Default::default()
		}
	}

	/// Lowercase tag name.
	pub fn tag(&self) -> &str {
		&self.tag
	}

	pub fn attribute(&self, name: &str) -> Option<&str> {
		self.attributes
			.iter()
			.find(|(key, _)| key == name)
			.map(|(_, value)| value.as_str())
	}

	/// Non-empty `id` attribute.
	pub fn id(&self) -> Option<&str> {
		self.attribute("id").filter(|id| !id.is_empty())
	}

	pub fn class_list(&self) -> Vec<&str> {
		self.attribute("class")
			.map(|classes| classes.split_whitespace().collect())
			.unwrap_or_default()
	}

	pub fn has_class(&self, class: &str) -> bool {
		self.class_list().contains(&class)
	}

	pub fn rect(&self) -> Rect {
		self.rect
	}

	/// Current value of a form control; falls back to the `value` attribute.
	pub fn value(&self) -> Option<&str> {
		self.value.as_deref().or_else(|| self.attribute("value"))
	}

	pub fn checked(&self) -> bool {
		self.checked
	}
}

#[derive(Debug, Clone)]
enum NodeData {
	Element(Element),
	Text(String),
}

#[derive(Debug, Clone)]
struct Node {
	data: NodeData,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
}

/// A document tree rooted at `<html>` with a `<body>`.
#[derive(Debug, Clone)]
pub struct DomTree {
	nodes: Vec<Node>,
	root: NodeId,
	body: NodeId,
}

impl Default for DomTree {
	fn default() -> Self {
		Self::new()
	}
}

impl DomTree {
	pub fn new() -> Self {
		let mut tree = Self {
			nodes: Vec::new(),
			root: NodeId(0),
			body: NodeId(0),
		};
		tree.root = tree.create_element("html");
		let head = tree.create_element("head");
		tree.append_child(tree.root, head);
		tree.body = tree.append_element(tree.root, "body");
		tree
	}

	pub fn root(&self) -> NodeId {
		self.root
	}

	pub fn body(&self) -> NodeId {
		self.body
	}

	/// Creates a detached element.
	pub fn create_element(&mut self, tag: &str) -> NodeId {
		self.push(NodeData::Element(Element::new(tag)))
	}

	/// Moves `child` under `parent`, detaching it from any previous parent.
	pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
		if let Some(old_parent) = self.nodes[child.0].parent {
			self.nodes[old_parent.0].children.retain(|c| *c != child);
		}
		self.nodes[child.0].parent = Some(parent);
		self.nodes[parent.0].children.push(child);
	}

	pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
		let child = self.create_element(tag);
		self.append_child(parent, child);
		child
	}

	pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
		let child = self.push(NodeData::Text(text.to_string()));
		self.append_child(parent, child);
		child
	}

	pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
		if let Some(element) = self.element_mut(node) {
			match element.attributes.iter_mut().find(|(key, _)| key == name) {
				Some((_, existing)) => *existing = value.to_string(),
				None => element
					.attributes
					.push((name.to_string(), value.to_string())),
			}
		}
	}

	pub fn set_rect(&mut self, node: NodeId, rect: Rect) {
		if let Some(element) = self.element_mut(node) {
			element.rect = rect;
		}
	}

	pub fn set_value(&mut self, node: NodeId, value: &str) {
		if let Some(element) = self.element_mut(node) {
			element.value = Some(value.to_string());
		}
	}

	pub fn set_checked(&mut self, node: NodeId, checked: bool) {
		if let Some(element) = self.element_mut(node) {
			element.checked = checked;
		}
	}

	/// The element at `node`, or `None` for text nodes.
	pub fn element(&self, node: NodeId) -> Option<&Element> {
		match &self.nodes.get(node.0)?.data {
			NodeData::Element(element) => Some(element),
			NodeData::Text(_) => None,
		}
	}

	pub fn is_element(&self, node: NodeId) -> bool {
		self.element(node).is_some()
	}

	pub fn parent(&self, node: NodeId) -> Option<NodeId> {
		self.nodes.get(node.0)?.parent
	}

	pub fn children(&self, node: NodeId) -> &[NodeId] {
		self.nodes
			.get(node.0)
			.map(|n| n.children.as_slice())
			.unwrap_or_default()
	}

	pub fn element_children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
		self.children(node)
			.iter()
			.copied()
			.filter(|child| self.is_element(*child))
	}

	/// Element ancestors, nearest first, excluding `node` itself.
	pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
		std::iter::successors(self.parent(node), |current| self.parent(*current))
			.filter(|n| self.is_element(*n))
	}

	/// Nearest element at or above `node` (the node itself if it is one).
	pub fn element_or_parent(&self, node: NodeId) -> Option<NodeId> {
		if self.is_element(node) {
			Some(node)
		} else {
			self.ancestors(node).next()
		}
	}

	/// Nearest ancestor-or-self with the given tag.
	pub fn closest(&self, node: NodeId, tag: &str) -> Option<NodeId> {
		std::iter::once(node)
			.chain(self.ancestors(node))
			.find(|n| self.element(*n).is_some_and(|e| e.tag() == tag))
	}

	/// Element descendants in document order.
	pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
		let mut out = Vec::new();
		let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
		while let Some(current) = stack.pop() {
			if self.is_element(current) {
				out.push(current);
			}
			stack.extend(self.children(current).iter().rev().copied());
		}
		out
	}

	/// Concatenated text of the node's direct text children.
	pub fn direct_text(&self, node: NodeId) -> String {
		self.children(node)
			.iter()
			.filter_map(|child| match &self.nodes[child.0].data {
				NodeData::Text(text) => Some(text.as_str()),
				NodeData::Element(_) => None,
			})
			.collect::<Vec<_>>()
			.join(" ")
	}

	/// All descendant text, in document order.
	pub fn text_content(&self, node: NodeId) -> String {
		let mut parts = Vec::new();
		self.collect_text(node, &mut parts);
		parts.join(" ")
	}

	fn collect_text<'a>(&'a self, node: NodeId, parts: &mut Vec<&'a str>) {
		let Some(entry) = self.nodes.get(node.0) else {
			return;
		};
		match &entry.data {
			NodeData::Text(text) => parts.push(text),
			NodeData::Element(_) => {
				for child in &entry.children {
					self.collect_text(*child, parts);
				}
			}
		}
	}

	fn push(&mut self, data: NodeData) -> NodeId {
		let id = NodeId(self.nodes.len());
		self.nodes.push(Node {
			data,
			parent: None,
			children: Vec::new(),
		});
		id
	}

	fn element_mut(&mut self, node: NodeId) -> Option<&mut Element> {
		match &mut self.nodes.get_mut(node.0)?.data {
			NodeData::Element(element) => Some(element),
			NodeData::Text(_) => None,
		}
	}
}

/// DOM event categories the SDK listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomEventKind {
	Click,
	Submit,
	Change,
	MouseUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerPhase {
	Capture,
	Bubble,
}

/// A dispatched DOM event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomEvent {
	pub kind: DomEventKind,
	pub target: NodeId,
}

impl DomEvent {
	pub fn new(kind: DomEventKind, target: NodeId) -> Self {
		Self { kind, target }
	}
}

/// Handle returned by listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

impl ListenerId {
	pub(crate) fn next() -> Self {
		Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
	}
}

pub type DomListener = Arc<dyn Fn(&DomEvent, &DomTree) + Send + Sync>;

struct Registration {
	id: ListenerId,
	kind: DomEventKind,
	phase: ListenerPhase,
	listener: DomListener,
}

/// A document: its tree plus document-level listeners.
#[derive(Default)]
pub struct Document {
	tree: RwLock<DomTree>,
	listeners: Mutex<Vec<Registration>>,
}

impl Document {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_tree(tree: DomTree) -> Self {
		Self {
			tree: RwLock::new(tree),
			listeners: Mutex::new(Vec::new()),
		}
	}

	pub fn read<R>(&self, f: impl FnOnce(&DomTree) -> R) -> R {
		f(&self.tree.read().unwrap_or_else(PoisonError::into_inner))
	}

	pub fn write<R>(&self, f: impl FnOnce(&mut DomTree) -> R) -> R {
		f(&mut self.tree.write().unwrap_or_else(PoisonError::into_inner))
	}

	pub fn add_event_listener(
		&self,
		kind: DomEventKind,
		phase: ListenerPhase,
		listener: DomListener,
	) -> ListenerId {
		let id = ListenerId::next();
		self.registrations().push(Registration {
			id,
			kind,
			phase,
			listener,
		});
		id
	}

	/// Returns true if a listener was removed.
	pub fn remove_event_listener(&self, id: ListenerId) -> bool {
		let mut registrations = self.registrations();
		let before = registrations.len();
		registrations.retain(|r| r.id != id);
		registrations.len() != before
	}

	pub fn listener_count(&self) -> usize {
		self.registrations().len()
	}

	/// Delivers `event` to capture-phase listeners, then bubble-phase ones.
	///
	/// Listeners see the tree read-locked and must not write to it.
	pub fn dispatch(&self, event: DomEvent) {
		let matching: Vec<(ListenerPhase, DomListener)> = self
			.registrations()
			.iter()
			.filter(|r| r.kind == event.kind)
			.map(|r| (r.phase, Arc::clone(&r.listener)))
			.collect();
		if matching.is_empty() {
			return;
		}
		let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
		for phase in [ListenerPhase::Capture, ListenerPhase::Bubble] {
			for (_, listener) in matching.iter().filter(|(p, _)| *p == phase) {
				listener(&event, &tree);
			}
		}
	}

	fn registrations(&self) -> std::sync::MutexGuard<'_, Vec<Registration>> {
		self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
	}
}
