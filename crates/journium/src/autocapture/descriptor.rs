// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Derivation of autocapture properties from a DOM target.

use serde_json::{json, Map, Value};
use url::Url;

use crate::dom::{DomTree, Element, NodeId};
use crate::host::host_of;

/// Cap on `$element_text` and `$selected_text`.
pub const MAX_TEXT_LENGTH: usize = 200;

/// Cap on each entry of `$elements_chain_texts`.
pub const MAX_CHAIN_TEXT_LENGTH: usize = 100;

/// Selections shorter than this are not captured.
pub const MIN_SELECTION_LENGTH: usize = 3;

const MAX_SELECTOR_CLASSES: usize = 3;

const ALLOWED_ATTRIBUTES: &[(&str, &str)] = &[
	("name", "$element_name"),
	("role", "$element_role"),
	("aria-label", "$element_aria_label"),
	("data-testid", "$element_data_testid"),
	("data-test", "$element_data_test"),
];

const SENSITIVE_INPUT_TYPES: &[&str] = &["password", "email", "tel", "hidden"];
const SENSITIVE_NAME_FRAGMENTS: &[&str] = &["card", "cvv", "cvc"];

/// Collapses whitespace and truncates to `max` characters.
pub fn clean_text(raw: &str, max: usize) -> String {
	raw.split_whitespace()
		.collect::<Vec<_>>()
		.join(" ")
		.chars()
		.take(max)
		.collect()
}

/// `type` as reported in `$element_type`.
pub fn element_type(element: &Element) -> String {
	match element.tag() {
		"input" => element.attribute("type").unwrap_or("text").to_ascii_lowercase(),
		"button" => element.attribute("type").unwrap_or("submit").to_ascii_lowercase(),
		tag => tag.to_string(),
	}
}

/// Returns true if the control's value must never be inspected.
pub fn is_sensitive_input(element: &Element) -> bool {
	let input_type = element.attribute("type").unwrap_or("text").to_ascii_lowercase();
	if SENSITIVE_INPUT_TYPES.contains(&input_type.as_str()) {
		return true;
	}
	if element
		.attribute("autocomplete")
		.is_some_and(|ac| ac.to_ascii_lowercase().starts_with("cc-"))
	{
		return true;
	}
	element.attribute("name").is_some_and(|name| {
		let name = name.to_ascii_lowercase();
		SENSITIVE_NAME_FRAGMENTS.iter().any(|f| name.contains(f))
	})
}

/// Base properties shared by click, submit and change events.
pub fn element_properties(
	tree: &DomTree,
	node: NodeId,
	capture_content_text: bool,
	location: &Url,
) -> Map<String, Value> {
	let mut props = Map::new();
	let Some(element) = tree.element(node) else {
		return props;
	};

	props.insert("$element_tag".into(), element.tag().into());
	props.insert("$element_type".into(), element_type(element).into());
	if let Some(id) = element.id() {
		props.insert("$element_id".into(), id.into());
	}
	props.insert("$element_classes".into(), json!(element.class_list()));
	for (attribute, key) in ALLOWED_ATTRIBUTES {
		if let Some(value) = element.attribute(attribute) {
			props.insert((*key).into(), value.into());
		}
	}

	if capture_content_text {
		let text = clean_text(&tree.text_content(node), MAX_TEXT_LENGTH);
		if !text.is_empty() {
			props.insert("$element_text".into(), text.into());
		}
	}

	let rect = element.rect();
	props.insert(
		"$element_rect".into(),
		json!({
			"x": rect.x.round() as i64,
			"y": rect.y.round() as i64,
			"width": rect.width.round() as i64,
			"height": rect.height.round() as i64,
		}),
	);

	if let Some(parent) = tree.ancestors(node).next().and_then(|p| tree.element(p)) {
		props.insert("$parent_tag".into(), parent.tag().into());
		if let Some(id) = parent.id() {
			props.insert("$parent_id".into(), id.into());
		}
	}

	props.insert("$current_url".into(), location.as_str().into());
	props.insert("$host".into(), host_of(location).into());
	props.insert("$pathname".into(), location.path().into());

	ElementsChain::build(tree, node).write_into(&mut props);
	props
}

/// Selector path from the document body down to the target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementsChain {
	pub selectors: Vec<String>,
	pub texts: Vec<String>,
	pub ids: Vec<String>,
	pub href: Option<String>,
}

impl ElementsChain {
	/// Walks from `node` up to, but excluding, `<body>`; stored root first.
	pub fn build(tree: &DomTree, node: NodeId) -> Self {
		let mut chain = Self::default();
		let levels = std::iter::once(node)
			.chain(tree.ancestors(node))
			.take_while(|n| *n != tree.body() && *n != tree.root());
		for level in levels {
			let Some(element) = tree.element(level) else {
				continue;
			};
			chain.selectors.push(selector(tree, level, element));
			chain.texts.push(level_text(tree, level, element));
			chain.ids.push(element.id().unwrap_or_default().to_string());
			if chain.href.is_none() && element.tag() == "a" {
				chain.href = element.attribute("href").map(str::to_string);
			}
		}
		chain.selectors.reverse();
		chain.texts.reverse();
		chain.ids.reverse();
		chain
	}

	pub fn chain_string(&self) -> String {
		self.selectors.join(" > ")
	}

	fn write_into(self, props: &mut Map<String, Value>) {
		props.insert("$elements_chain".into(), self.chain_string().into());
		props.insert("$elements_chain_texts".into(), json!(self.texts));
		props.insert("$elements_chain_ids".into(), json!(self.ids));
		props.insert(
			"$elements_chain_href".into(),
			self.href.map(Value::String).unwrap_or(Value::Null),
		);
	}
}

fn selector(tree: &DomTree, node: NodeId, element: &Element) -> String {
	let mut selector = element.tag().to_string();
	if let Some(id) = element.id() {
		selector.push('#');
		selector.push_str(id);
	}
	for class in element.class_list().into_iter().take(MAX_SELECTOR_CLASSES) {
		selector.push('.');
		selector.push_str(class);
	}
	if element.id().is_none() {
		if let Some(parent) = tree.parent(node) {
			let siblings: Vec<NodeId> = tree.element_children(parent).collect();
			let same_tag = siblings
				.iter()
				.filter(|s| tree.element(**s).is_some_and(|e| e.tag() == element.tag()))
				.count();
			if same_tag > 1 {
				if let Some(position) = siblings.iter().position(|s| *s == node) {
					selector.push_str(&format!(":nth-child({})", position + 1));
				}
			}
		}
	}
	selector
}

fn level_text(tree: &DomTree, node: NodeId, element: &Element) -> String {
	let raw = match element.tag() {
		"a" => tree.text_content(node),
		"input" | "textarea" => match element.attribute("placeholder") {
			Some(placeholder) if !placeholder.is_empty() => placeholder.to_string(),
			_ if !is_sensitive_input(element) => element.value().unwrap_or_default().to_string(),
			_ => String::new(),
		},
		"button" | "span" | "div" => tree.direct_text(node),
		_ => String::new(),
	};
	clean_text(&raw, MAX_CHAIN_TEXT_LENGTH)
}

/// Submit additions for the form at or around `node`.
pub fn form_properties(tree: &DomTree, node: NodeId, location: &Url) -> Map<String, Value> {
	let mut props = Map::new();
	let Some(form_node) = tree.closest(node, "form") else {
		return props;
	};
	let Some(form) = tree.element(form_node) else {
		return props;
	};

	let method = form.attribute("method").unwrap_or("get").to_ascii_lowercase();
	props.insert("$form_method".into(), method.into());
	let action = form
		.attribute("action")
		.and_then(|action| location.join(action).ok())
		.unwrap_or_else(|| location.clone());
	props.insert("$form_action".into(), action.as_str().into());
	if let Some(id) = form.id() {
		props.insert("$form_id".into(), id.into());
	}

	let mut field_types = Map::new();
	let mut field_count = 0u64;
	for field in tree.descendants(form_node) {
		let Some(element) = tree.element(field) else {
			continue;
		};
		let field_type = match element.tag() {
			"input" => element.attribute("type").unwrap_or("text").to_ascii_lowercase(),
			"select" | "textarea" => element.tag().to_string(),
			_ => continue,
		};
		field_count += 1;
		let entry = field_types.entry(field_type).or_insert(Value::from(0u64));
		*entry = Value::from(entry.as_u64().unwrap_or(0) + 1);
	}
	props.insert("$form_field_count".into(), field_count.into());
	props.insert("$form_field_types".into(), Value::Object(field_types));
	props
}

/// Returns true for the form controls change capture applies to.
pub fn is_form_control(element: &Element) -> bool {
	matches!(element.tag(), "input" | "select" | "textarea")
}

/// Change additions for a form control. Value-derived fields only for
/// controls that pass [`is_sensitive_input`].
pub fn input_properties(tree: &DomTree, node: NodeId) -> Map<String, Value> {
	let mut props = Map::new();
	let Some(element) = tree.element(node) else {
		return props;
	};

	let input_type = match element.tag() {
		"input" => element.attribute("type").unwrap_or("text").to_ascii_lowercase(),
		tag => tag.to_string(),
	};
	props.insert("$input_type".into(), input_type.clone().into());
	if let Some(name) = element.attribute("name") {
		props.insert("$input_name".into(), name.into());
	}
	if let Some(placeholder) = element.attribute("placeholder") {
		props.insert("$input_placeholder".into(), placeholder.into());
	}

	if !is_sensitive_input(element) {
		if matches!(input_type.as_str(), "checkbox" | "radio") {
			props.insert("$input_checked".into(), element.checked().into());
		} else {
			let value = element.value().unwrap_or_default();
			props.insert("$input_value_length".into(), value.chars().count().into());
			props.insert("$input_has_value".into(), (!value.is_empty()).into());
			if element.tag() == "select" {
				props.insert("$input_selected_value".into(), value.into());
			}
		}
	}

	if let Some(form_id) = tree
		.ancestors(node)
		.find(|n| tree.element(*n).is_some_and(|e| e.tag() == "form"))
		.and_then(|form| tree.element(form))
		.and_then(Element::id)
	{
		props.insert("$form_id".into(), form_id.into());
	}
	props
}

/// Text-selection properties, or `None` for selections too short to keep.
pub fn selection_properties(selected: &str) -> Option<Map<String, Value>> {
	let trimmed = selected.trim();
	let length = trimmed.chars().count();
	if length < MIN_SELECTION_LENGTH {
		return None;
	}
	let mut props = Map::new();
	props.insert(
		"$selected_text".into(),
		trimmed.chars().take(MAX_TEXT_LENGTH).collect::<String>().into(),
	);
	props.insert("$selection_length".into(), length.into());
	Some(props)
}
