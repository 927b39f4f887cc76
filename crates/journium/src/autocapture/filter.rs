// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use journium_core::AutocaptureOptions;

use crate::dom::{DomTree, NodeId};

/// Returns true if interactions with `node` must not be captured.
///
/// The node's own tag is checked against `ignore_elements`; the node and every
/// ancestor up to the root are checked against `ignore_classes`.
pub fn should_ignore(tree: &DomTree, node: NodeId, options: &AutocaptureOptions) -> bool {
	let Some(element) = tree.element(node) else {
		return true;
	};
	if options
		.ignore_elements
		.iter()
		.any(|tag| tag.eq_ignore_ascii_case(element.tag()))
	{
		return true;
	}
	if options.ignore_classes.is_empty() {
		return false;
	}
	std::iter::once(node)
		.chain(tree.ancestors(node))
		.filter_map(|n| tree.element(n))
		.any(|e| {
			options
				.ignore_classes
				.iter()
				.any(|class| e.has_class(class))
		})
}
