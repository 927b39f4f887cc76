// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Drives a client against a simulated browser page.
//!
//! ```text
//! JOURNIUM_KEY=pk_test_xxx RUST_LOG=journium=debug cargo run -p journium --example track
//! ```

use std::sync::Arc;
use std::time::Duration;

use journium::{DomEvent, DomEventKind, FileStorage, Journium, LocalOptions, ReqwestTransport, Window};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();

	let key = std::env::var("JOURNIUM_KEY").unwrap_or_else(|_| "pk_demo".to_string());
	let storage_path = std::env::temp_dir().join("journium-demo.json");

	let window = Arc::new(
		Window::new("https://demo.journium.app/pricing")?
			.with_title("Pricing")
			.with_user_agent("Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0"),
	);
	let upgrade = window.document().write(|tree| {
		let card = tree.append_element(tree.body(), "div");
		tree.set_attribute(card, "class", "plan-card");
		let button = tree.append_element(card, "button");
		tree.set_attribute(button, "id", "upgrade");
		tree.append_text(button, "Upgrade");
		button
	});

	let client = Journium::builder()
		.publishable_key(key)
		.transport(Arc::new(ReqwestTransport::new(Duration::from_secs(10))?))
		.storage(Arc::new(FileStorage::new(storage_path)))
		.window(window.clone())
		.options(LocalOptions::new().debug(true).flush_at(5))
		.build_async()
		.await?;

	window
		.document()
		.dispatch(DomEvent::new(DomEventKind::Click, upgrade));
	window.history().push_state("/checkout");
	tokio::task::yield_now().await;

	client.track("plan_selected", json!({ "plan": "team" }).as_object().cloned());
	client.identify("demo_user", json!({ "company": "Acme" }).as_object().cloned());

	println!("pending events: {}", client.pending_events().len());
	if let Err(e) = client.destroy().await {
		eprintln!("final flush failed: {e}");
	}
	Ok(())
}
