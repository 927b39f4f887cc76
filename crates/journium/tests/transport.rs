// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use journium::resolver::{fetch_remote, RetryPolicy};
use journium::transport::user_agent;
use journium::{Journium, LocalOptions, ReqwestTransport, Transport};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport() -> Arc<ReqwestTransport> {
	Arc::new(ReqwestTransport::new(Duration::from_secs(5)).unwrap())
}

#[tokio::test]
async fn get_sends_sdk_user_agent() {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/ping"))
		.and(header("user-agent", user_agent().as_str()))
		.respond_with(ResponseTemplate::new(200).set_body_string("pong"))
		.expect(1)
		.mount(&server)
		.await;

	let response = transport()
		.get(&format!("{}/ping", server.uri()))
		.await
		.unwrap();

	assert_eq!(response.status, 200);
	assert_eq!(response.body, "pong");
}

#[tokio::test]
async fn post_json_authenticates_with_bearer_key() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/v1/ingest_event"))
		.and(header("authorization", "Bearer pk_test"))
		.and(body_partial_json(json!({ "hello": "world" })))
		.respond_with(ResponseTemplate::new(202))
		.expect(1)
		.mount(&server)
		.await;

	let response = transport()
		.post_json(
			&format!("{}/v1/ingest_event", server.uri()),
			"pk_test",
			&json!({ "hello": "world" }),
		)
		.await;

	let response = tokio_test::assert_ok!(response);
	assert!(response.is_success());
}

#[tokio::test]
async fn non_success_status_is_a_response_not_an_error() {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.respond_with(ResponseTemplate::new(500).set_body_string("boom"))
		.mount(&server)
		.await;

	let response = tokio_test::assert_ok!(transport().get(&server.uri()).await);

	assert_eq!(response.status, 500);
	assert!(!response.is_success());
}

#[tokio::test]
async fn unreachable_host_is_an_error() {
	let result = transport().get("http://127.0.0.1:9/unreachable").await;
	tokio_test::assert_err!(result);
}

#[tokio::test]
async fn config_endpoint_unknown_key_is_fatal() {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/v1/configs"))
		.and(query_param("ingestion_key", "pk_unknown"))
		.respond_with(ResponseTemplate::new(404).set_body_json(json!({
			"success": false,
			"error": "not found",
			"code": "ingestion_key_not_found",
		})))
		.mount(&server)
		.await;

	let response = fetch_remote(transport().as_ref(), &server.uri(), "pk_unknown")
		.await
		.unwrap();

	assert!(response.is_fatal());
	assert_eq!(response.code.as_deref(), Some("ingestion_key_not_found"));
}

#[tokio::test]
async fn client_round_trip_against_endpoints() {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/v1/configs"))
		.and(query_param("ingestion_key", "pk_test"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"success": true,
			"config": { "flushAt": 50, "autocapture": false },
			"timestamp": "2025-06-01T12:00:00Z",
		})))
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path("/v1/ingest_event"))
		.and(header("authorization", "Bearer pk_test"))
		.and(body_partial_json(json!({
			"events": [{ "event": "report_exported", "ingestion_key": "pk_test" }]
		})))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
		.expect(1)
		.mount(&server)
		.await;

	let client = Journium::builder()
		.publishable_key("pk_test")
		.api_host(server.uri())
		.retry_policy(RetryPolicy {
			max_attempts: 1,
			..RetryPolicy::default()
		})
		.options(LocalOptions::new().flush_interval(0))
		.build_async()
		.await
		.unwrap();

	assert_eq!(client.options().flush_at, 50);
	assert!(!client.options().autocapture_options().capture_clicks);

	client.track("report_exported", json!({ "format": "csv" }).as_object().cloned());
	client.flush().await.unwrap();
	assert!(client.pending_events().is_empty());

	let requests = server.received_requests().await.unwrap();
	let ingest = requests
		.iter()
		.find(|r| r.url.path() == "/v1/ingest_event")
		.unwrap();
	let body: serde_json::Value = serde_json::from_slice(&ingest.body).unwrap();
	let properties = &body["events"][0]["properties"];
	assert_eq!(properties["format"], "csv");
	assert_eq!(properties["$platform"], "server");
	assert!(properties["$device_id"].is_string());
}
