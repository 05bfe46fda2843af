//! Integration tests for Flowsmith
//!
//! Drives the axum router end-to-end against an isolated environment.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use flowsmith::config::HttpConfig;
use flowsmith::core::OperationRegistry;
use flowsmith::http::build_router;
use flowsmith::utils::TestEnvironment;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn router(env: &TestEnvironment) -> Router {
    let http = HttpConfig {
        host: "127.0.0.1".to_string(),
        port: 5000,
        allowed_origins: None,
    };
    build_router(Arc::new(env.deps.clone()), &http)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let env = TestEnvironment::new().await;
    let app = router(&env);

    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_generate_flow_requires_prompt() {
    let env = TestEnvironment::new().await;
    let app = router(&env);

    let (status, body) = call(&app, Method::POST, "/generate-flow", Some(json!({"prompt": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "prompt is required");

    let (status, _) = call(&app, Method::POST, "/generate-flow", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_generate_flow_degrades_when_backend_is_down() {
    let env = TestEnvironment::new().await;
    let app = router(&env);

    // Nothing scripted: every agent falls back to its deterministic path
    let (status, body) = call(
        &app,
        Method::POST,
        "/generate-flow",
        Some(json!({"prompt": "Every hour send the dollar rate to my telegram"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["flow"]["nodes"].as_array().is_some_and(|n| !n.is_empty()));
    assert!(body["validation"]["score"].is_number());

    let (status, stats) = call(&app, Method::GET, "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 1);
}

#[tokio::test]
async fn test_stopping_unknown_automation_is_client_error() {
    let env = TestEnvironment::new().await;
    let app = router(&env);

    let (status, body) = call(&app, Method::POST, "/automations/automation_missing/stop", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Automation is not running");
}

#[tokio::test]
async fn test_automation_refused_without_credentials() {
    let env = TestEnvironment::new().await;
    let app = router(&env);

    let (status, body) = call(
        &app,
        Method::POST,
        "/automations",
        Some(json!({
            "flow": {"name": "Rates", "nodes": [{"id": "1", "type": "trigger"}]},
            "intent": {"integrations": ["telegram"]},
            "interval_minutes": 30,
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["missing_credentials"],
        json!(["TELEGRAM_BOT_TOKEN", "TELEGRAM_CHAT_ID"])
    );

    let (_, listed) = call(&app, Method::GET, "/automations", None).await;
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn test_saved_automation_lifecycle_without_start() {
    let env = TestEnvironment::new().await;
    let app = router(&env);

    let (status, created) = call(
        &app,
        Method::POST,
        "/automations",
        Some(json!({
            "flow": {"name": "Daily report", "nodes": []},
            "interval_minutes": 1440,
            "auto_start": false,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["message"], "Automation created and paused");
    let id = created["automation_id"].as_str().unwrap().to_string();

    let (_, listed) = call(&app, Method::GET, "/automations", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["active"], false);

    let (status, _) = call(&app, Method::DELETE, &format!("/automations/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, Method::DELETE, &format!("/automations/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_saved_flow_validation_and_lookup() {
    let env = TestEnvironment::new().await;
    let app = router(&env);

    let (status, body) = call(&app, Method::POST, "/saved-flows", Some(json!({"flow": {"name": "x"}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Flow must contain a list of nodes");

    let (status, body) = call(&app, Method::POST, "/saved-flows", Some(json!({"flow": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Flow must be a JSON object");

    let (status, saved) = call(
        &app,
        Method::POST,
        "/saved-flows",
        Some(json!({
            "flow": {"nodes": [{"id": "1", "type": "trigger", "name": "Start"}]},
            "prompt": "say hi",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["flow"]["name"], "Untitled flow");
    let flow_id = saved["flow_id"].as_i64().unwrap();

    let (status, fetched) = call(&app, Method::GET, &format!("/saved-flows/{}", flow_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["prompt"], "say hi");

    let (status, _) = call(&app, Method::GET, "/saved-flows/not-a-number", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::DELETE, &format!("/saved-flows/{}", flow_id), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::GET, &format!("/saved-flows/{}", flow_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_project_editing_and_execution_order() {
    let env = TestEnvironment::new().await;
    let app = router(&env);

    let (status, created) = call(&app, Method::POST, "/api/projects", Some(json!({"name": "Canvas"}))).await;
    assert_eq!(status, StatusCode::OK);
    let project_id = created["project"]["id"].as_i64().unwrap();
    let base = format!("/api/projects/{}", project_id);

    for (node_id, x) in [("right", 400.0), ("left", 50.0)] {
        let (status, _) = call(
            &app,
            Method::POST,
            &format!("{}/nodes", base),
            Some(json!({
                "node_id": node_id,
                "name": node_id,
                "node_type": "log",
                "position_x": x,
                "config": {"message": format!("from {}", node_id)},
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    // Edges point right to left; execution still follows the canvas
    let (status, _) = call(
        &app,
        Method::POST,
        &format!("{}/edges", base),
        Some(json!({"source_node_id": "right", "target_node_id": "left"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, run) = call(&app, Method::POST, &format!("{}/execute", base), None).await;
    assert_eq!(status, StatusCode::OK);
    let results = run["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["node"], "left");
    assert_eq!(results[0]["type"], "log");
    assert_eq!(results[1]["node"], "right");

    // Deleting a node takes its edges with it
    let (status, _) = call(&app, Method::DELETE, &format!("{}/nodes/left", base), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, detail) = call(&app, Method::GET, &base, None).await;
    assert_eq!(detail["project"]["nodes"].as_array().unwrap().len(), 1);
    assert_eq!(detail["project"]["edges"], json!([]));
    assert_eq!(detail["project"]["execution_count"], 1);

    let (status, _) = call(&app, Method::DELETE, &base, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&app, Method::GET, &base, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Project not found");
}

#[tokio::test]
async fn test_saved_configurations_apply_immediately() {
    let env = TestEnvironment::new().await;
    let app = router(&env);

    let (_, before) = call(&app, Method::GET, "/credentials", None).await;
    assert_eq!(before["telegram"]["all_configured"], false);

    let (status, saved) = call(
        &app,
        Method::POST,
        "/api/configurations",
        Some(json!({"configurations": [
            {"key": "TELEGRAM_BOT_TOKEN", "value": "123:abc", "integration": "telegram"},
            {"key": "TELEGRAM_CHAT_ID", "value": "42", "integration": "telegram"},
            {"key": "", "value": "ignored"},
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["success"], true);

    let (_, after) = call(&app, Method::GET, "/credentials", None).await;
    assert_eq!(after["telegram"]["all_configured"], true);

    let (_, stored) = call(&app, Method::GET, "/api/configurations", None).await;
    assert_eq!(stored.as_array().unwrap().len(), 2);

    let (status, _) = call(&app, Method::DELETE, "/api/configurations/TELEGRAM_CHAT_ID", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, after_delete) = call(&app, Method::GET, "/credentials", None).await;
    assert_eq!(after_delete["telegram"]["all_configured"], false);
}

#[tokio::test]
async fn test_registry_and_router_agree() {
    let env = TestEnvironment::new().await;
    let registry = OperationRegistry::new(env.deps.clone());

    for meta in flowsmith::core::all_operation_metadata() {
        assert!(
            registry.get_metadata(meta.name).is_some(),
            "{} is not registered",
            meta.name
        );
    }

    let node_types = registry.execute("list_node_types", json!({})).await.unwrap();
    assert_eq!(node_types["success"], true);
}
