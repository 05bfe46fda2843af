use super::*;
use crate::utils::TestEnvironment;
use axum::body::Body;
use axum::http::Request;
use serde_json::Value;
use tower::ServiceExt;

fn local_http(port: u16) -> HttpConfig {
    HttpConfig {
        host: "127.0.0.1".to_string(),
        port,
        allowed_origins: None,
    }
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[test]
fn test_error_status_mapping() {
    let cases = [
        (FlowsmithError::validation("bad"), StatusCode::BAD_REQUEST),
        (
            FlowsmithError::MissingCredentials {
                missing: vec!["K".to_string()],
            },
            StatusCode::BAD_REQUEST,
        ),
        (FlowsmithError::not_found("gone"), StatusCode::NOT_FOUND),
        (FlowsmithError::generation("down"), StatusCode::BAD_GATEWAY),
        (FlowsmithError::config("broken"), StatusCode::INTERNAL_SERVER_ERROR),
        (FlowsmithError::storage("locked"), StatusCode::INTERNAL_SERVER_ERROR),
    ];

    for (err, expected) in cases {
        assert_eq!(AppError::from(err).status(), expected);
    }
}

#[tokio::test]
async fn test_error_body_shape() {
    let response = AppError::from(FlowsmithError::validation("interval too small")).into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "interval too small");
    assert!(body.get("missing_credentials").is_none());
}

#[tokio::test]
async fn test_missing_credentials_body_lists_keys() {
    let response = AppError::from(FlowsmithError::MissingCredentials {
        missing: vec!["TELEGRAM_BOT_TOKEN".to_string(), "TELEGRAM_CHAT_ID".to_string()],
    })
    .into_response();

    let body = body_json(response).await;
    assert_eq!(
        body["missing_credentials"],
        serde_json::json!(["TELEGRAM_BOT_TOKEN", "TELEGRAM_CHAT_ID"])
    );
    assert_eq!(
        body["error"],
        "Missing credentials: TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID"
    );
}

#[tokio::test]
async fn test_storage_errors_are_not_leaked() {
    let response = AppError::from(FlowsmithError::storage("disk I/O at /secret/path")).into_response();
    let body = body_json(response).await;
    assert_eq!(body["error"], "An internal storage error occurred");
}

#[tokio::test]
async fn test_health_route() {
    let env = TestEnvironment::new().await;
    let app = build_router(Arc::new(env.deps.clone()), &local_http(3000));

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_metrics_route_serves_text() {
    crate::telemetry::record_automation_run("manual");

    let env = TestEnvironment::new().await;
    let app = build_router(Arc::new(env.deps.clone()), &local_http(3000));

    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("flowsmith_automation_runs_total"));
}

#[tokio::test]
async fn test_non_object_body_is_rejected() {
    let env = TestEnvironment::new().await;
    let app = build_router(Arc::new(env.deps.clone()), &local_http(3000));

    let response = app
        .oneshot(
            Request::post("/generate-flow")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("[1, 2]"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Request body must be a JSON object");
}

#[tokio::test]
async fn test_empty_body_takes_path_params() {
    let env = TestEnvironment::new().await;
    let app = build_router(Arc::new(env.deps.clone()), &local_http(3000));

    let response = app
        .clone()
        .oneshot(
            Request::post("/automations/auto_missing/stop")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Automation is not running");

    let response = app
        .oneshot(
            Request::post("/automations/auto_missing/stop")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid JSON body")
    );
}

#[test]
fn test_default_origins_follow_port() {
    let origins = allowed_origins(&local_http(8123));
    assert_eq!(
        origins,
        vec![
            HeaderValue::from_static("http://localhost:8123"),
            HeaderValue::from_static("http://127.0.0.1:8123"),
        ]
    );
}

#[test]
fn test_configured_origins_replace_defaults() {
    let config = HttpConfig {
        allowed_origins: Some(vec!["https://editor.example.com".to_string()]),
        ..local_http(8123)
    };
    assert_eq!(
        allowed_origins(&config),
        vec![HeaderValue::from_static("https://editor.example.com")]
    );
}
