use super::*;
use crate::config::IntegrationsConfig;
use crate::model::NewWorkflowNode;
use crate::storage::ProjectStorage;
use crate::utils::TestEnvironment;
use chrono::TimeZone;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn quotes_body() -> Value {
    json!({
        "USDBRL": {"name": "Dollar/Real", "bid": "5.4321", "pctChange": "0.50",
                   "high": "5.50", "low": "5.40", "create_date": "2026-10-17 10:00:00"},
        "EURBRL": {"name": "Euro/Real", "bid": "6.10", "pctChange": "-0.10",
                   "high": "6.20", "low": "6.00", "create_date": "2026-10-17 10:00:00"}
    })
}

/// Central bank down, quote API answering
async fn currency_servers() -> (MockServer, MockServer) {
    let bcb = MockServer::start().await;
    let awesome = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("CotacaoDolarDia"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&bcb)
        .await;
    Mock::given(method("GET"))
        .and(path("/json/last/USD-BRL,EUR-BRL,BTC-BRL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(quotes_body()))
        .mount(&awesome)
        .await;
    (bcb, awesome)
}

fn integrations(bcb: &MockServer, awesome: &MockServer, telegram: &MockServer) -> IntegrationsConfig {
    IntegrationsConfig {
        bcb_base_url: bcb.uri(),
        awesome_api_base_url: awesome.uri(),
        telegram_base_url: telegram.uri(),
        currency_timeout_secs: 2,
        ..IntegrationsConfig::default()
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn canvas_node(node_id: &str, node_type: &str, x: f64, config: Value) -> NewWorkflowNode {
    NewWorkflowNode {
        node_id: node_id.to_string(),
        name: node_id.to_string(),
        node_type: node_type.to_string(),
        node_category: "flow".to_string(),
        position_x: x,
        position_y: 200.0,
        config: config.as_object().cloned().unwrap_or_default(),
    }
}

#[test]
fn test_sanitize_filename() {
    let now = Local.with_ymd_and_hms(2026, 10, 17, 9, 5, 3).unwrap();

    assert_eq!(sanitize_filename("report.csv", "csv", now), "report.csv");
    assert_eq!(
        sanitize_filename("../../etc/passwd", "txt", now),
        "passwd"
    );
    assert_eq!(
        sanitize_filename("C:\\temp\\my report (1).txt", "txt", now),
        "my_report__1_.txt"
    );
    assert_eq!(
        sanitize_filename(".env", "json", now),
        "output_20261017_090503.json"
    );
    assert_eq!(sanitize_filename("", "", now), "output_20261017_090503.txt");
    assert_eq!(
        sanitize_filename("dir/", "../md", now),
        "output_20261017_090503.md"
    );
}

#[test]
fn test_has_executable_integration() {
    assert!(has_executable_integration(&["email", "currency_api"]));
    assert!(has_executable_integration(&["telegram"]));
    assert!(!has_executable_integration(&["email", "slack"]));
    assert!(!has_executable_integration::<&str>(&[]));
}

#[tokio::test]
async fn test_execute_real_without_integrations() {
    let env = TestEnvironment::new().await;

    let report = env
        .deps
        .executor
        .execute_real(&Flow::default(), &Intent::default())
        .await;

    assert!(report.results.is_empty());
    assert_eq!(report.output, vec!["No executable integration found"]);
}

#[tokio::test]
async fn test_telegram_without_credentials_is_reported() {
    let env = TestEnvironment::new().await;

    let report = env
        .deps
        .executor
        .run_integrations("Rates", &names(&["telegram"]))
        .await;

    assert_eq!(
        report.results,
        vec![RunResult::Telegram {
            result: None,
            error: Some("Telegram not configured".to_string()),
        }]
    );
    assert!(report.output_text().starts_with("Telegram not configured"));
}

#[tokio::test]
async fn test_currency_failure_does_not_stop_telegram() {
    let env = TestEnvironment::new().await;

    let report = env
        .deps
        .executor
        .run_integrations("Rates", &names(&["currency_api", "telegram"]))
        .await;

    assert_eq!(report.results.len(), 2);
    assert!(report.results.iter().all(RunResult::is_error));
    assert!(report.output[0].starts_with("Failed to fetch rates"));
}

#[tokio::test]
async fn test_run_integrations_sends_rates_to_telegram() {
    let (bcb, awesome) = currency_servers().await;
    let telegram = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botbot-token/sendMessage"))
        .and(body_partial_json(json!({"chat_id": "42", "parse_mode": "HTML"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true, "result": {"message_id": 99}
        })))
        .expect(1)
        .mount(&telegram)
        .await;

    let env = TestEnvironment::with_integrations(integrations(&bcb, &awesome, &telegram)).await;
    env.secrets.set_secret(TELEGRAM_BOT_TOKEN, "bot-token").await.unwrap();
    env.secrets.set_secret(TELEGRAM_CHAT_ID, "42").await.unwrap();

    let report = env
        .deps
        .executor
        .run_integrations("Daily rates", &names(&["currency_api", "telegram"]))
        .await;

    assert_eq!(
        report.output,
        vec![
            "Rates fetched",
            "  • Euro/Real: R$ 6.10 (↓ -0.10%)",
            "  • Dollar/Real: R$ 5.43 (↑ 0.50%)",
            "Message sent to Telegram",
        ]
    );
    assert!(matches!(
        &report.results[1],
        RunResult::Telegram { result: Some(d), error: None } if d.message_id == Some(99)
    ));

    let requests = telegram.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let text = body["text"].as_str().unwrap();
    assert!(text.starts_with("<b>Daily rates</b>"));
    assert!(text.contains("Dollar/Real: R$ 5.43"));
}

#[tokio::test]
async fn test_synthesize_file_writes_output() {
    let env = TestEnvironment::new().await;
    let content = "x".repeat(600);
    env.generator.push_json(json!({
        "content": content,
        "filename": "../report.txt",
        "summary": "Report written"
    }));

    let file = env
        .deps
        .executor
        .synthesize_file(&Flow::default(), &Intent::default(), 500)
        .await
        .unwrap();

    assert_eq!(file.filename, "report.txt");
    assert_eq!(file.summary, "Report written");
    assert_eq!(file.preview.len(), 503);
    assert!(file.preview.ends_with("..."));
    assert!(file.filepath.starts_with(env.deps.executor.outputs_dir()));
    assert_eq!(std::fs::read_to_string(&file.filepath).unwrap(), content);

    let request = &env.generator.requests()[0];
    assert!(request.user.contains("FLOW:"));
}

#[tokio::test]
async fn test_synthesize_file_pretty_prints_structured_content() {
    let env = TestEnvironment::new().await;
    env.generator.push_json(json!({
        "content": {"rows": [1, 2]},
        "filename": "data.json"
    }));

    let file = env
        .deps
        .executor
        .synthesize_file(&Flow::default(), &Intent::default(), 500)
        .await
        .unwrap();

    let written = std::fs::read_to_string(&file.filepath).unwrap();
    assert_eq!(written, serde_json::to_string_pretty(&json!({"rows": [1, 2]})).unwrap());
    assert_eq!(file.summary, "Execution finished");
    assert!(!file.preview.ends_with("..."));
}

#[tokio::test]
async fn test_execute_saved_records_synthesis_failure() {
    let env = TestEnvironment::new().await;

    let report = env
        .deps
        .executor
        .execute_saved(&Flow::default(), &Intent::default())
        .await;

    assert_eq!(report.results.len(), 1);
    assert!(matches!(report.results[0], RunResult::Error { .. }));
    assert!(report.output[0].starts_with("Failed to execute flow"));
}

#[tokio::test]
async fn test_run_project_interprets_nodes_in_position_order() {
    let env = TestEnvironment::new().await;
    let storage = &env.deps.storage;
    let project = storage.create_project("Canvas", "").await.unwrap();

    let nodes = [
        canvas_node("log", "log", 700.0, json!({"message": "done"})),
        canvas_node("start", "manual", 100.0, json!({})),
        canvas_node("repeat", "loop", 300.0, json!({"count": 2})),
        canvas_node("check", "condition", 400.0, json!({})),
        canvas_node("pause", "wait", 500.0, json!({"seconds": 2})),
        canvas_node("notify", "telegram", 600.0, json!({})),
        canvas_node("skipped", "log", 50.0, json!({})),
    ];
    for node in &nodes {
        storage.create_node(project.id, node).await.unwrap();
    }
    storage
        .update_node(
            project.id,
            "skipped",
            &crate::storage::NodePatch {
                is_enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let detail = storage.project_detail(project.id).await.unwrap().unwrap();
    let run = env.deps.executor.run_project(&detail).await;

    assert!(run.success);
    assert_eq!(
        run.output,
        [
            "[start] Executed (manual)",
            "[repeat] Loop ran 2 times",
            "[check] Condition evaluated: true",
            "[pause] Waiting 2s",
            "[notify] Telegram not configured",
            "[log] done",
        ]
        .join("\n")
    );
    assert_eq!(run.results.len(), 6);
    assert!(run.results[4].is_error());

    let value = serde_json::to_value(&run.results[1]).unwrap();
    assert_eq!(value["type"], "loop");
    assert_eq!(value["results"], json!(["Iteration 1", "Iteration 2"]));
}

#[tokio::test]
async fn test_run_project_currency_error_is_recorded() {
    let env = TestEnvironment::new().await;
    let storage = &env.deps.storage;
    let project = storage.create_project("Rates", "").await.unwrap();
    storage
        .create_node(project.id, &canvas_node("rates", "currency", 0.0, json!({})))
        .await
        .unwrap();
    storage
        .create_node(project.id, &canvas_node("after", "log", 10.0, json!({})))
        .await
        .unwrap();

    let detail = storage.project_detail(project.id).await.unwrap().unwrap();
    let run = env.deps.executor.run_project(&detail).await;

    assert!(run.success);
    assert!(run.results[0].is_error());
    assert!(run.output.starts_with("[rates] Error:"));
    assert!(run.output.ends_with("[after] Log entry"));
}
