use super::*;
use serde_json::json;

#[tokio::test]
async fn test_gateway_parses_fenced_completion() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator.push_text("```json\n{\"objective\": \"rates\"}\n```");

    let gateway = Gateway::new(generator.clone());
    let value = gateway.generate_json("sys", "usr").await.unwrap();

    assert_eq!(value, json!({"objective": "rates"}));
    assert_eq!(
        generator.requests(),
        vec![GenerationRequest::new("sys", "usr")]
    );
}

#[tokio::test]
async fn test_gateway_surfaces_backend_failure() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator.push_failure("quota exceeded");

    let gateway = Gateway::new(generator);
    let err = gateway.generate_json("sys", "usr").await.unwrap_err();
    assert!(matches!(err, FlowsmithError::Generation(ref m) if m == "quota exceeded"));
}

#[tokio::test]
async fn test_gateway_surfaces_malformed_output() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator.push_text("I cannot help with that");

    let gateway = Gateway::new(generator);
    let err = gateway.generate_json("sys", "usr").await.unwrap_err();
    assert!(matches!(err, FlowsmithError::MalformedOutput(_)));
}

#[tokio::test]
async fn test_exhausted_script_fails() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator.push_json(json!({"ok": true}));

    let gateway = Gateway::new(generator.clone());
    assert!(gateway.generate_json("a", "b").await.is_ok());
    assert_eq!(generator.remaining(), 0);
    assert!(gateway.generate_json("a", "b").await.unwrap_err().is_generation_failure());
}
