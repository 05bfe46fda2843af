use super::*;
use serde_json::json;

#[test]
fn test_intent_defaults_fill_missing_fields() {
    let intent: Intent = serde_json::from_value(json!({})).unwrap();
    assert_eq!(intent.objective, "Not specified");
    assert_eq!(intent.summary, "Flow processing");
    assert_eq!(intent.action_type, ActionType::Transform);
    assert_eq!(intent.output_type, OutputType::File);
    assert_eq!(intent.complexity, Complexity::Medium);
    assert!(intent.output_format.is_none());
    assert!(intent.integrations.is_empty());
}

#[test]
fn test_lenient_enums_accept_aliases_and_unknowns() {
    let intent: Intent = serde_json::from_value(json!({
        "action_type": "envio",
        "output_type": "mensagem",
        "complexity": "complexa"
    }))
    .unwrap();
    assert_eq!(intent.action_type, ActionType::Send);
    assert_eq!(intent.output_type, OutputType::Message);
    assert_eq!(intent.complexity, Complexity::Complex);

    let intent: Intent = serde_json::from_value(json!({
        "action_type": "teleport",
        "output_type": "HOLOGRAM",
        "complexity": "extreme"
    }))
    .unwrap();
    assert_eq!(intent.action_type, ActionType::Transform);
    assert_eq!(intent.output_type, OutputType::File);
    assert_eq!(intent.complexity, Complexity::Medium);

    let serialized = serde_json::to_value(ActionType::Hybrid).unwrap();
    assert_eq!(serialized, json!("hybrid"));
}

#[test]
fn test_integrations_accept_string_or_null() {
    let intent: Intent = serde_json::from_value(json!({"integrations": "telegram"})).unwrap();
    assert_eq!(intent.integrations, vec!["telegram"]);

    let intent: Intent = serde_json::from_value(json!({"integrations": null})).unwrap();
    assert!(intent.integrations.is_empty());

    let intent: Intent =
        serde_json::from_value(json!({"integrations": ["slack", 3, "email"]})).unwrap();
    assert_eq!(intent.integrations, vec!["slack", "email"]);
}

#[test]
fn test_node_classification() {
    assert!(FlowNode::new("a", "Schedule", "Every hour").is_trigger());
    assert!(FlowNode::new("b", "notification", "Notify").is_output());
    let process = FlowNode::new("c", "process", "Work");
    assert!(!process.is_trigger());
    assert!(!process.is_output());
}

#[test]
fn test_flow_parsing_with_aliases() {
    let flow: Flow = serde_json::from_value(json!({
        "name": "Rates",
        "nodes": [
            {"id": "n1", "type": "trigger", "name": "Start", "next": "n2"},
            {"id": "n2", "name": "Work", "next": ["n3"]},
            {"id": "n3", "type": "output", "name": "Done"}
        ],
        "connections": [{"source": "n1", "target": "n2"}]
    }))
    .unwrap();

    assert_eq!(flow.nodes[0].next, vec!["n2"]);
    assert_eq!(flow.nodes[1].node_type, "process");
    assert_eq!(flow.connections[0], Connection::new("n1", "n2"));
    assert!(flow.has_trigger());
    assert!(flow.has_output());
    assert_eq!(
        flow.connections_from_next(),
        vec![Connection::new("n1", "n2"), Connection::new("n2", "n3")]
    );
}

#[test]
fn test_dangling_references() {
    let flow = Flow {
        name: "x".to_string(),
        description: String::new(),
        nodes: vec![
            FlowNode::new("a", "trigger", "A").with_next(vec!["b".to_string(), "ghost".to_string()]),
            FlowNode::new("b", "output", "B"),
        ],
        connections: vec![Connection::new("phantom", "b")],
    };

    let dangling = flow.dangling_references();
    assert_eq!(
        dangling,
        vec![
            ("a".to_string(), "ghost".to_string()),
            ("phantom".to_string(), "b".to_string())
        ]
    );
}

#[test]
fn test_run_result_tagging() {
    let result = RunResult::Telegram {
        result: None,
        error: Some("Telegram not configured".to_string()),
    };
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["type"], "telegram");
    assert_eq!(value["error"], "Telegram not configured");
    assert!(value.get("result").is_none());
    assert!(result.is_error());
}
