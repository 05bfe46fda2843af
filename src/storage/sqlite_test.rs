use super::*;
use crate::agents::builder::default_flow;
use serde_json::json;

async fn storage() -> SqliteStorage {
    SqliteStorage::new(":memory:").await.unwrap()
}

fn new_node(node_id: &str, x: f64) -> NewWorkflowNode {
    NewWorkflowNode {
        node_id: node_id.to_string(),
        name: node_id.to_uppercase(),
        node_type: "log".to_string(),
        node_category: "output".to_string(),
        position_x: x,
        position_y: 200.0,
        config: NodeConfig::new(),
    }
}

fn new_edge(edge_id: &str, source: &str, target: &str) -> NewWorkflowEdge {
    NewWorkflowEdge {
        edge_id: edge_id.to_string(),
        source_node_id: source.to_string(),
        target_node_id: target.to_string(),
        source_port: "output".to_string(),
        target_port: "input".to_string(),
        label: None,
    }
}

#[tokio::test]
async fn test_configuration_upsert_by_key() {
    let storage = storage().await;

    let first = storage
        .upsert_configuration("TELEGRAM_CHAT_ID", "1", Some("telegram"))
        .await
        .unwrap();
    let second = storage
        .upsert_configuration("TELEGRAM_CHAT_ID", "2", None)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.value, "2");
    assert_eq!(second.integration.as_deref(), Some("telegram"));
    assert_eq!(storage.list_configurations().await.unwrap().len(), 1);

    assert!(storage.delete_configuration("TELEGRAM_CHAT_ID").await.unwrap());
    assert!(!storage.delete_configuration("TELEGRAM_CHAT_ID").await.unwrap());
    assert!(storage.get_configuration("TELEGRAM_CHAT_ID").await.unwrap().is_none());
}

#[tokio::test]
async fn test_saved_flow_round_trip_and_execution_counter() {
    let storage = storage().await;
    let intent = Intent::default();

    let saved = storage
        .create_saved_flow(&NewSavedFlow {
            name: "Rates".to_string(),
            description: "Daily rates".to_string(),
            prompt: "send rates".to_string(),
            flow: default_flow(&intent),
            intent: intent.clone(),
            validation_score: Some(85),
        })
        .await
        .unwrap();

    assert_eq!(saved.flow.nodes.len(), 3);
    assert_eq!(saved.execution_count, 0);
    assert!(saved.last_executed.is_none());

    storage.record_saved_flow_execution(saved.id).await.unwrap();
    storage.record_saved_flow_execution(saved.id).await.unwrap();

    let loaded = storage.get_saved_flow(saved.id).await.unwrap().unwrap();
    assert_eq!(loaded.execution_count, 2);
    assert!(loaded.last_executed.is_some());
    assert_eq!(loaded.validation_score, Some(85));

    assert!(storage.delete_saved_flow(saved.id).await.unwrap());
    assert!(storage.list_saved_flows().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_project_patch_leaves_other_fields() {
    let storage = storage().await;
    let project = storage.create_project("Canvas", "first").await.unwrap();
    assert_eq!(project.canvas_zoom, 1.0);
    assert!(project.is_active);

    let patched = storage
        .update_project(
            project.id,
            &ProjectPatch {
                canvas_zoom: Some(1.5),
                ..ProjectPatch::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(patched.canvas_zoom, 1.5);
    assert_eq!(patched.name, "Canvas");
    assert_eq!(patched.description, "first");

    assert!(
        storage
            .update_project(9999, &ProjectPatch::default())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_nodes_ordered_by_position() {
    let storage = storage().await;
    let project = storage.create_project("Order", "").await.unwrap();

    storage.create_node(project.id, &new_node("right", 500.0)).await.unwrap();
    storage.create_node(project.id, &new_node("left", 100.0)).await.unwrap();
    storage.create_node(project.id, &new_node("middle", 300.0)).await.unwrap();

    let ids: Vec<String> = storage
        .list_nodes(project.id)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.node_id)
        .collect();
    assert_eq!(ids, vec!["left", "middle", "right"]);
}

#[tokio::test]
async fn test_node_patch() {
    let storage = storage().await;
    let project = storage.create_project("Patch", "").await.unwrap();
    storage.create_node(project.id, &new_node("n1", 0.0)).await.unwrap();

    let mut config = NodeConfig::new();
    config.insert("message".to_string(), json!("hi"));
    let node = storage
        .update_node(
            project.id,
            "n1",
            &NodePatch {
                config: Some(config),
                is_enabled: Some(false),
                ..NodePatch::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert!(!node.is_enabled);
    assert_eq!(node.config["message"], "hi");
    assert_eq!(node.name, "N1");
    assert!(
        storage
            .update_node(project.id, "missing", &NodePatch::default())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_duplicate_edge_rejected() {
    let storage = storage().await;
    let project = storage.create_project("Edges", "").await.unwrap();

    storage.create_edge(project.id, &new_edge("e1", "a", "b")).await.unwrap();
    let err = storage
        .create_edge(project.id, &new_edge("e2", "a", "b"))
        .await
        .unwrap_err();

    assert!(matches!(err, FlowsmithError::Validation(ref m) if m == "Connection already exists"));
    assert!(storage.edge_exists(project.id, "a", "b").await.unwrap());
    assert!(!storage.edge_exists(project.id, "b", "a").await.unwrap());
}

#[tokio::test]
async fn test_node_delete_removes_touching_edges() {
    let storage = storage().await;
    let project = storage.create_project("Cascade", "").await.unwrap();
    for (id, x) in [("a", 0.0), ("b", 1.0), ("c", 2.0)] {
        storage.create_node(project.id, &new_node(id, x)).await.unwrap();
    }
    storage.create_edge(project.id, &new_edge("e1", "a", "b")).await.unwrap();
    storage.create_edge(project.id, &new_edge("e2", "b", "c")).await.unwrap();
    storage.create_edge(project.id, &new_edge("e3", "a", "c")).await.unwrap();

    assert!(storage.delete_node(project.id, "b").await.unwrap());
    assert!(!storage.delete_node(project.id, "b").await.unwrap());

    let edges = storage.list_edges(project.id).await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].edge_id, "e3");
}

#[tokio::test]
async fn test_project_delete_cascades() {
    let storage = storage().await;
    let project = storage.create_project("Gone", "").await.unwrap();
    let keep = storage.create_project("Kept", "").await.unwrap();

    storage.create_node(project.id, &new_node("a", 0.0)).await.unwrap();
    storage.create_node(project.id, &new_node("b", 1.0)).await.unwrap();
    storage.create_edge(project.id, &new_edge("e1", "a", "b")).await.unwrap();
    storage.create_node(keep.id, &new_node("a", 0.0)).await.unwrap();

    assert!(storage.delete_project(project.id).await.unwrap());

    assert!(storage.get_project(project.id).await.unwrap().is_none());
    assert!(storage.list_nodes(project.id).await.unwrap().is_empty());
    assert!(storage.list_edges(project.id).await.unwrap().is_empty());
    assert_eq!(storage.list_nodes(keep.id).await.unwrap().len(), 1);
    assert!(!storage.delete_project(project.id).await.unwrap());
}

#[tokio::test]
async fn test_project_detail_and_execution_counter() {
    let storage = storage().await;
    let project = storage.create_project("Detail", "").await.unwrap();
    storage.create_node(project.id, &new_node("a", 0.0)).await.unwrap();
    storage.record_project_execution(project.id).await.unwrap();

    let detail = storage.project_detail(project.id).await.unwrap().unwrap();
    assert_eq!(detail.project.execution_count, 1);
    assert!(detail.project.last_executed.is_some());
    assert_eq!(detail.nodes.len(), 1);

    let value = serde_json::to_value(&detail).unwrap();
    assert_eq!(value["name"], "Detail");
    assert_eq!(value["nodes"][0]["node_id"], "a");

    assert!(storage.project_detail(404).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rejects_path_traversal() {
    let result = SqliteStorage::new("../escape.db").await;
    assert!(matches!(result, Err(FlowsmithError::Config(_))));
}

#[tokio::test]
async fn test_file_database_survives_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("nested").join("flowsmith.db");
    let dsn = path.to_str().unwrap();

    {
        let storage = SqliteStorage::new(dsn).await.unwrap();
        storage.upsert_configuration("K", "V", None).await.unwrap();
    }

    let storage = SqliteStorage::new(dsn).await.unwrap();
    let config = storage.get_configuration("K").await.unwrap().unwrap();
    assert_eq!(config.value, "V");
}
