//! Project operations module
//!
//! Visual-editor projects: CRUD on projects, nodes and edges, flow import,
//! and the step interpreter.

use super::*;
use crate::engine::NodeOutcome;
use crate::model::{
    Flow, Intent, NewWorkflowEdge, NewWorkflowNode, NodeConfig, ProjectDetail, WorkflowEdge,
    WorkflowNode,
};
use crate::projects::{import_flow, node_type_catalog, to_flow_json};
use crate::storage::{NodePatch, ProjectPatch};
use chrono::Local;
use flowsmith_core_macros::{operation, operation_group};
use schemars::JsonSchema;

const DEFAULT_PROJECT_NAME: &str = "New project";
const DEFAULT_NODE_NAME: &str = "New node";
const DEFAULT_NODE_TYPE: &str = "manual";
const DEFAULT_NODE_CATEGORY: &str = "trigger";
const DEFAULT_NODE_POSITION: f64 = 100.0;
const DEFAULT_SOURCE_PORT: &str = "output";
const DEFAULT_TARGET_PORT: &str = "input";

/// Timestamp suffix for generated node and edge ids
fn id_stamp() -> String {
    Local::now().format("%Y%m%d%H%M%S%6f").to_string()
}

async fn load_detail(deps: &Dependencies, raw_id: &str) -> Result<ProjectDetail> {
    let id = parse_row_id(raw_id, "Project")?;
    deps.storage
        .project_detail(id)
        .await?
        .ok_or_else(|| FlowsmithError::not_found("Project not found"))
}

/// Row id of an existing project
async fn existing_project(deps: &Dependencies, raw_id: &str) -> Result<i64> {
    let id = parse_row_id(raw_id, "Project")?;
    match deps.storage.get_project(id).await? {
        Some(project) => Ok(project.id),
        None => Err(FlowsmithError::not_found("Project not found")),
    }
}

#[operation_group(projects)]
pub mod projects {
    use super::*;

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Empty input (no parameters required)")]
    pub struct EmptyInput {}

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input for creating a project")]
    pub struct CreateInput {
        #[schemars(description = "Project name")]
        pub name: Option<String>,
        #[schemars(description = "Project description")]
        #[serde(default)]
        pub description: String,
    }

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input addressing one project")]
    pub struct ProjectIdInput {
        #[schemars(description = "Project id")]
        pub project_id: String,
    }

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input for updating project fields")]
    pub struct UpdateInput {
        #[schemars(description = "Project id")]
        pub project_id: String,
        pub name: Option<String>,
        pub description: Option<String>,
        pub canvas_zoom: Option<f64>,
        pub canvas_offset_x: Option<f64>,
        pub canvas_offset_y: Option<f64>,
    }

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input for importing a generated flow into the editor")]
    pub struct ImportInput {
        #[schemars(description = "Flow document as returned by generate_flow")]
        pub flow: Option<Flow>,
        #[serde(default)]
        pub intent: Intent,
    }

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input for adding a node to a project")]
    pub struct CreateNodeInput {
        #[schemars(description = "Project id")]
        pub project_id: String,
        #[schemars(description = "External node id (generated when absent)")]
        pub node_id: Option<String>,
        pub name: Option<String>,
        pub node_type: Option<String>,
        pub node_category: Option<String>,
        pub position_x: Option<f64>,
        pub position_y: Option<f64>,
        #[serde(default)]
        pub config: NodeConfig,
    }

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input for updating a node")]
    pub struct UpdateNodeInput {
        #[schemars(description = "Project id")]
        pub project_id: String,
        #[schemars(description = "External node id")]
        pub node_id: String,
        pub name: Option<String>,
        pub position_x: Option<f64>,
        pub position_y: Option<f64>,
        pub config: Option<NodeConfig>,
        pub is_enabled: Option<bool>,
    }

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input addressing one node")]
    pub struct NodeIdInput {
        #[schemars(description = "Project id")]
        pub project_id: String,
        #[schemars(description = "External node id")]
        pub node_id: String,
    }

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input for connecting two nodes")]
    pub struct CreateEdgeInput {
        #[schemars(description = "Project id")]
        pub project_id: String,
        #[schemars(description = "External edge id (generated when absent)")]
        pub edge_id: Option<String>,
        pub source_node_id: String,
        pub target_node_id: String,
        pub source_port: Option<String>,
        pub target_port: Option<String>,
        pub label: Option<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input addressing one edge")]
    pub struct EdgeIdInput {
        #[schemars(description = "Project id")]
        pub project_id: String,
        #[schemars(description = "External edge id")]
        pub edge_id: String,
    }

    #[derive(Serialize)]
    pub struct ProjectListOutput {
        pub success: bool,
        pub projects: Vec<ProjectDetail>,
    }

    #[derive(Serialize)]
    pub struct ProjectOutput {
        pub success: bool,
        pub project: ProjectDetail,
    }

    #[derive(Serialize)]
    pub struct ImportOutput {
        pub success: bool,
        pub project_id: i64,
        pub project: ProjectDetail,
        pub message: String,
    }

    #[derive(Serialize)]
    pub struct NodeOutput {
        pub success: bool,
        pub node: WorkflowNode,
    }

    #[derive(Serialize)]
    pub struct EdgeOutput {
        pub success: bool,
        pub edge: WorkflowEdge,
    }

    #[derive(Serialize)]
    pub struct MessageOutput {
        pub success: bool,
        pub message: String,
    }

    #[derive(Serialize)]
    pub struct ExecuteOutput {
        pub success: bool,
        pub output: String,
        pub results: Vec<NodeOutcome>,
        pub flow: Flow,
    }

    #[derive(Serialize)]
    pub struct NodeTypesOutput {
        pub success: bool,
        pub node_types: Value,
    }

    fn message(text: &str) -> MessageOutput {
        MessageOutput {
            success: true,
            message: text.to_string(),
        }
    }

    #[operation(
        name = "list_projects",
        input = EmptyInput,
        http = "GET /api/projects",
        cli = "projects list",
        description = "List editor projects with their nodes and edges"
    )]
    pub struct List {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for List {
        type Input = EmptyInput;
        type Output = ProjectListOutput;

        async fn execute(&self, _input: Self::Input) -> Result<Self::Output> {
            let mut projects = Vec::new();
            for project in self.deps.storage.list_projects().await? {
                let nodes = self.deps.storage.list_nodes(project.id).await?;
                let edges = self.deps.storage.list_edges(project.id).await?;
                projects.push(ProjectDetail {
                    project,
                    nodes,
                    edges,
                });
            }
            Ok(ProjectListOutput {
                success: true,
                projects,
            })
        }
    }

    #[operation(
        name = "create_project",
        input = CreateInput,
        http = "POST /api/projects",
        cli = "projects create",
        description = "Create an empty editor project"
    )]
    pub struct Create {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Create {
        type Input = CreateInput;
        type Output = ProjectOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let name = input
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string());
            let project = self
                .deps
                .storage
                .create_project(&name, &input.description)
                .await?;

            Ok(ProjectOutput {
                success: true,
                project: ProjectDetail {
                    project,
                    nodes: Vec::new(),
                    edges: Vec::new(),
                },
            })
        }
    }

    /// Lay a generated flow out on a new canvas
    #[operation(
        name = "import_flow",
        input = ImportInput,
        http = "POST /api/projects/import-flow",
        cli = "projects import --flow <FLOW>",
        description = "Import a generated flow as an editor project"
    )]
    pub struct Import {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Import {
        type Input = ImportInput;
        type Output = ImportOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let flow = input
                .flow
                .ok_or_else(|| FlowsmithError::validation("Flow not provided"))?;
            let detail = import_flow(self.deps.storage.as_ref(), &flow, &input.intent).await?;
            tracing::info!(
                project_id = detail.project.id,
                nodes = detail.nodes.len(),
                "Flow imported"
            );

            Ok(ImportOutput {
                success: true,
                project_id: detail.project.id,
                message: format!("Flow imported with {} nodes", detail.nodes.len()),
                project: detail,
            })
        }
    }

    #[operation(
        name = "get_project",
        input = ProjectIdInput,
        http = "GET /api/projects/{project_id}",
        cli = "projects get <PROJECT_ID>",
        description = "Get a project with its nodes and edges"
    )]
    pub struct Get {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Get {
        type Input = ProjectIdInput;
        type Output = ProjectOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            Ok(ProjectOutput {
                success: true,
                project: load_detail(&self.deps, &input.project_id).await?,
            })
        }
    }

    #[operation(
        name = "update_project",
        input = UpdateInput,
        http = "PATCH /api/projects/{project_id}",
        cli = "projects update <PROJECT_ID>",
        description = "Update project name, description or canvas state"
    )]
    pub struct Update {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Update {
        type Input = UpdateInput;
        type Output = ProjectOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let id = parse_row_id(&input.project_id, "Project")?;
            let patch = ProjectPatch {
                name: input.name,
                description: input.description,
                canvas_zoom: input.canvas_zoom,
                canvas_offset_x: input.canvas_offset_x,
                canvas_offset_y: input.canvas_offset_y,
            };
            if self.deps.storage.update_project(id, &patch).await?.is_none() {
                return Err(FlowsmithError::not_found("Project not found"));
            }

            Ok(ProjectOutput {
                success: true,
                project: load_detail(&self.deps, &input.project_id).await?,
            })
        }
    }

    #[operation(
        name = "delete_project",
        input = ProjectIdInput,
        http = "DELETE /api/projects/{project_id}",
        cli = "projects delete <PROJECT_ID>",
        description = "Delete a project with all of its nodes and edges"
    )]
    pub struct Delete {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Delete {
        type Input = ProjectIdInput;
        type Output = MessageOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let id = parse_row_id(&input.project_id, "Project")?;
            if !self.deps.storage.delete_project(id).await? {
                return Err(FlowsmithError::not_found("Project not found"));
            }
            Ok(message("Project deleted"))
        }
    }

    #[operation(
        name = "create_node",
        input = CreateNodeInput,
        http = "POST /api/projects/{project_id}/nodes",
        cli = "nodes create <PROJECT_ID>",
        description = "Add a node to a project"
    )]
    pub struct CreateNode {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for CreateNode {
        type Input = CreateNodeInput;
        type Output = NodeOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let project_id = existing_project(&self.deps, &input.project_id).await?;
            let node = NewWorkflowNode {
                node_id: input
                    .node_id
                    .unwrap_or_else(|| format!("node_{}", id_stamp())),
                name: input.name.unwrap_or_else(|| DEFAULT_NODE_NAME.to_string()),
                node_type: input
                    .node_type
                    .unwrap_or_else(|| DEFAULT_NODE_TYPE.to_string()),
                node_category: input
                    .node_category
                    .unwrap_or_else(|| DEFAULT_NODE_CATEGORY.to_string()),
                position_x: input.position_x.unwrap_or(DEFAULT_NODE_POSITION),
                position_y: input.position_y.unwrap_or(DEFAULT_NODE_POSITION),
                config: input.config,
            };

            Ok(NodeOutput {
                success: true,
                node: self.deps.storage.create_node(project_id, &node).await?,
            })
        }
    }

    #[operation(
        name = "update_node",
        input = UpdateNodeInput,
        http = "PATCH /api/projects/{project_id}/nodes/{node_id}",
        cli = "nodes update <PROJECT_ID> <NODE_ID>",
        description = "Move, rename, reconfigure or toggle a node"
    )]
    pub struct UpdateNode {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for UpdateNode {
        type Input = UpdateNodeInput;
        type Output = NodeOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let project_id = parse_row_id(&input.project_id, "Node")?;
            let patch = NodePatch {
                name: input.name,
                position_x: input.position_x,
                position_y: input.position_y,
                config: input.config,
                is_enabled: input.is_enabled,
            };

            let node = self
                .deps
                .storage
                .update_node(project_id, &input.node_id, &patch)
                .await?
                .ok_or_else(|| FlowsmithError::not_found("Node not found"))?;
            Ok(NodeOutput {
                success: true,
                node,
            })
        }
    }

    #[operation(
        name = "delete_node",
        input = NodeIdInput,
        http = "DELETE /api/projects/{project_id}/nodes/{node_id}",
        cli = "nodes delete <PROJECT_ID> <NODE_ID>",
        description = "Delete a node and every edge touching it"
    )]
    pub struct DeleteNode {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for DeleteNode {
        type Input = NodeIdInput;
        type Output = MessageOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let project_id = parse_row_id(&input.project_id, "Node")?;
            if !self
                .deps
                .storage
                .delete_node(project_id, &input.node_id)
                .await?
            {
                return Err(FlowsmithError::not_found("Node not found"));
            }
            Ok(message("Node deleted"))
        }
    }

    #[operation(
        name = "create_edge",
        input = CreateEdgeInput,
        http = "POST /api/projects/{project_id}/edges",
        cli = "edges create <PROJECT_ID>",
        description = "Connect two nodes of a project"
    )]
    pub struct CreateEdge {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for CreateEdge {
        type Input = CreateEdgeInput;
        type Output = EdgeOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let project_id = existing_project(&self.deps, &input.project_id).await?;
            let edge = NewWorkflowEdge {
                edge_id: input
                    .edge_id
                    .unwrap_or_else(|| format!("edge_{}", id_stamp())),
                source_node_id: input.source_node_id,
                target_node_id: input.target_node_id,
                source_port: input
                    .source_port
                    .unwrap_or_else(|| DEFAULT_SOURCE_PORT.to_string()),
                target_port: input
                    .target_port
                    .unwrap_or_else(|| DEFAULT_TARGET_PORT.to_string()),
                label: input.label,
            };

            Ok(EdgeOutput {
                success: true,
                edge: self.deps.storage.create_edge(project_id, &edge).await?,
            })
        }
    }

    #[operation(
        name = "delete_edge",
        input = EdgeIdInput,
        http = "DELETE /api/projects/{project_id}/edges/{edge_id}",
        cli = "edges delete <PROJECT_ID> <EDGE_ID>",
        description = "Remove a connection"
    )]
    pub struct DeleteEdge {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for DeleteEdge {
        type Input = EdgeIdInput;
        type Output = MessageOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let project_id = parse_row_id(&input.project_id, "Connection")?;
            if !self
                .deps
                .storage
                .delete_edge(project_id, &input.edge_id)
                .await?
            {
                return Err(FlowsmithError::not_found("Connection not found"));
            }
            Ok(message("Connection deleted"))
        }
    }

    /// Interpret the project's enabled nodes left to right
    #[operation(
        name = "execute_project",
        input = ProjectIdInput,
        http = "POST /api/projects/{project_id}/execute",
        cli = "projects execute <PROJECT_ID>",
        description = "Run a project's nodes in canvas order"
    )]
    pub struct Execute {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Execute {
        type Input = ProjectIdInput;
        type Output = ExecuteOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let detail = load_detail(&self.deps, &input.project_id).await?;
            let run = self.deps.executor.run_project(&detail).await;
            self.deps
                .storage
                .record_project_execution(detail.project.id)
                .await?;

            Ok(ExecuteOutput {
                success: run.success,
                output: run.output,
                results: run.results,
                flow: to_flow_json(&detail),
            })
        }
    }

    #[operation(
        name = "list_node_types",
        input = EmptyInput,
        http = "GET /api/node-types",
        cli = "projects node-types",
        description = "Catalog of node types the editor offers"
    )]
    pub struct NodeTypes {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for NodeTypes {
        type Input = EmptyInput;
        type Output = NodeTypesOutput;

        async fn execute(&self, _input: Self::Input) -> Result<Self::Output> {
            Ok(NodeTypesOutput {
                success: true,
                node_types: node_type_catalog(),
            })
        }
    }
}
