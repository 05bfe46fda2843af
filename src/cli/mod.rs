//! Command-line interface for Flowsmith
//!
//! Provides CLI access to all operations via auto-generated commands from
//! metadata, the same metadata the HTTP routes are built from.

use crate::Result;
use crate::config::Config;
use crate::core::{OperationMetadata, OperationRegistry};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::Value;
use std::collections::BTreeMap;

/// Convert String to 'static str for CLI command building
///
/// Commands are built once per process from metadata, and clap's builder
/// wants `'static` names.
fn to_static_str(s: String) -> &'static str {
    s.leak()
}

/// Leading command words of a pattern: `automations create --flow <FLOW>`
/// gives `["automations", "create"]`
fn command_words(cli_pattern: &str) -> Vec<&str> {
    cli_pattern
        .split_whitespace()
        .take_while(|w| !w.starts_with('<') && !w.starts_with('[') && !w.starts_with('-'))
        .collect()
}

/// Config from `--config`, or from the default files in the working directory
fn load_config(matches: &ArgMatches) -> Result<Config> {
    match matches.get_one::<String>("config") {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

/// Main CLI entry point
pub async fn run() -> Result<()> {
    let metadata = crate::core::all_operation_metadata();

    let app = build_cli(&metadata);
    let matches = app.get_matches();

    let config = load_config(&matches)?;
    crate::init_logging(&config.log_filter());

    if let Some(("serve", sub_matches)) = matches.subcommand() {
        return handle_serve_command(config, sub_matches).await;
    }

    let Some((op_name, input)) = dispatch_to_operation(&matches, &metadata) else {
        eprintln!("No command specified. Use --help for usage information.");
        std::process::exit(1);
    };

    let deps = crate::core::create_dependencies(&config).await?;
    let registry = OperationRegistry::new(deps);

    let result = registry.execute(op_name, input).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

// ============================================================================
// CLI Building (from operation metadata)
// ============================================================================

/// Build CLI from operations metadata
pub fn build_cli(metadata: &[OperationMetadata]) -> Command {
    let app = Command::new("flowsmith")
        .about("Flowsmith - describe an automation, get a validated flow, run it on a schedule")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .help("Path to a JSON or YAML config file"),
        )
        .subcommand(
            Command::new("serve")
                .about("Start the HTTP server")
                .arg(Arg::new("host").long("host").help("Bind host (overrides config)"))
                .arg(
                    Arg::new("port")
                        .long("port")
                        .short('p')
                        .value_parser(clap::value_parser!(u16))
                        .help("Bind port (overrides config)"),
                ),
        );

    add_operation_commands(app, metadata)
}

/// Build commands from operation metadata (mirrors HTTP route generation)
fn add_operation_commands(mut app: Command, metadata: &[OperationMetadata]) -> Command {
    // BTreeMap keeps --help output stable
    let mut grouped: BTreeMap<&'static str, Vec<&OperationMetadata>> = BTreeMap::new();

    for meta in metadata {
        if let Some(cli_pattern) = meta.cli_pattern
            && let Some(group) = command_words(cli_pattern).first().copied()
        {
            grouped.entry(group).or_default().push(meta);
        }
    }

    for (group_name, ops) in grouped {
        // A single-word pattern such as `generate <PROMPT>` is a top-level command
        if let [meta] = ops.as_slice()
            && command_words(meta.cli_pattern.unwrap_or_default()).len() == 1
        {
            app = app.subcommand(build_operation_command(meta, group_name));
            continue;
        }

        let group_about = to_static_str(format!("{} operations", group_name));
        let mut group_cmd = Command::new(group_name)
            .about(group_about)
            .subcommand_required(true)
            .arg_required_else_help(true);

        for meta in ops {
            let words = command_words(meta.cli_pattern.unwrap_or_default());
            if let Some(subcmd_name) = words.get(1).copied() {
                group_cmd = group_cmd.subcommand(build_operation_command(meta, subcmd_name));
            }
        }

        app = app.subcommand(group_cmd);
    }

    app
}

/// First non-null JSON schema type of a property, `string` when absent
fn field_type(field_schema: &Value) -> &str {
    match field_schema.get("type") {
        Some(Value::String(s)) => s.as_str(),
        Some(Value::Array(arr)) => arr
            .iter()
            .filter_map(|v| v.as_str())
            .find(|&s| s != "null")
            .unwrap_or("string"),
        _ => "string",
    }
}

/// Build a clap Command for an operation using its schema
fn build_operation_command(meta: &OperationMetadata, cmd_name: &'static str) -> Command {
    let mut cmd = Command::new(cmd_name).about(meta.description);

    let Some(properties) = meta.schema.get("properties").and_then(|p| p.as_object()) else {
        return cmd;
    };

    let required: Vec<&str> = meta
        .schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let cli_pattern = meta.cli_pattern.unwrap_or("");
    let mut positional_index = 1;

    for (field_name, field_schema) in properties {
        let is_required = required.contains(&field_name.as_str());
        let description = field_schema
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or("");

        // Positional if it appears as <FIELD> but not as --field <FIELD>
        let uppercase_field = format!("<{}>", field_name.to_uppercase());
        let flag_pattern = format!("--{} {}", field_name, uppercase_field);
        let is_positional =
            cli_pattern.contains(&uppercase_field) && !cli_pattern.contains(&flag_pattern);

        let field_name_static = to_static_str(field_name.clone());
        let description_static = to_static_str(description.to_string());

        cmd = if is_positional {
            let arg = Arg::new(field_name_static)
                .required(is_required)
                .index(positional_index)
                .help(description_static);
            positional_index += 1;
            cmd.arg(arg)
        } else if field_type(field_schema) == "boolean" {
            cmd.arg(
                Arg::new(field_name_static)
                    .long(field_name_static)
                    .action(ArgAction::SetTrue)
                    .help(description_static),
            )
        } else {
            cmd.arg(
                Arg::new(field_name_static)
                    .long(field_name_static)
                    .required(is_required)
                    .help(description_static),
            )
        };
    }

    cmd
}

/// Resolve parsed matches to an operation name and its JSON input
pub fn dispatch_to_operation(
    matches: &ArgMatches,
    metadata: &[OperationMetadata],
) -> Option<(&'static str, Value)> {
    let (first, first_matches) = matches.subcommand()?;

    let (words, op_matches) = match first_matches.subcommand() {
        Some((second, second_matches)) => (vec![first, second], second_matches),
        None => (vec![first], first_matches),
    };

    metadata.iter().find_map(|meta| {
        let pattern = meta.cli_pattern?;
        (command_words(pattern) == words)
            .then(|| (meta.name, extract_input_from_matches(op_matches, meta)))
    })
}

/// Extract operation input from CLI arguments using schema
fn extract_input_from_matches(matches: &ArgMatches, meta: &OperationMetadata) -> Value {
    let mut input = serde_json::Map::new();

    if let Some(properties) = meta.schema.get("properties").and_then(|p| p.as_object()) {
        for (field_name, field_schema) in properties {
            let field_type = field_type(field_schema);

            if field_type == "boolean" {
                if matches.get_flag(field_name.as_str()) {
                    input.insert(field_name.clone(), serde_json::json!(true));
                }
            } else if let Some(value_str) = matches.get_one::<String>(field_name.as_str()) {
                input.insert(field_name.clone(), parse_cli_value(field_type, value_str));
            }
        }
    }

    Value::Object(input)
}

/// Typed value for one CLI argument
///
/// Structured fields (flows, intents) are passed as JSON text.
fn parse_cli_value(field_type: &str, raw: &str) -> Value {
    let trimmed = raw.trim_start();
    match field_type {
        "integer" => raw
            .parse::<i64>()
            .map(|n| serde_json::json!(n))
            .unwrap_or_else(|_| serde_json::json!(raw)),
        "number" => raw
            .parse::<f64>()
            .map(|n| serde_json::json!(n))
            .unwrap_or_else(|_| serde_json::json!(raw)),
        "object" | "array" => {
            serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!(raw))
        }
        "string" if trimmed.starts_with('{') || trimmed.starts_with('[') => {
            serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!(raw))
        }
        _ => serde_json::json!(raw),
    }
}

// ============================================================================
// Special Commands (not operations)
// ============================================================================

/// Handle `serve`: CLI host/port override the config file
async fn handle_serve_command(mut config: Config, serve_matches: &ArgMatches) -> Result<()> {
    let mut http_config = config.http_config();

    if let Some(host) = serve_matches.get_one::<String>("host") {
        http_config.host = host.clone();
    }
    if let Some(port) = serve_matches.get_one::<u16>("port") {
        http_config.port = *port;
    }

    println!(
        "Starting Flowsmith server on {}:{}",
        http_config.host, http_config.port
    );
    println!("   Press Ctrl+C to stop\n");

    config.http = Some(http_config);
    crate::http::start_server(config).await
}
