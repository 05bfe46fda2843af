use super::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.storage.driver, "sqlite");
    assert_eq!(config.http_config().port, 5000);
    assert_eq!(config.llm.model, "gemini-2.5-flash");
    assert_eq!(config.integrations.currency_cache_ttl_secs, 300);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_serialization() {
    let config = Config::default();
    let json = serde_json::to_string_pretty(&config).unwrap();
    assert!(json.contains("\"currencyCacheTtlSecs\""));
    let parsed: Config = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.storage.driver, "sqlite");
}

#[test]
fn test_config_validation() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.storage.driver = "postgres".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.integrations.currency_cache_ttl_secs = 0;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("currencyCacheTtlSecs"));

    let mut config = Config::default();
    config.http = Some(HttpConfig {
        host: "127.0.0.1".to_string(),
        port: 5000,
        allowed_origins: Some(vec!["localhost:5000".to_string()]),
    });
    assert!(config.validate().is_err());
}

#[test]
fn test_missing_file_yields_default() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::load_from_path(temp_dir.path().join("absent.json")).unwrap();
    assert_eq!(config.storage.driver, "sqlite");
}

#[test]
fn test_config_load_from_json_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("flowsmith.config.json");

    fs::write(
        &config_path,
        r#"{
            "storage": {"driver": "sqlite", "dsn": ":memory:"},
            "http": {"host": "0.0.0.0", "port": 8080},
            "dataDir": "/tmp/flowsmith-data",
            "integrations": {"currencyCacheTtlSecs": 60}
        }"#,
    )
    .unwrap();

    let config = Config::load_from_path(&config_path).unwrap();
    assert_eq!(config.storage.dsn, ":memory:");
    assert_eq!(config.http_config().port, 8080);
    assert_eq!(config.integrations.currency_cache_ttl_secs, 60);
    // Unset integration fields keep their defaults
    assert_eq!(config.integrations.currency_timeout_secs, 10);
    assert_eq!(
        config.learning_path(),
        PathBuf::from("/tmp/flowsmith-data/learning_memory.json")
    );
}

#[test]
fn test_config_load_from_yaml_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("flowsmith.config.yaml");

    fs::write(
        &config_path,
        "storage:\n  driver: sqlite\n  dsn: ./data/flowsmith.db\nllm:\n  model: gemini-2.0-flash\n",
    )
    .unwrap();

    let config = Config::load_from_path(&config_path).unwrap();
    assert_eq!(config.llm.model, "gemini-2.0-flash");
    assert_eq!(config.llm.timeout_secs, 10);
}

#[test]
fn test_schema_rejects_missing_storage() {
    let result = validate_config(br#"{"http": {"port": 8080}}"#);
    assert!(result.is_err());

    let result = validate_config(br#"{"storage": {"driver": "sqlite", "dsn": "x.db"}, "http": {"port": 0}}"#);
    assert!(result.is_err());
}

#[test]
fn test_save_and_reload_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested/flowsmith.config.yml");

    let mut config = Config::default();
    config.data_dir = Some("/srv/flowsmith".to_string());
    config.save_to_path(&path).unwrap();

    let loaded = Config::load_from_path(&path).unwrap();
    assert_eq!(loaded.data_dir.as_deref(), Some("/srv/flowsmith"));
    assert_eq!(loaded.outputs_dir(), PathBuf::from("/srv/flowsmith/generated_outputs"));
}

#[test]
fn test_log_level_feeds_default_filter() {
    let mut config = Config::default();
    assert_eq!(config.log_filter(), "flowsmith=info,tower_http=info");

    config.log = Some(LogConfig {
        level: Some("debug".to_string()),
    });
    assert_eq!(config.log_filter(), "flowsmith=debug,tower_http=debug");

    config.log = None;
    assert_eq!(config.log_filter(), "flowsmith=info,tower_http=info");
}

#[test]
fn test_unknown_log_level_is_rejected() {
    let config = Config {
        log: Some(LogConfig {
            level: Some("loud".to_string()),
        }),
        ..Config::default()
    };
    assert!(config.validate().is_err());
}
