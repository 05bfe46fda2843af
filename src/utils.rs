//! Utility functions and helpers
//!
//! Common utilities used throughout Flowsmith.

use crate::config::{Config, IntegrationsConfig, StorageConfig};
use crate::llm::ScriptedGenerator;
use crate::secrets::{EnvSecretsProvider, SecretsProvider};
use crate::storage::SqliteStorage;
use crate::{FlowsmithError, Result};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::{NamedTempFile, TempDir};

/// Longest prefix of `s` holding at most `max` characters
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Replace `path` with `bytes` via a temp file in the same directory
///
/// Readers observe either the old document or the new one, never a partial
/// write.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| {
        FlowsmithError::storage(format!("failed to replace {}: {}", path.display(), e.error))
    })?;
    Ok(())
}

/// Unreachable upstream: connections are refused immediately
const UNREACHABLE_URL: &str = "http://127.0.0.1:9";

/// Test environment with isolated temporary directories (test builds only)
///
/// This struct provides a complete, isolated test environment that mirrors production:
/// - Temporary data directory (auto-cleaned on drop)
/// - SQLite database in the temp directory
/// - A scripted text generator in place of the real backend
/// - Upstream provider URLs that refuse connections
/// - A secrets provider that ignores the process environment
///
/// # Example
///
/// ```no_run
/// use flowsmith::utils::TestEnvironment;
/// use flowsmith::core::OperationRegistry;
///
/// #[tokio::test]
/// async fn my_test() {
///     let env = TestEnvironment::new().await;
///     let registry = OperationRegistry::new(env.deps);
///     // Cleanup happens automatically when env drops
/// }
/// ```
pub struct TestEnvironment {
    /// Temporary directory - kept alive for test duration
    _temp_dir: TempDir,

    /// Complete dependencies object ready to use in tests
    pub deps: crate::core::Dependencies,

    /// Queue completions here before driving the pipeline
    pub generator: Arc<ScriptedGenerator>,

    pub secrets: Arc<EnvSecretsProvider>,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub async fn new() -> Self {
        Self::with_integrations(IntegrationsConfig {
            bcb_base_url: UNREACHABLE_URL.to_string(),
            awesome_api_base_url: UNREACHABLE_URL.to_string(),
            telegram_base_url: UNREACHABLE_URL.to_string(),
            ..IntegrationsConfig::default()
        })
        .await
    }

    /// Create a test environment pointing the integrations at the given
    /// (usually wiremock) endpoints
    pub async fn with_integrations(integrations: IntegrationsConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let data_dir = temp_dir.path().join(".flowsmith");
        let db_path = data_dir.join("flowsmith.db");

        let config = Config {
            storage: StorageConfig {
                driver: crate::constants::STORAGE_DRIVER_SQLITE.to_string(),
                dsn: db_path.to_str().unwrap().to_string(),
            },
            data_dir: Some(data_dir.to_str().unwrap().to_string()),
            integrations,
            ..Config::default()
        };

        let storage = Arc::new(
            SqliteStorage::new(&config.storage.dsn)
                .await
                .expect("Failed to create SQLite storage"),
        );
        let secrets = Arc::new(EnvSecretsProvider::isolated());
        let generator = Arc::new(ScriptedGenerator::new());

        let deps = crate::core::assemble_dependencies(
            config,
            storage,
            secrets.clone() as Arc<dyn SecretsProvider>,
            generator.clone(),
        )
        .await
        .expect("Failed to assemble dependencies");

        TestEnvironment {
            _temp_dir: temp_dir,
            deps,
            generator,
            secrets,
        }
    }

    /// Data directory of this environment
    pub fn data_dir(&self) -> std::path::PathBuf {
        self.deps.config.data_dir()
    }
}
