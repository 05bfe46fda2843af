//! Constants used throughout Flowsmith
//!
//! Configuration paths, provider endpoints, timeouts and the fixed user-facing
//! messages produced by the pipeline fallbacks.

use once_cell::sync::Lazy;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Default data directory (~/.flowsmith)
pub fn default_data_dir() -> &'static str {
    static DATA_DIR: Lazy<String> = Lazy::new(|| {
        dirs::home_dir()
            .map(|home| home.join(".flowsmith").to_string_lossy().to_string())
            .unwrap_or_else(|| ".flowsmith".to_string())
    });
    &DATA_DIR
}

/// Default SQLite DSN (~/.flowsmith/flowsmith.db)
pub fn default_sqlite_dsn() -> &'static str {
    static SQLITE_DSN: Lazy<String> =
        Lazy::new(|| format!("{}/flowsmith.db", default_data_dir()));
    &SQLITE_DSN
}

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "flowsmith.config.json";

/// Configuration files probed in the working directory, in order
pub const CONFIG_FILE_CANDIDATES: &[&str] = &[
    CONFIG_FILE_NAME,
    "flowsmith.config.yaml",
    "flowsmith.config.yml",
];

/// Storage driver: SQLite
pub const STORAGE_DRIVER_SQLITE: &str = "sqlite";

/// Learning store snapshot file (inside the data directory)
pub const LEARNING_FILE_NAME: &str = "learning_memory.json";

/// Automation store snapshot file (inside the data directory)
pub const AUTOMATIONS_FILE_NAME: &str = "active_automations.json";

/// Directory for files synthesized by flow execution (inside the data directory)
pub const OUTPUTS_DIR_NAME: &str = "generated_outputs";

/// Environment variable: log output format (`json` or anything else for text)
pub const ENV_LOG_FORMAT: &str = "FLOWSMITH_LOG_FORMAT";

// ============================================================================
// HTTP SERVER
// ============================================================================

/// Default HTTP server port
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Default HTTP bind host
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";

// ============================================================================
// TEXT GENERATION
// ============================================================================

/// Default generation model
pub const DEFAULT_LLM_MODEL: &str = "gemini-2.5-flash";

/// Default generation API base URL
pub const DEFAULT_LLM_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Environment variable holding the generation API key
pub const DEFAULT_LLM_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Low temperature keeps completions close to deterministic
pub const DEFAULT_LLM_TEMPERATURE: f32 = 0.2;

/// Generation request timeout (seconds)
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 10;

/// Characters of raw model output quoted in malformed-output errors
pub const MALFORMED_OUTPUT_PREVIEW_CHARS: usize = 200;

// ============================================================================
// INTEGRATIONS
// ============================================================================

/// Integration id: Telegram bot
pub const INTEGRATION_TELEGRAM: &str = "telegram";

/// Integration id: currency quotes
pub const INTEGRATION_CURRENCY: &str = "currency_api";

/// Central bank PTAX OData service
pub const DEFAULT_BCB_BASE_URL: &str = "https://olinda.bcb.gov.br/olinda/servico/PTAX/versao/v1/odata";

/// Multi-pair quote API
pub const DEFAULT_AWESOME_API_BASE_URL: &str = "https://economia.awesomeapi.com.br";

/// Telegram Bot API
pub const DEFAULT_TELEGRAM_BASE_URL: &str = "https://api.telegram.org";

/// Currency pairs fetched when the caller does not ask for specific ones
pub const DEFAULT_CURRENCY_PAIRS: &[&str] = &["USD-BRL", "EUR-BRL", "BTC-BRL"];

/// Currency cache time-to-live (seconds)
pub const DEFAULT_CURRENCY_CACHE_TTL_SECS: u64 = 300;

/// Currency provider request timeout (seconds)
pub const DEFAULT_CURRENCY_TIMEOUT_SECS: u64 = 10;

/// Telegram `getMe` probe timeout (seconds)
pub const DEFAULT_TELEGRAM_PROBE_TIMEOUT_SECS: u64 = 5;

/// Telegram `sendMessage` timeout (seconds)
pub const DEFAULT_TELEGRAM_SEND_TIMEOUT_SECS: u64 = 10;

/// Telegram secret: bot token
pub const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";

/// Telegram secret: destination chat
pub const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";

// ============================================================================
// PIPELINE
// ============================================================================

/// Number of learning records returned by the history endpoint
pub const HISTORY_LIMIT: usize = 10;

/// Objective truncation for the fallback intent
pub const FALLBACK_OBJECTIVE_CHARS: usize = 150;

/// Summary truncation for the fallback intent
pub const FALLBACK_SUMMARY_CHARS: usize = 60;

/// Flow name derived from the intent summary
pub const DERIVED_NAME_CHARS: usize = 50;

/// Flow description derived from the intent objective
pub const DERIVED_DESCRIPTION_CHARS: usize = 200;

/// Minimum score the architect accepts
pub const APPROVAL_THRESHOLD: u8 = 60;

/// Default objective when the model omits one
pub const DEFAULT_OBJECTIVE: &str = "Not specified";

/// Default summary when the model omits one
pub const DEFAULT_SUMMARY: &str = "Flow processing";

// ============================================================================
// SCHEDULER
// ============================================================================

/// Default automation interval (minutes)
pub const DEFAULT_INTERVAL_MINUTES: u64 = 60;

/// Longest accepted automation interval (one year, in minutes)
pub const MAX_INTERVAL_MINUTES: u64 = 525_600;

// ============================================================================
// EXECUTION
// ============================================================================

/// Preview length for ad-hoc file synthesis
pub const EXECUTE_FLOW_PREVIEW_CHARS: usize = 500;

/// Preview length for saved-flow file synthesis
pub const SAVED_FLOW_PREVIEW_CHARS: usize = 300;

/// Default iteration count for loop steps
pub const DEFAULT_LOOP_COUNT: u64 = 3;

/// Upper bound on simulated loop iterations per node
pub const MAX_LOOP_ITERATIONS: u64 = 1000;

/// Default delay recorded by wait steps (seconds)
pub const DEFAULT_WAIT_SECONDS: f64 = 1.0;
