//! Settings schema definitions for docket configuration.
//!
//! All settings structs use `#[serde(default)]` to allow partial configuration files.
//! Missing fields are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root settings structure for docket.
///
/// Loaded from `~/.docket/settings.toml` with environment variable interpolation
/// support. Version field enables future migrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocketSettings {
    /// Schema version for migrations
    pub version: u32,

    /// HTTP server configuration
    pub server: ServerSettings,

    /// Job store and worker configuration
    pub jobs: JobSettings,

    /// LLM endpoint configuration
    pub llm: LlmSettings,

    /// API keys for external services
    pub api_keys: ApiKeysSettings,

    /// Advanced/debug settings
    pub advanced: AdvancedSettings,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind (loopback by default)
    pub host: String,

    /// Port to listen on (0 = random available port)
    pub port: u16,
}

/// Job store and worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// Upper bound for the store before forced eviction
    pub max_jobs: usize,

    /// Maximum age of any job in seconds
    pub job_ttl_seconds: u64,

    /// Maximum age of completed/failed/cancelled jobs in seconds
    pub terminal_job_ttl_seconds: u64,

    /// Minimum gap between eviction passes in seconds
    pub cleanup_interval_seconds: u64,

    /// Retry count for job execution
    pub max_attempts: u32,

    /// Throttle for progress writes in seconds
    pub progress_update_interval_seconds: u64,

    /// Capacity of the submission queue
    pub queue_capacity: usize,

    /// Estimate for job types not listed in `estimates`
    pub default_estimate_seconds: u64,

    /// Estimated duration per job type in seconds, used to derive timeouts
    pub estimates: BTreeMap<String, u64>,
}

/// LLM endpoint configuration (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// API key (supports $ENV_VAR syntax)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the endpoint
    pub base_url: String,

    /// Model identifier
    pub model: String,
}

/// API keys for external services.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApiKeysSettings {
    /// Tavily API key for web search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tavily: Option<String>,

    /// PatentsView API key for prior art search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patents_view: Option<String>,
}

/// Advanced/debug settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedSettings {
    /// Log level: "error" | "warn" | "info" | "debug" | "trace"
    pub log_level: String,
}

// =============================================================================
// Default implementations
// =============================================================================

impl Default for DocketSettings {
    fn default() -> Self {
        Self {
            version: 1,
            server: ServerSettings::default(),
            jobs: JobSettings::default(),
            llm: LlmSettings::default(),
            api_keys: ApiKeysSettings::default(),
            advanced: AdvancedSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8700,
        }
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        let mut estimates = BTreeMap::new();
        estimates.insert("prior_art_search".to_string(), 240);
        estimates.insert("claim_drafting".to_string(), 120);
        estimates.insert("claim_analysis".to_string(), 60);
        estimates.insert("web_search".to_string(), 30);
        estimates.insert("general_chat".to_string(), 30);

        Self {
            max_jobs: 1000,
            job_ttl_seconds: 3600,
            terminal_job_ttl_seconds: 600,
            cleanup_interval_seconds: 300,
            max_attempts: 3,
            progress_update_interval_seconds: 2,
            queue_capacity: 256,
            default_estimate_seconds: 120,
            estimates,
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
