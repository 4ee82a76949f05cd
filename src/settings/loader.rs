//! Settings loading and environment variable interpolation.
//!
//! The `SettingsManager` handles:
//! - Loading settings from `~/.docket/settings.toml` (or an explicit path)
//! - Resolving `$VAR` and `${VAR}` environment variable references
//! - Atomic file writes with temp file + rename
//! - First-run template generation

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::RwLock;

use super::schema::DocketSettings;

/// Embedded template for first-run generation.
const TEMPLATE: &str = include_str!("template.toml");

/// Get the path to the global settings file.
pub fn settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docket")
        .join("settings.toml")
}

/// Manages settings loading, interpolation, and persistence.
pub struct SettingsManager {
    /// Cached settings (with env vars resolved)
    settings: RwLock<DocketSettings>,

    /// Path to the settings file
    path: PathBuf,
}

impl SettingsManager {
    /// Create a new SettingsManager, loading from disk if available.
    pub async fn new() -> Result<Self> {
        Self::with_path(settings_path()).await
    }

    /// Create a SettingsManager backed by a specific file path.
    pub async fn with_path(path: PathBuf) -> Result<Self> {
        let settings = Self::load_from_path(&path).await?;

        Ok(Self {
            settings: RwLock::new(settings),
            path,
        })
    }

    /// Load settings from a specific path.
    async fn load_from_path(path: &PathBuf) -> Result<DocketSettings> {
        if !path.exists() {
            tracing::debug!("Settings file not found at {:?}, using defaults", path);
            return Ok(DocketSettings::default());
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .context("Failed to read settings file")?;

        let mut settings: DocketSettings =
            toml::from_str(&contents).context("Failed to deserialize settings")?;

        Self::resolve_env_vars(&mut settings);

        tracing::info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Resolve $ENV_VAR references in string fields.
    fn resolve_env_vars(settings: &mut DocketSettings) {
        fn resolve_opt(value: &mut Option<String>) {
            if let Some(v) = value {
                if let Some(resolved) = resolve_env_ref(v) {
                    *v = resolved;
                }
            }
        }

        resolve_opt(&mut settings.llm.api_key);
        resolve_opt(&mut settings.api_keys.tavily);
        resolve_opt(&mut settings.api_keys.patents_view);
    }

    /// Get the current settings (read-only).
    pub async fn get(&self) -> DocketSettings {
        self.settings.read().await.clone()
    }

    /// Update settings and persist to disk.
    pub async fn update(&self, new_settings: DocketSettings) -> Result<()> {
        *self.settings.write().await = new_settings.clone();

        let toml_string =
            toml::to_string_pretty(&new_settings).context("Failed to serialize settings")?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("toml.tmp");
        tokio::fs::write(&temp_path, &toml_string).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        tracing::info!("Saved settings to {:?}", self.path);
        Ok(())
    }

    /// Get the settings file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Ensure settings file exists, creating from template if needed.
    ///
    /// Returns `true` if a new file was created.
    pub async fn ensure_settings_file(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.path, TEMPLATE).await?;
        tracing::info!("Generated settings template at {:?}", self.path);
        Ok(true)
    }

    /// Reload settings from disk.
    pub async fn reload(&self) -> Result<()> {
        let settings = Self::load_from_path(&self.path).await?;
        *self.settings.write().await = settings;
        Ok(())
    }
}

/// Resolve a $ENV_VAR or ${ENV_VAR} reference.
///
/// Returns `Some(resolved)` if the value starts with `$` and the env var exists.
/// Returns `None` if no env var reference or env var not set.
fn resolve_env_ref(value: &str) -> Option<String> {
    let trimmed = value.trim();

    if trimmed.starts_with('$') {
        let var_name = if trimmed.starts_with("${") && trimmed.ends_with('}') {
            &trimmed[2..trimmed.len() - 1]
        } else {
            &trimmed[1..]
        };

        return std::env::var(var_name).ok();
    }

    None
}

/// Get a setting value with environment variable fallback.
///
/// Priority order:
/// 1. Settings value (if set and non-empty)
/// 2. Environment variable (first match from list)
/// 3. Default value
pub fn get_with_env_fallback(
    setting: &Option<String>,
    env_vars: &[&str],
    default: Option<String>,
) -> Option<String> {
    if let Some(v) = setting {
        if !v.is_empty() {
            return Some(v.clone());
        }
    }

    for env_var in env_vars {
        if let Ok(v) = std::env::var(env_var) {
            if !v.is_empty() {
                return Some(v);
            }
        }
    }

    default
}
