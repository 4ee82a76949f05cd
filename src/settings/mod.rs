//! Configuration for the docket backend.
//!
//! Settings live in a TOML file with environment-variable interpolation;
//! partial files are merged over defaults.

mod loader;
mod schema;

pub use loader::{get_with_env_fallback, settings_path, SettingsManager};
pub use schema::{
    AdvancedSettings, ApiKeysSettings, DocketSettings, JobSettings, LlmSettings, ServerSettings,
};
