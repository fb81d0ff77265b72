//! Configuration file handling
//!
//! `HiveConfig` is stored as pretty JSON. Writes go through a temp file and a
//! rename so a crash never leaves a half-written config behind. `HIVE_*`
//! environment variables override file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use super::engine::EngineConfig;
use super::error::HiveError;

/// Overrides [`EngineConfig::max_steps`].
pub const ENV_MAX_STEPS: &str = "HIVE_MAX_STEPS";
/// Overrides [`EngineConfig::tool_timeout_ms`].
pub const ENV_TOOL_TIMEOUT_MS: &str = "HIVE_TOOL_TIMEOUT_MS";
/// Overrides [`EngineConfig::model`].
pub const ENV_MODEL: &str = "HIVE_MODEL";
/// Overrides [`EngineConfig::temperature`].
pub const ENV_TEMPERATURE: &str = "HIVE_TEMPERATURE";

/// Process-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveConfig {
    /// Engine limits and reasoning defaults.
    pub engine: EngineConfig,
    /// Validate calls against registered tool specs before running.
    pub strict_validation: bool,
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            strict_validation: true,
        }
    }
}

impl HiveConfig {
    /// Reject settings no run could succeed under.
    pub fn validate(&self) -> std::result::Result<(), HiveError> {
        if self.engine.max_steps == 0 {
            return Err(HiveError::Config("max_steps must be at least 1".into()));
        }
        if self.engine.tool_timeout_ms == 0 {
            return Err(HiveError::Config("tool_timeout_ms must be at least 1".into()));
        }
        Ok(())
    }

    /// Replace the step budget, keeping the config valid.
    pub fn set_max_steps(&mut self, max_steps: usize) -> std::result::Result<(), HiveError> {
        let previous = std::mem::replace(&mut self.engine.max_steps, max_steps);
        if let Err(err) = self.validate() {
            self.engine.max_steps = previous;
            return Err(err);
        }
        Ok(())
    }

    /// Apply `HIVE_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_STEPS) {
            self.engine.max_steps = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {:?}", ENV_MAX_STEPS, raw))?;
        }
        if let Some(raw) = lookup(ENV_TOOL_TIMEOUT_MS) {
            self.engine.tool_timeout_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {:?}", ENV_TOOL_TIMEOUT_MS, raw))?;
        }
        if let Some(raw) = lookup(ENV_MODEL) {
            self.engine.model = Some(raw).filter(|model| !model.is_empty());
        }
        if let Some(raw) = lookup(ENV_TEMPERATURE) {
            let temperature: f32 = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {:?}", ENV_TEMPERATURE, raw))?;
            self.engine.temperature = Some(temperature);
        }
        Ok(())
    }
}

/// Write configuration atomically.
pub fn write_config(path: &Path, config: &HiveConfig) -> Result<()> {
    let json = serde_json::to_vec_pretty(config).context("Failed to serialize config")?;
    write_atomic(path, &json)
}

/// Load configuration from a JSON file.
pub fn load_config(path: &Path) -> Result<HiveConfig> {
    let data = fs::read(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    serde_json::from_slice(&data).context("Failed to deserialize config")
}

/// Load `path` if given (defaults otherwise), then apply environment
/// overrides.
pub fn resolve_config(path: Option<&Path>) -> Result<HiveConfig> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => HiveConfig::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;
    file.write_all(data).context("Failed to write data")?;
    file.sync_all().context("Failed to sync file")?;
    drop(file);

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        let dir = OpenOptions::new()
            .read(true)
            .open(parent)
            .with_context(|| format!("Failed to open directory: {:?}", parent))?;
        dir.sync_all().context("Failed to sync directory")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn config_round_trips_through_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hive.json");

        let mut config = HiveConfig::default();
        config.engine.max_steps = 4;
        config.engine.model = Some("small".into());
        write_config(&path, &config).unwrap();

        assert!(!temp.path().join("hive.tmp").exists());
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hive.json");
        fs::write(&path, r#"{"engine": {"max_steps": 3}}"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.engine.max_steps, 3);
        assert_eq!(config.engine.tool_timeout_ms, 30_000);
        assert!(config.strict_validation);
    }

    #[test]
    fn overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = [
            (ENV_MAX_STEPS, "7"),
            (ENV_TOOL_TIMEOUT_MS, "1500"),
            (ENV_MODEL, "large"),
            (ENV_TEMPERATURE, "0.2"),
        ]
        .into_iter()
        .collect();

        let mut config = HiveConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|value| value.to_string()))
            .unwrap();
        assert_eq!(config.engine.max_steps, 7);
        assert_eq!(config.engine.tool_timeout_ms, 1500);
        assert_eq!(config.engine.model.as_deref(), Some("large"));
        assert_eq!(config.engine.temperature, Some(0.2));
    }

    #[test]
    fn zero_step_budget_is_rejected() {
        let mut config = HiveConfig::default();
        config.engine.max_steps = 0;
        assert!(matches!(config.validate(), Err(HiveError::Config(_))));
    }

    #[test]
    fn step_budget_override_is_validated() {
        let mut config = HiveConfig::default();
        config.set_max_steps(3).unwrap();
        assert_eq!(config.engine.max_steps, 3);

        assert!(matches!(config.set_max_steps(0), Err(HiveError::Config(_))));
        assert_eq!(config.engine.max_steps, 3);
    }

    #[test]
    fn malformed_override_is_reported() {
        let mut config = HiveConfig::default();
        let err = config
            .apply_overrides(|name| (name == ENV_MAX_STEPS).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_STEPS));
    }
}
