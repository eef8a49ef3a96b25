//! Config file loading shared between `signal_cli` and `signal_daemon`.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use signal_core::PipelineConfig;

const VALID_KEYS: &[&str] = &[
    "channel",
    "signal_type_tag",
    "heartbeat_interval_ms",
    "expire_window_ms",
    "auto_clear_padding_secs",
    "auto_clear_fallback_secs",
];

pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file: {}", path.display()))?;
    let config: PipelineConfig = serde_json::from_str(&json)
        .with_context(|| format!("parsing config file: {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Rejects configs that would spin the heartbeat or never expire anything.
pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    if config.channel.is_empty() {
        bail!("config 'channel' must not be empty");
    }
    if config.heartbeat_interval_ms == 0 {
        bail!("config 'heartbeat_interval_ms' must be > 0");
    }
    if config.expire_window_ms == 0 {
        bail!("config 'expire_window_ms' must be > 0");
    }
    if config.auto_clear_fallback_secs == 0 {
        bail!("config 'auto_clear_fallback_secs' must be > 0");
    }
    Ok(())
}

pub fn apply_overrides(
    config: &mut PipelineConfig,
    overrides: &HashMap<String, serde_json::Value>,
) -> Result<()> {
    for (key, value) in overrides {
        match key.as_str() {
            "channel" => config.channel = as_string(key, value)?,
            "signal_type_tag" => config.signal_type_tag = as_i64(key, value)?,
            "heartbeat_interval_ms" => config.heartbeat_interval_ms = as_u64(key, value)?,
            "expire_window_ms" => config.expire_window_ms = as_u64(key, value)?,
            "auto_clear_padding_secs" => config.auto_clear_padding_secs = as_u64(key, value)?,
            "auto_clear_fallback_secs" => config.auto_clear_fallback_secs = as_u64(key, value)?,
            _ => bail!(
                "unknown override key '{key}'. Valid keys: {}",
                VALID_KEYS.join(", ")
            ),
        }
    }
    validate_config(config)
}

/// Parses `key=value` pairs from the command line. Values are read as JSON,
/// falling back to a plain string.
pub fn parse_overrides(pairs: &[String]) -> Result<HashMap<String, serde_json::Value>> {
    let mut overrides = HashMap::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("override '{pair}' must look like key=value");
        };
        let value = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        overrides.insert(key.trim().to_string(), value);
    }
    Ok(overrides)
}

fn as_string(key: &str, value: &serde_json::Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("override '{key}': expected a string, got {value}"))
}

fn as_i64(key: &str, value: &serde_json::Value) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| anyhow::anyhow!("override '{key}': expected an integer, got {value}"))
}

fn as_u64(key: &str, value: &serde_json::Value) -> Result<u64> {
    value.as_u64().ok_or_else(|| {
        anyhow::anyhow!("override '{key}': expected a positive integer, got {value}")
    })
}
