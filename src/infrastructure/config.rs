use crate::domain::models::CycleDurations;
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const TIMER_JSON: &str = "timer.json";
const SUPPORTED_SCHEMA: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub schema: u8,
    pub app_name: String,
    #[serde(default)]
    pub notification_command: Option<Vec<String>>,
}

impl AppConfig {
    /// The configured notification command with blank entries dropped, or
    /// `None` when nothing usable is configured.
    pub fn notification_command(&self) -> Option<Vec<String>> {
        self.notification_command
            .as_ref()
            .map(|parts| {
                parts
                    .iter()
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|parts| !parts.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerConfig {
    pub schema: u8,
    pub work_seconds: u32,
    pub short_break_seconds: u32,
    pub long_break_seconds: u32,
    pub long_break_every: u32,
}

impl TimerConfig {
    pub fn durations(&self) -> CycleDurations {
        CycleDurations {
            work_seconds: self.work_seconds,
            short_break_seconds: self.short_break_seconds,
            long_break_seconds: self.long_break_seconds,
            long_break_every: self.long_break_every,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBundle {
    pub app: AppConfig,
    pub timer: TimerConfig,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    let durations = CycleDurations::default();
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "Pomocycle",
                "notificationCommand": null
            }),
        ),
        (
            TIMER_JSON,
            serde_json::json!({
                "schema": 1,
                "workSeconds": durations.work_seconds,
                "shortBreakSeconds": durations.short_break_seconds,
                "longBreakSeconds": durations.long_break_seconds,
                "longBreakEvery": durations.long_break_every
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    let app: AppConfig = serde_json::from_value(read_config(&config_dir.join(APP_JSON))?)?;
    let timer: TimerConfig = serde_json::from_value(read_config(&config_dir.join(TIMER_JSON))?)?;
    timer
        .durations()
        .validate()
        .map_err(|message| InfraError::InvalidConfig(format!("{message} in {TIMER_JSON}")))?;
    Ok(ConfigBundle { app, timer })
}
