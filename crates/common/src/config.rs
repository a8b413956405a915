use crate::Result;
use anyhow::anyhow;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

// TOML configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    /// `memory` または `postgres`
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default)]
    pub pg_dsn: String,
    #[serde(default = "default_pg_pool_size")]
    pub pg_pool_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_realtime_data_dir")]
    pub data_dir: String,
    /// humantime 形式 (例: "3s")
    #[serde(default = "default_ws_push_interval")]
    pub ws_push_interval: String,
}

#[derive(Debug, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_readings_retention_days")]
    pub readings_days: u32,
    #[serde(default = "default_retention_cron_schedule")]
    pub cron_schedule: String,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_rust_log_format")]
    pub rust_log_format: String,
}

// Default values
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_store_backend() -> String {
    "memory".to_string()
}
fn default_pg_pool_size() -> u32 {
    16
}
fn default_realtime_data_dir() -> String {
    "data/realtime".to_string()
}
fn default_ws_push_interval() -> String {
    "3s".to_string()
}
fn default_readings_retention_days() -> u32 {
    30
}
fn default_retention_cron_schedule() -> String {
    "0 0 3 * * *".to_string() // 毎日 3:00
}
fn default_rust_log_format() -> String {
    "json".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            pg_dsn: String::new(),
            pg_pool_size: default_pg_pool_size(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_realtime_data_dir(),
            ws_push_interval: default_ws_push_interval(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            readings_days: default_readings_retention_days(),
            cron_schedule: default_retention_cron_schedule(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            rust_log_format: default_rust_log_format(),
        }
    }
}

static CONFIG: Lazy<Config> = Lazy::new(|| {
    load_config().unwrap_or_else(|e| {
        eprintln!(
            "Warning: Failed to load config files: {}. Using defaults.",
            e
        );
        Config::default()
    })
});

static CONFIG_STORE: Lazy<Arc<Mutex<HashMap<String, String>>>> =
    Lazy::new(|| Arc::new(Mutex::new(HashMap::new())));

pub fn get(name: &str) -> Result<String> {
    // Priority 1: CONFIG_STORE (runtime overrides)
    if let Some(value) = get_from_store(name) {
        if value.is_empty() {
            return Err(anyhow!("{} is empty", name));
        }
        return Ok(value);
    }

    // Priority 2: Environment variables
    if let Ok(val) = std::env::var(name)
        && !val.is_empty()
    {
        return Ok(val);
    }

    // Priority 3: TOML config
    let toml_value = match name {
        "SERVER_BIND_ADDR" => Some(CONFIG.server.bind_addr.clone()),
        "READING_STORE" => Some(CONFIG.store.backend.clone()),
        "PG_DSN" => Some(CONFIG.store.pg_dsn.clone()),
        "PG_POOL_SIZE" => Some(CONFIG.store.pg_pool_size.to_string()),
        "REALTIME_DATA_DIR" => Some(CONFIG.realtime.data_dir.clone()),
        "WS_PUSH_INTERVAL" => Some(CONFIG.realtime.ws_push_interval.clone()),
        "READINGS_RETENTION_DAYS" => Some(CONFIG.retention.readings_days.to_string()),
        "RETENTION_CRON_SCHEDULE" => Some(CONFIG.retention.cron_schedule.clone()),
        "HISTORY_DEFAULT_HOURS" => Some("24".to_string()),
        "ALERTS_DEFAULT_LIMIT" => Some("50".to_string()),
        "RUST_LOG_FORMAT" => Some(CONFIG.logging.rust_log_format.clone()),
        _ => None,
    };

    if let Some(value) = toml_value
        && !value.is_empty()
    {
        return Ok(value);
    }

    Err(anyhow!("Configuration key not found: {}", name))
}

/// humantime 形式の値を Duration として取得する
pub fn get_duration(name: &str) -> Result<std::time::Duration> {
    let value = get(name)?;
    humantime::parse_duration(&value).map_err(|e| anyhow!("{} is not a duration: {}", name, e))
}

/// テスト用: 設定値を上書きする
///
/// 注: `#[cfg(test)]` にすると他クレートのテストから参照できないため
/// `#[doc(hidden)]` で公開している
#[doc(hidden)]
pub fn set(name: &str, value: &str) {
    if let Ok(mut store) = CONFIG_STORE.lock() {
        store.insert(name.to_string(), value.to_string());
    }
}

/// テスト用: 設定値を CONFIG_STORE から削除する
#[doc(hidden)]
pub fn remove(name: &str) {
    if let Ok(mut store) = CONFIG_STORE.lock() {
        store.remove(name);
    }
}

/// テスト用: CONFIG_STORE に値をセットし、Drop 時に自動で元に戻す RAII ガード。
#[doc(hidden)]
pub struct ConfigGuard {
    key: String,
    previous: Option<String>,
}

impl ConfigGuard {
    pub fn new(key: &str, value: &str) -> Self {
        let previous = get_from_store(key);
        set(key, value);
        Self {
            key: key.to_string(),
            previous,
        }
    }
}

impl Drop for ConfigGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(prev) => set(&self.key, prev),
            None => remove(&self.key),
        }
    }
}

fn get_from_store(name: &str) -> Option<String> {
    if let Ok(store) = CONFIG_STORE.lock() {
        store.get(name).cloned()
    } else {
        None
    }
}

/// Load configuration from TOML files with priority:
/// 1. config/config.local.toml (git-ignored, for local overrides)
/// 2. config/config.toml (git-managed template)
/// 3. Default values
fn load_config() -> Result<Config> {
    let mut config = Config::default();

    let base_path = "config/config.toml";
    if Path::new(base_path).exists() {
        let content = fs::read_to_string(base_path)?;
        config = toml::from_str(&content)?;
    }

    let local_path = "config/config.local.toml";
    if Path::new(local_path).exists() {
        let content = fs::read_to_string(local_path)?;
        let local_config: Config = toml::from_str(&content)?;
        merge_config(&mut config, local_config);
    }

    Ok(config)
}

/// Merge local config into base config (local values override base values)
fn merge_config(base: &mut Config, local: Config) {
    // Server
    if local.server.bind_addr != default_bind_addr() {
        base.server.bind_addr = local.server.bind_addr;
    }

    // Store
    if local.store.backend != default_store_backend() {
        base.store.backend = local.store.backend;
    }
    if !local.store.pg_dsn.is_empty() {
        base.store.pg_dsn = local.store.pg_dsn;
    }
    if local.store.pg_pool_size != default_pg_pool_size() {
        base.store.pg_pool_size = local.store.pg_pool_size;
    }

    // Realtime
    if local.realtime.data_dir != default_realtime_data_dir() {
        base.realtime.data_dir = local.realtime.data_dir;
    }
    if local.realtime.ws_push_interval != default_ws_push_interval() {
        base.realtime.ws_push_interval = local.realtime.ws_push_interval;
    }

    // Retention
    if local.retention.readings_days != default_readings_retention_days() {
        base.retention.readings_days = local.retention.readings_days;
    }
    if local.retention.cron_schedule != default_retention_cron_schedule() {
        base.retention.cron_schedule = local.retention.cron_schedule;
    }

    // Logging
    if local.logging.rust_log_format != default_rust_log_format() {
        base.logging.rust_log_format = local.logging.rust_log_format;
    }
}

/// Get TOML-based configuration
pub fn config() -> &'static Config {
    &CONFIG
}
