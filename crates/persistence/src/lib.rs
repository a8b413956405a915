pub mod alert;
pub mod connection_pool;
pub mod machine_reading;
pub mod memory;
pub mod postgres;
pub mod realtime;
pub mod schema;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use realtime::RealtimeSource;

use chrono::{Duration, NaiveDateTime};
use common::config;
use common::store::{AlertStore, ReadingStore};
use common::types::{Alert, NewAlert, Reading, TimeRange};
use logging::*;
use thiserror::Error;

type Result<T> = anyhow::Result<T>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown reading store backend: {0}")]
    UnknownBackend(String),
    #[error("malformed snapshot file {path}: {reason}")]
    MalformedSnapshot { path: String, reason: String },
}

/// 設定で選ばれた計測値ストア
#[derive(Clone)]
pub enum Store {
    Postgres(PgStore),
    Memory(MemoryStore),
}

impl Store {
    /// `READING_STORE` に従ってストアを作る
    pub fn from_config() -> Result<Self> {
        let log = DEFAULT.new(o!("function" => "Store::from_config"));
        let backend = config::get("READING_STORE").unwrap_or_else(|_| "memory".to_string());
        let store = match backend.as_str() {
            "memory" => Store::Memory(MemoryStore::new()),
            "postgres" => Store::Postgres(PgStore::from_config()?),
            other => return Err(Error::UnknownBackend(other.to_string()).into()),
        };
        info!(log, "reading store ready"; "backend" => store.backend_name());
        Ok(store)
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Store::Postgres(_) => "postgres",
            Store::Memory(_) => "memory",
        }
    }
}

impl ReadingStore for Store {
    async fn recent_readings(&self, machine_id: &str, window: Duration) -> Result<Vec<Reading>> {
        match self {
            Store::Postgres(s) => s.recent_readings(machine_id, window).await,
            Store::Memory(s) => s.recent_readings(machine_id, window).await,
        }
    }

    async fn readings_in_range(&self, range: &TimeRange) -> Result<Vec<Reading>> {
        match self {
            Store::Postgres(s) => s.readings_in_range(range).await,
            Store::Memory(s) => s.readings_in_range(range).await,
        }
    }

    async fn append(&self, reading: &Reading) -> Result<()> {
        match self {
            Store::Postgres(s) => s.append(reading).await,
            Store::Memory(s) => s.append(reading).await,
        }
    }

    async fn purge_before(&self, cutoff: NaiveDateTime) -> Result<usize> {
        match self {
            Store::Postgres(s) => s.purge_before(cutoff).await,
            Store::Memory(s) => s.purge_before(cutoff).await,
        }
    }
}

impl AlertStore for Store {
    async fn create_alert(&self, alert: &NewAlert) -> Result<Alert> {
        match self {
            Store::Postgres(s) => s.create_alert(alert).await,
            Store::Memory(s) => s.create_alert(alert).await,
        }
    }

    async fn active_alerts(&self, limit: usize) -> Result<Vec<Alert>> {
        match self {
            Store::Postgres(s) => s.active_alerts(limit).await,
            Store::Memory(s) => s.active_alerts(limit).await,
        }
    }

    async fn acknowledge_alert(&self, id: i32) -> Result<Option<Alert>> {
        match self {
            Store::Postgres(s) => s.acknowledge_alert(id).await,
            Store::Memory(s) => s.acknowledge_alert(id).await,
        }
    }
}
