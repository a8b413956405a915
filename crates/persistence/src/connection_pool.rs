use crate::Result;
use deadpool_diesel::postgres::Pool;
use deadpool_diesel::{Manager, ManagerConfig, RecyclingMethod};

pub type Client = deadpool_diesel::postgres::Connection;

const DEFAULT_POOL_SIZE: usize = 16;

/// 設定 (`PG_DSN`, `PG_POOL_SIZE`) からコネクションプールを作る
pub fn from_config() -> Result<Pool> {
    let max_size: usize = common::config::get("PG_POOL_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_POOL_SIZE);
    let dsn = common::config::get("PG_DSN")?;
    build(&dsn, max_size)
}

pub fn build(dsn: &str, max_size: usize) -> Result<Pool> {
    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(dsn, deadpool_diesel::Runtime::Tokio1, mgr_config);
    Ok(Pool::builder(mgr).max_size(max_size).build()?)
}
