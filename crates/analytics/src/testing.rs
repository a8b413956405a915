//! テスト用の計測値ビルダーと壊れたストア

use anyhow::anyhow;
use chrono::{Duration, NaiveDateTime, Utc};
use common::store::ReadingStore;
use common::types::{MachineSnapshot, Reading, TimeRange};

pub const MACHINE: &str = "MILL-01";

pub fn base_time() -> NaiveDateTime {
    NaiveDateTime::parse_from_str("2025-06-01 08:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
}

pub fn snapshot(
    temperature: Option<f64>,
    vibration: Option<f64>,
    rpm: Option<f64>,
) -> MachineSnapshot {
    MachineSnapshot {
        machine_id: MACHINE.to_string(),
        timestamp: base_time(),
        temperature,
        vibration,
        rpm,
        health_score: None,
    }
}

pub fn reading(timestamp: NaiveDateTime) -> Reading {
    Reading {
        machine_id: MACHINE.to_string(),
        timestamp,
        temperature: None,
        vibration: None,
        rpm: None,
        health_score: None,
        status: None,
    }
}

/// `base_time()` に向かって `step` 間隔で並ぶ昇順の履歴
pub fn series(
    end: NaiveDateTime,
    step: Duration,
    len: usize,
    fill: impl Fn(usize, &mut Reading),
) -> Vec<Reading> {
    (0..len)
        .map(|i| {
            let mut r = reading(end - step * (len - 1 - i) as i32);
            fill(i, &mut r);
            r
        })
        .collect()
}

pub fn temperature_history(temps: &[f64]) -> Vec<Reading> {
    series(base_time(), Duration::minutes(10), temps.len(), |i, r| {
        r.temperature = Some(temps[i])
    })
}

pub fn vibration_history(vibs: &[f64]) -> Vec<Reading> {
    series(base_time(), Duration::minutes(10), vibs.len(), |i, r| {
        r.vibration = Some(vibs[i])
    })
}

/// ストアに入れるための、現在時刻に向かって並ぶ履歴
pub fn recent_series(step: Duration, len: usize, fill: impl Fn(usize, &mut Reading)) -> Vec<Reading> {
    series(Utc::now().naive_utc() - Duration::minutes(1), step, len, fill)
}

pub struct BrokenStore;

impl ReadingStore for BrokenStore {
    async fn recent_readings(&self, _: &str, _: Duration) -> anyhow::Result<Vec<Reading>> {
        Err(anyhow!("connection refused"))
    }

    async fn readings_in_range(&self, _: &TimeRange) -> anyhow::Result<Vec<Reading>> {
        Err(anyhow!("connection refused"))
    }

    async fn append(&self, _: &Reading) -> anyhow::Result<()> {
        Err(anyhow!("connection refused"))
    }

    async fn purge_before(&self, _: NaiveDateTime) -> anyhow::Result<usize> {
        Err(anyhow!("connection refused"))
    }
}
