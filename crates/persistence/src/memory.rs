//! プロセス内に保持する計測値・アラートストア
//!
//! 開発用とテスト用。再起動で内容は消える。

use crate::Result;
use anyhow::anyhow;
use chrono::{Duration, NaiveDateTime, Utc};
use common::store::{AlertStore, ReadingStore, window_start};
use common::types::{Alert, NewAlert, Reading, TimeRange};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    // タイムスタンプ昇順を保つ
    readings: Vec<Reading>,
    alerts: Vec<Alert>,
    next_alert_id: i32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_readings(readings: impl IntoIterator<Item = Reading>) -> Self {
        let store = Self::new();
        if let Ok(mut inner) = store.inner.lock() {
            for reading in readings {
                inner.insert_reading(reading);
            }
        }
        store
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

impl Inner {
    fn insert_reading(&mut self, reading: Reading) {
        let at = self
            .readings
            .partition_point(|r| r.timestamp <= reading.timestamp);
        self.readings.insert(at, reading);
    }
}

impl ReadingStore for MemoryStore {
    async fn recent_readings(&self, machine_id: &str, window: Duration) -> Result<Vec<Reading>> {
        let cutoff = window_start(window)?;
        let inner = self.lock()?;
        Ok(inner
            .readings
            .iter()
            .filter(|r| r.machine_id == machine_id && r.timestamp >= cutoff)
            .cloned()
            .collect())
    }

    async fn readings_in_range(&self, range: &TimeRange) -> Result<Vec<Reading>> {
        let inner = self.lock()?;
        Ok(inner
            .readings
            .iter()
            .filter(|r| range.start <= r.timestamp && r.timestamp <= range.end)
            .cloned()
            .collect())
    }

    async fn append(&self, reading: &Reading) -> Result<()> {
        self.lock()?.insert_reading(reading.clone());
        Ok(())
    }

    async fn purge_before(&self, cutoff: NaiveDateTime) -> Result<usize> {
        let mut inner = self.lock()?;
        let before = inner.readings.len();
        inner.readings.retain(|r| r.timestamp >= cutoff);
        Ok(before - inner.readings.len())
    }
}

impl AlertStore for MemoryStore {
    async fn create_alert(&self, alert: &NewAlert) -> Result<Alert> {
        let mut inner = self.lock()?;
        inner.next_alert_id += 1;
        let created = Alert {
            id: inner.next_alert_id,
            machine_id: alert.machine_id.clone(),
            alert_type: alert.alert_type.clone(),
            severity: alert.severity,
            message: alert.message.clone(),
            acknowledged: false,
            created_at: Utc::now().naive_utc(),
        };
        inner.alerts.push(created.clone());
        Ok(created)
    }

    async fn active_alerts(&self, limit: usize) -> Result<Vec<Alert>> {
        let inner = self.lock()?;
        // 追加順 = 作成順なので逆順に辿れば新しい順
        Ok(inner
            .alerts
            .iter()
            .rev()
            .filter(|a| !a.acknowledged)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn acknowledge_alert(&self, id: i32) -> Result<Option<Alert>> {
        let mut inner = self.lock()?;
        Ok(inner.alerts.iter_mut().find(|a| a.id == id).map(|a| {
            a.acknowledged = true;
            a.clone()
        }))
    }
}
