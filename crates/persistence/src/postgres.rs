//! PostgreSQL 上の計測値・アラートストア

use crate::Result;
use crate::connection_pool;
use crate::{alert, machine_reading};
use anyhow::anyhow;
use chrono::{Duration, NaiveDateTime};
use common::store::{AlertStore, ReadingStore, window_start};
use common::types::{Alert, NewAlert, Reading, TimeRange};
use deadpool_diesel::postgres::Pool;
use diesel::prelude::*;
use logging::*;

#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config() -> Result<Self> {
        Ok(Self::new(connection_pool::from_config()?))
    }

    async fn interact<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> QueryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn: connection_pool::Client = self.pool.get().await?;
        let result = conn
            .interact(f)
            .await
            .map_err(|e| anyhow!("Database interaction error: {:?}", e))?;
        Ok(result?)
    }
}

fn into_readings(rows: Vec<machine_reading::DbMachineReading>) -> Result<Vec<Reading>> {
    let readings = rows
        .into_iter()
        .map(Reading::try_from)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(readings)
}

fn into_alerts(rows: Vec<alert::DbAlert>) -> Result<Vec<Alert>> {
    let alerts = rows
        .into_iter()
        .map(Alert::try_from)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(alerts)
}

impl ReadingStore for PgStore {
    async fn recent_readings(&self, machine_id: &str, window: Duration) -> Result<Vec<Reading>> {
        let log = DEFAULT.new(o!(
            "function" => "PgStore::recent_readings",
            "machine_id" => machine_id.to_owned(),
            "window_minutes" => window.num_minutes(),
        ));
        trace!(log, "start");
        let cutoff = window_start(window)?;
        let machine_id = machine_id.to_owned();
        let rows = self
            .interact(move |conn| machine_reading::recent(conn, &machine_id, cutoff))
            .await?;
        let readings = into_readings(rows)?;
        trace!(log, "success"; "count" => readings.len());
        Ok(readings)
    }

    async fn readings_in_range(&self, range: &TimeRange) -> Result<Vec<Reading>> {
        let log = DEFAULT.new(o!(
            "function" => "PgStore::readings_in_range",
            "start" => format!("{:?}", range.start),
            "end" => format!("{:?}", range.end),
        ));
        trace!(log, "start");
        let (start, end) = (range.start, range.end);
        let rows = self
            .interact(move |conn| machine_reading::in_range(conn, start, end))
            .await?;
        let readings = into_readings(rows)?;
        trace!(log, "success"; "count" => readings.len());
        Ok(readings)
    }

    async fn append(&self, reading: &Reading) -> Result<()> {
        let row = machine_reading::NewDbMachineReading::from(reading);
        self.interact(move |conn| machine_reading::insert(conn, &row))
            .await?;
        Ok(())
    }

    async fn purge_before(&self, cutoff: NaiveDateTime) -> Result<usize> {
        let log = DEFAULT.new(o!(
            "function" => "PgStore::purge_before",
            "cutoff" => format!("{:?}", cutoff),
        ));
        let deleted = self
            .interact(move |conn| machine_reading::delete_before(conn, cutoff))
            .await?;
        debug!(log, "success"; "deleted" => deleted);
        Ok(deleted)
    }
}

impl AlertStore for PgStore {
    async fn create_alert(&self, new_alert: &NewAlert) -> Result<Alert> {
        let row = alert::NewDbAlert::from(new_alert);
        let inserted = self.interact(move |conn| alert::insert(conn, &row)).await?;
        Ok(Alert::try_from(inserted)?)
    }

    async fn active_alerts(&self, limit: usize) -> Result<Vec<Alert>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self.interact(move |conn| alert::active(conn, limit)).await?;
        into_alerts(rows)
    }

    async fn acknowledge_alert(&self, id: i32) -> Result<Option<Alert>> {
        let row = self
            .interact(move |conn| alert::acknowledge(conn, id))
            .await?;
        Ok(row.map(Alert::try_from).transpose()?)
    }
}
