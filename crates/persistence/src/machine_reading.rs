use crate::schema::machine_readings;
use chrono::NaiveDateTime;
use common::types::{HealthStatus, ParseError, Reading};
use diesel::prelude::*;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = machine_readings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbMachineReading {
    pub id: i32,
    pub machine_id: String,
    pub temperature: Option<f64>,
    pub vibration: Option<f64>,
    pub rpm: Option<f64>,
    pub health_score: Option<i32>,
    pub status: Option<String>,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = machine_readings)]
pub struct NewDbMachineReading {
    pub machine_id: String,
    pub temperature: Option<f64>,
    pub vibration: Option<f64>,
    pub rpm: Option<f64>,
    pub health_score: Option<i32>,
    pub status: Option<String>,
    pub timestamp: NaiveDateTime,
}

impl From<&Reading> for NewDbMachineReading {
    fn from(reading: &Reading) -> Self {
        Self {
            machine_id: reading.machine_id.clone(),
            temperature: reading.temperature,
            vibration: reading.vibration,
            rpm: reading.rpm,
            health_score: reading.health_score,
            status: reading.status.map(|s| s.as_str().to_string()),
            timestamp: reading.timestamp,
        }
    }
}

impl TryFrom<DbMachineReading> for Reading {
    type Error = ParseError;

    fn try_from(row: DbMachineReading) -> Result<Self, Self::Error> {
        let status = row.status.as_deref().map(str::parse::<HealthStatus>).transpose()?;
        Ok(Reading {
            machine_id: row.machine_id,
            timestamp: row.timestamp,
            temperature: row.temperature,
            vibration: row.vibration,
            rpm: row.rpm,
            health_score: row.health_score,
            status,
        })
    }
}

pub fn recent(
    conn: &mut PgConnection,
    machine_id: &str,
    cutoff: NaiveDateTime,
) -> QueryResult<Vec<DbMachineReading>> {
    machine_readings::table
        .filter(machine_readings::machine_id.eq(machine_id))
        .filter(machine_readings::timestamp.ge(cutoff))
        .order_by((machine_readings::timestamp.asc(), machine_readings::id.asc()))
        .select(DbMachineReading::as_select())
        .load(conn)
}

pub fn in_range(
    conn: &mut PgConnection,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> QueryResult<Vec<DbMachineReading>> {
    machine_readings::table
        .filter(machine_readings::timestamp.ge(start))
        .filter(machine_readings::timestamp.le(end))
        .order_by((machine_readings::timestamp.asc(), machine_readings::id.asc()))
        .select(DbMachineReading::as_select())
        .load(conn)
}

pub fn insert(conn: &mut PgConnection, reading: &NewDbMachineReading) -> QueryResult<usize> {
    diesel::insert_into(machine_readings::table)
        .values(reading)
        .execute(conn)
}

pub fn delete_before(conn: &mut PgConnection, cutoff: NaiveDateTime) -> QueryResult<usize> {
    diesel::delete(machine_readings::table.filter(machine_readings::timestamp.lt(cutoff)))
        .execute(conn)
}
