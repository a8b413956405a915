use crate::schema::alerts;
use chrono::NaiveDateTime;
use common::types::{Alert, AlertSeverity, NewAlert, ParseError};
use diesel::prelude::*;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = alerts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbAlert {
    pub id: i32,
    pub machine_id: String,
    pub alert_type: String,
    pub severity: String,
    pub message: String,
    pub acknowledged: bool,
    pub created_at: NaiveDateTime,
}

/// `acknowledged` と `created_at` はテーブルのデフォルト値に任せる
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = alerts)]
pub struct NewDbAlert {
    pub machine_id: String,
    pub alert_type: String,
    pub severity: String,
    pub message: String,
}

impl From<&NewAlert> for NewDbAlert {
    fn from(alert: &NewAlert) -> Self {
        Self {
            machine_id: alert.machine_id.clone(),
            alert_type: alert.alert_type.clone(),
            severity: alert.severity.as_str().to_string(),
            message: alert.message.clone(),
        }
    }
}

impl TryFrom<DbAlert> for Alert {
    type Error = ParseError;

    fn try_from(row: DbAlert) -> Result<Self, Self::Error> {
        Ok(Alert {
            id: row.id,
            machine_id: row.machine_id,
            alert_type: row.alert_type,
            severity: row.severity.parse::<AlertSeverity>()?,
            message: row.message,
            acknowledged: row.acknowledged,
            created_at: row.created_at,
        })
    }
}

pub fn insert(conn: &mut PgConnection, alert: &NewDbAlert) -> QueryResult<DbAlert> {
    diesel::insert_into(alerts::table)
        .values(alert)
        .returning(DbAlert::as_returning())
        .get_result(conn)
}

pub fn active(conn: &mut PgConnection, limit: i64) -> QueryResult<Vec<DbAlert>> {
    alerts::table
        .filter(alerts::acknowledged.eq(false))
        .order_by((alerts::created_at.desc(), alerts::id.desc()))
        .limit(limit)
        .select(DbAlert::as_select())
        .load(conn)
}

pub fn acknowledge(conn: &mut PgConnection, id: i32) -> QueryResult<Option<DbAlert>> {
    diesel::update(alerts::table.find(id))
        .set(alerts::acknowledged.eq(true))
        .returning(DbAlert::as_returning())
        .get_result(conn)
        .optional()
}
