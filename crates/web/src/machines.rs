use super::{AppState, Error, Reply, Result, config_or, lookback_hours, respond};
use analytics::health::{self, HealthAssessment};
use axum::{
    Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use chrono::NaiveDateTime;
use common::store::{AlertStore, ReadingStore};
use common::types::{Alert, HealthStatus, MachineSnapshot, Reading};
use logging::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn path(sub: &str) -> String {
    format!("/machines/{sub}")
}

pub fn add_route(app: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    app.route(&path("live"), get(live))
        .route(&path("history/{machine_id}"), get(history))
        .route(&path("alerts"), get(alerts))
        .route(&path("alerts/{alert_id}/acknowledge"), post(acknowledge_alert))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMachine {
    pub machine_id: String,
    pub timestamp: NaiveDateTime,
    pub temperature: Option<f64>,
    pub vibration: Option<f64>,
    pub rpm: Option<f64>,
    pub health_score: i32,
    pub status: HealthStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveMachines {
    pub count: usize,
    pub machines: Vec<LiveMachine>,
}

impl LiveMachines {
    pub fn new(machines: Vec<LiveMachine>) -> Self {
        Self {
            count: machines.len(),
            machines,
        }
    }
}

pub(crate) fn enrich(snapshot: &MachineSnapshot) -> (LiveMachine, HealthAssessment) {
    let assessment = health::assess(snapshot);
    let machine = LiveMachine {
        machine_id: snapshot.machine_id.clone(),
        timestamp: snapshot.timestamp,
        temperature: snapshot.temperature,
        vibration: snapshot.vibration,
        rpm: snapshot.rpm,
        health_score: assessment.score,
        status: assessment.status,
    };
    (machine, assessment)
}

/// 現在値を評価し、計測値として記録してアラートを発行する
async fn live(State(state): State<Arc<AppState>>) -> Reply<LiveMachines> {
    let log = DEFAULT.new(o!("function" => "live"));
    info!(log, "start");
    respond(&log, record_live(&state, &log).await)
}

async fn record_live(state: &AppState, log: &Logger) -> Result<LiveMachines> {
    let snapshots = state.snapshots().await?;
    let mut machines = Vec::with_capacity(snapshots.len());
    for snapshot in &snapshots {
        let (machine, assessment) = enrich(snapshot);
        state
            .store
            .append(&snapshot.to_reading(assessment.score, assessment.status))
            .await
            .map_err(Error::store)?;
        for alert in &assessment.alerts {
            let created = state.store.create_alert(alert).await.map_err(Error::store)?;
            debug!(log, "alert raised";
                "id" => created.id,
                "machine_id" => &created.machine_id,
                "severity" => %created.severity,
            );
        }
        machines.push(machine);
    }
    Ok(LiveMachines::new(machines))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    hours: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
struct HistoryResponse {
    machine_id: String,
    hours: i64,
    count: usize,
    readings: Vec<Reading>,
}

async fn history(
    State(state): State<Arc<AppState>>,
    Path(machine_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Reply<HistoryResponse> {
    let hours = query
        .hours
        .unwrap_or_else(|| config_or("HISTORY_DEFAULT_HOURS", 24));
    let log = DEFAULT.new(o!(
        "function" => "history",
        "machine_id" => machine_id.clone(),
        "hours" => hours,
    ));
    info!(log, "start");
    respond(&log, load_history(&state, machine_id, hours).await)
}

async fn load_history(state: &AppState, machine_id: String, hours: i64) -> Result<HistoryResponse> {
    let window = lookback_hours(hours)?;
    let readings = state
        .store
        .recent_readings(&machine_id, window)
        .await
        .map_err(Error::store)?;
    Ok(HistoryResponse {
        machine_id,
        hours,
        count: readings.len(),
        readings,
    })
}

#[derive(Debug, Deserialize)]
struct AlertsQuery {
    limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
struct AlertsResponse {
    count: usize,
    alerts: Vec<Alert>,
}

async fn alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertsQuery>,
) -> Reply<AlertsResponse> {
    let limit = query
        .limit
        .unwrap_or_else(|| config_or("ALERTS_DEFAULT_LIMIT", 50));
    let log = DEFAULT.new(o!("function" => "alerts", "limit" => limit));
    info!(log, "start");
    let result = state
        .store
        .active_alerts(limit)
        .await
        .map_err(Error::store)
        .map(|alerts| AlertsResponse {
            count: alerts.len(),
            alerts,
        });
    respond(&log, result)
}

#[derive(Debug, Clone, Serialize)]
struct AcknowledgeResponse {
    success: bool,
    message: String,
    alert: Alert,
}

async fn acknowledge_alert(
    State(state): State<Arc<AppState>>,
    Path(alert_id): Path<i32>,
) -> Reply<AcknowledgeResponse> {
    let log = DEFAULT.new(o!("function" => "acknowledge_alert", "alert_id" => alert_id));
    info!(log, "start");
    let result = match state.store.acknowledge_alert(alert_id).await {
        Ok(Some(alert)) => Ok(AcknowledgeResponse {
            success: true,
            message: format!("Alert {alert_id} acknowledged"),
            alert,
        }),
        Ok(None) => Err(Error::AlertNotFound(alert_id).into()),
        Err(e) => Err(Error::store(e)),
    };
    respond(&log, result)
}
