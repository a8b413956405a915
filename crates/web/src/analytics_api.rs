use super::{AppState, Error, Reply, Result, lookback_hours, respond};
use analytics::aggregate::{self, Recommendation};
use analytics::anomaly::{self, AnomalyReport, AnomalySummary};
use analytics::explain::{self, AnomalyExplanation, Language};
use analytics::limits::{self, SafeLimits};
use analytics::maintenance::{self, MaintenanceRecommendation};
use analytics::predict::{self, PredictionReport};
use analytics::trend_stats::{self, MachineTrends};
use axum::{
    Router,
    extract::{Path, Query, State},
    routing::get,
};
use chrono::Duration;
use logging::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn path(sub: &str) -> String {
    format!("/analytics/{sub}")
}

pub fn add_route(app: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    app.route(&path("anomalies"), get(anomalies))
        .route(&path("anomalies/{machine_id}"), get(machine_anomalies))
        .route(&path("explain/{machine_id}"), get(explain_machine))
        .route(&path("predictions/{machine_id}"), get(predictions))
        .route(&path("maintenance"), get(maintenance_list))
        .route(&path("recommendations"), get(recommendations))
        .route(&path("trends/{machine_id}"), get(trends))
        .route(&path("safe-limits"), get(safe_limits))
}

async fn anomalies(State(state): State<Arc<AppState>>) -> Reply<AnomalySummary> {
    let log = DEFAULT.new(o!("function" => "anomalies"));
    info!(log, "start");
    let result = match state.snapshots().await {
        Ok(snapshots) => anomaly::anomaly_summary(&state.store, &snapshots).await,
        Err(e) => Err(e),
    };
    respond(&log, result)
}

async fn machine_anomalies(
    State(state): State<Arc<AppState>>,
    Path(machine_id): Path<String>,
) -> Reply<AnomalyReport> {
    let log = DEFAULT.new(o!("function" => "machine_anomalies", "machine_id" => machine_id.clone()));
    info!(log, "start");
    let result = match state.snapshot(&machine_id).await {
        Ok(snapshot) => anomaly::detect_anomalies(&state.store, &snapshot).await,
        Err(e) => Err(e),
    };
    respond(&log, result)
}

#[derive(Debug, Deserialize)]
struct ExplainQuery {
    language: Option<String>,
}

async fn explain_machine(
    State(state): State<Arc<AppState>>,
    Path(machine_id): Path<String>,
    Query(query): Query<ExplainQuery>,
) -> Reply<AnomalyExplanation> {
    let language = query
        .language
        .as_deref()
        .map(Language::from_code)
        .unwrap_or_default();
    let log = DEFAULT.new(o!(
        "function" => "explain_machine",
        "machine_id" => machine_id.clone(),
        "language" => format!("{:?}", language),
    ));
    info!(log, "start");
    let result = match state.snapshot(&machine_id).await {
        Ok(snapshot) => explain::explain_anomaly(&state.store, &snapshot, language).await,
        Err(e) => Err(e),
    };
    respond(&log, result)
}

async fn predictions(
    State(state): State<Arc<AppState>>,
    Path(machine_id): Path<String>,
) -> Reply<PredictionReport> {
    let log = DEFAULT.new(o!("function" => "predictions", "machine_id" => machine_id.clone()));
    info!(log, "start");
    let result = match state.snapshot(&machine_id).await {
        Ok(snapshot) => predict::predict_machine_state(&state.store, &snapshot).await,
        Err(e) => Err(e),
    };
    respond(&log, result)
}

#[derive(Debug, Clone, Serialize)]
struct MaintenanceResponse {
    count: usize,
    recommendations: Vec<MaintenanceRecommendation>,
}

async fn maintenance_list(State(state): State<Arc<AppState>>) -> Reply<MaintenanceResponse> {
    let log = DEFAULT.new(o!("function" => "maintenance_list"));
    info!(log, "start");
    let result = match state.snapshots().await {
        Ok(snapshots) => maintenance::maintenance_recommendations(&state.store, &snapshots)
            .await
            .map(|recommendations| MaintenanceResponse {
                count: recommendations.len(),
                recommendations,
            }),
        Err(e) => Err(e),
    };
    respond(&log, result)
}

#[derive(Debug, Deserialize)]
struct RecommendationsQuery {
    limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
struct RecommendationsResponse {
    count: usize,
    recommendations: Vec<Recommendation>,
}

async fn recommendations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecommendationsQuery>,
) -> Reply<RecommendationsResponse> {
    let log = DEFAULT.new(o!("function" => "recommendations", "limit" => format!("{:?}", query.limit)));
    info!(log, "start");
    let result = match state.snapshots().await {
        Ok(snapshots) => aggregate::recommendations(&state.store, &snapshots, query.limit)
            .await
            .map(|recommendations| RecommendationsResponse {
                count: recommendations.len(),
                recommendations,
            }),
        Err(e) => Err(e),
    };
    respond(&log, result)
}

#[derive(Debug, Deserialize)]
struct TrendsQuery {
    hours: Option<i64>,
    period: Option<String>,
}

/// `hours` と `period` ("1h", "30m" など) を検証する
fn trend_window(query: &TrendsQuery) -> Result<(Duration, Duration)> {
    let hours = query.hours.unwrap_or(24);
    let window = lookback_hours(hours)?;
    let period = query.period.as_deref().unwrap_or("1h");
    let period = humantime::parse_duration(period)
        .ok()
        .and_then(|d| Duration::from_std(d).ok())
        .filter(|d| *d >= Duration::minutes(1))
        .ok_or_else(|| Error::InvalidRequest(format!("invalid period: {period}")))?;
    Ok((window, period))
}

async fn trends(
    State(state): State<Arc<AppState>>,
    Path(machine_id): Path<String>,
    Query(query): Query<TrendsQuery>,
) -> Reply<MachineTrends> {
    let log = DEFAULT.new(o!(
        "function" => "trends",
        "machine_id" => machine_id.clone(),
        "hours" => format!("{:?}", query.hours),
        "period" => format!("{:?}", query.period),
    ));
    info!(log, "start");
    let result = match trend_window(&query) {
        Ok((window, period)) => {
            trend_stats::machine_trends(&state.store, &machine_id, window, period).await
        }
        Err(e) => Err(e),
    };
    respond(&log, result)
}

#[derive(Debug, Deserialize)]
struct SafeLimitsQuery {
    days: Option<u32>,
}

async fn safe_limits(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SafeLimitsQuery>,
) -> Reply<SafeLimits> {
    let days = query.days.unwrap_or(limits::DEFAULT_DAYS);
    let log = DEFAULT.new(o!("function" => "safe_limits", "days" => days));
    info!(log, "start");
    respond(&log, limits::safe_limits(&state.store, days).await)
}
