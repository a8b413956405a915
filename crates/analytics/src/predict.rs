//! トレンド予測
//!
//! 直近 6 時間の履歴に対してメトリクスごとに直線をあてはめ、
//! 1/4/24 時間後の値と、故障しきい値に達するまでの時間を見積もる。
//! x 軸は履歴の先頭からの経過時間 (時間単位)。

use crate::health;
use crate::stats::{TrendModel, linear_regression, round_to};
use crate::{Result, load_history};
use chrono::{Duration, NaiveDateTime};
use common::store::ReadingStore;
use common::types::{MachineSnapshot, Reading};
use logging::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TEMPERATURE_FAILURE: f64 = 90.0;
pub const VIBRATION_FAILURE: f64 = 1.0;
pub const HEALTH_CRITICAL: f64 = 40.0;

/// 予測に必要な履歴の件数
pub const MIN_HISTORY: usize = 5;
pub const HORIZONS: [u32; 3] = [1, 4, 24];
/// これより先の到達予測は出さない
pub const MAX_LEAD_HOURS: f64 = 48.0;

const TEMPERATURE_TREND_SLOPE: f64 = 0.5;
const VIBRATION_TREND_SLOPE: f64 = 0.01;
const HEALTH_TREND_SLOPE: f64 = 1.0;

pub const INSUFFICIENT_DATA: &str = "Insufficient historical data for prediction";

pub fn history_window() -> Duration {
    Duration::hours(6)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Temperature,
    Vibration,
    Health,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Rising,
    Falling,
    Stable,
    Declining,
    Improving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trends {
    pub temperature: Direction,
    pub vibration: Direction,
    pub health: Direction,
}

impl Trends {
    fn from_slopes(temperature: f64, vibration: f64, health: f64) -> Self {
        let rising_or_falling = |slope: f64, limit: f64| {
            if slope > limit {
                Direction::Rising
            } else if slope < -limit {
                Direction::Falling
            } else {
                Direction::Stable
            }
        };
        let health = if health < -HEALTH_TREND_SLOPE {
            Direction::Declining
        } else if health > HEALTH_TREND_SLOPE {
            Direction::Improving
        } else {
            Direction::Stable
        };
        Self {
            temperature: rising_or_falling(temperature, TEMPERATURE_TREND_SLOPE),
            vibration: rising_or_falling(vibration, VIBRATION_TREND_SLOPE),
            health,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentState {
    pub temperature: Option<f64>,
    pub vibration: Option<f64>,
    pub health_score: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedState {
    pub temperature: f64,
    pub vibration: f64,
    pub health_score: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeToCritical {
    pub hours: f64,
    pub threshold: f64,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Stable,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn message(&self) -> &'static str {
        match self {
            RiskLevel::High => "Immediate attention required - critical threshold approaching",
            RiskLevel::Medium => "Schedule maintenance soon - degradation detected",
            RiskLevel::Low => "Monitor closely - gradual degradation observed",
            RiskLevel::Stable => "Machine operating normally",
        }
    }
}

/// 履歴が足りない場合は `has_prediction = false` で、予測系のフィールドは空
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionReport {
    pub machine_id: String,
    pub timestamp: NaiveDateTime,
    pub has_prediction: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub current: CurrentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trends: Option<Trends>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub predictions: BTreeMap<String, PredictedState>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub time_to_critical: BTreeMap<Metric, TimeToCritical>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_message: Option<String>,
}

impl PredictionReport {
    fn insufficient(snapshot: &MachineSnapshot, current: CurrentState) -> Self {
        Self {
            machine_id: snapshot.machine_id.clone(),
            timestamp: snapshot.timestamp,
            has_prediction: false,
            message: Some(INSUFFICIENT_DATA.to_string()),
            current,
            trends: None,
            predictions: BTreeMap::new(),
            time_to_critical: BTreeMap::new(),
            risk_level: None,
            risk_message: None,
        }
    }
}

pub async fn predict_machine_state<S: ReadingStore>(
    store: &S,
    snapshot: &MachineSnapshot,
) -> Result<PredictionReport> {
    let log = DEFAULT.new(o!(
        "function" => "predict_machine_state",
        "machine_id" => snapshot.machine_id.clone(),
    ));
    trace!(log, "start");
    let history = load_history(store, &snapshot.machine_id, history_window()).await?;
    let report = forecast(snapshot, &history);
    debug!(log, "success";
        "history_count" => history.len(),
        "has_prediction" => report.has_prediction,
        "risk_level" => ?report.risk_level,
    );
    Ok(report)
}

/// しきい値に達するまでの時間
///
/// 増加していなければ `None`、すでに達していれば 0。
pub fn time_to_threshold(current: f64, slope: f64, threshold: f64) -> Option<f64> {
    if slope <= 0.0 {
        return None;
    }
    if current >= threshold {
        return Some(0.0);
    }
    let hours = (threshold - current) / slope;
    (hours > 0.0).then_some(hours)
}

pub fn risk_level(time_to_critical: &BTreeMap<Metric, TimeToCritical>) -> RiskLevel {
    let any_within = |limit: f64| time_to_critical.values().any(|t| t.hours < limit);
    if any_within(4.0) {
        RiskLevel::High
    } else if any_within(12.0) {
        RiskLevel::Medium
    } else if !time_to_critical.is_empty() {
        RiskLevel::Low
    } else {
        RiskLevel::Stable
    }
}

fn lead_time(current: f64, slope: f64, threshold: f64) -> Option<f64> {
    time_to_threshold(current, slope, threshold).filter(|hours| *hours < MAX_LEAD_HOURS)
}

/// `history` はタイムスタンプ昇順であること
pub fn forecast(snapshot: &MachineSnapshot, history: &[Reading]) -> PredictionReport {
    let current = CurrentState {
        temperature: snapshot.temperature,
        vibration: snapshot.vibration,
        health_score: snapshot
            .health_score
            .unwrap_or_else(|| health::assess(snapshot).score),
    };
    let (Some(first), Some(last)) = (history.first(), history.last()) else {
        return PredictionReport::insufficient(snapshot, current);
    };
    if history.len() < MIN_HISTORY {
        return PredictionReport::insufficient(snapshot, current);
    }

    let hours_since_first =
        |r: &Reading| (r.timestamp - first.timestamp).num_milliseconds() as f64 / 3_600_000.0;
    // 欠損値は除外し、値が一つも無ければ現在値で横ばいとみなす
    let fit = |value: fn(&Reading) -> Option<f64>, fallback: f64| {
        let points: Vec<(f64, f64)> = history
            .iter()
            .filter_map(|r| value(r).map(|y| (hours_since_first(r), y)))
            .collect();
        if points.is_empty() {
            TrendModel {
                slope: 0.0,
                intercept: fallback,
            }
        } else {
            linear_regression(&points)
        }
    };
    let temperature = fit(|r| r.temperature, current.temperature.unwrap_or_default());
    let vibration = fit(|r| r.vibration, current.vibration.unwrap_or_default());
    let health = fit(
        |r| r.health_score.map(f64::from),
        f64::from(current.health_score),
    );
    let last_x = hours_since_first(last);

    let predictions = HORIZONS
        .iter()
        .map(|hours| {
            let x = last_x + f64::from(*hours);
            let predicted = PredictedState {
                temperature: round_to(temperature.at(x), 1),
                vibration: round_to(vibration.at(x), 3),
                health_score: health.at(x).round().clamp(0.0, 100.0) as i32,
            };
            (format!("{hours}h"), predicted)
        })
        .collect();

    let mut time_to_critical = BTreeMap::new();
    if let Some(t) = current.temperature
        && let Some(hours) = lead_time(t, temperature.slope, TEMPERATURE_FAILURE)
    {
        time_to_critical.insert(
            Metric::Temperature,
            TimeToCritical {
                hours: round_to(hours, 1),
                threshold: TEMPERATURE_FAILURE,
                message: format!("Temperature may reach {TEMPERATURE_FAILURE}°C in {hours:.1} hours"),
            },
        );
    }
    if let Some(v) = current.vibration
        && let Some(hours) = lead_time(v, vibration.slope, VIBRATION_FAILURE)
    {
        time_to_critical.insert(
            Metric::Vibration,
            TimeToCritical {
                hours: round_to(hours, 1),
                threshold: VIBRATION_FAILURE,
                message: format!("Vibration may reach critical level in {hours:.1} hours"),
            },
        );
    }
    // ヘルススコアは減少方向なので 100 からの減少量に置き換えて扱う
    if health.slope < 0.0
        && let Some(hours) = lead_time(
            100.0 - f64::from(current.health_score),
            -health.slope,
            100.0 - HEALTH_CRITICAL,
        )
    {
        time_to_critical.insert(
            Metric::Health,
            TimeToCritical {
                hours: round_to(hours, 1),
                threshold: HEALTH_CRITICAL,
                message: format!("Health score may drop to {HEALTH_CRITICAL}% in {hours:.1} hours"),
            },
        );
    }

    let risk = risk_level(&time_to_critical);
    PredictionReport {
        machine_id: snapshot.machine_id.clone(),
        timestamp: snapshot.timestamp,
        has_prediction: true,
        message: None,
        current,
        trends: Some(Trends::from_slopes(
            temperature.slope,
            vibration.slope,
            health.slope,
        )),
        predictions,
        time_to_critical,
        risk_level: Some(risk),
        risk_message: Some(risk.message().to_string()),
    }
}

#[cfg(test)]
mod tests;
