//! 異常検知
//!
//! 現在値を次の順で調べ、見つかった異常を並べて返す。
//!
//! 1. 温度・振動・回転数の固定しきい値
//! 2. 直近 2 時間の履歴に対する温度・振動の z-score
//! 3. 直近 5 件の履歴での温度上昇幅
//!
//! 同じ入力からは常に同じレポートになる。

use crate::stats::{self, round_to};
use crate::{Result, load_history};
use chrono::{Duration, NaiveDateTime};
use common::store::ReadingStore;
use common::types::{MachineSnapshot, Reading};
use logging::*;
use serde::{Deserialize, Serialize};

pub const TEMPERATURE_CRITICAL: f64 = 85.0;
pub const TEMPERATURE_WARNING: f64 = 75.0;
pub const TEMPERATURE_MIN: f64 = 15.0;
pub const VIBRATION_CRITICAL: f64 = 0.9;
pub const VIBRATION_WARNING: f64 = 0.6;
pub const RPM_CRITICAL: f64 = 3200.0;
pub const RPM_WARNING: f64 = 2800.0;

pub const ZSCORE_THRESHOLD: f64 = 2.5;
/// z-score 判定を行うのに必要な履歴の件数
pub const MIN_SPIKE_HISTORY: usize = 5;

/// 上昇幅を見る履歴の件数 (経過時間ではなく件数で固定)
pub const RISE_WINDOW: usize = 5;
pub const RISE_LIMIT: f64 = 10.0;

pub fn history_window() -> Duration {
    Duration::hours(2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Temperature,
    Vibration,
    Rpm,
    TemperatureSpike,
    VibrationSpike,
    TemperatureRising,
}

impl AnomalyKind {
    pub fn is_temperature(&self) -> bool {
        matches!(
            self,
            AnomalyKind::Temperature | AnomalyKind::TemperatureSpike | AnomalyKind::TemperatureRising
        )
    }

    pub fn is_vibration(&self) -> bool {
        matches!(self, AnomalyKind::Vibration | AnomalyKind::VibrationSpike)
    }
}

/// 深刻度。`Normal < Warning < Anomaly < Critical` の順に並ぶ。
///
/// 個々の異常が `Normal` になることはない。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Warning,
    Anomaly,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zscore: Option<f64>,
    /// 上昇幅 (`temperature_rising` のみ)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub machine_id: String,
    pub timestamp: NaiveDateTime,
    pub overall_severity: Severity,
    pub anomaly_count: usize,
    pub anomalies: Vec<Anomaly>,
    pub is_anomaly: bool,
}

impl AnomalyReport {
    fn new(snapshot: &MachineSnapshot, anomalies: Vec<Anomaly>) -> Self {
        let overall_severity = anomalies
            .iter()
            .map(|a| a.severity)
            .max()
            .unwrap_or(Severity::Normal);
        Self {
            machine_id: snapshot.machine_id.clone(),
            timestamp: snapshot.timestamp,
            overall_severity,
            anomaly_count: anomalies.len(),
            is_anomaly: !anomalies.is_empty(),
            anomalies,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub total_machines: usize,
    pub machines_with_anomalies: usize,
    pub critical_count: usize,
    /// `warning` と `anomaly` の合計
    pub warning_count: usize,
    /// 異常のあった機械のレポートのみ
    pub anomalies: Vec<AnomalyReport>,
}

/// 直近 2 時間の履歴を読んで `snapshot` を評価する
pub async fn detect_anomalies<S: ReadingStore>(
    store: &S,
    snapshot: &MachineSnapshot,
) -> Result<AnomalyReport> {
    let log = DEFAULT.new(o!(
        "function" => "detect_anomalies",
        "machine_id" => snapshot.machine_id.clone(),
    ));
    trace!(log, "start");
    let history = load_history(store, &snapshot.machine_id, history_window()).await?;
    let report = evaluate(snapshot, &history);
    debug!(log, "success";
        "history_count" => history.len(),
        "overall_severity" => ?report.overall_severity,
        "anomaly_count" => report.anomaly_count,
    );
    Ok(report)
}

/// 全機械を順に評価して集計する
pub async fn anomaly_summary<S: ReadingStore>(
    store: &S,
    snapshots: &[MachineSnapshot],
) -> Result<AnomalySummary> {
    let mut reports = Vec::with_capacity(snapshots.len());
    for snapshot in snapshots {
        reports.push(detect_anomalies(store, snapshot).await?);
    }
    Ok(summarize(reports))
}

pub fn summarize(reports: Vec<AnomalyReport>) -> AnomalySummary {
    let total_machines = reports.len();
    let anomalies: Vec<_> = reports.into_iter().filter(|r| r.is_anomaly).collect();
    let count_of = |pred: fn(Severity) -> bool| {
        anomalies
            .iter()
            .filter(|r| pred(r.overall_severity))
            .count()
    };
    AnomalySummary {
        total_machines,
        machines_with_anomalies: anomalies.len(),
        critical_count: count_of(|s| s == Severity::Critical),
        warning_count: count_of(|s| matches!(s, Severity::Warning | Severity::Anomaly)),
        anomalies,
    }
}

/// `history` はタイムスタンプ昇順であること
pub fn evaluate(snapshot: &MachineSnapshot, history: &[Reading]) -> AnomalyReport {
    let mut anomalies = Vec::new();

    anomalies.extend(snapshot.temperature.and_then(check_temperature));
    anomalies.extend(snapshot.vibration.and_then(check_vibration));
    anomalies.extend(snapshot.rpm.and_then(check_rpm));

    if let Some(temperature) = snapshot.temperature {
        let past: Vec<f64> = history.iter().filter_map(|r| r.temperature).collect();
        anomalies.extend(check_spike(AnomalyKind::TemperatureSpike, temperature, &past));
    }
    if let Some(vibration) = snapshot.vibration {
        let past: Vec<f64> = history.iter().filter_map(|r| r.vibration).collect();
        anomalies.extend(check_spike(AnomalyKind::VibrationSpike, vibration, &past));
    }

    anomalies.extend(check_rise(snapshot, history));

    AnomalyReport::new(snapshot, anomalies)
}

fn threshold_anomaly(
    kind: AnomalyKind,
    severity: Severity,
    value: f64,
    threshold: f64,
    message: String,
) -> Anomaly {
    Anomaly {
        kind,
        severity,
        value,
        threshold: Some(threshold),
        zscore: None,
        rate: None,
        message,
    }
}

fn check_temperature(t: f64) -> Option<Anomaly> {
    let kind = AnomalyKind::Temperature;
    if t >= TEMPERATURE_CRITICAL {
        Some(threshold_anomaly(
            kind,
            Severity::Critical,
            t,
            TEMPERATURE_CRITICAL,
            format!("Critical temperature: {t}°C exceeds safe limit"),
        ))
    } else if t >= TEMPERATURE_WARNING {
        Some(threshold_anomaly(
            kind,
            Severity::Warning,
            t,
            TEMPERATURE_WARNING,
            format!("High temperature warning: {t}°C"),
        ))
    } else if t < TEMPERATURE_MIN {
        Some(threshold_anomaly(
            kind,
            Severity::Warning,
            t,
            TEMPERATURE_MIN,
            format!("Abnormally low temperature: {t}°C"),
        ))
    } else {
        None
    }
}

fn check_vibration(v: f64) -> Option<Anomaly> {
    let kind = AnomalyKind::Vibration;
    if v >= VIBRATION_CRITICAL {
        Some(threshold_anomaly(
            kind,
            Severity::Critical,
            v,
            VIBRATION_CRITICAL,
            format!("Critical vibration level: {v:.3}"),
        ))
    } else if v >= VIBRATION_WARNING {
        Some(threshold_anomaly(
            kind,
            Severity::Warning,
            v,
            VIBRATION_WARNING,
            format!("High vibration warning: {v:.3}"),
        ))
    } else {
        None
    }
}

fn check_rpm(rpm: f64) -> Option<Anomaly> {
    let kind = AnomalyKind::Rpm;
    if rpm >= RPM_CRITICAL {
        Some(threshold_anomaly(
            kind,
            Severity::Critical,
            rpm,
            RPM_CRITICAL,
            format!("Critical RPM: {rpm}"),
        ))
    } else if rpm >= RPM_WARNING {
        Some(threshold_anomaly(
            kind,
            Severity::Warning,
            rpm,
            RPM_WARNING,
            format!("High RPM warning: {rpm}"),
        ))
    } else {
        None
    }
}

fn check_spike(kind: AnomalyKind, value: f64, history: &[f64]) -> Option<Anomaly> {
    if history.len() < MIN_SPIKE_HISTORY {
        return None;
    }
    let z = stats::zscore(value, history);
    if z.abs() <= ZSCORE_THRESHOLD {
        return None;
    }
    let message = match kind {
        AnomalyKind::VibrationSpike => format!("Unusual vibration spike detected (z={z:.1})"),
        _ => format!("Unusual temperature spike detected (z={z:.1})"),
    };
    Some(Anomaly {
        kind,
        severity: Severity::Anomaly,
        value,
        threshold: None,
        zscore: Some(round_to(z, 2)),
        rate: None,
        message,
    })
}

/// 直近 `RISE_WINDOW` 件のうち最新と最古の温度差を見る
fn check_rise(snapshot: &MachineSnapshot, history: &[Reading]) -> Option<Anomaly> {
    let recent: Vec<f64> = history
        .iter()
        .rev()
        .take(RISE_WINDOW)
        .filter_map(|r| r.temperature)
        .collect();
    if recent.len() < 2 {
        return None;
    }
    let newest = *recent.first()?;
    let oldest = *recent.last()?;
    let rise = newest - oldest;
    if rise <= RISE_LIMIT {
        return None;
    }
    Some(Anomaly {
        kind: AnomalyKind::TemperatureRising,
        severity: Severity::Warning,
        value: snapshot.temperature.unwrap_or(newest),
        threshold: Some(RISE_LIMIT),
        zscore: None,
        rate: Some(round_to(rise, 2)),
        message: format!("Temperature rising rapidly: +{rise:.1}°C"),
    })
}
