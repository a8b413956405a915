//! 現在値からのヘルススコア算出

use common::types::{AlertSeverity, HealthStatus, MachineSnapshot, NewAlert};
use serde::Serialize;

const TEMPERATURE_LIMIT: f64 = 80.0;
const TEMPERATURE_CRITICAL: f64 = 90.0;
const VIBRATION_LIMIT: f64 = 0.7;
const VIBRATION_CRITICAL: f64 = 1.2;
const RPM_LIMIT: f64 = 3000.0;

const TEMPERATURE_PENALTY: i32 = 30;
const VIBRATION_PENALTY: i32 = 25;
const RPM_PENALTY: i32 = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthAssessment {
    pub score: i32,
    pub status: HealthStatus,
    pub alerts: Vec<NewAlert>,
}

pub fn status_for(score: i32) -> HealthStatus {
    if score >= 70 {
        HealthStatus::Healthy
    } else if score >= 40 {
        HealthStatus::Warning
    } else {
        HealthStatus::Critical
    }
}

/// 100 点から、しきい値を超えたメトリクスごとに減点する
pub fn assess(snapshot: &MachineSnapshot) -> HealthAssessment {
    let mut score = 100;
    let mut alerts = Vec::new();
    let alert = |alert_type: &str, severity, message: String| NewAlert {
        machine_id: snapshot.machine_id.clone(),
        alert_type: alert_type.to_string(),
        severity,
        message,
    };

    if let Some(t) = snapshot.temperature
        && t > TEMPERATURE_LIMIT
    {
        score -= TEMPERATURE_PENALTY;
        let severity = if t > TEMPERATURE_CRITICAL {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        alerts.push(alert(
            "temperature",
            severity,
            format!("High temperature: {t}°C"),
        ));
    }

    if let Some(v) = snapshot.vibration
        && v > VIBRATION_LIMIT
    {
        score -= VIBRATION_PENALTY;
        let severity = if v > VIBRATION_CRITICAL {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        alerts.push(alert(
            "vibration",
            severity,
            format!("High vibration: {v:.3}"),
        ));
    }

    if let Some(rpm) = snapshot.rpm
        && rpm > RPM_LIMIT
    {
        score -= RPM_PENALTY;
        alerts.push(alert(
            "rpm",
            AlertSeverity::Warning,
            format!("RPM above limit: {rpm}"),
        ));
    }

    HealthAssessment {
        score,
        status: status_for(score),
        alerts,
    }
}
