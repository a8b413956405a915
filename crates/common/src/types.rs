//! 計測値・アラートなど各クレートで共有するドメイン型

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

/// ヘルススコアから導かれる機械の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "Healthy",
            HealthStatus::Warning => "Warning",
            HealthStatus::Critical => "Critical",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Healthy" => Ok(HealthStatus::Healthy),
            "Warning" => Ok(HealthStatus::Warning),
            "Critical" => Ok(HealthStatus::Critical),
            _ => Err(ParseError {
                kind: "health status",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warning" => Ok(AlertSeverity::Warning),
            "critical" => Ok(AlertSeverity::Critical),
            _ => Err(ParseError {
                kind: "alert severity",
                value: s.to_string(),
            }),
        }
    }
}

/// 記録済みの計測値。一度記録されたら変更しない。
///
/// 欠損したメトリクスは `None` で表し、各計算から除外される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub machine_id: String,
    pub timestamp: NaiveDateTime,
    pub temperature: Option<f64>,
    pub vibration: Option<f64>,
    pub rpm: Option<f64>,
    pub health_score: Option<i32>,
    pub status: Option<HealthStatus>,
}

/// リアルタイムデータから取り出した、ある機械の現在値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub machine_id: String,
    pub timestamp: NaiveDateTime,
    pub temperature: Option<f64>,
    pub vibration: Option<f64>,
    pub rpm: Option<f64>,
    pub health_score: Option<i32>,
}

impl MachineSnapshot {
    /// 評価済みのヘルススコアを付けて記録用の Reading にする
    pub fn to_reading(&self, health_score: i32, status: HealthStatus) -> Reading {
        Reading {
            machine_id: self.machine_id.clone(),
            timestamp: self.timestamp,
            temperature: self.temperature,
            vibration: self.vibration,
            rpm: self.rpm,
            health_score: Some(health_score),
            status: Some(status),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub machine_id: String,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i32,
    pub machine_id: String,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub acknowledged: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_round_trip_through_str() {
        for status in [
            HealthStatus::Healthy,
            HealthStatus::Warning,
            HealthStatus::Critical,
        ] {
            assert_eq!(status.as_str().parse::<HealthStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_unknown_severity_is_rejected() {
        let err = "fatal".parse::<AlertSeverity>().unwrap_err();
        assert_eq!(err.to_string(), "unknown alert severity: fatal");
    }

    #[test]
    fn test_snapshot_to_reading_keeps_missing_metrics() {
        let timestamp = NaiveDateTime::parse_from_str("2025-03-26 11:00:00", "%Y-%m-%d %H:%M:%S")
            .unwrap();
        let snapshot = MachineSnapshot {
            machine_id: "PRESS-01".to_string(),
            timestamp,
            temperature: Some(70.0),
            vibration: None,
            rpm: Some(1500.0),
            health_score: None,
        };
        let reading = snapshot.to_reading(100, HealthStatus::Healthy);
        assert_eq!(reading.vibration, None);
        assert_eq!(reading.health_score, Some(100));
        assert_eq!(reading.status, Some(HealthStatus::Healthy));
        assert_eq!(reading.timestamp, timestamp);
    }
}
