//! 過去の計測値から安全運転範囲を見積もる
//!
//! ヘルススコアが十分高かった時間帯の値だけを使い、
//! 平均と標準偏差から min/optimal/warning/critical を決める。

use crate::stats::{mean, round_to, stdev};
use crate::{Error, Result};
use chrono::{Duration, Utc};
use common::store::ReadingStore;
use common::types::{Reading, TimeRange};
use logging::*;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DAYS: u32 = 30;
/// これ未満ならすべて既定値
pub const MIN_READINGS: usize = 10;
/// メトリクスごとに必要な値の数
pub const MIN_METRIC_VALUES: usize = 5;
/// この値を超えるヘルススコアの計測値だけを使う
pub const HEALTHY_SCORE: i32 = 60;

const TEMPERATURE_CRITICAL_SIGMA: f64 = 2.0;
const VIBRATION_CRITICAL_SIGMA: f64 = 2.5;
const RPM_CRITICAL_SIGMA: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricLimits {
    pub min: f64,
    pub optimal: f64,
    pub warning: f64,
    pub critical: f64,
}

impl MetricLimits {
    pub const TEMPERATURE: Self = Self::new(20.0, 45.0, 70.0, 85.0);
    pub const VIBRATION: Self = Self::new(0.05, 0.3, 0.6, 0.9);
    pub const RPM: Self = Self::new(500.0, 1800.0, 2800.0, 3200.0);

    const fn new(min: f64, optimal: f64, warning: f64, critical: f64) -> Self {
        Self {
            min,
            optimal,
            warning,
            critical,
        }
    }

    fn from_values(values: &[f64], critical_sigma: f64) -> Option<Self> {
        if values.len() < MIN_METRIC_VALUES {
            return None;
        }
        let avg = mean(values);
        let sd = stdev(values);
        Some(Self {
            min: round_to((avg - 2.0 * sd).max(0.0), 2),
            optimal: round_to(avg, 2),
            warning: round_to(avg + sd, 2),
            critical: round_to(avg + critical_sigma * sd, 2),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn for_points(points: usize) -> Self {
        if points > 1000 {
            Confidence::High
        } else if points > 100 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafeLimits {
    pub temperature: MetricLimits,
    pub vibration: MetricLimits,
    pub rpm: MetricLimits,
    pub data_points: usize,
    pub confidence: Confidence,
}

pub fn calibrate(readings: &[Reading]) -> SafeLimits {
    let data_points = readings.len();
    if data_points < MIN_READINGS {
        return SafeLimits {
            temperature: MetricLimits::TEMPERATURE,
            vibration: MetricLimits::VIBRATION,
            rpm: MetricLimits::RPM,
            data_points,
            confidence: Confidence::Low,
        };
    }

    let healthy: Vec<&Reading> = readings
        .iter()
        .filter(|r| r.health_score.is_some_and(|s| s > HEALTHY_SCORE))
        .collect();
    let values = |metric: fn(&Reading) -> Option<f64>| -> Vec<f64> {
        healthy.iter().filter_map(|r| metric(r)).collect()
    };

    SafeLimits {
        temperature: MetricLimits::from_values(
            &values(|r| r.temperature),
            TEMPERATURE_CRITICAL_SIGMA,
        )
        .unwrap_or(MetricLimits::TEMPERATURE),
        vibration: MetricLimits::from_values(&values(|r| r.vibration), VIBRATION_CRITICAL_SIGMA)
            .unwrap_or(MetricLimits::VIBRATION),
        rpm: MetricLimits::from_values(&values(|r| r.rpm), RPM_CRITICAL_SIGMA)
            .unwrap_or(MetricLimits::RPM),
        data_points,
        confidence: Confidence::for_points(data_points),
    }
}

/// 全機械の直近 `days` 日分から見積もる
pub async fn safe_limits<S: ReadingStore>(store: &S, days: u32) -> Result<SafeLimits> {
    let log = DEFAULT.new(o!("function" => "safe_limits", "days" => days));
    trace!(log, "start");
    let end = Utc::now().naive_utc();
    let start = Duration::try_days(i64::from(days))
        .and_then(|window| end.checked_sub_signed(window))
        .ok_or_else(|| Error::WindowOutOfRange(format!("{days} days")))?;
    let range = TimeRange { start, end };
    let readings = store.readings_in_range(&range).await.map_err(|e| {
        warn!(log, "failed to read history"; "error" => %e);
        Error::DataUnavailable {
            machine_id: "all".to_string(),
            reason: format!("{e:#}"),
        }
    })?;
    let limits = calibrate(&readings);
    debug!(log, "success";
        "data_points" => limits.data_points,
        "confidence" => ?limits.confidence,
    );
    Ok(limits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use persistence::MemoryStore;

    fn healthy_series(len: usize, fill: impl Fn(usize, &mut Reading)) -> Vec<Reading> {
        series(base_time(), Duration::minutes(5), len, |i, r| {
            r.health_score = Some(90);
            fill(i, r);
        })
    }

    #[test]
    fn test_too_few_readings_use_defaults() {
        let limits = calibrate(&healthy_series(9, |_, r| r.temperature = Some(50.0)));
        assert_eq!(limits.temperature, MetricLimits::TEMPERATURE);
        assert_eq!(limits.vibration, MetricLimits::VIBRATION);
        assert_eq!(limits.rpm, MetricLimits::RPM);
        assert_eq!(limits.data_points, 9);
        assert_eq!(limits.confidence, Confidence::Low);
    }

    #[test]
    fn test_limits_from_healthy_readings() {
        let temps = [40.0, 50.0];
        let readings = healthy_series(12, |i, r| {
            r.temperature = Some(temps[i % 2]);
            r.vibration = Some(0.3);
        });
        let limits = calibrate(&readings);

        let values: Vec<f64> = (0..12).map(|i| temps[i % 2]).collect();
        let sd = stdev(&values);
        assert_eq!(limits.temperature.optimal, 45.0);
        assert_eq!(limits.temperature.min, round_to(45.0 - 2.0 * sd, 2));
        assert_eq!(limits.temperature.warning, round_to(45.0 + sd, 2));
        assert_eq!(limits.temperature.critical, round_to(45.0 + 2.0 * sd, 2));

        // ばらつきが無ければ全部同じ値
        assert_eq!(limits.vibration, MetricLimits::new(0.3, 0.3, 0.3, 0.3));
        // rpm は値が無いので既定値
        assert_eq!(limits.rpm, MetricLimits::RPM);
        assert_eq!(limits.data_points, 12);
    }

    #[test]
    fn test_unhealthy_readings_are_ignored() {
        let readings = series(base_time(), Duration::minutes(5), 12, |i, r| {
            r.temperature = Some(if i < 6 { 50.0 } else { 95.0 });
            r.health_score = match i {
                0..6 => Some(80),
                6..10 => Some(HEALTHY_SCORE),
                _ => None,
            };
        });
        let limits = calibrate(&readings);
        assert_eq!(limits.temperature.optimal, 50.0);
        assert_eq!(limits.temperature.critical, 50.0);
        assert_eq!(limits.data_points, 12);
    }

    #[test]
    fn test_metric_with_too_few_values_falls_back() {
        let readings = healthy_series(12, |i, r| {
            if i < 4 {
                r.rpm = Some(1500.0);
            }
            r.temperature = Some(0.0);
        });
        let limits = calibrate(&readings);
        assert_eq!(limits.rpm, MetricLimits::RPM);
        // 0.0 も有効な値
        assert_eq!(limits.temperature, MetricLimits::new(0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_min_is_not_negative() {
        let vibs = [0.05, 0.05, 0.05, 0.05, 0.05, 0.05, 0.05, 0.05, 0.05, 1.5];
        let limits = calibrate(&healthy_series(10, |i, r| r.vibration = Some(vibs[i])));
        assert_eq!(limits.vibration.min, 0.0);
        assert!(limits.vibration.critical > limits.vibration.warning);
    }

    #[test]
    fn test_confidence() {
        assert_eq!(Confidence::for_points(100), Confidence::Low);
        assert_eq!(Confidence::for_points(101), Confidence::Medium);
        assert_eq!(Confidence::for_points(1000), Confidence::Medium);
        assert_eq!(Confidence::for_points(1001), Confidence::High);
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(calibrate(&[])).unwrap();
        assert_eq!(json["temperature"]["critical"], 85.0);
        assert_eq!(json["rpm"]["optimal"], 1800.0);
        assert_eq!(json["confidence"], "low");
        assert_eq!(json["data_points"], 0);
    }

    #[tokio::test]
    async fn test_safe_limits_reads_window() {
        let mut readings = recent_series(Duration::hours(1), 12, |_, r| {
            r.temperature = Some(60.0);
            r.health_score = Some(90);
        });
        readings.extend(series(
            Utc::now().naive_utc() - Duration::days(40),
            Duration::hours(1),
            20,
            |_, r| {
                r.temperature = Some(10.0);
                r.health_score = Some(90);
            },
        ));
        let store = MemoryStore::with_readings(readings);
        let limits = safe_limits(&store, DEFAULT_DAYS).await.unwrap();
        assert_eq!(limits.data_points, 12);
        assert_eq!(limits.temperature.optimal, 60.0);

        let err = safe_limits(&BrokenStore, DEFAULT_DAYS).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::DataUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_safe_limits_window_out_of_range() {
        let err = safe_limits(&MemoryStore::new(), 200_000_000).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::WindowOutOfRange(_))
        ));
    }
}
