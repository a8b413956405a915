//! 計測値の期間別統計
//!
//! メトリクスの時系列を一定期間ごとに集計し、期間ごとの要約文を作る。

use crate::{Result, load_history};
use chrono::{Duration, NaiveDateTime};
use common::store::ReadingStore;
use common::types::Reading;
use logging::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendMetric {
    Temperature,
    Vibration,
    Rpm,
    HealthScore,
}

impl TrendMetric {
    pub const ALL: [TrendMetric; 4] = [
        TrendMetric::Temperature,
        TrendMetric::Vibration,
        TrendMetric::Rpm,
        TrendMetric::HealthScore,
    ];

    fn value_of(&self, reading: &Reading) -> Option<f64> {
        match self {
            TrendMetric::Temperature => reading.temperature,
            TrendMetric::Vibration => reading.vibration,
            TrendMetric::Rpm => reading.rpm,
            TrendMetric::HealthScore => reading.health_score.map(f64::from),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricSeries {
    pub points: Vec<Point>,
}

#[derive(Debug, Clone)]
pub struct Point {
    pub value: f64,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsInPeriod {
    pub timestamp: NaiveDateTime,
    #[serde(with = "period_minutes")]
    pub period: Duration,

    pub start: f64,
    pub end: f64,
    pub average: f64,
    pub max: f64,
    pub min: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListStatsInPeriod(pub Vec<StatsInPeriod>);

mod period_minutes {
    use chrono::Duration;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(period: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(period.num_minutes())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let minutes = i64::deserialize(deserializer)?;
        Duration::try_minutes(minutes)
            .ok_or_else(|| D::Error::custom(format!("period out of range: {minutes} minutes")))
    }
}

impl MetricSeries {
    /// 昇順の計測値から、値のあるものだけを拾う
    pub fn from_readings(readings: &[Reading], metric: TrendMetric) -> Self {
        let points = readings
            .iter()
            .filter_map(|r| {
                metric.value_of(r).map(|value| Point {
                    value,
                    timestamp: r.timestamp,
                })
            })
            .collect();
        MetricSeries { points }
    }

    pub fn aggregate(&self, period: Duration) -> ListStatsInPeriod {
        let log = DEFAULT.new(o!(
            "function" => "MetricSeries::aggregate",
            "points_count" => self.points.len(),
            "period" => format!("{}", period),
        ));
        trace!(log, "start");

        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return ListStatsInPeriod(Vec::new());
        };
        if period <= Duration::zero() {
            warn!(log, "non-positive period");
            return ListStatsInPeriod(Vec::new());
        }

        let mut stats = Vec::new();
        let mut current_start = first.timestamp;

        while current_start <= last.timestamp {
            // 日時の上限を越える期間は残りすべてを 1 区間にまとめる
            let current_end = current_start.checked_add_signed(period);
            let values: Vec<f64> = self
                .points
                .iter()
                .skip_while(|p| p.timestamp < current_start)
                .take_while(|p| current_end.is_none_or(|end| p.timestamp < end))
                .map(|p| p.value)
                .collect();

            if let (Some(start), Some(end)) = (values.first(), values.last()) {
                let sum: f64 = values.iter().sum();
                stats.push(StatsInPeriod {
                    timestamp: current_start,
                    period,
                    start: *start,
                    end: *end,
                    average: sum / values.len() as f64,
                    max: values.iter().copied().fold(f64::MIN, f64::max),
                    min: values.iter().copied().fold(f64::MAX, f64::min),
                });
            }

            match current_end {
                Some(end) => current_start = end,
                None => break,
            }
        }

        trace!(log, "success"; "stats_count" => stats.len());
        ListStatsInPeriod(stats)
    }
}

impl ListStatsInPeriod {
    fn format_decimal(value: f64) -> String {
        let s = value.to_string();
        let Some((integer_part, decimal_part)) = s.split_once('.') else {
            return s;
        };
        // 末尾の0を削除し、最大9桁まで表示
        let mut decimal_part = decimal_part.trim_end_matches('0');
        if decimal_part.len() > 9 {
            decimal_part = &decimal_part[..9];
        }
        if decimal_part.is_empty() {
            return integer_part.to_string();
        }
        format!("{integer_part}.{decimal_part}")
    }

    pub fn describes(&self) -> Vec<String> {
        let log = DEFAULT.new(o!(
            "function" => "ListStatsInPeriod::describes",
            "stats_count" => self.0.len(),
        ));
        trace!(log, "start");
        let mut lines = Vec::new();
        let mut prev = None;
        for stat in self.0.iter() {
            let date = stat.timestamp.to_string();
            let changes = prev
                .map(|p: &StatsInPeriod| {
                    let prev = format!(
                        "from the previous {m} minutes",
                        m = stat.period.num_minutes()
                    );
                    let diff = stat.end - p.end;
                    if diff == 0.0 {
                        return format!(", no change {prev}");
                    }
                    let dw = if diff < 0.0 { "decrease" } else { "increase" };
                    if p.end == 0.0 {
                        let diff_str = Self::format_decimal(diff);
                        return format!(", marking a {diff_str} {dw} {prev}");
                    }
                    let change_str = Self::format_decimal(diff / p.end * 100.0);
                    format!(", marking a {change_str} % {dw} {prev}")
                })
                .unwrap_or_default();
            let summary = format!(
                "opened at {start}, closed at {end}, with a high of {max}, a low of {min}, and an average of {ave}",
                start = Self::format_decimal(stat.start),
                end = Self::format_decimal(stat.end),
                max = Self::format_decimal(stat.max),
                min = Self::format_decimal(stat.min),
                ave = Self::format_decimal(stat.average),
            );
            let line = format!("{date}, {summary}{changes}");
            trace!(log, "added line";
                "line" => &line,
            );
            lines.push(line);
            prev = Some(stat);
        }
        trace!(log, "success";
           "lines_count" => lines.len(),
        );
        lines
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTrend {
    pub stats: ListStatsInPeriod,
    pub descriptions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineTrends {
    pub machine_id: String,
    pub hours: i64,
    pub period_minutes: i64,
    pub metrics: BTreeMap<TrendMetric, MetricTrend>,
}

/// 直近 `window` の計測値を `period` ごとに集計する。値の無いメトリクスは含めない。
pub async fn machine_trends<S: ReadingStore>(
    store: &S,
    machine_id: &str,
    window: Duration,
    period: Duration,
) -> Result<MachineTrends> {
    let log = DEFAULT.new(o!(
        "function" => "machine_trends",
        "machine_id" => machine_id.to_string(),
    ));
    trace!(log, "start");
    let readings = load_history(store, machine_id, window).await?;
    let metrics: BTreeMap<_, _> = TrendMetric::ALL
        .into_iter()
        .filter_map(|metric| {
            let stats = MetricSeries::from_readings(&readings, metric).aggregate(period);
            if stats.0.is_empty() {
                return None;
            }
            let descriptions = stats.describes();
            Some((metric, MetricTrend { stats, descriptions }))
        })
        .collect();
    debug!(log, "success";
        "readings_count" => readings.len(),
        "metrics_count" => metrics.len(),
    );
    Ok(MachineTrends {
        machine_id: machine_id.to_string(),
        hours: window.num_hours(),
        period_minutes: period.num_minutes(),
        metrics,
    })
}
