//! 異常検知とトレンド予測の結果を、機械ごとに一つの推奨へまとめる

use crate::Result;
use crate::anomaly::{AnomalyKind, AnomalyReport, Severity, detect_anomalies};
use crate::maintenance::{self, CHECK_COOLING, CONTINUE_MONITORING, INSPECT_BEARINGS, REDUCE_LOAD};
use crate::predict::{PredictionReport, RiskLevel, predict_machine_state};
use common::store::ReadingStore;
use common::types::MachineSnapshot;
use logging::*;
use serde::{Deserialize, Serialize};

/// 並び順がそのまま優先度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    CriticalAnomaly,
    UrgentMaintenance,
    ScheduledMaintenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub machine_id: String,
    pub category: RecommendationCategory,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    pub message: String,
    pub actions: Vec<String>,
}

fn push_unique(actions: &mut Vec<String>, action: &str) {
    if !actions.iter().any(|a| a == action) {
        actions.push(action.to_string());
    }
}

fn critical_anomaly(anomaly: &AnomalyReport, prediction: &PredictionReport) -> Recommendation {
    let critical: Vec<_> = anomaly
        .anomalies
        .iter()
        .filter(|a| a.severity == Severity::Critical)
        .collect();
    let mut actions = Vec::new();
    for a in &critical {
        let action = match a.kind {
            AnomalyKind::Rpm => REDUCE_LOAD,
            kind if kind.is_vibration() => INSPECT_BEARINGS,
            _ => CHECK_COOLING,
        };
        push_unique(&mut actions, action);
    }
    for action in maintenance::recommended_actions(prediction) {
        if action != CONTINUE_MONITORING {
            push_unique(&mut actions, &action);
        }
    }
    Recommendation {
        machine_id: anomaly.machine_id.clone(),
        category: RecommendationCategory::CriticalAnomaly,
        severity: anomaly.overall_severity,
        risk_level: prediction.risk_level,
        message: critical
            .iter()
            .map(|a| a.message.as_str())
            .collect::<Vec<_>>()
            .join("; "),
        actions,
    }
}

/// 一台分の結果から、最も優先度の高い区分の推奨を作る
pub fn classify(anomaly: &AnomalyReport, prediction: &PredictionReport) -> Option<Recommendation> {
    if anomaly.overall_severity == Severity::Critical {
        return Some(critical_anomaly(anomaly, prediction));
    }
    let maintenance = maintenance::recommend(prediction)?;
    let category = match maintenance.priority {
        maintenance::MaintenancePriority::Urgent => RecommendationCategory::UrgentMaintenance,
        maintenance::MaintenancePriority::Scheduled => RecommendationCategory::ScheduledMaintenance,
    };
    Some(Recommendation {
        machine_id: maintenance.machine_id,
        category,
        severity: anomaly.overall_severity,
        risk_level: Some(maintenance.risk_level),
        message: maintenance.message,
        actions: maintenance.actions,
    })
}

/// 区分、machine_id の順に並べ、`limit` があれば先頭から切り詰める
pub fn merge<'a>(
    results: impl IntoIterator<Item = (&'a AnomalyReport, &'a PredictionReport)>,
    limit: Option<usize>,
) -> Vec<Recommendation> {
    let mut recommendations: Vec<_> = results
        .into_iter()
        .filter_map(|(anomaly, prediction)| classify(anomaly, prediction))
        .collect();
    recommendations.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then_with(|| a.machine_id.cmp(&b.machine_id))
    });
    if let Some(limit) = limit {
        recommendations.truncate(limit);
    }
    recommendations
}

pub async fn recommendations<S: ReadingStore>(
    store: &S,
    snapshots: &[MachineSnapshot],
    limit: Option<usize>,
) -> Result<Vec<Recommendation>> {
    let log = DEFAULT.new(o!("function" => "recommendations"));
    trace!(log, "start"; "machines" => snapshots.len(), "limit" => ?limit);
    let mut results = Vec::with_capacity(snapshots.len());
    for snapshot in snapshots {
        let anomaly = detect_anomalies(store, snapshot).await?;
        let prediction = predict_machine_state(store, snapshot).await?;
        results.push((anomaly, prediction));
    }
    let merged = merge(results.iter().map(|(a, p)| (a, p)), limit);
    debug!(log, "success"; "recommendations" => merged.len());
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::evaluate;
    use crate::predict::forecast;
    use crate::testing::*;
    use chrono::Duration;
    use common::types::Reading;
    use persistence::MemoryStore;

    fn machine(id: &str, temperature: f64, vibration: f64) -> (AnomalyReport, PredictionReport) {
        let mut snap = snapshot(Some(temperature), Some(vibration), None);
        snap.machine_id = id.to_string();
        let history: Vec<Reading> = series(base_time(), Duration::hours(1), 5, |i, r| {
            r.machine_id = id.to_string();
            r.temperature = Some(50.0 + 2.0 * i as f64);
        });
        (evaluate(&snap, &[]), forecast(&snap, &history))
    }

    fn ordered(
        results: &[(AnomalyReport, PredictionReport)],
        limit: Option<usize>,
    ) -> Vec<(String, RecommendationCategory)> {
        merge(results.iter().map(|(a, p)| (a, p)), limit)
            .into_iter()
            .map(|r| (r.machine_id, r.category))
            .collect()
    }

    #[test]
    fn test_total_ordering() {
        let results = vec![
            machine("PRESS-03", 70.0, 0.3),
            machine("MILL-02", 88.0, 0.3),
            machine("LATHE-01", 60.0, 0.3),
            machine("DRILL-04", 86.0, 0.3),
            machine("CNC-05", 88.5, 0.3),
            machine("BORE-06", 71.0, 0.7),
        ];
        // 86°C 以上は critical。70/71°C は lead time が 12 時間未満で scheduled
        assert_eq!(
            ordered(&results, None),
            vec![
                ("CNC-05".to_string(), RecommendationCategory::CriticalAnomaly),
                ("DRILL-04".to_string(), RecommendationCategory::CriticalAnomaly),
                ("MILL-02".to_string(), RecommendationCategory::CriticalAnomaly),
                ("BORE-06".to_string(), RecommendationCategory::ScheduledMaintenance),
                ("PRESS-03".to_string(), RecommendationCategory::ScheduledMaintenance),
            ]
        );
        assert_eq!(ordered(&results, Some(2)).len(), 2);
        assert_eq!(ordered(&results, Some(0)), vec![]);
    }

    #[test]
    fn test_urgent_maintenance_without_critical_anomaly() {
        // 84°C は warning、lead time 3 時間で high
        let results = vec![machine("MILL-02", 84.0, 0.3), machine("PRESS-03", 70.0, 0.3)];
        assert_eq!(
            ordered(&results, None),
            vec![
                ("MILL-02".to_string(), RecommendationCategory::UrgentMaintenance),
                ("PRESS-03".to_string(), RecommendationCategory::ScheduledMaintenance),
            ]
        );
        let merged = merge(results.iter().map(|(a, p)| (a, p)), None);
        assert_eq!(merged[0].severity, Severity::Warning);
        assert_eq!(merged[0].risk_level, Some(RiskLevel::High));
        assert_eq!(
            merged[0].message,
            "Immediate attention required - critical threshold approaching"
        );
    }

    #[test]
    fn test_critical_anomaly_actions() {
        let results = vec![machine("MILL-02", 88.0, 1.0)];
        let merged = merge(results.iter().map(|(a, p)| (a, p)), None);
        assert_eq!(merged.len(), 1);
        let rec = &merged[0];
        assert_eq!(rec.category, RecommendationCategory::CriticalAnomaly);
        assert_eq!(rec.severity, Severity::Critical);
        assert_eq!(
            rec.message,
            "Critical temperature: 88°C exceeds safe limit; Critical vibration level: 1.000"
        );
        assert_eq!(
            rec.actions,
            vec![CHECK_COOLING, INSPECT_BEARINGS, maintenance::MONITOR_TEMPERATURE]
        );
    }

    #[tokio::test]
    async fn test_recommendations_from_store() {
        let store = MemoryStore::with_readings(recent_series(Duration::minutes(10), 5, |_, r| {
            r.temperature = Some(60.0)
        }));
        let result = recommendations(&store, &[snapshot(Some(92.0), None, None)], None)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].category, RecommendationCategory::CriticalAnomaly);

        assert!(
            recommendations(&BrokenStore, &[snapshot(Some(60.0), None, None)], Some(3))
                .await
                .is_err()
        );
    }
}
