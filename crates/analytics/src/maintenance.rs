//! 予測結果から保守の推奨を組み立てる

use crate::Result;
use crate::predict::{
    Direction, Metric, PredictionReport, RiskLevel, TimeToCritical, predict_machine_state,
};
use common::store::ReadingStore;
use common::types::MachineSnapshot;
use logging::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CHECK_COOLING: &str = "Check cooling system and airflow";
pub const INSPECT_BEARINGS: &str = "Inspect bearings and alignment";
pub const FULL_DIAGNOSTIC: &str = "Perform full diagnostic";
pub const MONITOR_TEMPERATURE: &str = "Monitor temperature closely";
pub const REDUCE_LOAD: &str = "Reduce load or speed";
pub const CONTINUE_MONITORING: &str = "Continue monitoring";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenancePriority {
    Urgent,
    Scheduled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceRecommendation {
    pub machine_id: String,
    pub priority: MaintenancePriority,
    pub risk_level: RiskLevel,
    pub message: String,
    pub time_to_critical: BTreeMap<Metric, TimeToCritical>,
    pub actions: Vec<String>,
    pub recommended_action: String,
}

/// 到達予測のあるメトリクスと上昇傾向から決まる作業リスト
pub fn recommended_actions(report: &PredictionReport) -> Vec<String> {
    let ttc = &report.time_to_critical;
    let mut actions = Vec::new();
    if ttc.contains_key(&Metric::Temperature) {
        actions.push(CHECK_COOLING);
    }
    if ttc.contains_key(&Metric::Vibration) {
        actions.push(INSPECT_BEARINGS);
    }
    if ttc.contains_key(&Metric::Health) {
        actions.push(FULL_DIAGNOSTIC);
    }
    if let Some(trends) = &report.trends {
        if trends.temperature == Direction::Rising {
            actions.push(MONITOR_TEMPERATURE);
        }
        if trends.vibration == Direction::Rising {
            actions.push(REDUCE_LOAD);
        }
    }
    if actions.is_empty() {
        actions.push(CONTINUE_MONITORING);
    }
    actions.into_iter().map(str::to_string).collect()
}

/// リスクが high/medium の場合のみ推奨を返す
pub fn recommend(report: &PredictionReport) -> Option<MaintenanceRecommendation> {
    let priority = match report.risk_level? {
        RiskLevel::High => MaintenancePriority::Urgent,
        RiskLevel::Medium => MaintenancePriority::Scheduled,
        RiskLevel::Low | RiskLevel::Stable => return None,
    };
    let risk_level = report.risk_level?;
    let actions = recommended_actions(report);
    Some(MaintenanceRecommendation {
        machine_id: report.machine_id.clone(),
        priority,
        risk_level,
        message: report
            .risk_message
            .clone()
            .unwrap_or_else(|| risk_level.message().to_string()),
        time_to_critical: report.time_to_critical.clone(),
        recommended_action: actions.join("; "),
        actions,
    })
}

/// urgent を先に、同じ優先度では machine_id 昇順
pub fn rank<'a>(
    reports: impl IntoIterator<Item = &'a PredictionReport>,
) -> Vec<MaintenanceRecommendation> {
    let mut recommendations: Vec<_> = reports.into_iter().filter_map(recommend).collect();
    recommendations.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.machine_id.cmp(&b.machine_id))
    });
    recommendations
}

pub async fn maintenance_recommendations<S: ReadingStore>(
    store: &S,
    snapshots: &[MachineSnapshot],
) -> Result<Vec<MaintenanceRecommendation>> {
    let log = DEFAULT.new(o!("function" => "maintenance_recommendations"));
    trace!(log, "start"; "machines" => snapshots.len());
    let mut reports = Vec::with_capacity(snapshots.len());
    for snapshot in snapshots {
        reports.push(predict_machine_state(store, snapshot).await?);
    }
    let recommendations = rank(&reports);
    debug!(log, "success"; "recommendations" => recommendations.len());
    Ok(recommendations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::forecast;
    use crate::testing::*;
    use chrono::Duration;
    use common::types::Reading;
    use persistence::MemoryStore;

    fn rising_history(machine_id: &str) -> Vec<Reading> {
        series(base_time(), Duration::hours(1), 5, |i, r| {
            r.machine_id = machine_id.to_string();
            r.temperature = Some(50.0 + 2.0 * i as f64);
        })
    }

    fn report_at(machine_id: &str, temperature: f64) -> PredictionReport {
        let mut snap = snapshot(Some(temperature), None, None);
        snap.machine_id = machine_id.to_string();
        forecast(&snap, &rising_history(machine_id))
    }

    #[test]
    fn test_actions_for_rising_temperature() {
        let report = report_at(MACHINE, 88.0);
        assert_eq!(
            recommended_actions(&report),
            vec![CHECK_COOLING, MONITOR_TEMPERATURE]
        );
    }

    #[test]
    fn test_actions_without_signals() {
        let report = forecast(&snapshot(Some(60.0), None, None), &[]);
        assert_eq!(recommended_actions(&report), vec![CONTINUE_MONITORING]);
    }

    #[test]
    fn test_recommend_by_risk() {
        let urgent = recommend(&report_at(MACHINE, 88.0)).unwrap();
        assert_eq!(urgent.priority, MaintenancePriority::Urgent);
        assert_eq!(urgent.risk_level, RiskLevel::High);
        assert_eq!(
            urgent.message,
            "Immediate attention required - critical threshold approaching"
        );
        assert_eq!(
            urgent.recommended_action,
            "Check cooling system and airflow; Monitor temperature closely"
        );
        assert!(urgent.time_to_critical.contains_key(&Metric::Temperature));

        let scheduled = recommend(&report_at(MACHINE, 70.0)).unwrap();
        assert_eq!(scheduled.priority, MaintenancePriority::Scheduled);

        assert!(recommend(&report_at(MACHINE, 60.0)).is_none());
        assert!(recommend(&forecast(&snapshot(Some(60.0), None, None), &[])).is_none());
    }

    #[test]
    fn test_rank_orders_urgent_first_then_machine_id() {
        let reports = vec![
            report_at("PRESS-03", 70.0),
            report_at("MILL-02", 88.0),
            report_at("LATHE-01", 60.0),
            report_at("DRILL-04", 70.0),
            report_at("CNC-05", 89.0),
        ];
        let ranked: Vec<(String, MaintenancePriority)> = rank(&reports)
            .into_iter()
            .map(|r| (r.machine_id, r.priority))
            .collect();
        assert_eq!(
            ranked,
            vec![
                ("CNC-05".to_string(), MaintenancePriority::Urgent),
                ("MILL-02".to_string(), MaintenancePriority::Urgent),
                ("DRILL-04".to_string(), MaintenancePriority::Scheduled),
                ("PRESS-03".to_string(), MaintenancePriority::Scheduled),
            ]
        );
    }

    #[tokio::test]
    async fn test_maintenance_recommendations_from_store() {
        let store = MemoryStore::with_readings(recent_series(Duration::hours(1), 5, |i, r| {
            r.temperature = Some(80.0 + 2.0 * i as f64)
        }));
        let result = maintenance_recommendations(&store, &[snapshot(Some(88.0), None, None)])
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].machine_id, MACHINE);
        assert_eq!(result[0].priority, MaintenancePriority::Urgent);

        assert!(
            maintenance_recommendations(&BrokenStore, &[snapshot(Some(88.0), None, None)])
                .await
                .is_err()
        );
    }
}
