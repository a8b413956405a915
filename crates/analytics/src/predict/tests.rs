use super::*;
use crate::Error;
use crate::testing::*;
use assertables::*;
use persistence::MemoryStore;
use proptest::prelude::*;

fn hourly(len: usize, fill: impl Fn(usize, &mut Reading)) -> Vec<Reading> {
    series(base_time(), Duration::hours(1), len, fill)
}

fn rising_temperature(start: f64, step: f64) -> Vec<Reading> {
    hourly(5, |i, r| r.temperature = Some(start + step * i as f64))
}

fn with_health(mut snapshot: MachineSnapshot, score: i32) -> MachineSnapshot {
    snapshot.health_score = Some(score);
    snapshot
}

#[test]
fn test_time_to_threshold() {
    assert_eq!(time_to_threshold(50.0, 0.0, 90.0), None);
    assert_eq!(time_to_threshold(50.0, -1.0, 90.0), None);
    assert_eq!(time_to_threshold(95.0, 1.0, 90.0), Some(0.0));
    assert_eq!(time_to_threshold(90.0, 1.0, 90.0), Some(0.0));
    assert_eq!(time_to_threshold(50.0, 2.0, 90.0), Some(20.0));
}

#[test]
fn test_insufficient_history() {
    let snap = snapshot(Some(60.0), Some(0.3), None);
    let report = forecast(&snap, &rising_temperature(50.0, 2.0)[..4]);
    assert!(!report.has_prediction);
    assert_eq!(report.message.as_deref(), Some(INSUFFICIENT_DATA));
    assert_eq!(report.current.temperature, Some(60.0));
    assert_eq!(report.current.vibration, Some(0.3));
    assert_eq!(report.current.health_score, 100);
    assert!(report.predictions.is_empty());
    assert!(report.trends.is_none());
    assert!(report.risk_level.is_none());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["has_prediction"], false);
    assert!(json.get("predictions").is_none());
    assert!(json.get("time_to_critical").is_none());

    assert!(!forecast(&snap, &[]).has_prediction);
}

#[test]
fn test_rising_temperature_forecast() {
    let snap = snapshot(Some(58.0), None, None);
    let report = forecast(&snap, &rising_temperature(50.0, 2.0));
    assert!(report.has_prediction);
    assert!(report.message.is_none());

    let trends = report.trends.unwrap();
    assert_eq!(trends.temperature, Direction::Rising);
    assert_eq!(trends.vibration, Direction::Stable);
    assert_eq!(trends.health, Direction::Stable);

    // 最後のサンプルは先頭から 4 時間後
    let keys: Vec<&str> = report.predictions.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["1h", "24h", "4h"]);
    assert_eq!(report.predictions["1h"].temperature, 60.0);
    assert_eq!(report.predictions["4h"].temperature, 66.0);
    assert_eq!(report.predictions["24h"].temperature, 106.0);
    assert_eq!(report.predictions["24h"].health_score, 100);
    assert_gt!(report.predictions["24h"].temperature, TEMPERATURE_FAILURE);

    let ttc = &report.time_to_critical[&Metric::Temperature];
    assert_eq!(ttc.hours, 16.0);
    assert_eq!(ttc.threshold, TEMPERATURE_FAILURE);
    assert_eq!(ttc.message, "Temperature may reach 90°C in 16.0 hours");
    assert_eq!(report.time_to_critical.len(), 1);
    assert_eq!(report.risk_level, Some(RiskLevel::Low));
    assert_eq!(
        report.risk_message.as_deref(),
        Some("Monitor closely - gradual degradation observed")
    );
}

#[test]
fn test_falling_temperature_has_no_time_to_critical() {
    let snap = snapshot(Some(62.0), None, None);
    let report = forecast(&snap, &rising_temperature(70.0, -2.0));
    assert_eq!(report.trends.unwrap().temperature, Direction::Falling);
    assert!(report.time_to_critical.is_empty());
    assert_eq!(report.risk_level, Some(RiskLevel::Stable));
    assert_eq!(
        report.risk_message.as_deref(),
        Some("Machine operating normally")
    );
}

#[test]
fn test_risk_levels_follow_lead_time() {
    let risk_for = |current: f64| {
        forecast(
            &snapshot(Some(current), None, None),
            &rising_temperature(50.0, 2.0),
        )
        .risk_level
    };
    assert_eq!(risk_for(88.0), Some(RiskLevel::High));
    assert_eq!(risk_for(95.0), Some(RiskLevel::High));
    assert_eq!(risk_for(70.0), Some(RiskLevel::Medium));
    assert_eq!(risk_for(60.0), Some(RiskLevel::Low));
}

#[test]
fn test_lead_time_beyond_two_days_is_dropped() {
    let report = forecast(
        &snapshot(Some(60.0), None, None),
        &rising_temperature(50.0, 0.5),
    );
    assert!(report.time_to_critical.is_empty());
    assert_eq!(report.trends.unwrap().temperature, Direction::Stable);
}

#[test]
fn test_vibration_forecast() {
    let history = hourly(5, |i, r| r.vibration = Some(0.5 + 0.05 * i as f64));
    let report = forecast(&snapshot(None, Some(0.7), None), &history);
    assert_eq!(report.trends.unwrap().vibration, Direction::Rising);
    assert_eq!(report.predictions["1h"].vibration, 0.75);
    let ttc = &report.time_to_critical[&Metric::Vibration];
    assert_eq!(ttc.hours, 6.0);
    assert_eq!(
        ttc.message,
        "Vibration may reach critical level in 6.0 hours"
    );
    assert_eq!(report.risk_level, Some(RiskLevel::Medium));
}

#[test]
fn test_declining_health() {
    let scores = [90, 85, 80, 75, 70];
    let history = hourly(5, |i, r| r.health_score = Some(scores[i]));
    let snap = with_health(snapshot(Some(60.0), Some(0.3), None), 70);
    let report = forecast(&snap, &history);

    assert_eq!(report.trends.unwrap().health, Direction::Declining);
    assert_eq!(report.predictions["1h"].health_score, 65);
    assert_eq!(report.predictions["4h"].health_score, 50);
    assert_eq!(report.predictions["24h"].health_score, 0);

    let ttc = &report.time_to_critical[&Metric::Health];
    assert_eq!(ttc.hours, 6.0);
    assert_eq!(ttc.threshold, HEALTH_CRITICAL);
    assert_eq!(ttc.message, "Health score may drop to 40% in 6.0 hours");
    assert_eq!(report.risk_level, Some(RiskLevel::Medium));
}

#[test]
fn test_improving_health_has_no_time_to_critical() {
    let scores = [50, 55, 60, 65, 70];
    let history = hourly(5, |i, r| r.health_score = Some(scores[i]));
    let report = forecast(&with_health(snapshot(None, None, None), 70), &history);
    assert_eq!(report.trends.unwrap().health, Direction::Improving);
    assert!(report.time_to_critical.is_empty());
}

#[test]
fn test_missing_metric_values_are_skipped() {
    let history = hourly(6, |i, r| {
        if i % 2 == 0 {
            r.temperature = Some(50.0 + 2.0 * i as f64);
        }
    });
    let report = forecast(&snapshot(Some(60.0), None, None), &history);
    assert!(report.has_prediction);
    assert_eq!(report.trends.unwrap().temperature, Direction::Rising);
    // 先頭から 5 時間後 + 1 時間
    assert_eq!(report.predictions["1h"].temperature, 62.0);
}

#[test]
fn test_time_to_critical_json_keys() {
    let report = forecast(
        &snapshot(Some(58.0), None, None),
        &rising_temperature(50.0, 2.0),
    );
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["time_to_critical"]["temperature"]["hours"], 16.0);
    assert_eq!(json["risk_level"], "low");
    assert_eq!(json["trends"]["temperature"], "rising");
    assert_eq!(json["predictions"]["4h"]["temperature"], 66.0);
}

#[tokio::test]
async fn test_predict_with_store_history() {
    let store = MemoryStore::with_readings(recent_series(Duration::hours(1), 5, |i, r| {
        r.temperature = Some(50.0 + 2.0 * i as f64)
    }));
    let snap = snapshot(Some(58.0), None, None);
    let report = predict_machine_state(&store, &snap).await.unwrap();
    assert!(report.has_prediction);
    assert_eq!(report.risk_level, Some(RiskLevel::Low));

    let again = predict_machine_state(&store, &snap).await.unwrap();
    assert_eq!(report, again);
}

#[tokio::test]
async fn test_predict_ignores_other_machines() {
    let store = MemoryStore::with_readings(recent_series(Duration::hours(1), 5, |i, r| {
        r.machine_id = "LATHE-02".to_string();
        r.temperature = Some(50.0 + 2.0 * i as f64)
    }));
    let report = predict_machine_state(&store, &snapshot(Some(58.0), None, None))
        .await
        .unwrap();
    assert!(!report.has_prediction);
}

#[tokio::test]
async fn test_predict_store_failure() {
    let err = predict_machine_state(&BrokenStore, &snapshot(Some(58.0), None, None))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::DataUnavailable { .. })
    ));
}

proptest! {
    #[test]
    fn prop_forecast_bounds(
        temps in proptest::collection::vec(20.0f64..100.0, 5..20),
        scores in proptest::collection::vec(0i32..=100, 20),
        current in 20.0f64..100.0,
    ) {
        let history = series(base_time(), Duration::minutes(15), temps.len(), |i, r| {
            r.temperature = Some(temps[i]);
            r.health_score = Some(scores[i]);
        });
        let report = forecast(&snapshot(Some(current), None, None), &history);
        prop_assert!(report.has_prediction);
        prop_assert_eq!(report.predictions.len(), HORIZONS.len());
        for predicted in report.predictions.values() {
            prop_assert!((0..=100).contains(&predicted.health_score));
        }
        for ttc in report.time_to_critical.values() {
            prop_assert!(ttc.hours >= 0.0);
            prop_assert!(ttc.hours <= MAX_LEAD_HOURS);
        }
        prop_assert_eq!(report.risk_level, Some(risk_level(&report.time_to_critical)));
        prop_assert_eq!(report.clone(), forecast(&snapshot(Some(current), None, None), &history));
    }
}
