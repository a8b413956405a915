//! 異常の説明文
//!
//! 検知済みの異常と直近 6 時間の平均値だけを材料に文章を作る。新しいしきい値は持ち込まない。
//! 文言は `(Language, TemplateId)` の表から引き、表に無い組み合わせは出力しない。

use crate::anomaly::{self, AnomalyReport, Severity};
use crate::stats::mean;
use crate::{Result, load_history};
use chrono::Duration;
use common::store::ReadingStore;
use common::types::{MachineSnapshot, Reading};
use logging::*;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 温度がこれ以上平均を上回っていたら急上昇として説明する
const TEMPERATURE_JUMP: f64 = 15.0;
/// 振動が平均のこの倍率を超えていたら説明する
const VIBRATION_RATIO: f64 = 1.5;

const DEFAULT_TEMPERATURE_MEAN: f64 = 50.0;
const DEFAULT_VIBRATION_MEAN: f64 = 0.3;

pub fn history_window() -> Duration {
    Duration::hours(6)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ta,
    Tanglish,
}

impl Language {
    /// 未知の指定は英語にする
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "ta" | "tamil" => Language::Ta,
            "tanglish" => Language::Tanglish,
            _ => Language::En,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateId {
    OperatingNormally,
    TemperatureJump,
    TemperatureCauses,
    TemperatureCritical,
    VibrationAboveAverage,
    VibrationCauses,
    CheckCoolant,
    InspectBearings,
    ConsiderShutdown,
    CheckMounting,
    ScheduleBearingInspection,
}

static TEMPLATES: Lazy<HashMap<(Language, TemplateId), &'static str>> = Lazy::new(|| {
    use Language::*;
    use TemplateId::*;
    HashMap::from([
        (
            (En, OperatingNormally),
            "{machine} is operating normally. All parameters within safe ranges.",
        ),
        (
            (Ta, OperatingNormally),
            "{machine} இயல்பாக இயங்குகிறது. எல்லா அளவுருக்களும் பாதுகாப்பான வரம்பில் உள்ளன.",
        ),
        (
            (Tanglish, OperatingNormally),
            "{machine} normal-aa run aagudhu. All parameters safe range-la irukku.",
        ),
        (
            (En, TemperatureJump),
            "Temperature spiked {change}°C above the 6-hour average of {average}°C.",
        ),
        (
            (Ta, TemperatureJump),
            "வெப்பநிலை சராசரியை விட {change}°C அதிகரித்துள்ளது.",
        ),
        (
            (Tanglish, TemperatureJump),
            "Temperature {change}°C spike aayiruchu, average {average}°C irundhadhu.",
        ),
        (
            (En, TemperatureCauses),
            "Possible causes: coolant system failure, bearing friction, or excessive load.",
        ),
        (
            (En, TemperatureCritical),
            "Temperature at {value}°C is in the critical zone.",
        ),
        (
            (En, VibrationAboveAverage),
            "Vibration is {percent}% higher than normal average.",
        ),
        (
            (Ta, VibrationAboveAverage),
            "அதிர்வு சாதாரணத்தை விட {percent}% அதிகம்.",
        ),
        (
            (Tanglish, VibrationAboveAverage),
            "Vibration normal-a vida {percent}% high-aa irukku.",
        ),
        (
            (En, VibrationCauses),
            "Possible causes: unbalanced load, loose components, or worn bearings.",
        ),
        ((En, CheckCoolant), "Check coolant levels and flow rate"),
        ((Ta, CheckCoolant), "குளிரூட்டி அமைப்பை சரிபார்க்கவும்"),
        ((Tanglish, CheckCoolant), "Coolant system check pannunga"),
        ((En, InspectBearings), "Inspect bearings for wear"),
        (
            (En, ConsiderShutdown),
            "Consider immediate shutdown to prevent damage",
        ),
        ((En, CheckMounting), "Check for loose bolts and mounting"),
        ((En, ScheduleBearingInspection), "Schedule bearing inspection"),
    ])
});

pub fn template(language: Language, id: TemplateId) -> Option<&'static str> {
    TEMPLATES.get(&(language, id)).copied()
}

fn render(language: Language, id: TemplateId, vars: &[(&str, String)]) -> Option<String> {
    let template = template(language, id)?;
    Some(vars.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("{{{key}}}"), value)
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyExplanation {
    pub machine_id: String,
    pub has_anomaly: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    pub explanation: String,
    pub recommendations: Vec<String>,
    pub anomaly_count: usize,
    pub anomalies: Vec<anomaly::Anomaly>,
}

pub async fn explain_anomaly<S: ReadingStore>(
    store: &S,
    snapshot: &MachineSnapshot,
    language: Language,
) -> Result<AnomalyExplanation> {
    let log = DEFAULT.new(o!(
        "function" => "explain_anomaly",
        "machine_id" => snapshot.machine_id.clone(),
        "language" => format!("{:?}", language),
    ));
    trace!(log, "start");
    let report = anomaly::detect_anomalies(store, snapshot).await?;
    if !report.is_anomaly {
        return Ok(explain(&report, &[], language));
    }
    let history = load_history(store, &snapshot.machine_id, history_window()).await?;
    let explanation = explain(&report, &history, language);
    trace!(log, "success"; "recommendations" => explanation.recommendations.len());
    Ok(explanation)
}

/// `history` は平均値の算出にだけ使う
pub fn explain(report: &AnomalyReport, history: &[Reading], language: Language) -> AnomalyExplanation {
    if !report.is_anomaly {
        let vars = [("machine", report.machine_id.clone())];
        let explanation = render(language, TemplateId::OperatingNormally, &vars)
            .or_else(|| render(Language::En, TemplateId::OperatingNormally, &vars))
            .unwrap_or_default();
        return AnomalyExplanation {
            machine_id: report.machine_id.clone(),
            has_anomaly: false,
            severity: None,
            explanation,
            recommendations: Vec::new(),
            anomaly_count: 0,
            anomalies: Vec::new(),
        };
    }

    let temps: Vec<f64> = history.iter().filter_map(|r| r.temperature).collect();
    let vibs: Vec<f64> = history.iter().filter_map(|r| r.vibration).collect();
    let temperature_mean = if temps.is_empty() {
        DEFAULT_TEMPERATURE_MEAN
    } else {
        mean(&temps)
    };
    let vibration_mean = if vibs.is_empty() {
        DEFAULT_VIBRATION_MEAN
    } else {
        mean(&vibs)
    };

    let mut lines = Vec::new();
    let mut advice = Vec::new();
    for anomaly in &report.anomalies {
        if anomaly.kind.is_temperature() {
            let change = anomaly.value - temperature_mean;
            if change > TEMPERATURE_JUMP {
                let vars = [
                    ("change", format!("{change:.1}")),
                    ("average", format!("{temperature_mean:.1}")),
                ];
                lines.push(render(language, TemplateId::TemperatureJump, &vars));
                lines.push(render(language, TemplateId::TemperatureCauses, &[]));
                advice.push(TemplateId::CheckCoolant);
                advice.push(TemplateId::InspectBearings);
            } else if anomaly.severity == Severity::Critical {
                let vars = [("value", anomaly.value.to_string())];
                lines.push(render(language, TemplateId::TemperatureCritical, &vars));
                advice.push(TemplateId::ConsiderShutdown);
            }
        } else if anomaly.kind.is_vibration()
            && vibration_mean > 0.0
            && anomaly.value > vibration_mean * VIBRATION_RATIO
        {
            let percent = (anomaly.value / vibration_mean - 1.0) * 100.0;
            let vars = [("percent", format!("{percent:.0}"))];
            lines.push(render(language, TemplateId::VibrationAboveAverage, &vars));
            lines.push(render(language, TemplateId::VibrationCauses, &[]));
            advice.push(TemplateId::CheckMounting);
            advice.push(TemplateId::ScheduleBearingInspection);
        }
    }

    let lines: Vec<String> = lines.into_iter().flatten().collect();
    let explanation = if lines.is_empty() {
        report.anomalies[0].message.clone()
    } else {
        lines.join(" ")
    };

    let mut recommendations: Vec<String> = Vec::new();
    for text in advice.into_iter().filter_map(|id| render(language, id, &[])) {
        if !recommendations.contains(&text) {
            recommendations.push(text);
        }
    }

    AnomalyExplanation {
        machine_id: report.machine_id.clone(),
        has_anomaly: true,
        severity: Some(report.overall_severity),
        explanation,
        recommendations,
        anomaly_count: report.anomaly_count,
        anomalies: report.anomalies.clone(),
    }
}
