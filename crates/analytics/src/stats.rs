//! 平均・標準偏差・z-score・線形回帰

use serde::{Deserialize, Serialize};

/// z-score を計算するのに必要な最小サンプル数
pub const MIN_ZSCORE_SAMPLES: usize = 3;

/// 空なら 0
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// 標本標準偏差 (n - 1)。2 件未満はばらつき無しとして 0
pub fn stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

pub fn zscore(value: f64, history: &[f64]) -> f64 {
    if history.len() < MIN_ZSCORE_SAMPLES {
        return 0.0;
    }
    let sd = stdev(history);
    if sd == 0.0 {
        return 0.0;
    }
    (value - mean(history)) / sd
}

/// 1 メトリクス分の直線 `y = slope * x + intercept`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendModel {
    pub slope: f64,
    pub intercept: f64,
}

impl TrendModel {
    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// 最小二乗法による直線のあてはめ
///
/// 点が 2 つ未満、または x が全て同じ場合は傾き 0、切片は y の平均。
pub fn linear_regression(points: &[(f64, f64)]) -> TrendModel {
    let ys: Vec<f64> = points.iter().map(|(_, y)| *y).collect();
    let flat = TrendModel {
        slope: 0.0,
        intercept: mean(&ys),
    };
    let Some((x0, _)) = points.first() else {
        return flat;
    };
    if points.len() < 2 || points.iter().all(|(x, _)| x == x0) {
        return flat;
    }

    let xs: Vec<f64> = points.iter().map(|(x, _)| *x).collect();
    let x_mean = mean(&xs);
    let y_mean = mean(&ys);
    let (sxy, sxx) = points.iter().fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
        let dx = x - x_mean;
        (sxy + dx * (y - y_mean), sxx + dx * dx)
    });
    if sxx == 0.0 {
        return flat;
    }
    let slope = sxy / sxx;
    TrendModel {
        slope,
        intercept: y_mean - slope * x_mean,
    }
}

/// 小数点以下 `digits` 桁に丸める (0.5 は 0 から遠い方へ)
pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10_f64.powi(digits);
    (value * factor).round() / factor
}
