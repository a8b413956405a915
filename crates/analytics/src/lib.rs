//! 設備の計測値を分析する
//!
//! 異常検知 ([`anomaly`]) とトレンド予測 ([`predict`]) が中心で、
//! どちらも同じスナップショットと計測値ストアを入力に独立して動く。
//! 結果はリクエストごとに計算し直し、共有状態は持たない。

pub mod aggregate;
pub mod anomaly;
pub mod explain;
pub mod health;
pub mod limits;
pub mod maintenance;
pub mod predict;
pub mod stats;
pub mod trend_stats;

use chrono::Duration;
use common::store::ReadingStore;
use common::types::Reading;
use thiserror::Error;

type Result<T> = anyhow::Result<T>;

#[derive(Error, Debug)]
pub enum Error {
    /// 計測値ストアから履歴を読めなかった。「異常なし」とは区別する。
    #[error("reading data unavailable for {machine_id}: {reason}")]
    DataUnavailable { machine_id: String, reason: String },
    /// 集計期間が日時として表せない
    #[error("time window out of range: {0}")]
    WindowOutOfRange(String),
}

pub(crate) async fn load_history<S: ReadingStore>(
    store: &S,
    machine_id: &str,
    window: Duration,
) -> Result<Vec<Reading>> {
    store
        .recent_readings(machine_id, window)
        .await
        .map_err(|e| {
            Error::DataUnavailable {
                machine_id: machine_id.to_string(),
                reason: format!("{e:#}"),
            }
            .into()
        })
}

#[cfg(test)]
pub(crate) mod testing;
