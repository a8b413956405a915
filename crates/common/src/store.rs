//! 計測値とアラートの保存先を抽象化するトレイト
//!
//! 実装は persistence クレートにある (PostgreSQL / インメモリ)。

use crate::Result;
use crate::types::{Alert, NewAlert, Reading, TimeRange};
use anyhow::anyhow;
use chrono::{Duration, NaiveDateTime, Utc};
use std::future::Future;

/// 現在時刻から `window` 遡った時刻。日時として表せなければエラー
pub fn window_start(window: Duration) -> Result<NaiveDateTime> {
    Utc::now()
        .naive_utc()
        .checked_sub_signed(window)
        .ok_or_else(|| anyhow!("time window out of range: {window}"))
}

pub trait ReadingStore: Send + Sync {
    /// 現在時刻から `window` 以内の計測値をタイムスタンプ昇順で返す
    fn recent_readings(
        &self,
        machine_id: &str,
        window: Duration,
    ) -> impl Future<Output = Result<Vec<Reading>>> + Send;

    /// 全機械の計測値を期間で絞り込み、タイムスタンプ昇順で返す
    fn readings_in_range(
        &self,
        range: &TimeRange,
    ) -> impl Future<Output = Result<Vec<Reading>>> + Send;

    fn append(&self, reading: &Reading) -> impl Future<Output = Result<()>> + Send;

    /// `cutoff` より古い計測値を削除し、削除件数を返す
    fn purge_before(&self, cutoff: NaiveDateTime) -> impl Future<Output = Result<usize>> + Send;
}

pub trait AlertStore: Send + Sync {
    fn create_alert(&self, alert: &NewAlert) -> impl Future<Output = Result<Alert>> + Send;

    /// 未確認のアラートを新しい順に最大 `limit` 件
    fn active_alerts(&self, limit: usize) -> impl Future<Output = Result<Vec<Alert>>> + Send;

    /// 該当 ID が無ければ `None`
    fn acknowledge_alert(&self, id: i32) -> impl Future<Output = Result<Option<Alert>>> + Send;
}
