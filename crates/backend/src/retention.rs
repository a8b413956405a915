//! 古い計測値を定期的に削除する

use super::Result;
use anyhow::anyhow;
use chrono::{Duration, Utc as TZ};
use common::config;
use common::store::ReadingStore;
use logging::*;
use persistence::Store;
use std::future::Future;

const DEFAULT_CRON: &str = "0 0 3 * * *"; // デフォルト: 毎日 3:00
const DEFAULT_RETENTION_DAYS: i64 = 30;

pub async fn run(store: Store) {
    let log = DEFAULT.new(o!("function" => "retention::run"));
    info!(log, "initializing retention cron job");

    let schedule = get_cron_schedule("RETENTION_CRON_SCHEDULE", DEFAULT_CRON);
    cronjob(schedule, || purge(&store), "purge_readings").await;
}

fn retention_days() -> i64 {
    config::get("READINGS_RETENTION_DAYS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|days| *days > 0)
        .unwrap_or(DEFAULT_RETENTION_DAYS)
}

async fn purge(store: &Store) -> Result<()> {
    let days = retention_days();
    let cutoff = Duration::try_days(days)
        .and_then(|window| TZ::now().naive_utc().checked_sub_signed(window))
        .ok_or_else(|| anyhow!("retention window out of range: {days} days"))?;
    let log = DEFAULT.new(o!("function" => "purge", "days" => days, "cutoff" => cutoff.to_string()));
    trace!(log, "start");
    let deleted = store.purge_before(cutoff).await?;
    info!(log, "success"; "deleted" => deleted);
    Ok(())
}

/// 設定から cron スケジュールを取得してパースする
fn get_cron_schedule(name: &str, default: &str) -> cron::Schedule {
    let log = DEFAULT.new(o!("function" => "get_cron_schedule", "name" => name.to_owned()));
    let cron_conf = config::get(name).unwrap_or_else(|_| default.to_string());

    match cron_conf.parse() {
        Ok(s) => {
            info!(log, "cron schedule configured"; "schedule" => &cron_conf);
            s
        }
        Err(e) => {
            error!(log, "failed to parse cron schedule, using default";
                   "error" => ?e, "schedule" => &cron_conf, "default" => default);
            default
                .parse()
                .unwrap_or_else(|_| panic!("invalid default cron schedule: {default}"))
        }
    }
}

async fn cronjob<F, Fut>(schedule: cron::Schedule, func: F, name: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let log = DEFAULT.new(o!("function" => "cronjob", "name" => name.to_owned()));
    info!(log, "starting cron job");

    for (iteration, next) in schedule.upcoming(TZ).enumerate() {
        let now = TZ::now();
        debug!(log, "cron iteration"; "iteration" => iteration, "next" => %next, "now" => %now);

        if next <= now {
            warn!(log, "execution time already passed, skipping to next iteration";
                "next" => %next,
                "now" => %now,
                "iteration" => iteration
            );
            continue;
        }

        // 長時間 sleep を避けるため 1 分ごとに確認する
        loop {
            let now = TZ::now();
            let Ok(remaining) = (next - now).to_std() else {
                break;
            };
            if remaining.is_zero() {
                break;
            }
            if remaining.as_secs() > 300 {
                trace!(log, "still waiting for next execution";
                    "remaining_seconds" => remaining.as_secs(),
                    "next_time" => %next
                );
            }
            tokio::time::sleep(remaining.min(std::time::Duration::from_secs(60))).await;
        }

        let exec_log = DEFAULT.new(o!("function" => "run", "name" => name.to_owned()));
        info!(exec_log, "executing scheduled task");

        match func().await {
            Ok(_) => info!(exec_log, "success"),
            Err(err) => error!(exec_log, "failure"; "error" => ?err),
        }
    }
}
