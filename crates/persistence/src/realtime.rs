//! シミュレータが書き出すリアルタイムデータの読み出し
//!
//! ディレクトリ内で名前が最も大きい `*.json` が最新のスナップショット。
//! 中身は機械ごとの現在値の配列。

use crate::{Error, Result};
use chrono::{NaiveDateTime, Utc};
use common::config;
use common::types::MachineSnapshot;
use logging::*;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const DEFAULT_DATA_DIR: &str = "data/realtime";

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    machine_id: String,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    vibration: Option<f64>,
    #[serde(default)]
    rpm: Option<f64>,
    #[serde(default)]
    health_score: Option<f64>,
    #[serde(default)]
    timestamp: Option<NaiveDateTime>,
}

impl RawSnapshot {
    fn into_snapshot(self, ingested_at: NaiveDateTime) -> MachineSnapshot {
        MachineSnapshot {
            machine_id: self.machine_id,
            timestamp: self.timestamp.unwrap_or(ingested_at),
            temperature: self.temperature,
            vibration: self.vibration,
            rpm: self.rpm,
            health_score: self.health_score.map(|h| h.round() as i32),
        }
    }
}

/// タイムスタンプの無いエントリには `ingested_at` を使う
pub fn parse_snapshots(
    content: &str,
    ingested_at: NaiveDateTime,
) -> serde_json::Result<Vec<MachineSnapshot>> {
    let raw: Vec<RawSnapshot> = serde_json::from_str(content)?;
    Ok(raw
        .into_iter()
        .map(|r| r.into_snapshot(ingested_at))
        .collect())
}

#[derive(Debug, Clone)]
pub struct RealtimeSource {
    dir: PathBuf,
}

impl RealtimeSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config() -> Self {
        let dir =
            config::get("REALTIME_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 最新ファイルの全機械分。ディレクトリやファイルが無ければ空
    pub async fn latest(&self) -> Result<Vec<MachineSnapshot>> {
        let log = DEFAULT.new(o!(
            "function" => "RealtimeSource::latest",
            "dir" => self.dir.display().to_string(),
        ));
        let Some(path) = self.latest_file().await? else {
            debug!(log, "no snapshot file");
            return Ok(Vec::new());
        };
        let content = tokio::fs::read_to_string(&path).await?;
        match parse_snapshots(&content, Utc::now().naive_utc()) {
            Ok(snapshots) => {
                trace!(log, "success"; "file" => path.display().to_string(), "count" => snapshots.len());
                Ok(snapshots)
            }
            Err(e) => {
                warn!(log, "malformed snapshot file"; "file" => path.display().to_string(), "error" => %e);
                Err(Error::MalformedSnapshot {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    pub async fn find(&self, machine_id: &str) -> Result<Option<MachineSnapshot>> {
        Ok(self
            .latest()
            .await?
            .into_iter()
            .find(|s| s.machine_id == machine_id))
    }

    async fn latest_file(&self) -> Result<Option<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut latest: Option<PathBuf> = None;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if latest
                .as_ref()
                .is_none_or(|current| path.file_name() > current.file_name())
            {
                latest = Some(path);
            }
        }
        Ok(latest)
    }
}
