//! HTTP / WebSocket の入口
//!
//! 計算はすべて analytics と persistence に任せ、ここではリクエストの
//! 受け付けとレスポンスの形、エラーのステータスコードへの対応だけを扱う。

mod analytics_api;
mod basic;
pub mod control;
pub mod handover;
mod machines;
mod ws;

use axum::{Json, Router, http::StatusCode};
use chrono::TimeDelta;
use common::ApiResponse;
use common::config;
use common::store::window_start;
use common::types::MachineSnapshot;
use logging::*;
use persistence::{RealtimeSource, Store};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

pub use control::ControlBoard;
pub use handover::HandoverBook;

type Result<T> = anyhow::Result<T>;

const DEFAULT_WS_PUSH_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Error, Debug)]
pub enum Error {
    #[error("machine not found: {0}")]
    MachineNotFound(String),
    #[error("alert not found: {0}")]
    AlertNotFound(i32),
    #[error("note not found: {0}")]
    NoteNotFound(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("realtime data unavailable: {0}")]
    RealtimeUnavailable(String),
    #[error("reading store unavailable: {0}")]
    StoreUnavailable(String),
}

impl Error {
    pub(crate) fn store(err: anyhow::Error) -> anyhow::Error {
        Error::StoreUnavailable(format!("{err:#}")).into()
    }
}

pub struct AppState {
    pub store: Store,
    pub realtime: RealtimeSource,
    pub handover: HandoverBook,
    pub controls: ControlBoard,
    pub ws_interval: Duration,
}

impl AppState {
    pub fn new(store: Store, realtime: RealtimeSource) -> Self {
        Self {
            store,
            realtime,
            handover: HandoverBook::new(),
            controls: ControlBoard::new(),
            ws_interval: DEFAULT_WS_PUSH_INTERVAL,
        }
    }

    pub fn from_config(store: Store) -> Self {
        let log = DEFAULT.new(o!("function" => "AppState::from_config"));
        let mut state = Self::new(store, RealtimeSource::from_config());
        match config::get_duration("WS_PUSH_INTERVAL") {
            Ok(interval) if !interval.is_zero() => state.ws_interval = interval,
            Ok(_) => warn!(log, "zero push interval, using default"),
            Err(e) => warn!(log, "using default push interval"; "error" => %e),
        }
        info!(log, "state ready";
            "store" => state.store.backend_name(),
            "realtime_dir" => state.realtime.dir().display().to_string(),
            "ws_interval" => ?state.ws_interval,
        );
        state
    }

    async fn snapshots(&self) -> Result<Vec<MachineSnapshot>> {
        self.realtime
            .latest()
            .await
            .map_err(|e| Error::RealtimeUnavailable(format!("{e:#}")).into())
    }

    /// 最新のリアルタイムデータに無い機械は `MachineNotFound`
    async fn snapshot(&self, machine_id: &str) -> Result<MachineSnapshot> {
        self.realtime
            .find(machine_id)
            .await
            .map_err(|e| Error::RealtimeUnavailable(format!("{e:#}")))?
            .ok_or_else(|| Error::MachineNotFound(machine_id.to_string()).into())
    }
}

/// 設定値を数値として読む。無いか読めなければ `default`
pub(crate) fn config_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    config::get(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// クエリの `hours` を現在から遡る時間幅にする
pub(crate) fn lookback_hours(hours: i64) -> Result<TimeDelta> {
    if hours <= 0 {
        return Err(Error::InvalidRequest(format!("hours must be positive: {hours}")).into());
    }
    TimeDelta::try_hours(hours)
        .filter(|window| window_start(*window).is_ok())
        .ok_or_else(|| Error::InvalidRequest(format!("hours out of range: {hours}")).into())
}

pub(crate) type Reply<T> = (StatusCode, Json<ApiResponse<T, String>>);

pub(crate) fn status_of(err: &anyhow::Error) -> StatusCode {
    if let Some(e) = err.downcast_ref::<Error>() {
        return match e {
            Error::MachineNotFound(_) | Error::AlertNotFound(_) | Error::NoteNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::RealtimeUnavailable(_) | Error::StoreUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
    }
    if let Some(e) = err.downcast_ref::<analytics::Error>() {
        return match e {
            analytics::Error::WindowOutOfRange(_) => StatusCode::BAD_REQUEST,
            analytics::Error::DataUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
    }
    StatusCode::INTERNAL_SERVER_ERROR
}

pub(crate) fn respond<T>(log: &Logger, result: Result<T>) -> Reply<T>
where
    T: Debug + Clone,
{
    match result {
        Ok(value) => {
            debug!(log, "success");
            (StatusCode::OK, Json(ApiResponse::Success(value)))
        }
        Err(e) => {
            let status = status_of(&e);
            if status.is_server_error() {
                error!(log, "request failed"; "status" => status.as_u16(), "error" => format!("{e:#}"));
            } else {
                info!(log, "request rejected"; "status" => status.as_u16(), "error" => format!("{e:#}"));
            }
            (status, Json(ApiResponse::Error(format!("{e:#}"))))
        }
    }
}

fn add_routes(
    app: Router<Arc<AppState>>,
    routes: &[fn(Router<Arc<AppState>>) -> Router<Arc<AppState>>],
) -> Router<Arc<AppState>> {
    routes.iter().fold(app, |app, add| add(app))
}

pub fn router(state: Arc<AppState>) -> Router {
    add_routes(
        Router::new(),
        &[
            basic::add_route,
            machines::add_route,
            control::add_route,
            analytics_api::add_route,
            handover::add_route,
            ws::add_route,
        ],
    )
    .with_state(state)
    .layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

pub async fn serve(addr: &str, state: Arc<AppState>) -> Result<()> {
    let log = DEFAULT.new(o!("module" => "web"));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(log, "HTTP server starting"; "addr" => %listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing;
