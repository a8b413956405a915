//! 機械の制御状態
//!
//! 実機へは何も送らず、機械ごとの状態を記録するだけ。
//! 初めて参照された機械は速度 100% で稼働中として扱う。

use super::{AppState, Error, Reply, Result, respond};
use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::{Duration, NaiveDateTime, Utc};
use common::registry::KeyedStore;
use logging::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_SPEED: f64 = 100.0;
pub const MAX_SPEED: f64 = 150.0;

pub fn add_route(app: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    app.route("/machines/{machine_id}/control", post(control))
        .route("/machines/{machine_id}/state", get(machine_state))
        .route("/machines/pending-maintenance", get(pending_maintenance))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    pub running: bool,
    pub speed: f64,
    pub maintenance_scheduled: bool,
    pub scheduled_time: Option<String>,
    pub last_action: Option<String>,
    pub last_action_time: Option<NaiveDateTime>,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            running: true,
            speed: DEFAULT_SPEED,
            maintenance_scheduled: false,
            scheduled_time: None,
            last_action: None,
            last_action_time: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlRequest {
    pub action: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub scheduled_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Start,
    Stop,
    AdjustSpeed(f64),
    ScheduleMaintenance(Option<String>),
}

impl ControlCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ControlCommand::Start => "start",
            ControlCommand::Stop => "stop",
            ControlCommand::AdjustSpeed(_) => "adjust_speed",
            ControlCommand::ScheduleMaintenance(_) => "schedule_maintenance",
        }
    }
}

impl TryFrom<ControlRequest> for ControlCommand {
    type Error = Error;

    fn try_from(request: ControlRequest) -> std::result::Result<Self, Error> {
        match request.action.as_str() {
            "start" => Ok(ControlCommand::Start),
            "stop" => Ok(ControlCommand::Stop),
            "adjust_speed" => {
                let speed = request.value.unwrap_or(DEFAULT_SPEED);
                if !(0.0..=MAX_SPEED).contains(&speed) {
                    return Err(Error::InvalidRequest(format!(
                        "invalid speed value {speed}, must be between 0-{MAX_SPEED}%"
                    )));
                }
                Ok(ControlCommand::AdjustSpeed(speed))
            }
            "schedule_maintenance" => Ok(ControlCommand::ScheduleMaintenance(request.scheduled_time)),
            other => Err(Error::InvalidRequest(format!("unknown action: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
    pub machine_id: String,
    pub action: String,
    pub timestamp: NaiveDateTime,
}

/// 状態遷移。すでにその状態なら `success = false` で何も変えない
pub fn apply(
    state: &mut ControlState,
    machine_id: &str,
    command: &ControlCommand,
    now: NaiveDateTime,
) -> CommandOutcome {
    let (success, message, last_action) = match command {
        ControlCommand::Start if state.running => {
            (false, format!("{machine_id} is already running"), None)
        }
        ControlCommand::Start => {
            state.running = true;
            (
                true,
                format!("{machine_id} has been started successfully"),
                Some("Started".to_string()),
            )
        }
        ControlCommand::Stop if !state.running => {
            (false, format!("{machine_id} is already stopped"), None)
        }
        ControlCommand::Stop => {
            state.running = false;
            (
                true,
                format!("{machine_id} has been shut down safely"),
                Some("Stopped".to_string()),
            )
        }
        ControlCommand::AdjustSpeed(_) if !state.running => (
            false,
            format!("Cannot adjust speed - {machine_id} is not running"),
            None,
        ),
        ControlCommand::AdjustSpeed(speed) => {
            let old = state.speed;
            state.speed = *speed;
            (
                true,
                format!("{machine_id} speed adjusted from {old}% to {speed}%"),
                Some(format!("Speed adjusted from {old}% to {speed}%")),
            )
        }
        ControlCommand::ScheduleMaintenance(time) => {
            // 指定が無ければ翌日の 9 時
            let scheduled = time.clone().unwrap_or_else(|| {
                (now + Duration::days(1))
                    .format("%Y-%m-%d 09:00")
                    .to_string()
            });
            state.maintenance_scheduled = true;
            state.scheduled_time = Some(scheduled.clone());
            (
                true,
                format!("Maintenance scheduled for {machine_id} on {scheduled}"),
                Some(format!("Maintenance scheduled for {scheduled}")),
            )
        }
    };
    if let Some(action) = last_action {
        state.last_action = Some(action);
        state.last_action_time = Some(now);
    }
    CommandOutcome {
        success,
        message,
        machine_id: machine_id.to_string(),
        action: command.name().to_string(),
        timestamp: now,
    }
}

#[derive(Debug, Default)]
pub struct ControlBoard {
    states: KeyedStore<String, ControlState>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineControl {
    pub machine_id: String,
    #[serde(flatten)]
    pub state: ControlState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingMaintenance {
    pub machine_id: String,
    pub scheduled_time: Option<String>,
}

impl ControlBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn execute(
        &self,
        machine_id: &str,
        command: &ControlCommand,
        now: NaiveDateTime,
    ) -> CommandOutcome {
        self.states.upsert(
            machine_id.to_string(),
            ControlState::default,
            |state| apply(state, machine_id, command, now),
        )
    }

    pub fn state(&self, machine_id: &str) -> ControlState {
        self.states
            .get(&machine_id.to_string())
            .unwrap_or_default()
    }

    /// machine_id 昇順
    pub fn pending_maintenance(&self) -> Vec<PendingMaintenance> {
        let mut pending: Vec<_> = self
            .states
            .entries()
            .into_iter()
            .filter(|(_, state)| state.maintenance_scheduled)
            .map(|(machine_id, state)| PendingMaintenance {
                machine_id,
                scheduled_time: state.scheduled_time,
            })
            .collect();
        pending.sort_by(|a, b| a.machine_id.cmp(&b.machine_id));
        pending
    }
}

async fn control(
    State(state): State<Arc<AppState>>,
    Path(machine_id): Path<String>,
    Json(request): Json<ControlRequest>,
) -> Reply<CommandOutcome> {
    let log = DEFAULT.new(o!(
        "function" => "control",
        "machine_id" => machine_id.clone(),
        "action" => request.action.clone(),
    ));
    info!(log, "start");
    let result: Result<CommandOutcome> = ControlCommand::try_from(request)
        .map(|command| {
            state
                .controls
                .execute(&machine_id, &command, Utc::now().naive_utc())
        })
        .map_err(Into::into);
    respond(&log, result)
}

async fn machine_state(
    State(state): State<Arc<AppState>>,
    Path(machine_id): Path<String>,
) -> Reply<MachineControl> {
    let log = DEFAULT.new(o!("function" => "machine_state", "machine_id" => machine_id.clone()));
    let control = state.controls.state(&machine_id);
    respond(
        &log,
        Ok(MachineControl {
            machine_id,
            state: control,
        }),
    )
}

#[derive(Debug, Clone, Serialize)]
struct PendingResponse {
    pending_maintenance: Vec<PendingMaintenance>,
}

async fn pending_maintenance(State(state): State<Arc<AppState>>) -> Reply<PendingResponse> {
    let log = DEFAULT.new(o!("function" => "pending_maintenance"));
    respond(
        &log,
        Ok(PendingResponse {
            pending_maintenance: state.controls.pending_maintenance(),
        }),
    )
}
