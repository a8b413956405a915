use super::machines::{LiveMachine, enrich};
use super::{AppState, Result};
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use common::types::MachineSnapshot;
use logging::*;
use serde::Serialize;
use std::sync::Arc;

pub fn add_route(app: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    app.route("/ws/machines", get(upgrade))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineUpdate {
    #[serde(rename = "type")]
    kind: &'static str,
    count: usize,
    machines: Vec<LiveMachine>,
}

impl MachineUpdate {
    fn new(snapshots: &[MachineSnapshot]) -> Self {
        let machines: Vec<_> = snapshots.iter().map(|s| enrich(s).0).collect();
        Self {
            kind: "machine_update",
            count: machines.len(),
            machines,
        }
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| push_updates(socket, state))
}

/// 接続が閉じるまで一定間隔で全機械の現在値を送る。
/// 読み取り専用なので計測値の記録やアラート発行はしない。
async fn push_updates(mut socket: WebSocket, state: Arc<AppState>) {
    let log = DEFAULT.new(o!("function" => "push_updates"));
    info!(log, "client connected"; "interval" => ?state.ws_interval);
    let mut interval = tokio::time::interval(state.ws_interval);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let text = match update_message(&state).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(log, "skip update"; "error" => format!("{e:#}"));
                        continue;
                    }
                };
                if let Err(e) = socket.send(Message::Text(text.into())).await {
                    debug!(log, "send failed"; "error" => %e);
                    break;
                }
            }
            received = socket.recv() => match received {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(log, "receive failed"; "error" => %e);
                    break;
                }
            },
        }
    }
    info!(log, "client disconnected");
}

async fn update_message(state: &AppState) -> Result<String> {
    let snapshots = state.snapshots().await?;
    Ok(serde_json::to_string(&MachineUpdate::new(&snapshots))?)
}
