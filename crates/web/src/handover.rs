//! シフト引き継ぎメモ

use super::{AppState, Error, Reply, Result, respond};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use chrono::{NaiveDateTime, Timelike, Utc};
use common::registry::KeyedStore;
use logging::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

fn path(sub: &str) -> String {
    format!("/handover/{sub}")
}

pub fn add_route(app: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    app.route(&path("notes"), get(list_notes).post(create_note))
        .route(&path("notes/{note_id}"), axum::routing::delete(delete_note))
        .route(&path("notes/{note_id}/acknowledge"), post(acknowledge_note))
        .route(&path("summary"), get(summary))
}

/// 並び順は重要度の高い順
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotePriority {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shift {
    Morning,
    Afternoon,
    Night,
}

impl Shift {
    /// 6-14 時が morning、14-22 時が afternoon、それ以外は night
    pub fn at(time: NaiveDateTime) -> Self {
        match time.hour() {
            6..14 => Shift::Morning,
            14..22 => Shift::Afternoon,
            _ => Shift::Night,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoverNote {
    pub id: String,
    pub author: String,
    pub shift: Shift,
    pub priority: NotePriority,
    pub message: String,
    pub machine_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewNote {
    pub author: String,
    /// 省略時は作成時刻のシフト
    #[serde(default)]
    pub shift: Option<Shift>,
    pub priority: NotePriority,
    pub message: String,
    #[serde(default)]
    pub machine_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteFilter {
    #[serde(default)]
    pub shift: Option<Shift>,
    #[serde(default)]
    pub unacknowledged_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandoverSummary {
    pub total: usize,
    pub unacknowledged: usize,
    /// 未確認の critical メモの数
    pub critical: usize,
    pub current_shift: Shift,
}

#[derive(Debug, Default)]
pub struct HandoverBook {
    notes: KeyedStore<String, HandoverNote>,
    last_id: AtomicU64,
}

impl HandoverBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, note: NewNote, now: NaiveDateTime) -> Result<HandoverNote> {
        if note.author.trim().is_empty() {
            return Err(Error::InvalidRequest("author is required".to_string()).into());
        }
        if note.message.trim().is_empty() {
            return Err(Error::InvalidRequest("message is required".to_string()).into());
        }
        let seq = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        let created = HandoverNote {
            id: format!("NOTE-{seq:04}"),
            author: note.author,
            shift: note.shift.unwrap_or_else(|| Shift::at(now)),
            priority: note.priority,
            message: note.message,
            machine_id: note.machine_id,
            created_at: now,
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
        };
        self.notes.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    /// critical を先頭に、同じ重要度では新しい順
    pub fn list(&self, filter: &NoteFilter) -> Vec<HandoverNote> {
        let mut notes: Vec<_> = self
            .notes
            .values()
            .into_iter()
            .filter(|n| filter.shift.is_none_or(|shift| n.shift == shift))
            .filter(|n| !filter.unacknowledged_only || !n.acknowledged)
            .collect();
        notes.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        notes
    }

    pub fn acknowledge(&self, id: &str, by: &str, now: NaiveDateTime) -> Option<HandoverNote> {
        self.notes.modify(&id.to_string(), |note| {
            note.acknowledged = true;
            note.acknowledged_by = Some(by.to_string());
            note.acknowledged_at = Some(now);
            note.clone()
        })
    }

    pub fn delete(&self, id: &str) -> Option<HandoverNote> {
        self.notes.remove(&id.to_string())
    }

    pub fn summary(&self, now: NaiveDateTime) -> HandoverSummary {
        let notes = self.notes.values();
        let open = || notes.iter().filter(|n| !n.acknowledged);
        HandoverSummary {
            total: notes.len(),
            unacknowledged: open().count(),
            critical: open()
                .filter(|n| n.priority == NotePriority::Critical)
                .count(),
            current_shift: Shift::at(now),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct NotesResponse {
    notes: Vec<HandoverNote>,
    total: usize,
    unacknowledged: usize,
}

async fn list_notes(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<NoteFilter>,
) -> Reply<NotesResponse> {
    let log = DEFAULT.new(o!("function" => "list_notes"));
    info!(log, "start"; "shift" => ?filter.shift, "unacknowledged_only" => filter.unacknowledged_only);
    let notes = state.handover.list(&filter);
    let unacknowledged = notes.iter().filter(|n| !n.acknowledged).count();
    respond(
        &log,
        Ok(NotesResponse {
            total: notes.len(),
            unacknowledged,
            notes,
        }),
    )
}

async fn create_note(
    State(state): State<Arc<AppState>>,
    Json(note): Json<NewNote>,
) -> Reply<HandoverNote> {
    let log = DEFAULT.new(o!(
        "function" => "create_note",
        "priority" => format!("{:?}", note.priority),
    ));
    info!(log, "start");
    respond(&log, state.handover.create(note, Utc::now().naive_utc()))
}

#[derive(Debug, Deserialize)]
struct AcknowledgeQuery {
    acknowledged_by: String,
}

async fn acknowledge_note(
    State(state): State<Arc<AppState>>,
    Path(note_id): Path<String>,
    Query(query): Query<AcknowledgeQuery>,
) -> Reply<HandoverNote> {
    let log = DEFAULT.new(o!(
        "function" => "acknowledge_note",
        "note_id" => note_id.clone(),
        "acknowledged_by" => query.acknowledged_by.clone(),
    ));
    info!(log, "start");
    let result = state
        .handover
        .acknowledge(&note_id, &query.acknowledged_by, Utc::now().naive_utc())
        .ok_or_else(|| Error::NoteNotFound(note_id).into());
    respond(&log, result)
}

#[derive(Debug, Clone, Serialize)]
struct DeleteResponse {
    success: bool,
    message: String,
}

async fn delete_note(
    State(state): State<Arc<AppState>>,
    Path(note_id): Path<String>,
) -> Reply<DeleteResponse> {
    let log = DEFAULT.new(o!("function" => "delete_note", "note_id" => note_id.clone()));
    info!(log, "start");
    let result = match state.handover.delete(&note_id) {
        Some(_) => Ok(DeleteResponse {
            success: true,
            message: format!("Note {note_id} deleted"),
        }),
        None => Err(Error::NoteNotFound(note_id).into()),
    };
    respond(&log, result)
}

async fn summary(State(state): State<Arc<AppState>>) -> Reply<HandoverSummary> {
    let log = DEFAULT.new(o!("function" => "handover_summary"));
    respond(&log, Ok(state.handover.summary(Utc::now().naive_utc())))
}

#[cfg(test)]
mod tests;
