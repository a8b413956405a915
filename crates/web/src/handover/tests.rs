use super::*;
use crate::testing::{TestApp, delete, error_message, get, post, post_empty, success};
use axum::http::StatusCode;
use chrono::Duration;
use serde_json::json;

fn at(hour: u32) -> NaiveDateTime {
    NaiveDateTime::parse_from_str("2025-06-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
        + Duration::hours(i64::from(hour))
}

fn note(priority: NotePriority, message: &str) -> NewNote {
    NewNote {
        author: "Priya S.".to_string(),
        shift: None,
        priority,
        message: message.to_string(),
        machine_id: Some("PRESS-03".to_string()),
    }
}

#[test]
fn test_shift_from_hour() {
    assert_eq!(Shift::at(at(5)), Shift::Night);
    assert_eq!(Shift::at(at(6)), Shift::Morning);
    assert_eq!(Shift::at(at(13)), Shift::Morning);
    assert_eq!(Shift::at(at(14)), Shift::Afternoon);
    assert_eq!(Shift::at(at(21)), Shift::Afternoon);
    assert_eq!(Shift::at(at(22)), Shift::Night);
}

#[test]
fn test_create_assigns_sequential_ids() {
    let book = HandoverBook::new();
    let first = book.create(note(NotePriority::Low, "All good"), at(8)).unwrap();
    let second = book
        .create(note(NotePriority::High, "Seal replaced"), at(15))
        .unwrap();
    assert_eq!(first.id, "NOTE-0001");
    assert_eq!(second.id, "NOTE-0002");
    assert_eq!(first.shift, Shift::Morning);
    assert_eq!(second.shift, Shift::Afternoon);
    assert!(!first.acknowledged);

    let mut empty = note(NotePriority::Low, " ");
    assert!(book.create(empty.clone(), at(8)).is_err());
    empty.message = "ok".to_string();
    empty.author = String::new();
    assert!(book.create(empty, at(8)).is_err());
}

#[test]
fn test_list_orders_critical_first_then_newest() {
    let book = HandoverBook::new();
    book.create(note(NotePriority::Low, "a"), at(7)).unwrap();
    book.create(note(NotePriority::Critical, "b"), at(8)).unwrap();
    book.create(note(NotePriority::Low, "c"), at(9)).unwrap();
    book.create(note(NotePriority::High, "d"), at(15)).unwrap();
    book.create(note(NotePriority::Critical, "e"), at(23)).unwrap();

    let messages: Vec<String> = book
        .list(&NoteFilter::default())
        .into_iter()
        .map(|n| n.message)
        .collect();
    assert_eq!(messages, vec!["e", "b", "d", "c", "a"]);

    let morning = book.list(&NoteFilter {
        shift: Some(Shift::Morning),
        unacknowledged_only: false,
    });
    assert_eq!(morning.len(), 3);
}

#[test]
fn test_acknowledge_delete_and_summary() {
    let book = HandoverBook::new();
    let critical = book
        .create(note(NotePriority::Critical, "Controller error"), at(8))
        .unwrap();
    book.create(note(NotePriority::Medium, "Coolant low"), at(9))
        .unwrap();

    let summary = book.summary(at(10));
    assert_eq!(summary.total, 2);
    assert_eq!(summary.unacknowledged, 2);
    assert_eq!(summary.critical, 1);
    assert_eq!(summary.current_shift, Shift::Morning);

    let acked = book.acknowledge(&critical.id, "Night Lead", at(11)).unwrap();
    assert!(acked.acknowledged);
    assert_eq!(acked.acknowledged_by.as_deref(), Some("Night Lead"));
    assert_eq!(acked.acknowledged_at, Some(at(11)));
    assert!(book.acknowledge("NOTE-9999", "x", at(11)).is_none());

    let summary = book.summary(at(23));
    assert_eq!(summary.unacknowledged, 1);
    assert_eq!(summary.critical, 0);
    assert_eq!(summary.current_shift, Shift::Night);

    let open = book.list(&NoteFilter {
        shift: None,
        unacknowledged_only: true,
    });
    assert_eq!(open.len(), 1);

    assert!(book.delete(&critical.id).is_some());
    assert!(book.delete(&critical.id).is_none());
    assert_eq!(book.summary(at(10)).total, 1);
}

#[tokio::test]
async fn test_notes_endpoints() {
    let app = TestApp::empty();
    let (status, body) = app
        .call(post(
            "/handover/notes",
            json!({"author": "Rajesh K.", "priority": "high", "message": "Spindle vibration rising", "machine_id": "MILL-01", "shift": "night"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let created = success(&body);
    assert_eq!(created["id"], "NOTE-0001");
    assert_eq!(created["shift"], "night");
    assert_eq!(created["priority"], "high");

    let (_, body) = app.call(get("/handover/notes?shift=night")).await;
    assert_eq!(success(&body)["total"], 1);
    let (_, body) = app.call(get("/handover/notes?shift=morning")).await;
    assert_eq!(success(&body)["total"], 0);

    let (status, body) = app
        .call(post_empty(
            "/handover/notes/NOTE-0001/acknowledge?acknowledged_by=Amit",
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(success(&body)["acknowledged_by"], "Amit");

    let (_, body) = app
        .call(get("/handover/notes?unacknowledged_only=true"))
        .await;
    assert_eq!(success(&body)["total"], 0);

    let (_, body) = app.call(get("/handover/summary")).await;
    assert_eq!(success(&body)["total"], 1);
    assert_eq!(success(&body)["unacknowledged"], 0);

    let (status, _) = app.call(delete("/handover/notes/NOTE-0001")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.call(delete("/handover/notes/NOTE-0001")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_message(&body), "note not found: NOTE-0001");
}

#[tokio::test]
async fn test_create_note_validation() {
    let app = TestApp::empty();
    let (status, body) = app
        .call(post(
            "/handover/notes",
            json!({"author": "", "priority": "low", "message": "x"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_message(&body), "invalid request: author is required");
}
