//! Client Tests
//!
//! Tests verify:
//! - Request objects carry the control keys and data fields
//! - A subscription confirmation is found even behind early notifications
//! - The notification log appends readable JSON entries
//! - The default client identity is stable

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use relaykv::client::{build_request, machine_uuid, Client, NotificationLog};
use relaykv::protocol::{Action, JsonStreamReader};
use serde_json::{json, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Accept one connection, read its request, then write `replies` back to back
fn scripted_server(replies: Vec<Value>) -> (String, thread::JoinHandle<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).unwrap();
        let request: Value = serde_json::from_slice(&buf[..n]).unwrap();

        let mut bytes = Vec::new();
        for reply in &replies {
            bytes.extend(serde_json::to_vec(reply).unwrap());
        }
        stream.write_all(&bytes).unwrap();
        request
    });

    (addr, handle)
}

fn update(id: &str) -> Value {
    json!({"action": "update", "record": {"id": id}, "timestamp": "2026-01-01T00:00:00Z"})
}

// =============================================================================
// Request Building Tests
// =============================================================================

#[test]
fn test_build_request() {
    let fields = BTreeMap::from([("cp".to_string(), "3100".to_string())]);

    let request = build_request("u1", Action::Set, Some("E1"), &fields);

    assert_eq!(
        request,
        json!({"UUID": "u1", "ACTION": "set", "ID": "E1", "cp": "3100"})
    );
    assert_eq!(
        build_request("u1", Action::List, None, &BTreeMap::new()),
        json!({"UUID": "u1", "ACTION": "list"})
    );
}

// =============================================================================
// Subscription Tests
// =============================================================================

#[test]
fn test_subscribe_skips_notifications_ahead_of_confirmation() {
    let confirmation = json!({"status": "subscribed", "uuid": "w1", "message": "ok"});
    let (addr, server) = scripted_server(vec![update("E1"), confirmation.clone(), update("E2")]);

    let mut subscription = Client::new(addr, "w1").subscribe().unwrap();

    assert_eq!(subscription.confirmation(), &confirmation);
    assert_eq!(subscription.next_message().unwrap(), Some(update("E1")));
    assert_eq!(subscription.next_message().unwrap(), Some(update("E2")));

    let request = server.join().unwrap();
    assert_eq!(request["ACTION"], "subscribe");
    assert_eq!(request["UUID"], "w1");
}

#[test]
fn test_subscribe_accepts_error_reply() {
    let (addr, server) = scripted_server(vec![json!({"Error": "server error: boom"})]);

    let subscription = Client::new(addr, "w1").subscribe().unwrap();

    assert_eq!(subscription.confirmation()["Error"], "server error: boom");
    server.join().unwrap();
}

#[test]
fn test_subscribe_without_reply_is_error() {
    let (addr, server) = scripted_server(vec![update("E1")]);

    // Server closes after the lone notification
    assert!(Client::new(addr, "w1").subscribe().is_err());
    server.join().unwrap();
}

// =============================================================================
// Notification Log Tests
// =============================================================================

#[test]
fn test_notification_log_appends_entries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notifications.json");
    let confirmation = json!({"status": "subscribed", "uuid": "w1", "message": "ok"});
    {
        let mut log = NotificationLog::open(&path).unwrap();
        log.append_confirmation(&confirmation).unwrap();
        log.append_notification(1, &update("E1")).unwrap();
    }
    {
        let mut log = NotificationLog::open(&path).unwrap();
        log.append_notification(2, &update("E2")).unwrap();
    }

    let mut reader = JsonStreamReader::new(File::open(&path).unwrap());
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_message().unwrap() {
        entries.push(entry);
    }

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["type"], "subscription_confirmation");
    assert_eq!(entries[0]["notification_number"], 0);
    assert_eq!(entries[0]["data"], confirmation);
    assert_eq!(entries[1]["type"], "data_update");
    assert_eq!(entries[1]["notification_number"], 1);
    assert_eq!(entries[2]["data"]["record"]["id"], "E2");
    assert!(entries[2]["timestamp"].is_string());
}

// =============================================================================
// Identity Tests
// =============================================================================

#[test]
fn test_machine_uuid_is_stable() {
    let first = machine_uuid();

    assert_eq!(first, machine_uuid());
    assert!(uuid::Uuid::parse_str(&first).is_ok());
}
