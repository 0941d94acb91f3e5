//! Request Tests
//!
//! Tests for decoding requests and encoding responses.

use std::collections::BTreeMap;

use relaykv::protocol::{Action, Notification, Request, RequestError, Response, SubscriptionStatus};
use relaykv::store::Record;
use serde_json::json;

// =============================================================================
// Decoding Tests
// =============================================================================

#[test]
fn test_decode_get() {
    let request = Request::from_value(&json!({"UUID": "u1", "ACTION": "get", "ID": "E1"})).unwrap();

    assert_eq!(
        request,
        Request::Get {
            uuid: "u1".to_string(),
            id: "E1".to_string()
        }
    );
    assert_eq!(request.action(), Action::Get);
    assert_eq!(request.uuid(), "u1");
}

#[test]
fn test_action_is_case_insensitive() {
    for name in ["LIST", "List", "list"] {
        let request = Request::from_value(&json!({"UUID": "u1", "ACTION": name})).unwrap();
        assert_eq!(request.action(), Action::List);
    }
}

#[test]
fn test_decode_set_collects_data_fields() {
    let request = Request::from_value(&json!({
        "UUID": "u1", "ACTION": "set", "ID": "E1",
        "cp": "3100", "telefono": 4221100, "web": null, "id": "ignored"
    }))
    .unwrap();

    let expected = BTreeMap::from([
        ("cp".to_string(), "3100".to_string()),
        ("telefono".to_string(), "4221100".to_string()),
        ("web".to_string(), String::new()),
    ]);
    match request {
        Request::Set { uuid, id, fields } => {
            assert_eq!(uuid, "u1");
            assert_eq!(id, "E1");
            assert_eq!(fields, expected);
        }
        other => panic!("expected set, got {:?}", other),
    }
}

#[test]
fn test_numeric_id_is_accepted() {
    let request = Request::from_value(&json!({"ACTION": "get", "ID": 42})).unwrap();

    assert_eq!(
        request,
        Request::Get {
            uuid: "unknown".to_string(),
            id: "42".to_string()
        }
    );
}

#[test]
fn test_missing_uuid_defaults_to_unknown() {
    let request = Request::from_value(&json!({"ACTION": "subscribe"})).unwrap();

    assert_eq!(request.uuid(), "unknown");
}

// =============================================================================
// Validation Error Tests
// =============================================================================

#[test]
fn test_get_without_id_is_missing_field() {
    let err = Request::from_value(&json!({"ACTION": "get"})).unwrap_err();

    assert_eq!(
        err,
        RequestError::MissingField {
            field: "ID",
            action: Action::Get
        }
    );
    assert!(err.to_string().contains("'ID'"));
}

#[test]
fn test_set_with_empty_id_is_missing_field() {
    let err = Request::from_value(&json!({"ACTION": "set", "ID": "", "cp": "1"})).unwrap_err();

    assert!(matches!(err, RequestError::MissingField { action: Action::Set, .. }));
}

#[test]
fn test_unknown_action() {
    let err = Request::from_value(&json!({"ACTION": "DELETE", "ID": "E1"})).unwrap_err();

    assert_eq!(err, RequestError::UnknownAction("delete".to_string()));
    assert_eq!(err.to_string(), "unknown action: delete");
}

#[test]
fn test_missing_action_is_unknown() {
    let err = Request::from_value(&json!({"UUID": "u1"})).unwrap_err();

    assert_eq!(err, RequestError::UnknownAction(String::new()));
}

#[test]
fn test_non_object_is_rejected() {
    assert_eq!(Request::from_value(&json!([1, 2])), Err(RequestError::NotAnObject));
    assert_eq!(Request::from_value(&json!("get")), Err(RequestError::NotAnObject));
}

// =============================================================================
// Response Encoding Tests
// =============================================================================

#[test]
fn test_error_response_shape() {
    let response = Response::error("boom");

    assert!(response.is_error());
    assert_eq!(response.to_json(), json!({"Error": "boom"}));
    assert_eq!(
        Response::server_error("disk full").to_json(),
        json!({"Error": "server error: disk full"})
    );
}

#[test]
fn test_list_response_shape() {
    let records = vec![
        Record::new("a", BTreeMap::new()),
        Record::new("b", BTreeMap::new()),
    ];

    let json = Response::List(records).to_json();

    assert_eq!(json["count"], 2);
    assert_eq!(json["records"], json!([{"id": "a"}, {"id": "b"}]));
    assert_eq!(Response::List(Vec::new()).to_json(), json!({"records": [], "count": 0}));
}

#[test]
fn test_subscription_response_shape() {
    let response = Response::subscription(SubscriptionStatus::NotFound, "u1", "nope");

    assert_eq!(
        response.to_json(),
        json!({"status": "not_found", "uuid": "u1", "message": "nope"})
    );
}

#[test]
fn test_notification_shape() {
    let record = Record::create("E1", BTreeMap::new());
    let json = Notification::update(record.clone()).to_json();

    assert_eq!(json["action"], "update");
    assert_eq!(json["record"], record.to_json());

    let timestamp = json["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}
