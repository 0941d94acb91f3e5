//! Record Tests
//!
//! Tests verify:
//! - Default fields on creation
//! - Merge keeps unspecified fields
//! - JSON wire form

use std::collections::BTreeMap;

use relaykv::store::{field_text, Record, DEFAULT_FIELDS};
use serde_json::json;

fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// =============================================================================
// Creation Tests
// =============================================================================

#[test]
fn test_create_fills_every_default_field() {
    let record = Record::create("E1", fields(&[("cp", "3100")]));

    assert_eq!(record.id, "E1");
    assert_eq!(record.get("cp"), Some("3100"));
    for field in DEFAULT_FIELDS.iter().filter(|f| **f != "cp") {
        assert_eq!(record.get(field), Some(""), "field {} should default to empty", field);
    }
    assert_eq!(record.fields.len(), DEFAULT_FIELDS.len());
}

#[test]
fn test_create_keeps_extra_fields() {
    let record = Record::create("E2", fields(&[("rubro", "metalurgia")]));

    assert_eq!(record.get("rubro"), Some("metalurgia"));
    assert_eq!(record.fields.len(), DEFAULT_FIELDS.len() + 1);
}

#[test]
fn test_new_does_not_apply_defaults() {
    let record = Record::new("E3", fields(&[("web", "example.com")]));

    assert_eq!(record.fields.len(), 1);
    assert_eq!(record.get("cp"), None);
}

// =============================================================================
// Merge Tests
// =============================================================================

#[test]
fn test_merge_overwrites_present_fields_only() {
    let mut record = Record::create("E1", fields(&[("cp", "3100"), ("sede", "Parana")]));

    record.merge(fields(&[("cp", "3260")]));

    assert_eq!(record.get("cp"), Some("3260"));
    assert_eq!(record.get("sede"), Some("Parana"));
    assert_eq!(record.get("web"), Some(""));
}

#[test]
fn test_merge_adds_new_fields() {
    let mut record = Record::create("E1", BTreeMap::new());

    record.merge(fields(&[("contacto", "Ana")]));

    assert_eq!(record.get("contacto"), Some("Ana"));
}

// =============================================================================
// JSON Form Tests
// =============================================================================

#[test]
fn test_to_json_matches_concrete_scenario() {
    let record = Record::create("E1", fields(&[("cp", "3100")]));

    let expected = json!({
        "id": "E1", "cp": "3100", "CUIT": "", "domicilio": "", "idreq": "",
        "idSeq": "", "localidad": "", "provincia": "", "sede": "", "seqID": "",
        "telefono": "", "web": ""
    });
    assert_eq!(record.to_json(), expected);
}

#[test]
fn test_to_json_puts_id_first() {
    let record = Record::create("E1", BTreeMap::new());
    let json = record.to_json();

    let first_key = json.as_object().unwrap().keys().next().unwrap().clone();
    assert_eq!(first_key, "id");
}

#[test]
fn test_from_json_reads_wire_form() {
    let value = json!({"id": "E9", "cp": "3100", "telefono": 4221100});

    let record = Record::from_json(&value).unwrap();

    assert_eq!(record.id, "E9");
    assert_eq!(record.get("cp"), Some("3100"));
    assert_eq!(record.get("telefono"), Some("4221100"));
    assert_eq!(record.get("id"), None);
}

#[test]
fn test_from_json_requires_string_id() {
    assert!(Record::from_json(&json!({"cp": "3100"})).is_none());
    assert!(Record::from_json(&json!({"id": 7})).is_none());
    assert!(Record::from_json(&json!(["id"])).is_none());
}

#[test]
fn test_field_text_conversions() {
    assert_eq!(field_text(&json!("x")), "x");
    assert_eq!(field_text(&json!(null)), "");
    assert_eq!(field_text(&json!(42)), "42");
    assert_eq!(field_text(&json!(true)), "true");
    assert_eq!(field_text(&json!({"a": 1})), r#"{"a":1}"#);
}
