//! Unit tests for the relation payload codec and protocol settings.

use std::collections::BTreeMap;

use proptest::prelude::*;

use crate::{decode_map, encode_map, DecodeError, ProtocolConfig, RelationId, RequestEntry, WireFormat};

fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ── decode_map ───────────────────────────────────────────────────────

#[test]
fn absent_payload_decodes_to_empty_map() {
    let decoded = decode_map(None).expect("absent payload is valid");
    assert!(decoded.is_empty());
}

#[test]
fn blank_payload_decodes_to_empty_map() {
    assert!(decode_map(Some("")).expect("empty string").is_empty());
    assert!(decode_map(Some("  \n")).expect("whitespace").is_empty());
}

#[test]
fn object_of_strings_decodes() {
    let decoded = decode_map(Some(r#"{"alice": "admins", "bob": "readers"}"#))
        .expect("well-formed payload");
    assert_eq!(decoded, map(&[("alice", "admins"), ("bob", "readers")]));
}

#[test]
fn empty_object_decodes_to_empty_map() {
    assert!(decode_map(Some("{}")).expect("empty object").is_empty());
}

#[test]
fn malformed_json_is_rejected() {
    let err = decode_map(Some("not-json")).unwrap_err();
    assert!(matches!(err, DecodeError::Json(_)), "got {err:?}");
}

#[test]
fn array_payload_is_rejected() {
    let err = decode_map(Some(r#"["alice"]"#)).unwrap_err();
    assert!(
        matches!(err, DecodeError::NotAnObject { found: "array" }),
        "got {err:?}"
    );
}

#[test]
fn json_string_payload_is_rejected() {
    let err = decode_map(Some(r#""alice""#)).unwrap_err();
    assert!(matches!(err, DecodeError::NotAnObject { found: "string" }));
}

#[test]
fn null_payload_is_rejected() {
    let err = decode_map(Some("null")).unwrap_err();
    assert!(matches!(err, DecodeError::NotAnObject { found: "null" }));
}

#[test]
fn nested_object_value_is_rejected() {
    let err = decode_map(Some(r#"{"alice": {"group": "admins"}}"#)).unwrap_err();
    match err {
        DecodeError::NonStringValue { key, found } => {
            assert_eq!(key, "alice");
            assert_eq!(found, "object");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn numeric_value_is_not_coerced() {
    let err = decode_map(Some(r#"{"alice": 42}"#)).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::NonStringValue { found: "number", .. }
    ));
}

#[test]
fn duplicate_keys_keep_last_value() {
    let decoded = decode_map(Some(r#"{"alice": "one", "alice": "two"}"#)).expect("decodes");
    assert_eq!(decoded, map(&[("alice", "two")]));
}

// ── encode_map ───────────────────────────────────────────────────────

#[test]
fn encode_sorts_keys() {
    let encoded = encode_map(&map(&[("zed", "1"), ("alice", "2")]));
    assert_eq!(encoded, r#"{"alice":"2","zed":"1"}"#);
}

#[test]
fn encode_empty_map() {
    assert_eq!(encode_map(&BTreeMap::new()), "{}");
}

#[test]
fn round_trip_preserves_awkward_strings() {
    let original = map(&[
        ("alice", "tok-123"),
        ("quote\"d", "back\\slash"),
        ("unicodé", "ключ"),
        ("", "empty key"),
        ("newline", "a\nb"),
    ]);
    let encoded = encode_map(&original);
    let decoded = decode_map(Some(encoded.as_str())).expect("round trip");
    assert_eq!(decoded, original);
}

proptest! {
    #[test]
    fn any_string_map_survives_encode_then_decode(
        original in prop::collection::btree_map(any::<String>(), any::<String>(), 0..16)
    ) {
        let encoded = encode_map(&original);
        let decoded = decode_map(Some(encoded.as_str()));
        prop_assert_eq!(decoded.ok(), Some(original));
    }
}

// ── RequestEntry ordering ────────────────────────────────────────────

#[test]
fn request_entries_order_by_relation_then_unit() {
    let entry = |rel: u64, unit: &str, identity: &str| RequestEntry {
        relation_id: RelationId(rel),
        unit: unit.to_string(),
        identity: identity.to_string(),
        group: "g".to_string(),
    };
    let mut entries = vec![
        entry(2, "app/0", "a"),
        entry(1, "app/1", "a"),
        entry(1, "app/0", "z"),
    ];
    entries.sort();
    assert_eq!(entries[0], entry(1, "app/0", "z"));
    assert_eq!(entries[1], entry(1, "app/1", "a"));
    assert_eq!(entries[2], entry(2, "app/0", "a"));
}

// ── ProtocolConfig ───────────────────────────────────────────────────

#[test]
fn protocol_config_defaults() {
    let config = ProtocolConfig::default();
    assert_eq!(config.endpoint, "tokens");
    assert_eq!(config.wire_format, WireFormat::Json);
    assert!(config.track_in_flight);
}

#[test]
fn protocol_config_parses_from_toml() {
    let config: ProtocolConfig = toml::from_str(
        r#"
        endpoint = "vault-tokens"
        wire_format = "legacy"
        "#,
    )
    .expect("valid toml");
    assert_eq!(config.endpoint, "vault-tokens");
    assert_eq!(config.wire_format, WireFormat::Legacy);
    assert!(config.track_in_flight, "unset field keeps its default");
}

#[test]
fn wire_format_parses_case_insensitively() {
    assert_eq!("JSON".parse::<WireFormat>(), Ok(WireFormat::Json));
    assert_eq!(" legacy ".parse::<WireFormat>(), Ok(WireFormat::Legacy));
    assert!("yaml".parse::<WireFormat>().is_err());
}
