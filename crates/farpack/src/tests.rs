use std::collections::BTreeMap;

use serde_json::json;

use crate::*;

// ============================================================================
//  REF VALIDITY
// ============================================================================

#[test]
fn test_validate_accepts_well_formed_refs() {
    assert!(validate(&json!({"id": "abc", "type_tag": "ndarray"})));
    assert!(validate(&json!({"id": 7, "type_tag": "Graph"})));
    assert!(validate(&json!({"__type__": "ref", "id": "x", "type_tag": "T", "session_id": "s1"})));
}

#[test]
fn test_validate_rejects_missing_or_empty_fields() {
    let bad = [
        json!({"type_tag": "ndarray"}),
        json!({"id": "", "type_tag": "ndarray"}),
        json!({"id": null, "type_tag": "ndarray"}),
        json!({"id": "abc"}),
        json!({"id": "abc", "type_tag": ""}),
        json!({"id": "abc", "type_tag": "   "}),
        json!({"id": {"nested": 1}, "type_tag": "T"}),
        json!({"id": -3, "type_tag": "T"}),
        json!({"id": 1.5, "type_tag": "T"}),
        json!({"id": "abc", "type_tag": 12}),
        json!("abc"),
        json!(null),
        json!([1, 2]),
    ];
    for payload in &bad {
        assert!(!validate(payload), "accepted {}", payload);
    }
}

#[test]
fn test_to_wire_reports_reason_codes() {
    let missing_id = to_wire(&Ref::unchecked("", "ndarray")).unwrap_err();
    assert_eq!(missing_id.reason, InvalidRefReason::MissingId);
    assert_eq!(missing_id.reason.as_str(), "missing_id");

    let missing_type = to_wire(&Ref::unchecked("abc", "")).unwrap_err();
    assert_eq!(missing_type.reason, InvalidRefReason::MissingType);
    assert_eq!(missing_type.reason.as_str(), "missing_type");

    let empty_session = to_wire(&Ref::unchecked("abc", "T").with_session("")).unwrap_err();
    assert_eq!(empty_session.reason, InvalidRefReason::InvalidFormat);
}

#[test]
fn test_ref_new_checks_fields() {
    assert!(Ref::new("abc", "T").is_ok());
    assert!(Ref::new(42u64, "T").is_ok());
    assert_eq!(Ref::new("", "T").unwrap_err().reason, InvalidRefReason::MissingId);
    assert_eq!(Ref::new("abc", " ").unwrap_err().reason, InvalidRefReason::MissingType);
}

#[test]
fn test_wire_shape_is_canonical() {
    let r = Ref::new("obj-1", "ndarray").unwrap();
    let wire = to_wire(&r).unwrap();
    assert_eq!(
        wire,
        json!({"__type__": "ref", "__schema__": 1, "id": "obj-1", "type_tag": "ndarray"})
    );
    assert!(is_marker(&wire));
}

#[test]
fn test_ref_round_trips_through_wire() {
    let refs = [
        Ref::new("abc", "ndarray").unwrap(),
        Ref::new(99u64, "Graph").unwrap(),
        Ref::new("x", "T")
            .unwrap()
            .with_session("session-1")
            .with_metadata("repr", "<T x>"),
    ];
    for r in &refs {
        let back = from_wire(&to_wire(r).unwrap()).unwrap();
        assert_eq!(&back, r);
    }
}

#[test]
fn test_from_wire_requires_discriminator() {
    let err = from_wire(&json!({"id": "abc", "type_tag": "T"})).unwrap_err();
    assert_eq!(err.reason, InvalidRefReason::InvalidFormat);

    let err = from_wire(&json!({"__type__": "tuple", "id": "abc", "type_tag": "T"})).unwrap_err();
    assert_eq!(err.reason, InvalidRefReason::InvalidFormat);

    let err = from_wire(&json!("ref")).unwrap_err();
    assert_eq!(err.reason, InvalidRefReason::InvalidFormat);
}

#[test]
fn test_from_wire_reports_missing_fields() {
    let err = from_wire(&json!({"__type__": "ref", "type_tag": "T"})).unwrap_err();
    assert_eq!(err.reason, InvalidRefReason::MissingId);

    let err = from_wire(&json!({"__type__": "ref", "id": "abc"})).unwrap_err();
    assert_eq!(err.reason, InvalidRefReason::MissingType);
}

#[test]
fn test_from_wire_rejects_newer_schema() {
    let err = from_wire(&json!({"__type__": "ref", "__schema__": 99, "id": "a", "type_tag": "T"}))
        .unwrap_err();
    assert_eq!(err.reason, InvalidRefReason::InvalidFormat);

    // an absent schema is accepted
    assert!(from_wire(&json!({"__type__": "ref", "id": "a", "type_tag": "T"})).is_ok());
}

#[test]
fn test_ref_display_and_repr() {
    let r = Ref::new("abc", "ndarray").unwrap().with_metadata("repr", "array([1, 2])");
    assert_eq!(r.to_string(), "#Ref<ndarray abc>");
    assert_eq!(r.repr(), Some("array([1, 2])"));
}

// ============================================================================
//  CODEC
// ============================================================================

#[test]
fn test_plain_values_are_plain_json() {
    let value = Value::map([
        ("name", Value::from("gpt")),
        ("cost", Value::from(1.25)),
        ("tokens", Value::from(100)),
        ("tags", Value::from(vec![Value::from("a"), Value::Null])),
        ("ok", Value::from(true)),
    ]);
    let wire = encode(&value).unwrap();
    assert_eq!(
        wire,
        json!({"name": "gpt", "cost": 1.25, "tokens": 100, "tags": ["a", null], "ok": true})
    );
    assert_eq!(decode(&wire).unwrap(), value);
}

#[test]
fn test_tagged_values() {
    let tuple = encode(&Value::tuple([Value::from(1), Value::from("two")])).unwrap();
    assert_eq!(tuple, json!({"__type__": "tuple", "__schema__": 1, "elements": [1, "two"]}));

    let bytes = encode(&Value::bytes(b"hello".to_vec())).unwrap();
    assert_eq!(bytes, json!({"__type__": "bytes", "__schema__": 1, "data": "aGVsbG8="}));
    assert_eq!(decode(&bytes).unwrap(), Value::bytes(b"hello".to_vec()));

    let inf = encode(&Value::Float(f64::INFINITY)).unwrap();
    assert_eq!(inf, json!({"__type__": "special_float", "__schema__": 1, "value": "infinity"}));
    assert_eq!(decode(&inf).unwrap(), Value::Float(f64::INFINITY));

    let nan = decode(&encode(&Value::Float(f64::NAN)).unwrap()).unwrap();
    assert!(nan.as_f64().is_some_and(f64::is_nan));
}

#[test]
fn test_complex_values() {
    let wire = encode(&Value::Complex { re: 1.0, im: -2.5 }).unwrap();
    assert_eq!(wire, json!({"__type__": "complex", "__schema__": 1, "real": 1.0, "imag": -2.5}));

    let value = decode(&json!({"__type__": "complex", "real": 3, "imag": 4.0})).unwrap();
    assert_eq!(value.as_complex(), Some((3.0, 4.0)));

    let err = decode(&json!({"__type__": "complex", "real": 1.0})).unwrap_err();
    assert!(matches!(err, Error::MalformedTag { ref tag, .. } if tag == "complex"));
}

#[test]
fn test_datetime_values_use_iso_strings() {
    let aware = decode(&json!({"__type__": "datetime", "value": "2024-05-06T07:08:09.123456+02:00"})).unwrap();
    let dt = aware.as_datetime().unwrap();
    assert_eq!(dt.offset().local_minus_utc(), 2 * 3600);
    assert_eq!(
        encode(&aware).unwrap(),
        json!({"__type__": "datetime", "__schema__": 1, "value": "2024-05-06T07:08:09.123456+02:00"})
    );

    let naive = decode(&json!({"__type__": "datetime", "value": "2024-05-06T07:08:09"})).unwrap();
    assert_eq!(naive.kind(), "naive_datetime");
    assert_eq!(encode(&naive).unwrap()["value"], json!("2024-05-06T07:08:09"));

    let date = decode(&json!({"__type__": "date", "value": "2024-02-29"})).unwrap();
    assert_eq!(date.as_date(), chrono::NaiveDate::from_ymd_opt(2024, 2, 29).as_ref());
    assert_eq!(encode(&date).unwrap()["value"], json!("2024-02-29"));

    let time = decode(&json!({"__type__": "time", "value": "13:45:00"})).unwrap();
    assert_eq!(time.as_time(), chrono::NaiveTime::from_hms_opt(13, 45, 0).as_ref());
    assert_eq!(encode(&time).unwrap()["value"], json!("13:45:00"));

    let precise = Value::from(chrono::NaiveTime::from_hms_micro_opt(1, 2, 3, 456_789).unwrap());
    assert_eq!(decode(&encode(&precise).unwrap()).unwrap(), precise);
}

#[test]
fn test_datetime_tags_reject_bad_values() {
    for wire in [
        json!({"__type__": "datetime", "value": "yesterday"}),
        json!({"__type__": "date", "value": "2023-02-30"}),
        json!({"__type__": "time"}),
    ] {
        assert!(matches!(decode(&wire), Err(Error::MalformedTag { .. })), "accepted {}", wire);
    }
}

#[test]
fn test_decode_rebuilds_nested_refs() {
    let wire = json!({
        "history": [
            {
                "model": "gpt-4",
                "response": {"__type__": "ref", "__schema__": 1, "id": "r1", "type_tag": "Response", "session_id": "s"},
                "cost": 1.23
            }
        ],
        "pair": {"__type__": "tuple", "elements": [1, {"__type__": "ref", "id": 5, "type_tag": "Node"}]}
    });

    let value = decode(&wire).unwrap();
    let refs = value.refs();
    assert_eq!(refs.len(), 2);
    assert_eq!(refs[0].id, RefId::from("r1"));
    assert_eq!(refs[0].session_id.as_deref(), Some("s"));
    assert_eq!(refs[1].id, RefId::from(5u64));

    let entry = &value.get("history").unwrap().as_list().unwrap()[0];
    assert_eq!(entry.get("model").and_then(Value::as_str), Some("gpt-4"));
    assert_eq!(entry.get("cost").and_then(Value::as_f64), Some(1.23));
}

#[test]
fn test_decode_rejects_malformed_ref_marker() {
    let wire = json!([1, {"__type__": "ref", "type_tag": "T"}]);
    match decode(&wire) {
        Err(Error::InvalidRef(e)) => assert_eq!(e.reason, InvalidRefReason::MissingId),
        other => panic!("expected InvalidRef, got {:?}", other),
    }
}

#[test]
fn test_encode_rejects_invalid_ref_anywhere() {
    let value = Value::map([("inner", Value::from(vec![Value::Ref(Ref::unchecked("", "T"))]))]);
    assert!(matches!(encode(&value), Err(Error::InvalidRef(_))));
}

#[test]
fn test_unknown_tags_stay_maps() {
    let wire = json!({"__type__": "callback", "ref_id": "cb1", "arity": 2});
    let value = decode(&wire).unwrap();
    let map = value.as_map().unwrap();
    assert_eq!(map.get("__type__"), Some(&Value::from("callback")));
    assert_eq!(map.get("arity"), Some(&Value::from(2)));
}

#[test]
fn test_decode_accepts_sets_atoms_and_legacy_floats() {
    assert_eq!(
        decode(&json!({"__type__": "set", "elements": [1, 2]})).unwrap(),
        Value::from(vec![Value::from(1), Value::from(2)])
    );
    assert_eq!(decode(&json!({"__type__": "atom", "value": "ok"})).unwrap(), Value::from("ok"));
    assert_eq!(
        decode(&json!({"__type__": "neg_infinity"})).unwrap(),
        Value::Float(f64::NEG_INFINITY)
    );
}

#[test]
fn test_decode_reports_bad_bytes() {
    let err = decode(&json!({"__type__": "bytes", "data": "!!not base64!!"})).unwrap_err();
    assert!(matches!(err, Error::InvalidBytes(_)));

    let err = decode(&json!({"__type__": "bytes"})).unwrap_err();
    assert!(matches!(err, Error::MalformedTag { .. }));
}

#[test]
fn test_depth_limit() {
    let mut value = Value::Null;
    for _ in 0..(MAX_DEPTH + 2) {
        value = Value::from(vec![value]);
    }
    assert_eq!(encode(&value), Err(Error::DepthExceeded));

    let mut json = json!(null);
    for _ in 0..(MAX_DEPTH + 2) {
        json = json!([json]);
    }
    assert_eq!(decode(&json), Err(Error::DepthExceeded));
}

#[test]
fn test_large_unsigned_numbers_decode_as_floats() {
    let value = decode(&json!(u64::MAX)).unwrap();
    assert_eq!(value.kind(), "float");
}

#[test]
fn test_value_conversions() {
    let m: BTreeMap<String, Value> = [("a".to_string(), Value::from(1))].into_iter().collect();
    assert_eq!(Value::from(m.clone()).as_map(), Some(&m));
    assert_eq!(Value::from(None::<i64>), Value::Null);
    assert_eq!(Value::from(Some("x")), Value::from("x"));
    assert_eq!(Value::from(3).as_f64(), Some(3.0));
}
