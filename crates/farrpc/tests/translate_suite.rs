//! Replies as a pool would send them, decoded and translated.

use serde_json::json;

use farrpc::ErrorKind;
use farrpc::Reply;
use farrpc::translate;

fn failure_of(reply: serde_json::Value) -> farrpc::RawFailure {
    match serde_json::from_value::<Reply>(reply).unwrap() {
        Reply::Error { raw_failure } => raw_failure,
        Reply::Ok { .. } => panic!("expected an error reply"),
    }
}

#[test]
fn test_pool_replies_translate_to_kinds() {
    let cases = [
        (
            json!({"status": "error", "raw_failure": {
                "message": "Unable to allocate 7.45 GiB for an array with shape (1000, 1000, 1000) and data type float64",
                "error_type": "numpy.core._exceptions._ArrayMemoryError"
            }}),
            ErrorKind::OutOfMemory,
        ),
        (
            json!({"status": "error", "raw_failure": {
                "message": "RuntimeError: expected dtype float32 but got float64",
                "error_type": "RuntimeError"
            }}),
            ErrorKind::DtypeMismatch,
        ),
        (
            json!({"status": "error", "raw_failure": {
                "message": "pool is not ready: worker failed to start",
                "error_type": "PoolNotReady"
            }}),
            ErrorKind::RemoteUnavailable,
        ),
        (
            json!({"status": "error", "raw_failure": {
                "message": "deadline exceeded after 30000 ms",
                "fields": {"origin": "pool"}
            }}),
            ErrorKind::Timeout,
        ),
    ];

    for (reply, kind) in cases {
        let err = translate(&failure_of(reply));
        assert_eq!(err.kind, kind, "{}", err.message);
        assert!(err.suggestion.is_some());
    }
}

#[test]
fn test_user_code_timeouts_are_not_pool_timeouts() {
    let raw = failure_of(json!({"status": "error", "raw_failure": {
        "message": "Read timed out. (read timeout=5)",
        "error_type": "ReadTimeout",
        "trace": "Traceback (most recent call last): ..."
    }}));
    let err = translate(&raw);
    assert_eq!(err.kind, ErrorKind::RemoteError);
    assert_eq!(err.message, "Read timed out. (read timeout=5)");
    assert!(err.raw_remote_trace.is_some());
}

#[test]
fn test_dtype_details_from_expected_got_form() {
    let raw = failure_of(json!({"status": "error", "raw_failure": {
        "message": "expected dtype float32 but got float64"
    }}));
    let err = translate(&raw);
    assert_eq!(err.detail("expected"), Some(&json!("float32")));
    assert_eq!(err.detail("actual"), Some(&json!("float64")));
}

#[test]
fn test_translated_error_serializes_for_callers() {
    let raw = failure_of(json!({"status": "error", "raw_failure": {
        "message": "No module named 'torch'",
        "error_type": "ModuleNotFoundError",
        "trace": "Traceback (most recent call last): ..."
    }}));
    let err = translate(&raw);
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["kind"], json!("environment_error"));
    assert_eq!(json["details"]["missing_packages"], json!(["torch"]));
    assert_eq!(json["raw_remote_trace"], json!("Traceback (most recent call last): ..."));
}
