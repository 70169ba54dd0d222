use std::time::Duration;

use serde_json::json;

use crate::adapter::declared_name;
use crate::adapter::normalize;
use crate::mock::RecordingPool;
use crate::*;

fn runtime() -> Runtime {
    Runtime::new(RecordingPool::replying(farrpc::Reply::ok(json!(null))))
}

fn opts(pairs: &[(&str, serde_json::Value)]) -> RuntimeOptions {
    pairs.iter().cloned().collect()
}

// ============================================================================
//  OPTIONS
// ============================================================================

#[test]
fn test_merge_is_right_biased() {
    let defaults = opts(&[("a", json!(1)), ("b", json!(2))]);
    let overrides = opts(&[("b", json!(3)), ("c", json!(4))]);
    assert_eq!(
        defaults.merge(&overrides),
        opts(&[("a", json!(1)), ("b", json!(3)), ("c", json!(4))])
    );
}

#[test]
fn test_typed_accessors() {
    let o = RuntimeOptions::new()
        .with_session_id("s-1")
        .with_pool("gpu")
        .with_timeout(Timeout::After(Duration::from_millis(250)))
        .with_stream(true)
        .with_affinity("strict");
    assert_eq!(o.session_id(), Some("s-1"));
    assert_eq!(o.pool(), Some("gpu"));
    assert_eq!(o.timeout(), Some(Timeout::After(Duration::from_millis(250))));
    assert!(o.stream());
    assert_eq!(o.affinity(), Some("strict"));
    assert!(o.check().is_ok());

    let never = RuntimeOptions::new().with_timeout(Timeout::Never);
    assert_eq!(never.get("timeout"), Some(&json!("infinity")));
    assert_eq!(never.timeout(), Some(Timeout::Never));
}

#[test]
fn test_check_rejects_mistyped_options() {
    for bad in [
        opts(&[("timeout", json!(-5))]),
        opts(&[("timeout", json!("soon"))]),
        opts(&[("session_id", json!(""))]),
        opts(&[("stream", json!("yes"))]),
    ] {
        let err = bad.check().unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
    }
    assert!(opts(&[("custom", json!({"any": "thing"})), ("pool", json!(null))]).check().is_ok());
}

// ============================================================================
//  CONTEXT
// ============================================================================

#[test]
fn test_set_defaults_with_empty_clears() {
    let mut ctx = runtime().context();
    ctx.set_defaults(opts(&[("a", json!(1))]));
    assert!(ctx.has_defaults());

    ctx.set_defaults(RuntimeOptions::new());
    assert!(!ctx.has_defaults());
    assert!(ctx.get_defaults().is_empty());

    ctx.set_defaults(opts(&[("a", json!(1))]));
    ctx.set_defaults(None::<RuntimeOptions>);
    assert!(!ctx.has_defaults());
}

#[test]
fn test_scope_merges_and_restores() {
    let mut ctx = runtime().context();
    ctx.set_defaults(opts(&[("a", json!(1)), ("b", json!(2))]));

    let seen = ctx.with_scope(&opts(&[("b", json!(3))]), |ctx| ctx.get_defaults());
    assert_eq!(seen, opts(&[("a", json!(1)), ("b", json!(3))]));
    assert_eq!(ctx.get_defaults(), opts(&[("a", json!(1)), ("b", json!(2))]));
}

#[test]
fn test_scope_without_prior_defaults_clears_afterwards() {
    let mut ctx = runtime().context();
    ctx.with_scope(&opts(&[("x", json!(true))]), |ctx| {
        assert!(ctx.has_defaults());
    });
    assert!(!ctx.has_defaults());
}

#[test]
fn test_scope_restores_after_panic() {
    let mut ctx = runtime().context();
    ctx.set_defaults(opts(&[("a", json!(1))]));

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        ctx.with_scope(&opts(&[("a", json!(2))]), |ctx| {
            if ctx.has_defaults() {
                panic!("body failed");
            }
            ctx.get_defaults()
        })
    }));
    assert!(outcome.is_err());
    assert_eq!(ctx.get_defaults(), opts(&[("a", json!(1))]));
}

#[test]
fn test_nested_scopes_unwind_in_order() {
    let mut ctx = runtime().context();
    {
        let mut outer = ctx.scope(&opts(&[("a", json!(1))]));
        {
            let inner = outer.scope(&opts(&[("b", json!(2))]));
            assert_eq!(inner.get_defaults(), opts(&[("a", json!(1)), ("b", json!(2))]));
        }
        assert_eq!(outer.get_defaults(), opts(&[("a", json!(1))]));
    }
    assert!(!ctx.has_defaults());
}

#[test]
fn test_fork_copies_state_without_sharing() {
    let mut ctx = runtime().context();
    ctx.set_defaults(opts(&[("a", json!(1))]));
    let mut fork = ctx.fork();
    fork.set_defaults(opts(&[("a", json!(2))]));
    assert_eq!(ctx.get_defaults(), opts(&[("a", json!(1))]));
}

#[test]
fn test_effective_options_prefer_overrides() {
    let mut ctx = runtime().context();
    ctx.set_defaults(opts(&[("a", json!(1)), ("b", json!(2))]));
    let effective = ctx.effective_options(Some(&opts(&[("b", json!(3)), ("c", json!(4))])));
    assert_eq!(effective, opts(&[("a", json!(1)), ("b", json!(3)), ("c", json!(4))]));
    assert_eq!(ctx.effective_options(None), ctx.get_defaults());
}

// ============================================================================
//  ADAPTER IDENTITY
// ============================================================================

#[test]
fn test_normalization_rule() {
    assert_eq!(normalize("Vector3"), "vector3");
    assert_eq!(normalize("LinearAlgebra"), "linear_algebra");
    assert_eq!(normalize("HTTPClient"), "http_client");
    assert_eq!(normalize("Numpy.Linalg"), "numpy.linalg");
    assert_eq!(normalize("numpy.linalg"), "numpy.linalg");
    assert_eq!(normalize("my-module"), "my_module");
    assert_eq!(normalize("_Private_"), "private");
    assert_eq!(normalize("a..B"), "a.b");
    assert_eq!(normalize("..."), "");
    assert_eq!(normalize("__"), "");
}

#[allow(dead_code)]
struct Generic<T>(T);

#[test]
fn test_declared_name_is_last_segment_without_generics() {
    assert_eq!(declared_name::<Generic<Vec<u8>>>(), "Generic");
    assert_eq!(declared_name::<RuntimeOptions>(), "RuntimeOptions");
}

#[test]
fn test_runtime_config_defaults() {
    let rt = runtime();
    assert_eq!(rt.config().default_timeout, Timeout::After(Duration::from_secs(30)));
    assert_eq!(rt.config().auto_session_prefix, "auto");
    assert!(rt.config().check_readiness);
    assert!(!rt.is_ready());
}
