//! Scoped defaults: restoration on every exit path, isolation between contexts.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;

use farrpc::Reply;
use farrun::Args;
use farrun::Context;
use farrun::ErrorKind;
use farrun::Runtime;
use farrun::RuntimeOptions;
use farrun::mock::RecordingPool;

fn runtime() -> (Arc<RecordingPool>, Runtime) {
    let pool = Arc::new(RecordingPool::replying(Reply::ok(json!(null))));
    (Arc::clone(&pool), Runtime::new(pool))
}

fn random_options(rng: &mut StdRng) -> RuntimeOptions {
    let keys = ["a", "b", "c", "pool", "affinity"];
    let mut opts = RuntimeOptions::new();
    for key in keys {
        if rng.gen_bool(0.5) {
            opts.insert(key, rng.gen_range(0..100));
        }
    }
    opts
}

#[test]
fn test_empty_scope_is_idempotent_for_any_prior_state() {
    let (_pool, runtime) = runtime();
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..200 {
        let mut ctx = runtime.context();
        let prior = random_options(&mut rng);
        ctx.set_defaults(prior.clone());
        let had_defaults = ctx.has_defaults();

        let failed: Result<(), &str> = ctx.with_scope(&RuntimeOptions::new(), |_| Err("body failed"));
        assert!(failed.is_err());

        assert_eq!(ctx.get_defaults(), prior);
        assert_eq!(ctx.has_defaults(), had_defaults);
    }
}

#[test]
fn test_random_nested_scopes_restore_exactly() {
    let (_pool, runtime) = runtime();
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..100 {
        let mut ctx = runtime.context();
        if rng.gen_bool(0.5) {
            ctx.set_defaults(random_options(&mut rng));
        }
        let before = ctx.get_defaults();
        let depth = rng.gen_range(1..6);
        nest(&mut ctx, &mut rng, depth);
        assert_eq!(ctx.get_defaults(), before);
    }
}

fn nest(ctx: &mut Context, rng: &mut StdRng, depth: usize) {
    if depth == 0 {
        return;
    }
    let opts = random_options(rng);
    let expected = ctx.get_defaults().merge(&opts);
    let outside = ctx.get_defaults();
    ctx.with_scope(&opts, |inner| {
        assert_eq!(inner.get_defaults(), expected);
        nest(inner, rng, depth - 1);
        assert_eq!(inner.get_defaults(), expected);
    });
    assert_eq!(ctx.get_defaults(), outside);
}

#[tokio::test]
async fn test_async_scope_applies_to_calls_and_restores_on_error() {
    let (pool, runtime) = runtime();
    let mut ctx = runtime.context();
    ctx.set_defaults(RuntimeOptions::new().with("pool", "cpu"));

    let scoped = RuntimeOptions::new().with("pool", "gpu");
    let result = ctx
        .with_scope_async(&scoped, |ctx| {
            async move {
                ctx.call_function("train.step", Args::new(), None).await?;
                ctx.call_method(&farrun::Ref::unchecked("", "T"), "f", Args::new(), None).await
            }
            .boxed()
        })
        .await;

    assert_eq!(result.unwrap_err().kind, ErrorKind::InvalidRef);
    assert_eq!(pool.last_request().unwrap().options.get("pool"), Some(&json!("gpu")));
    assert_eq!(ctx.get_defaults(), RuntimeOptions::new().with("pool", "cpu"));
}

#[tokio::test]
async fn test_cancelled_async_scope_restores() {
    let pool = Arc::new(RecordingPool::replying(Reply::ok(1)).with_delay(Duration::from_secs(5)));
    let runtime = Runtime::new(Arc::clone(&pool));
    let mut ctx = runtime.context();

    let scoped = RuntimeOptions::new().with("a", 1);
    let call = ctx.with_scope_async(&scoped, |ctx| {
        async move { ctx.call_function("slow.op", Args::new(), None).await }.boxed()
    });
    let outcome = tokio::time::timeout(Duration::from_millis(20), call).await;

    assert!(outcome.is_err());
    assert!(!ctx.has_defaults());
}

#[tokio::test]
async fn test_concurrent_contexts_do_not_share_defaults() {
    let (pool, runtime) = runtime();
    let mut tasks = Vec::new();

    for worker in 0..8 {
        let mut ctx = runtime.context();
        tasks.push(tokio::spawn(async move {
            let mine = RuntimeOptions::new().with("worker", worker);
            ctx.with_scope_async(&mine, |ctx| {
                async move {
                    for _ in 0..5 {
                        tokio::task::yield_now().await;
                        assert_eq!(ctx.get_defaults().get("worker"), Some(&json!(worker)));
                        ctx.call_function("f.g", Args::new(), None).await?;
                    }
                    Ok::<_, farrun::StructuredError>(())
                }
                .boxed()
            })
            .await?;
            assert!(!ctx.has_defaults());
            Ok::<_, farrun::StructuredError>(ctx.auto_session().map(str::to_string))
        }));
    }

    let mut sessions = Vec::new();
    for task in tasks {
        sessions.push(task.await.unwrap().unwrap());
    }
    sessions.sort();
    sessions.dedup();
    assert_eq!(sessions.len(), 8);

    for request in pool.requests() {
        assert!(request.options.contains_key("worker"));
    }
}

#[tokio::test]
async fn test_fork_propagates_session_and_defaults() -> anyhow::Result<()> {
    let (pool, runtime) = runtime();
    let mut parent = runtime.context();
    parent.set_defaults(RuntimeOptions::new().with("a", 1));
    parent.call_function("f.g", Args::new(), None).await?;

    let mut child = parent.fork();
    let handle = tokio::spawn(async move {
        child.call_function("f.h", Args::new(), None).await.map(|_| child)
    });
    let child = handle.await??;

    assert_eq!(child.auto_session(), parent.auto_session());
    let requests = pool.requests();
    assert_eq!(requests[0].session_id, requests[1].session_id);
    assert_eq!(requests[1].options.get("a"), Some(&json!(1)));
    Ok(())
}
