//! # Session Pool Boundary
//!
//! The narrow contract with whatever owns the remote workers.
//!
//! ## Philosophy
//!
//! - **Frame-Oriented**: The pool receives a [`WireRequest`] and answers a [`Reply`]. It
//!   knows nothing about local values, scopes or error translation.
//! - **Request-Response**: "send a request, await a reply". Streaming delivers chunks
//!   through a callback and still finishes with one reply.
//! - **Failures are data**: A pool reports failures as [`RawFailure`]s, never as Rust
//!   errors, so translation stays in one place.

use std::sync::Arc;

use farrpc::RawFailure;
use farrpc::Reply;
use farrpc::WireRequest;
use serde_json::Value as Json;

/// A collaborator that executes requests in the remote runtime.
///
/// Object safe; the runtime holds it as `Arc<dyn SessionPool>`.
#[async_trait::async_trait]
pub trait SessionPool: Send + Sync + 'static {
    /// Idempotent readiness check and auto-start hook.
    ///
    /// Called lazily before the first auto-provisioned session.
    async fn ensure_ready(&self) -> Result<(), RawFailure>;

    /// Executes one request against `request.session_id` and returns its reply.
    ///
    /// # invariants
    /// - Must not retry on the caller's behalf unless the pool itself guarantees it.
    /// - Must pass wire refs inside `request.call` through untouched.
    async fn submit(&self, request: WireRequest) -> Reply;

    /// Like [`SessionPool::submit`], but hands each incremental chunk to `on_chunk`
    /// before the final reply.
    async fn submit_stream(&self, request: WireRequest, on_chunk: &mut (dyn FnMut(Json) + Send)) -> Reply {
        let _ = on_chunk;
        Reply::error(
            RawFailure::new(format!(
                "session pool does not support streaming (request {})",
                request.correlation_id
            ))
            .with_type("NotImplementedError"),
        )
    }
}

#[async_trait::async_trait]
impl<P: SessionPool + ?Sized> SessionPool for Arc<P> {
    async fn ensure_ready(&self) -> Result<(), RawFailure> {
        (**self).ensure_ready().await
    }

    async fn submit(&self, request: WireRequest) -> Reply {
        (**self).submit(request).await
    }

    async fn submit_stream(&self, request: WireRequest, on_chunk: &mut (dyn FnMut(Json) + Send)) -> Reply {
        (**self).submit_stream(request, on_chunk).await
    }
}
