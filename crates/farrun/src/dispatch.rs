//! # Dynamic Dispatch
//!
//! The public call operations, implemented on [`Context`].
//!
//! ## Pipeline
//!
//! 1. Validate and encode the payload, converting every ref to its wire marker.
//!    Bad refs, paths and names fail here and never reach the pool.
//! 2. Merge the context's defaults with the per-call overrides.
//! 3. Resolve the effective timeout.
//! 4. Pick a session: the `session_id` option, then the target ref's own session,
//!    then this context's auto session, provisioning one if needed.
//! 5. Step 4 and the submission share one deadline, so a hanging readiness
//!    check still ends in `timeout`.
//! 6. Decode the reply, rebuilding refs at any depth, or translate the raw failure.

use std::future::Future;

use farpack::Ref;
use farpack::Value;
use farrpc::Args;
use farrpc::CallPayload;
use farrpc::Reply;
use farrpc::StructuredError;
use farrpc::WireRequest;
use serde_json::Value as Json;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::Result;
use crate::context::Context;
use crate::options;
use crate::options::RuntimeOptions;
use crate::options::Timeout;

impl Context {
    /// Invokes a module-level function, e.g. `math.sqrt`.
    pub async fn call_function(
        &mut self,
        path: &str,
        args: impl Into<Args>,
        opts: Option<&RuntimeOptions>,
    ) -> Result<Value> {
        self.dispatch(CallPayload::function(path, args), opts).await
    }

    /// Instantiates a remote class; the result is normally a [`Ref`].
    pub async fn construct(
        &mut self,
        path: &str,
        args: impl Into<Args>,
        opts: Option<&RuntimeOptions>,
    ) -> Result<Value> {
        self.dispatch(CallPayload::constructor(path, args), opts).await
    }

    pub async fn call_method(
        &mut self,
        target: &Ref,
        method: &str,
        args: impl Into<Args>,
        opts: Option<&RuntimeOptions>,
    ) -> Result<Value> {
        self.dispatch(CallPayload::method(target.clone(), method, args), opts).await
    }

    pub async fn get_attr(&mut self, target: &Ref, name: &str, opts: Option<&RuntimeOptions>) -> Result<Value> {
        self.dispatch(CallPayload::get_attr(target.clone(), name), opts).await
    }

    pub async fn set_attr(
        &mut self,
        target: &Ref,
        name: &str,
        value: impl Into<Value>,
        opts: Option<&RuntimeOptions>,
    ) -> Result<Value> {
        self.dispatch(CallPayload::set_attr(target.clone(), name, value), opts).await
    }

    /// Invokes a module-level function whose result arrives in chunks.
    ///
    /// Each chunk is decoded and passed to `on_chunk`; the final reply value is
    /// returned. A chunk that does not decode ends the call with `remote_error`.
    pub async fn stream_function<F>(
        &mut self,
        path: &str,
        args: impl Into<Args>,
        opts: Option<&RuntimeOptions>,
        mut on_chunk: F,
    ) -> Result<Value>
    where
        F: FnMut(Value) + Send,
    {
        let mut overrides = opts.cloned().unwrap_or_default();
        overrides.insert(options::STREAM, true);

        let payload = CallPayload::function(path, args);
        let (call, options) = self.prepare(&payload, Some(&overrides))?;
        let limit = self.limit(&options);
        let correlation_id = Uuid::new_v4().to_string();

        let mut broken: Option<StructuredError> = None;
        let mut forward = |chunk: Json| {
            if broken.is_some() {
                return;
            }
            match farpack::decode(&chunk) {
                Ok(value) => on_chunk(value),
                Err(e) => broken = Some(StructuredError::remote(format!("malformed stream chunk: {}", e))),
            }
        };

        let exchange = async {
            let request = self.address(&payload, call, &options, &correlation_id).await?;
            Ok::<_, StructuredError>(self.runtime().pool().submit_stream(request, &mut forward).await)
        };
        let reply = within(limit, &correlation_id, exchange).await??;

        if let Some(err) = broken {
            warn!(correlation_id = %correlation_id, kind = %err.kind, "stream aborted: {}", err.message);
            return Err(err);
        }
        settle(&correlation_id, reply)
    }

    /// Runs each call in order and returns one result per call.
    ///
    /// A failing call, local or remote, does not stop the calls after it. `opts` applies
    /// to every call, and each call gets its own timeout.
    pub async fn call_batch(&mut self, calls: Vec<CallPayload>, opts: Option<&RuntimeOptions>) -> Vec<Result<Value>> {
        debug!(calls = calls.len(), "dispatching batch");
        let mut results = Vec::with_capacity(calls.len());
        for payload in calls {
            results.push(self.dispatch(payload, opts).await);
        }
        results
    }

    async fn dispatch(&mut self, payload: CallPayload, opts: Option<&RuntimeOptions>) -> Result<Value> {
        let (call, options) = self.prepare(&payload, opts)?;
        let limit = self.limit(&options);
        let correlation_id = Uuid::new_v4().to_string();

        let exchange = async {
            let request = self.address(&payload, call, &options, &correlation_id).await?;
            Ok::<_, StructuredError>(self.runtime().pool().submit(request).await)
        };
        let reply = within(limit, &correlation_id, exchange).await??;
        settle(&correlation_id, reply)
    }

    /// Steps 1 to 3: the encoded call and its effective options.
    fn prepare(&self, payload: &CallPayload, opts: Option<&RuntimeOptions>) -> Result<(Json, RuntimeOptions)> {
        let call = payload.to_wire().map_err(encode_error)?;
        let options = self.effective_options(opts);
        options.check()?;
        Ok((call, options))
    }

    fn limit(&self, options: &RuntimeOptions) -> Timeout {
        options.timeout().unwrap_or(self.runtime().config().default_timeout)
    }

    /// Step 4: picks the session and builds the request.
    async fn address(
        &mut self,
        payload: &CallPayload,
        call: Json,
        options: &RuntimeOptions,
        correlation_id: &str,
    ) -> Result<WireRequest> {
        let session_id = self.resolve_session(payload, options).await?;
        let request = WireRequest {
            correlation_id: correlation_id.to_string(),
            session_id,
            call,
            options: options.to_wire(),
        };

        debug!(
            correlation_id = %request.correlation_id,
            call_type = %payload.call_type,
            session_id = %request.session_id,
            "dispatching call"
        );
        Ok(request)
    }

    async fn resolve_session(&mut self, payload: &CallPayload, options: &RuntimeOptions) -> Result<String> {
        if let Some(session_id) = options.session_id() {
            return Ok(session_id.to_string());
        }
        if let Some(session_id) = payload.target_ref().and_then(|r| r.session_id.as_deref()) {
            return Ok(session_id.to_string());
        }
        if let Some(session_id) = &self.auto_session {
            return Ok(session_id.clone());
        }

        let runtime = self.runtime().clone();
        if runtime.config().check_readiness {
            runtime.ensure_ready().await?;
        }

        let session_id = format!("{}_{}", runtime.config().auto_session_prefix, Uuid::new_v4().simple());
        info!(session_id = %session_id, "provisioned auto session");
        self.auto_session = Some(session_id.clone());
        Ok(session_id)
    }
}

/// Step 5: awaits session resolution and the reply, giving up once `limit` elapses.
///
/// Readiness checks run inside the same deadline as the submission.
async fn within<T>(limit: Timeout, correlation_id: &str, exchange: impl Future<Output = T>) -> Result<T> {
    match limit {
        Timeout::Never => Ok(exchange.await),
        Timeout::After(after) => tokio::time::timeout(after, exchange).await.map_err(|_| {
            warn!(correlation_id = %correlation_id, "call timed out after {:?}", after);
            StructuredError::timeout(after)
        }),
    }
}

/// Step 6.
fn settle(correlation_id: &str, reply: Reply) -> Result<Value> {
    let err = match reply {
        Reply::Ok { value } => match farpack::decode(&value) {
            Ok(value) => return Ok(value),
            Err(e) => StructuredError::remote(format!("malformed result: {}", e)),
        },
        Reply::Error { raw_failure } => farrpc::translate(&raw_failure),
    };
    warn!(correlation_id = %correlation_id, kind = %err.kind, "remote call failed: {}", err.message);
    Err(err)
}

fn encode_error(e: farrpc::Error) -> StructuredError {
    match e {
        farrpc::Error::Payload(e) => e.into(),
        farrpc::Error::Pack(farpack::Error::InvalidRef(e)) => e.into(),
        farrpc::Error::Pack(e) => StructuredError::validation(e.to_string()),
        farrpc::Error::ProtocolViolation(msg) => StructuredError::validation(msg),
    }
}
