//! Test doubles for the session pool boundary.
//!
//! [`RecordingPool`] answers from a script and records what it was sent.
//! [`ObjectPool`] is a small in-memory remote runtime that owns objects and hands out refs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use farpack::Ref;
use farpack::RefId;
use farpack::Value;
use farrpc::CallPayload;
use farrpc::CallType;
use farrpc::RawFailure;
use farrpc::Reply;
use farrpc::Target;
use farrpc::WireRequest;
use serde_json::Value as Json;

use crate::session::SessionPool;

// ============================================================================
//  RECORDING POOL
// ============================================================================

type Handler = Box<dyn Fn(&WireRequest) -> Reply + Send + Sync>;

/// Scripted pool: every request is recorded and answered by a handler.
pub struct RecordingPool {
    handler: Handler,
    requests: Mutex<Vec<WireRequest>>,
    ready_checks: AtomicUsize,
    ready_failure: Mutex<Option<RawFailure>>,
    ready_delay: Option<Duration>,
    delay: Option<Duration>,
    chunks: Vec<Json>,
}

impl RecordingPool {
    pub fn new(handler: impl Fn(&WireRequest) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            ready_checks: AtomicUsize::new(0),
            ready_failure: Mutex::new(None),
            ready_delay: None,
            delay: None,
            chunks: Vec::new(),
        }
    }

    /// Answers every request with the same reply.
    pub fn replying(reply: Reply) -> Self {
        Self::new(move |_| reply.clone())
    }

    /// Sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleeps this long in every readiness check.
    pub fn with_readiness_delay(mut self, delay: Duration) -> Self {
        self.ready_delay = Some(delay);
        self
    }

    /// Chunks delivered by `submit_stream` before the final reply.
    pub fn with_chunks(mut self, chunks: Vec<Json>) -> Self {
        self.chunks = chunks;
        self
    }

    /// Readiness fails with `failure` until [`RecordingPool::recover`] is called.
    pub fn failing_readiness(self, failure: RawFailure) -> Self {
        *lock(&self.ready_failure) = Some(failure);
        self
    }

    pub fn recover(&self) {
        *lock(&self.ready_failure) = None;
    }

    pub fn requests(&self) -> Vec<WireRequest> {
        lock(&self.requests).clone()
    }

    pub fn last_request(&self) -> Option<WireRequest> {
        lock(&self.requests).last().cloned()
    }

    pub fn submissions(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn ready_checks(&self) -> usize {
        self.ready_checks.load(Ordering::SeqCst)
    }

    async fn answer(&self, request: WireRequest) -> Reply {
        let reply = (self.handler)(&request);
        lock(&self.requests).push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        reply
    }
}

#[async_trait::async_trait]
impl SessionPool for RecordingPool {
    async fn ensure_ready(&self) -> Result<(), RawFailure> {
        self.ready_checks.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.ready_delay {
            tokio::time::sleep(delay).await;
        }
        match lock(&self.ready_failure).clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    async fn submit(&self, request: WireRequest) -> Reply {
        self.answer(request).await
    }

    async fn submit_stream(&self, request: WireRequest, on_chunk: &mut (dyn FnMut(Json) + Send)) -> Reply {
        for chunk in &self.chunks {
            on_chunk(chunk.clone());
        }
        self.answer(request).await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
//  OBJECT POOL
// ============================================================================

type Function = Arc<dyn Fn(&[Value]) -> Result<Value, RawFailure> + Send + Sync>;
type Method = Arc<dyn Fn(&mut BTreeMap<String, Value>, &[Value]) -> Result<Value, RawFailure> + Send + Sync>;

struct Class {
    type_tag: String,
    fields: Vec<String>,
}

struct RemoteObject {
    type_tag: String,
    session_id: String,
    attrs: BTreeMap<String, Value>,
}

/// An in-memory remote runtime.
///
/// Functions, classes and methods are registered up front. Objects live in the session
/// that constructed them and are only reachable from it.
#[derive(Default)]
pub struct ObjectPool {
    functions: DashMap<String, Function>,
    classes: DashMap<String, Class>,
    methods: DashMap<(String, String), Method>,
    objects: DashMap<u64, RemoteObject>,
    next_id: AtomicU64,
    submissions: AtomicUsize,
}

impl ObjectPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function(
        self,
        path: impl Into<String>,
        f: impl Fn(&[Value]) -> Result<Value, RawFailure> + Send + Sync + 'static,
    ) -> Self {
        self.functions.insert(path.into(), Arc::new(f));
        self
    }

    /// A class whose constructor fills `fields` from positional, then keyword, arguments.
    pub fn class(self, path: impl Into<String>, fields: &[&str]) -> Self {
        let path = path.into();
        let type_tag = path.rsplit('.').next().unwrap_or_default().to_string();
        let fields = fields.iter().map(|f| f.to_string()).collect();
        self.classes.insert(path, Class { type_tag, fields });
        self
    }

    pub fn method(
        self,
        type_tag: impl Into<String>,
        name: impl Into<String>,
        f: impl Fn(&mut BTreeMap<String, Value>, &[Value]) -> Result<Value, RawFailure> + Send + Sync + 'static,
    ) -> Self {
        self.methods.insert((type_tag.into(), name.into()), Arc::new(f));
        self
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    fn execute(&self, request: &WireRequest) -> Result<Value, RawFailure> {
        let payload = request
            .payload()
            .map_err(|e| RawFailure::new(e.to_string()).with_type("ProtocolError"))?;
        let CallPayload { call_type, target, name, args, value } = payload;
        let name = name.unwrap_or_default();

        match (call_type, target) {
            (CallType::Function, Target::Path(path)) => {
                let f = self
                    .functions
                    .get(&path)
                    .map(|f| Arc::clone(f.value()))
                    .ok_or_else(|| no_attribute(&path))?;
                f(&args.positional)
            }
            (CallType::Constructor, Target::Path(path)) => self.construct(&request.session_id, &path, args),
            (CallType::Method, Target::Ref(r)) => {
                let id = self.owned_id(&r, &request.session_id)?;
                let method = self
                    .methods
                    .get(&(r.type_tag.clone(), name.clone()))
                    .map(|m| Arc::clone(m.value()))
                    .ok_or_else(|| no_attribute(&format!("{}.{}", r.type_tag, name)))?;
                let mut object = self.objects.get_mut(&id).ok_or_else(|| gone(&r))?;
                method(&mut object.attrs, &args.positional)
            }
            (CallType::GetAttr, Target::Ref(r)) => {
                let id = self.owned_id(&r, &request.session_id)?;
                let object = self.objects.get(&id).ok_or_else(|| gone(&r))?;
                object
                    .attrs
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| no_attribute(&format!("{}.{}", object.type_tag, name)))
            }
            (CallType::SetAttr, Target::Ref(r)) => {
                let id = self.owned_id(&r, &request.session_id)?;
                let mut object = self.objects.get_mut(&id).ok_or_else(|| gone(&r))?;
                object.attrs.insert(name, value.unwrap_or_default());
                Ok(Value::Null)
            }
            (call_type, _) => Err(RawFailure::new(format!("unsupported {} target", call_type)).with_type("TypeError")),
        }
    }

    fn construct(&self, session_id: &str, path: &str, args: farrpc::Args) -> Result<Value, RawFailure> {
        let (type_tag, fields) = {
            let class = self.classes.get(path).ok_or_else(|| no_attribute(path))?;
            (class.type_tag.clone(), class.fields.clone())
        };

        if args.positional.len() > fields.len() {
            return Err(RawFailure::new(format!(
                "{}() takes {} positional arguments but {} were given",
                type_tag,
                fields.len(),
                args.positional.len()
            ))
            .with_type("TypeError"));
        }

        let mut attrs: BTreeMap<String, Value> = fields.iter().cloned().zip(args.positional).collect();
        attrs.extend(args.keyword);

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.objects.insert(
            id,
            RemoteObject { type_tag: type_tag.clone(), session_id: session_id.to_string(), attrs },
        );

        let handle = Ref::unchecked(id, type_tag.as_str())
            .with_session(session_id)
            .with_metadata("repr", format!("<{} object {}>", type_tag, id));
        Ok(Value::Ref(handle))
    }

    fn owned_id(&self, r: &Ref, session_id: &str) -> Result<u64, RawFailure> {
        let id = match &r.id {
            RefId::Num(n) => *n,
            RefId::Str(s) => s.parse().map_err(|_| gone(r))?,
        };
        let object = self.objects.get(&id).ok_or_else(|| gone(r))?;
        if object.session_id != session_id {
            return Err(RawFailure::new(format!(
                "object {} belongs to session {}, not {}",
                id, object.session_id, session_id
            ))
            .with_type("KeyError"));
        }
        Ok(id)
    }
}

#[async_trait::async_trait]
impl SessionPool for ObjectPool {
    async fn ensure_ready(&self) -> Result<(), RawFailure> {
        Ok(())
    }

    async fn submit(&self, request: WireRequest) -> Reply {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        match self.execute(&request).and_then(|value| {
            farpack::encode(&value).map_err(|e| RawFailure::new(e.to_string()).with_type("EncodeError"))
        }) {
            Ok(json) => Reply::ok(json),
            Err(failure) => Reply::error(failure),
        }
    }
}

fn no_attribute(path: &str) -> RawFailure {
    RawFailure::new(format!("no attribute {:?}", path)).with_type("AttributeError")
}

fn gone(r: &Ref) -> RawFailure {
    RawFailure::new(format!("{} no longer exists", r)).with_type("ReferenceError")
}
