//! # Runtime
//!
//! A cheap, clonable handle to one session pool and its configuration. All
//! per-context state lives in [`Context`]; the runtime itself only tracks readiness.

use std::sync::Arc;
use std::time::Duration;

use farrpc::ErrorKind;
use farrpc::StructuredError;
use tokio::sync::OnceCell;
use tracing::debug;
use tracing::warn;

use crate::builder::RuntimeBuilder;
use crate::context::Context;
use crate::options::Timeout;
use crate::session::SessionPool;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_AUTO_PREFIX: &str = "auto";

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Applied when no `timeout` option is in effect.
    pub default_timeout: Timeout,
    /// Auto-provisioned sessions are named `{prefix}_{uuid}`.
    pub auto_session_prefix: String,
    /// Whether the pool's readiness hook runs before the first auto session.
    pub check_readiness: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_timeout: Timeout::After(DEFAULT_TIMEOUT),
            auto_session_prefix: DEFAULT_AUTO_PREFIX.to_string(),
            check_readiness: true,
        }
    }
}

struct Inner {
    pool: Arc<dyn SessionPool>,
    config: RuntimeConfig,
    ready: OnceCell<()>,
}

#[derive(Clone)]
pub struct Runtime {
    inner: Arc<Inner>,
}

impl Runtime {
    pub fn builder(pool: impl SessionPool) -> RuntimeBuilder {
        RuntimeBuilder::new(pool)
    }

    /// A runtime with the default configuration.
    pub fn new(pool: impl SessionPool) -> Self {
        Self::builder(pool).build()
    }

    pub(crate) fn from_parts(pool: Arc<dyn SessionPool>, config: RuntimeConfig) -> Self {
        Self { inner: Arc::new(Inner { pool, config, ready: OnceCell::new() }) }
    }

    /// A fresh execution context with no defaults and no session.
    pub fn context(&self) -> Context {
        Context::new(self.clone())
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub(crate) fn pool(&self) -> &dyn SessionPool {
        self.inner.pool.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.initialized()
    }

    /// Runs the pool's readiness hook until it succeeds once.
    ///
    /// A failure is not cached; the next call tries again. Failures the translator
    /// cannot place are reported as `remote_unavailable`.
    pub async fn ensure_ready(&self) -> Result<(), StructuredError> {
        self.inner
            .ready
            .get_or_try_init(|| async {
                debug!("checking session pool readiness");
                self.inner.pool.ensure_ready().await.map_err(|raw| {
                    let err = farrpc::translate(&raw);
                    let err = match err.kind {
                        ErrorKind::RemoteError => {
                            StructuredError::unavailable(err.message).with_trace(err.raw_remote_trace)
                        }
                        _ => err,
                    };
                    warn!(kind = %err.kind, "session pool is not ready: {}", err.message);
                    err
                })
            })
            .await
            .map(|_| ())
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("ready", &self.is_ready())
            .finish()
    }
}
