//! Fluent configuration of a [`Runtime`].

use std::sync::Arc;
use std::time::Duration;

use crate::options::Timeout;
use crate::runtime::Runtime;
use crate::runtime::RuntimeConfig;
use crate::session::SessionPool;

pub struct RuntimeBuilder {
    pool: Arc<dyn SessionPool>,
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    pub fn new(pool: impl SessionPool) -> Self {
        Self { pool: Arc::new(pool), config: RuntimeConfig::default() }
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = Timeout::After(timeout);
        self
    }

    /// Calls wait for their reply however long it takes, unless a `timeout` option says otherwise.
    pub fn no_default_timeout(mut self) -> Self {
        self.config.default_timeout = Timeout::Never;
        self
    }

    pub fn auto_session_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.auto_session_prefix = prefix.into();
        self
    }

    /// When off, the caller owns readiness and auto sessions are named without
    /// consulting the pool.
    pub fn check_readiness(mut self, check: bool) -> Self {
        self.config.check_readiness = check;
        self
    }

    pub fn build(self) -> Runtime {
        Runtime::from_parts(self.pool, self.config)
    }
}
