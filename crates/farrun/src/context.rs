//! # Execution Context
//!
//! Scoped defaults belong to one logical execution context, never to the process.
//!
//! ## Invariants
//!
//! - "No defaults" and "empty defaults" are the same state: both read back as an
//!   empty [`RuntimeOptions`].
//! - A scope restores exactly what it found, whether the body returns, fails, panics
//!   or, for async bodies, is dropped mid-flight.
//! - Nothing is shared between contexts. [`Context::fork`] is the only way state
//!   moves from one to another.

use std::ops::Deref;
use std::ops::DerefMut;

use futures::future::BoxFuture;

use crate::options::RuntimeOptions;
use crate::runtime::Runtime;

pub struct Context {
    runtime: Runtime,
    defaults: Option<RuntimeOptions>,
    pub(crate) auto_session: Option<String>,
}

impl Context {
    pub(crate) fn new(runtime: Runtime) -> Self {
        Self { runtime, defaults: None, auto_session: None }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Replaces the defaults. `None` or an empty set clears them.
    pub fn set_defaults(&mut self, defaults: impl Into<Option<RuntimeOptions>>) {
        self.defaults = defaults.into().filter(|d| !d.is_empty());
    }

    pub fn get_defaults(&self) -> RuntimeOptions {
        self.defaults.clone().unwrap_or_default()
    }

    pub fn has_defaults(&self) -> bool {
        self.defaults.is_some()
    }

    pub fn clear_defaults(&mut self) {
        self.defaults = None;
    }

    /// Session provisioned for this context by the first call that needed one.
    pub fn auto_session(&self) -> Option<&str> {
        self.auto_session.as_deref()
    }

    /// Installs the current defaults merged with `opts` until the returned guard drops.
    pub fn scope(&mut self, opts: &RuntimeOptions) -> ScopeGuard<'_> {
        let prior = self.defaults.clone();
        let merged = self.get_defaults().merge(opts);
        self.set_defaults(merged);
        ScopeGuard { ctx: self, prior }
    }

    pub fn with_scope<T>(&mut self, opts: &RuntimeOptions, body: impl FnOnce(&mut Context) -> T) -> T {
        let mut guard = self.scope(opts);
        body(&mut *guard)
    }

    /// Async form of [`Context::with_scope`].
    ///
    /// ```ignore
    /// ctx.with_scope_async(&opts, |ctx| async move {
    ///     ctx.call_function("math.sqrt", vec![Value::from(2)], None).await
    /// }.boxed()).await
    /// ```
    pub async fn with_scope_async<T, F>(&mut self, opts: &RuntimeOptions, body: F) -> T
    where
        F: for<'c> FnOnce(&'c mut Context) -> BoxFuture<'c, T>,
    {
        let mut guard = self.scope(opts);
        body(&mut *guard).await
    }

    /// A new context starting from this one's defaults and auto session.
    pub fn fork(&self) -> Context {
        Context {
            runtime: self.runtime.clone(),
            defaults: self.defaults.clone(),
            auto_session: self.auto_session.clone(),
        }
    }

    /// Defaults merged with per-call overrides; overrides win.
    pub fn effective_options(&self, overrides: Option<&RuntimeOptions>) -> RuntimeOptions {
        match overrides {
            Some(overrides) => self.get_defaults().merge(overrides),
            None => self.get_defaults(),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("defaults", &self.defaults)
            .field("auto_session", &self.auto_session)
            .finish_non_exhaustive()
    }
}

/// Restores the defaults that were active when the scope was entered.
pub struct ScopeGuard<'a> {
    ctx: &'a mut Context,
    prior: Option<RuntimeOptions>,
}

impl Deref for ScopeGuard<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.ctx.defaults = self.prior.take();
    }
}
