//! # Farrun
//!
//! Dynamic dispatch of calls into a remote runtime, addressed by [`Ref`] handles.
//!
//! ## Architecture
//!
//! - [`SessionPool`]: the external collaborator that owns remote workers. Send a
//!   request, await a reply.
//! - [`Runtime`]: a shared handle to one pool plus its configuration.
//! - [`Context`]: one logical execution context. Owns its scoped defaults and its
//!   auto-provisioned session, and exposes the dispatch operations.
//! - [`RemoteModule`]: static adapter identity, resolved to a remote module path.
//!
//! ## Invariants
//!
//! - Invalid refs and bad paths fail locally; the pool never sees them.
//! - Scoped defaults are restored on every exit path of a scope.
//! - Every failure returned to a caller is a [`StructuredError`].

pub mod adapter;
pub mod builder;
pub mod context;
pub mod dispatch;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod options;
pub mod runtime;
pub mod session;

#[cfg(test)]
mod tests;

pub use adapter::RemoteModule;
pub use adapter::resolve_and_call;
pub use adapter::resolve_and_call_with;
pub use builder::RuntimeBuilder;
pub use context::Context;
pub use context::ScopeGuard;
pub use options::RuntimeOptions;
pub use options::Timeout;
pub use runtime::Runtime;
pub use session::SessionPool;

pub use farpack::Ref;
pub use farpack::Value;
pub use farrpc::Args;
pub use farrpc::CallPayload;
pub use farrpc::ErrorKind;
pub use farrpc::StructuredError;

/// Outcome of every public dispatch operation.
pub type Result<T> = std::result::Result<T, StructuredError>;
