//! # Call-Site Resolution
//!
//! Adapters call remote functions under their own module identity. The identity is
//! static: each adapter type implements [`RemoteModule`], usually through
//! [`remote_module!`](crate::remote_module), and its remote path is derived once from
//! the type's declared name or from an explicit path.
//!
//! ## Normalization
//!
//! Split on `.`; in each segment put `_` at lower-to-upper and acronym-to-word
//! boundaries, lowercase, map anything outside `[a-z0-9_]` to `_` and trim `_`; drop
//! empty segments; join with `.`.
//!
//! `Vector3` -> `vector3`, `LinearAlgebra` -> `linear_algebra`,
//! `HTTPClient` -> `http_client`, `Numpy.Linalg` -> `numpy.linalg`.

use farpack::Value;
use farrpc::Args;
use farrpc::StructuredError;

use crate::Result;
use crate::context::Context;
use crate::options::RuntimeOptions;

pub const UNRESOLVED_MODULE: &str = "unable to determine calling module";

/// A local adapter standing for one remote module.
pub trait RemoteModule: Sized {
    /// Explicit dotted path. When absent the type's own name is used.
    const PATH: Option<&'static str> = None;

    /// Normalized remote module path, or `None` when the identity normalizes to nothing.
    fn remote_path() -> Option<String> {
        resolve_path::<Self>()
    }
}

#[doc(hidden)]
pub fn resolve_path<M: RemoteModule>() -> Option<String> {
    let declared = match M::PATH {
        Some(path) => path.to_string(),
        None => declared_name::<M>(),
    };
    let path = normalize(&declared);
    (!path.is_empty()).then_some(path)
}

/// Last path segment of a type's name, generics stripped.
pub fn declared_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

pub fn normalize(declared: &str) -> String {
    declared
        .split('.')
        .map(normalize_segment)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

fn normalize_segment(segment: &str) -> String {
    let chars: Vec<char> = segment.chars().collect();
    let mut out = String::with_capacity(segment.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || (prev.is_uppercase() && next_is_lower) {
                out.push('_');
            }
        }
        for lower in c.to_lowercase() {
            if lower.is_ascii_lowercase() || lower.is_ascii_digit() || lower == '_' {
                out.push(lower);
            } else {
                out.push('_');
            }
        }
    }

    out.trim_matches('_').to_string()
}

/// Calls `function` in the remote module `M` stands for.
pub async fn resolve_and_call<M: RemoteModule>(
    ctx: &mut Context,
    function: &str,
    args: impl Into<Args>,
) -> Result<Value> {
    resolve_and_call_with::<M>(ctx, function, args, None).await
}

pub async fn resolve_and_call_with<M: RemoteModule>(
    ctx: &mut Context,
    function: &str,
    args: impl Into<Args>,
    opts: Option<&RuntimeOptions>,
) -> Result<Value> {
    let Some(module) = M::remote_path() else {
        return Err(StructuredError::validation(UNRESOLVED_MODULE));
    };
    ctx.call_function(&format!("{}.{}", module, function), args, opts).await
}

/// Declares an adapter type bound to a remote module.
///
/// ```ignore
/// remote_module! {
///     /// Adapter for the remote `linear_algebra` module.
///     pub struct LinearAlgebra;
/// }
///
/// remote_module! {
///     pub struct Linalg = "numpy.linalg";
/// }
///
/// let norm = Linalg::call(&mut ctx, "norm", vec![v]).await?;
/// ```
#[macro_export]
macro_rules! remote_module {
    (@cached) => {{
        static PATH: ::std::sync::OnceLock<::std::option::Option<::std::string::String>> =
            ::std::sync::OnceLock::new();
        PATH.get_or_init($crate::adapter::resolve_path::<Self>).clone()
    }};
    (@call $name:ident) => {
        impl $name {
            /// Calls `function` in this adapter's remote module.
            #[allow(dead_code)]
            pub async fn call(
                ctx: &mut $crate::Context,
                function: &str,
                args: impl ::std::convert::Into<$crate::Args>,
            ) -> $crate::Result<$crate::Value> {
                $crate::resolve_and_call::<Self>(ctx, function, args).await
            }
        }
    };
    ($(#[$meta:meta])* $vis:vis struct $name:ident;) => {
        $(#[$meta])*
        $vis struct $name;

        impl $crate::RemoteModule for $name {
            fn remote_path() -> ::std::option::Option<::std::string::String> {
                $crate::remote_module!(@cached)
            }
        }

        $crate::remote_module!(@call $name);
    };
    ($(#[$meta:meta])* $vis:vis struct $name:ident = $path:literal;) => {
        $(#[$meta])*
        $vis struct $name;

        impl $crate::RemoteModule for $name {
            const PATH: ::std::option::Option<&'static str> = ::std::option::Option::Some($path);

            fn remote_path() -> ::std::option::Option<::std::string::String> {
                $crate::remote_module!(@cached)
            }
        }

        $crate::remote_module!(@call $name);
    };
}
