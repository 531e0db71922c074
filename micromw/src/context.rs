//! Request-scoped values.
//!
//! A [`Context`] is an immutable, typed value bag. Values are keyed by their
//! Rust type, so a middleware that wants to hand something to the handler
//! defines a small newtype for it:
//!
//! ```
//! use micromw::Context;
//!
//! #[derive(Debug, PartialEq)]
//! struct TenantId(String);
//!
//! let base = Context::background();
//! let derived = base.with_value(TenantId("acme".into()));
//!
//! assert_eq!(derived.value::<TenantId>(), Some(&TenantId("acme".into())));
//! assert_eq!(base.value::<TenantId>(), None);
//! ```
//!
//! Deriving links a new entry in front of the parent; the parent and every
//! other context sharing it are untouched.

use std::any::{Any, TypeId};
use std::sync::Arc;

/// An immutable chain of typed request-scoped values.
///
/// Cloning is cheap (one `Arc` clone).
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Entry>>,
}

struct Entry {
    type_id: TypeId,
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<Entry>>,
}

impl Context {
    /// The empty root context.
    pub fn background() -> Self {
        Self { head: None }
    }

    /// Return a new context that carries `value` in addition to everything
    /// in `self`.
    ///
    /// A value of the same type already present is shadowed in the new
    /// context and still visible through `self`.
    pub fn with_value<T>(&self, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            head: Some(Arc::new(Entry {
                type_id: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
                value: Arc::new(value),
                parent: self.head.clone(),
            })),
        }
    }

    /// Get the nearest value of type `T`.
    pub fn value<T>(&self) -> Option<&T>
    where
        T: Any + Send + Sync,
    {
        self.entries()
            .find(|entry| entry.type_id == TypeId::of::<T>())
            .and_then(|entry| entry.value.downcast_ref::<T>())
    }

    /// Returns true if a value of type `T` is present.
    pub fn contains<T>(&self) -> bool
    where
        T: Any + Send + Sync,
    {
        self.value::<T>().is_some()
    }

    /// Returns true if nothing has been attached.
    pub fn is_background(&self) -> bool {
        self.head.is_none()
    }

    fn entries(&self) -> impl Iterator<Item = &Entry> {
        std::iter::successors(self.head.as_deref(), |entry| entry.parent.as_deref())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries().map(|entry| entry.type_name))
            .finish()
    }
}
