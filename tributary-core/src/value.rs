//! Entity Values
//!
//! Entities in one graph can hold values of unrelated types, so the engine
//! stores them type-erased. A [`Value`] is a reference-counted `Any`: cloning
//! it is a pointer copy, which is what lets cached results be handed out to
//! any number of flows without copying the payload.

use std::any::{type_name, Any};
use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::error::{FlowError, Result};

/// A type-erased, immutable, shareable entity value.
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Value {
    /// Wrap a value.
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            inner: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Borrow the payload if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Check the payload type without borrowing it.
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Name of the wrapped type, as reported by `std::any::type_name`.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// True if both values point at the same allocation.
    pub fn ptr_eq(a: &Value, b: &Value) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Borrow the payload as a `T`, reporting a mismatch against `entity`.
    pub(crate) fn expect_ref<T: Any>(&self, entity: &str) -> Result<&T> {
        self.downcast_ref::<T>()
            .ok_or_else(|| FlowError::TypeMismatch {
                entity: entity.to_string(),
                expected: type_name::<T>(),
                actual: self.type_name,
            })
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}
