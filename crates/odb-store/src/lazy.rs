use std::fmt;

use once_cell::sync::OnceCell;

use crate::error::{StoreError, StoreResult};

/// A field that is computed on first access and cached afterwards.
///
/// The resolver runs at most once per successful population. It may return
/// `Ok(None)` when it cannot produce the value, in which case access fails
/// with [`StoreError::AttributeMissing`]; a resolver error is returned as is
/// and the next access tries again. A resolver that knows sibling values can
/// fill other caches through [`LazyCache::set`].
pub struct LazyCache<T> {
    attribute: &'static str,
    cell: OnceCell<T>,
}

impl<T> LazyCache<T> {
    /// An unresolved cache for the named attribute.
    pub const fn new(attribute: &'static str) -> Self {
        Self {
            attribute,
            cell: OnceCell::new(),
        }
    }

    /// A cache that starts out resolved.
    pub fn with_value(attribute: &'static str, value: T) -> Self {
        Self {
            attribute,
            cell: OnceCell::with_value(value),
        }
    }

    /// Name of the cached attribute.
    pub fn attribute(&self) -> &'static str {
        self.attribute
    }

    /// The value, if it has been populated.
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Populate the value from outside. Returns the value back if the cache
    /// was already resolved.
    pub fn set(&self, value: T) -> Result<(), T> {
        self.cell.set(value)
    }

    /// Return the cached value, running `resolve` if nothing is cached yet.
    pub fn get_or_resolve<F>(&self, resolve: F) -> StoreResult<&T>
    where
        F: FnOnce() -> StoreResult<Option<T>>,
    {
        self.cell
            .get_or_try_init(|| resolve()?.ok_or(StoreError::AttributeMissing(self.attribute)))
    }

    /// Drop the cached value so the next access resolves again.
    pub fn invalidate(&mut self) -> Option<T> {
        self.cell.take()
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyCache")
            .field("attribute", &self.attribute)
            .field("value", &self.cell.get())
            .finish()
    }
}
