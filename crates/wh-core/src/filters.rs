//! Filter chains
//!
//! An ordered list of interceptors that each receive the current value and
//! return the value handed to the next one. Filters run in registration order
//! and the last filter's output is the chain's result.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

pub type Filter<T, C> = Arc<dyn Fn(T, &C) -> T + Send + Sync>;

pub struct FilterChain<T, C = ()> {
    filters: RwLock<Vec<Filter<T, C>>>,
}

impl<T, C> FilterChain<T, C> {
    pub fn new() -> Self {
        Self {
            filters: RwLock::new(Vec::new()),
        }
    }

    pub fn add<F>(&self, filter: F)
    where
        F: Fn(T, &C) -> T + Send + Sync + 'static,
    {
        self.filters.write().push(Arc::new(filter));
    }

    /// Thread `initial` through every filter. No filters: `initial` unchanged.
    pub fn apply(&self, initial: T, context: &C) -> T {
        // Snapshot so a filter can add filters without deadlocking
        let filters = self.filters.read().clone();
        filters
            .iter()
            .fold(initial, |value, filter| filter(value, context))
    }

    pub fn len(&self) -> usize {
        self.filters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, C> Default for FilterChain<T, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C> fmt::Debug for FilterChain<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.len())
            .finish()
    }
}
