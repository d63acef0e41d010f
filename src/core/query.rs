//! Fetch requests
//!
//! A [`FetchRequest`] is what a repository hands to the store: the entity
//! type, an optional predicate, a sort specification and optional paging.
//!
//! # Example
//! ```rust,ignore
//! let request = FetchRequest::new("Pokemon")
//!     .with_predicate(Predicate::lt("level", 36))
//!     .with_sort(SortSpec::descending("level"))
//!     .with_limit(1);
//! let ids = store.execute(&request)?;
//! ```

use crate::core::predicate::Predicate;
use crate::core::sort::SortSpec;

/// Query over one entity type
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Entity type to fetch
    pub entity_type: String,

    /// Filter; `None` matches every entity
    pub predicate: Option<Predicate>,

    /// Ordering; empty keeps store order
    pub sort: SortSpec,

    /// Number of leading matches to skip
    pub offset: usize,

    /// Maximum number of matches to return
    pub limit: Option<usize>,
}

impl FetchRequest {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            predicate: None,
            sort: SortSpec::default(),
            offset: 0,
            limit: None,
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Set or clear the predicate from an optional borrow
    pub fn with_optional_predicate(mut self, predicate: Option<&Predicate>) -> Self {
        self.predicate = predicate.cloned();
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Apply offset and limit to an already filtered and sorted list
    pub fn page<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}
