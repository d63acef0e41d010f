//! Core module containing the query and aggregation layer

pub mod aggregate;
pub mod completion;
pub mod entity;
pub mod error;
pub mod field;
pub mod format;
pub mod predicate;
pub mod query;
pub mod repository;
pub mod sort;
pub mod store;

pub use aggregate::{AggregateFunction, AggregateRequest, AggregateResult, GroupRow};
pub use completion::{Completion, Fetched};
pub use entity::{Attribute, AttributeKind, Entity, EntityDescription, Managed};
pub use error::{
    ConfigError, PersistenceError, QueryError, RecordError, StoreError, UpdateError,
};
pub use field::{EntityId, FieldPath, FieldSource, FieldValue};
pub use predicate::{ComparisonOperator, Predicate};
pub use query::FetchRequest;
pub use repository::{Repository, UpdateOutcome, UpdateResultMode};
pub use sort::{GroupSpec, SortRule, SortSpec};
pub use store::EntityStore;
