//! Typed error handling for record-kit
//!
//! Every fallible operation of the repository layer returns a
//! [`RecordError`], which wraps one of the category errors below so callers
//! can match on the failure they care about.
//!
//! # Error Categories
//!
//! - [`QueryError`]: malformed predicates, unknown or non-numeric fields
//! - [`UpdateError`]: rejected bulk updates (nothing is committed)
//! - [`PersistenceError`]: store commit failures surfaced by `save()`
//! - [`StoreError`]: entity store lookups and attribute access
//! - [`ConfigError`]: model configuration problems
//!
//! Absence is never an error: find operations return empty sequences and
//! first-or-create operations create.
//!
//! # Example
//!
//! ```rust,ignore
//! match Predicate::build("level", Some(5.into()), "~") {
//!     Err(QueryError::InvalidOperator { token }) => eprintln!("bad operator {}", token),
//!     Ok(Some(predicate)) => run(predicate),
//!     Ok(None) => {}
//! }
//! ```

use crate::core::field::EntityId;
use thiserror::Error;

/// The main error type for record-kit
#[derive(Debug, Error)]
pub enum RecordError {
    /// Predicate construction or query planning failed
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A bulk update was rejected
    #[error(transparent)]
    Update(#[from] UpdateError),

    /// The store failed to commit
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Entity store errors
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A completion signal was not delivered within the caller's bound
    #[error("completion not signalled within {millis} ms")]
    CompletionTimedOut { millis: u128 },

    /// The sending half of a completion signal went away without firing
    #[error("completion signal dropped before firing")]
    CompletionDropped,
}

impl RecordError {
    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            RecordError::Query(e) => e.error_code(),
            RecordError::Update(e) => e.error_code(),
            RecordError::Persistence(e) => e.error_code(),
            RecordError::Store(e) => e.error_code(),
            RecordError::Config(_) => "CONFIG_ERROR",
            RecordError::CompletionTimedOut { .. } => "COMPLETION_TIMED_OUT",
            RecordError::CompletionDropped => "COMPLETION_DROPPED",
        }
    }
}

// =============================================================================
// Query Errors
// =============================================================================

/// Errors raised while building predicates or planning a query
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    /// Operator token is not one of `=`, `!=`, `<`, `<=`, `>`, `>=` (or an alias)
    #[error("invalid comparison operator '{token}'")]
    InvalidOperator { token: String },

    /// Field path is empty or has an empty segment
    #[error("invalid field path '{path}'")]
    InvalidFieldPath { path: String },

    /// Field does not exist on the entity type
    #[error("{entity_type} has no field '{field}'")]
    UnknownField { entity_type: String, field: String },

    /// Aggregation requested over a field that does not hold numbers
    #[error("field '{field}' of {entity_type} is not numeric")]
    NonNumericField { entity_type: String, field: String },

    /// Predicate format string could not be parsed
    #[error("cannot parse predicate '{format}' at offset {offset}: {message}")]
    Parse {
        format: String,
        offset: usize,
        message: String,
    },

    /// Predicate format string references more arguments than were supplied
    #[error("predicate format needs argument #{index} but only {supplied} were supplied")]
    MissingArgument { index: usize, supplied: usize },

    /// Aggregate request did not name any field
    #[error("aggregate request has no fields")]
    EmptyAggregate,
}

impl QueryError {
    pub fn error_code(&self) -> &'static str {
        match self {
            QueryError::InvalidOperator { .. } => "INVALID_OPERATOR",
            QueryError::InvalidFieldPath { .. } => "INVALID_FIELD_PATH",
            QueryError::UnknownField { .. } => "UNKNOWN_FIELD",
            QueryError::NonNumericField { .. } => "NON_NUMERIC_FIELD",
            QueryError::Parse { .. } => "PREDICATE_PARSE_ERROR",
            QueryError::MissingArgument { .. } => "MISSING_ARGUMENT",
            QueryError::EmptyAggregate => "EMPTY_AGGREGATE",
        }
    }
}

// =============================================================================
// Update Errors
// =============================================================================

/// Errors raised by bulk updates; a failed update commits nothing
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Property name is not an attribute of the entity type
    #[error("cannot update unknown attribute '{attribute}' of {entity_type}")]
    UnknownAttribute {
        entity_type: String,
        attribute: String,
    },

    /// Property value does not fit the attribute kind
    #[error("cannot assign {found} to attribute '{attribute}' ({expected})")]
    TypeMismatch {
        attribute: String,
        expected: String,
        found: String,
    },

    /// The store refused the batch
    #[error("update rejected by store: {0}")]
    Store(#[from] StoreError),
}

impl UpdateError {
    pub fn error_code(&self) -> &'static str {
        match self {
            UpdateError::UnknownAttribute { .. } => "UPDATE_UNKNOWN_ATTRIBUTE",
            UpdateError::TypeMismatch { .. } => "UPDATE_TYPE_MISMATCH",
            UpdateError::Store(_) => "UPDATE_REJECTED",
        }
    }
}

// =============================================================================
// Persistence Errors
// =============================================================================

/// Errors surfaced by `EntityStore::save`
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A required attribute is still null at commit time
    #[error("{entity_type} {id} is missing required attribute '{attribute}'")]
    MissingRequired {
        entity_type: String,
        id: EntityId,
        attribute: String,
    },

    /// The underlying commit failed
    #[error("commit failed: {message}")]
    Commit { message: String },
}

impl PersistenceError {
    pub fn error_code(&self) -> &'static str {
        match self {
            PersistenceError::MissingRequired { .. } => "MISSING_REQUIRED_ATTRIBUTE",
            PersistenceError::Commit { .. } => "COMMIT_FAILED",
        }
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors related to entity store access
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Entity type was never registered with the store
    #[error("unknown entity type: {entity_type}")]
    UnknownEntityType { entity_type: String },

    /// Entity does not exist (never registered, or deleted)
    #[error("entity '{id}' not found")]
    EntityNotFound { id: EntityId },

    /// Attribute is not declared on the entity type
    #[error("{entity_type} has no attribute '{attribute}'")]
    UnknownAttribute {
        entity_type: String,
        attribute: String,
    },

    /// Value does not fit the attribute kind
    #[error("cannot assign {found} to attribute '{attribute}' ({expected})")]
    TypeMismatch {
        attribute: String,
        expected: String,
        found: String,
    },

    /// Reference points at an entity of the wrong type
    #[error("attribute '{attribute}' expects {expected}, got {found}")]
    WrongEntity {
        attribute: String,
        expected: String,
        found: String,
    },

    /// A lock guarding store state was poisoned
    #[error("failed to acquire store lock: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::UnknownEntityType { .. } => "UNKNOWN_ENTITY_TYPE",
            StoreError::EntityNotFound { .. } => "ENTITY_NOT_FOUND",
            StoreError::UnknownAttribute { .. } => "UNKNOWN_ATTRIBUTE",
            StoreError::TypeMismatch { .. } => "TYPE_MISMATCH",
            StoreError::WrongEntity { .. } => "WRONG_ENTITY",
            StoreError::LockPoisoned(_) => "LOCK_POISONED",
        }
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to model configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Two entity descriptions share a name
    #[error("entity '{entity}' is defined more than once")]
    DuplicateEntity { entity: String },

    /// A relationship targets an entity that is not defined
    #[error("relationship '{entity}.{attribute}' targets unknown entity '{target}'")]
    UnknownTarget {
        entity: String,
        attribute: String,
        target: String,
    },

    /// A relationship declares an inverse the target does not have
    #[error("relationship '{entity}.{attribute}' names missing inverse '{target}.{inverse}'")]
    MissingInverse {
        entity: String,
        attribute: String,
        target: String,
        inverse: String,
    },
}
