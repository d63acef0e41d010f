//! # record-kit
//!
//! A generic find, update, delete and aggregate layer over entity stores.
//!
//! ## Features
//!
//! - **Typed Predicates**: comparison trees over dotted field paths, built with
//!   a typed builder or compiled from a format string
//! - **Sort and Group Specifications**: stable multi-key ordering and
//!   ordered group-by keys
//! - **Generic Repository**: `Repository<E>` finds, creates, updates and
//!   deletes entities of one type through an `EntityStore`
//! - **Aggregation**: sum, min, max, avg and count, per field or per group
//! - **Completion Signals**: every query returns its value and a single-fire
//!   completion future
//! - **Configuration-Based**: describe entity models in YAML
//! - **Reference Store**: an in-memory store keeping relationships consistent
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use record::prelude::*;
//!
//! impl_entity!(Pokemon, "Pokemon", [
//!     string("name").required(),
//!     integer("level"),
//! ]);
//!
//! let store = InMemoryStore::default();
//! store.define::<Pokemon>()?;
//!
//! let pokemons = Pokemon::repository(&store);
//! let charizard = pokemons.create_new_entity()?;
//! charizard.set("name", "Charizard")?;
//! charizard.set("level", 36)?;
//!
//! let strong = pokemons.find_all_with_predicate(
//!     Some(&Predicate::ge("level", 16)),
//!     &SortSpec::descending("level"),
//! )?;
//! strong.completion.await?;
//!
//! let total = pokemons.sum("level", None)?;
//! assert_eq!(*total, 36.0);
//! ```

pub mod config;
pub mod core;
pub mod entities;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        aggregate::{AggregateFunction, AggregateRequest, AggregateResult, GroupRow},
        completion::{Completion, Fetched},
        entity::{Attribute, AttributeKind, Entity, EntityDescription, Managed},
        error::{
            ConfigError, PersistenceError, QueryError, RecordError, StoreError, UpdateError,
        },
        field::{EntityId, FieldPath, FieldSource, FieldValue},
        predicate::{ComparisonOperator, Predicate},
        query::FetchRequest,
        repository::{Repository, UpdateOutcome, UpdateResultMode},
        sort::{GroupSpec, SortRule, SortSpec},
        store::EntityStore,
    };

    // === Macros ===
    pub use crate::impl_entity;

    // === Storage ===
    pub use crate::storage::InMemoryStore;

    // === Config ===
    pub use crate::config::{CompletionMode, ModelConfig, StoreSettings};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use uuid::Uuid;
}
