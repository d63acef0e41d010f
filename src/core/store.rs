//! The entity store collaborator
//!
//! Repositories never touch storage directly: everything goes through this
//! trait. A store owns the entities, resolves field paths, runs fetches and
//! keeps relationships consistent.

use crate::config::StoreSettings;
use crate::core::entity::{Attribute, AttributeKind, EntityDescription};
use crate::core::error::{PersistenceError, QueryError, StoreError};
use crate::core::field::{EntityId, FieldPath, FieldValue};
use crate::core::query::FetchRequest;
use indexmap::IndexMap;
use std::sync::{Arc, MutexGuard};

/// Trait for stores that own managed entities
///
/// All methods take `&self`; implementations guard their state internally.
/// Bulk changes match and write atomically; operations composed of several
/// calls (find-or-create) additionally hold the guard returned by
/// [`EntityStore::serialize`].
pub trait EntityStore: Send + Sync {
    /// Runtime settings (completion dispatch, wait bounds)
    fn settings(&self) -> StoreSettings;

    /// Schema of a registered entity type
    fn description(&self, entity_type: &str) -> Result<Arc<EntityDescription>, StoreError>;

    /// Allocate a new, uninitialized entity of `entity_type`
    fn register(&self, entity_type: &str) -> Result<EntityId, StoreError>;

    /// Run a fetch and return matching ids, filtered then sorted
    fn execute(&self, request: &FetchRequest) -> Result<Vec<EntityId>, StoreError>;

    /// Resolve a path on one entity; `None` when the entity or path is unknown
    fn resolve(&self, id: EntityId, path: &FieldPath) -> Option<FieldValue>;

    /// Entity type of a live entity, `None` once deleted
    fn entity_type_of(&self, id: EntityId) -> Option<String>;

    /// All attribute values of one entity in declaration order
    fn snapshot(&self, id: EntityId) -> Option<IndexMap<String, FieldValue>>;

    /// Assign one attribute, maintaining inverse relationships
    fn set_value(&self, id: EntityId, attribute: &str, value: FieldValue) -> Result<(), StoreError>;

    /// Assign the same changes to every entity matching `request`, all or
    /// nothing. Matching and writing happen under one write section, so no
    /// concurrent change lands in between. Returns the updated ids.
    fn update_matching(
        &self,
        request: &FetchRequest,
        changes: &[(String, FieldValue)],
    ) -> Result<Vec<EntityId>, StoreError>;

    /// Remove an entity and every reference to it
    fn delete(&self, id: EntityId) -> Result<(), StoreError>;

    /// Remove every entity matching `request` in one write section and
    /// return the removed ids
    fn delete_matching(&self, request: &FetchRequest) -> Result<Vec<EntityId>, StoreError>;

    /// Commit pending changes
    fn save(&self) -> Result<(), PersistenceError>;

    /// Exclusive section for operations that read then write
    fn serialize(&self) -> Result<MutexGuard<'_, ()>, StoreError>;

    /// Resolve several paths on several entities at once
    fn project(
        &self,
        ids: &[EntityId],
        paths: &[FieldPath],
    ) -> Result<Vec<Vec<FieldValue>>, StoreError> {
        Ok(ids
            .iter()
            .map(|id| {
                paths
                    .iter()
                    .map(|path| self.resolve(*id, path).unwrap_or(FieldValue::Null))
                    .collect()
            })
            .collect())
    }

    /// Walk a dotted path through the schema and return its final attribute.
    ///
    /// Every segment but the last must be a to-one relationship.
    fn attribute_at(&self, entity_type: &str, path: &FieldPath) -> Result<Attribute, QueryError> {
        let unknown = || QueryError::UnknownField {
            entity_type: entity_type.to_string(),
            field: path.to_string(),
        };

        let mut description = self.description(entity_type).map_err(|_| unknown())?;
        let segments = path.segments();
        for (i, segment) in segments.iter().enumerate() {
            let attribute = description.attribute(segment).cloned().ok_or_else(unknown)?;
            if i + 1 == segments.len() {
                return Ok(attribute);
            }
            match &attribute.kind {
                AttributeKind::ToOne { target, .. } => {
                    description = self.description(target).map_err(|_| unknown())?;
                }
                _ => return Err(unknown()),
            }
        }
        Err(unknown())
    }
}
