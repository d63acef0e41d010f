//! Typed repository over an entity store
//!
//! A [`Repository`] names one entity type (through the [`Entity`] trait)
//! and runs find, create, update and delete operations for it against a
//! borrowed [`EntityStore`]. Every query is turned into a [`FetchRequest`]
//! and executed by the store; the repository never touches storage itself.
//!
//! # Example
//! ```rust,ignore
//! let pokemons = Repository::<Pokemon>::new(&store);
//! let charizard = pokemons.create_new_entity()?;
//! charizard.set("name", "Charizard")?;
//! charizard.set("level", 36)?;
//!
//! let strong = pokemons.find_all_with_predicate(
//!     Some(&Predicate::ge("level", 16)),
//!     &SortSpec::descending("level"),
//! )?;
//! assert_eq!(strong.len(), 1);
//! strong.completion.await?;
//! ```

use crate::core::completion::{Completion, Fetched};
use crate::core::entity::{Entity, Managed};
use crate::core::error::{RecordError, StoreError, UpdateError};
use crate::core::field::{EntityId, FieldPath, FieldValue};
use crate::core::predicate::Predicate;
use crate::core::query::FetchRequest;
use crate::core::sort::SortSpec;
use crate::core::store::EntityStore;
use std::marker::PhantomData;

/// What [`Repository::update_all`] hands back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateResultMode {
    /// Number of updated entities
    #[default]
    Count,
    /// Ids of the updated entities
    Ids,
    /// Handles on the updated entities
    Objects,
}

/// Result of a bulk update, shaped by [`UpdateResultMode`]
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome<'s> {
    Count(usize),
    Ids(Vec<EntityId>),
    Objects(Vec<Managed<'s>>),
}

impl UpdateOutcome<'_> {
    /// Number of updated entities, whatever the mode
    pub fn count(&self) -> usize {
        match self {
            UpdateOutcome::Count(count) => *count,
            UpdateOutcome::Ids(ids) => ids.len(),
            UpdateOutcome::Objects(objects) => objects.len(),
        }
    }
}

/// Find/create/update/delete operations for entity type `E`
pub struct Repository<'s, E: Entity> {
    store: &'s dyn EntityStore,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E: Entity> Copy for Repository<'_, E> {}

impl<'s, E: Entity> Repository<'s, E> {
    pub fn new(store: &'s dyn EntityStore) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    pub fn store(&self) -> &'s dyn EntityStore {
        self.store
    }

    pub fn entity_name(&self) -> &'static str {
        E::entity_name()
    }

    fn handles(&self, ids: Vec<EntityId>) -> Vec<Managed<'s>> {
        ids.into_iter()
            .map(|id| Managed::new(self.store, id, E::entity_name()))
            .collect()
    }

    pub(crate) fn request(&self) -> FetchRequest {
        FetchRequest::new(E::entity_name())
    }

    pub(crate) fn completion(&self) -> Completion {
        Completion::dispatch(self.store.settings().completion, Ok(()))
    }

    /// Allocate and register a new, uninitialized entity
    pub fn create_new_entity(&self) -> Result<Managed<'s>, RecordError> {
        let id = self.store.register(E::entity_name())?;
        Ok(Managed::new(self.store, id, E::entity_name()))
    }

    /// Every entity of the type, in `sort` order (store order when empty)
    pub fn find_all(&self, sort: &SortSpec) -> Result<Vec<Managed<'s>>, RecordError> {
        let ids = self.store.execute(&self.request().with_sort(sort.clone()))?;
        tracing::debug!(entity_type = E::entity_name(), matched = ids.len(), "find_all");
        Ok(self.handles(ids))
    }

    /// Entities whose `field` (possibly a dotted path) equals `value`
    pub fn find_all_with_attribute(
        &self,
        field: impl Into<FieldPath>,
        value: impl Into<FieldValue>,
        sort: &SortSpec,
    ) -> Result<Vec<Managed<'s>>, RecordError> {
        let predicate = Predicate::eq(field, value);
        Ok(self.find_all_with_predicate(Some(&predicate), sort)?.into_value())
    }

    /// Entities matching `predicate` (all of them for `None`).
    ///
    /// The returned [`Fetched`] carries the result and a completion that
    /// fires once the fetch has settled.
    pub fn find_all_with_predicate(
        &self,
        predicate: Option<&Predicate>,
        sort: &SortSpec,
    ) -> Result<Fetched<Vec<Managed<'s>>>, RecordError> {
        let request = self
            .request()
            .with_optional_predicate(predicate)
            .with_sort(sort.clone());
        let ids = self.store.execute(&request)?;
        tracing::debug!(
            entity_type = E::entity_name(),
            predicate = %predicate.map(ToString::to_string).unwrap_or_default(),
            matched = ids.len(),
            "find_all_with_predicate"
        );
        Ok(Fetched::new(self.handles(ids), self.completion()))
    }

    /// Number of entities matching `predicate`
    pub fn count(&self, predicate: Option<&Predicate>) -> Result<usize, RecordError> {
        let ids = self
            .store
            .execute(&self.request().with_optional_predicate(predicate))?;
        Ok(ids.len())
    }

    /// First entity (store order) whose `field` equals `value`, or a new
    /// entity with `field` set to `value`
    pub fn find_first_or_create_with_attribute(
        &self,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> Result<Fetched<Managed<'s>>, RecordError> {
        let value = value.into();
        let predicate = Predicate::eq(field, value.clone());
        let _serial = self.store.serialize()?;

        if let Some(existing) = self.first_matching(&predicate)? {
            return Ok(Fetched::new(existing, self.completion()));
        }

        let created = self.create_new_entity()?;
        if let Err(e) = created.set(field, value) {
            // do not leave a half-initialized entity behind
            if let Err(rollback) = created.delete() {
                tracing::warn!(
                    entity_type = E::entity_name(),
                    id = %created.id(),
                    error = %rollback,
                    "could not remove entity after failed initialization"
                );
            }
            return Err(e.into());
        }
        tracing::debug!(entity_type = E::entity_name(), field, id = %created.id(), "created on first lookup");
        Ok(Fetched::new(created, self.completion()))
    }

    /// First entity (store order) matching `predicate`, or a new
    /// uninitialized entity. The predicate is not used to populate it.
    pub fn find_first_or_create_with_predicate(
        &self,
        predicate: &Predicate,
    ) -> Result<Fetched<Managed<'s>>, RecordError> {
        let _serial = self.store.serialize()?;
        let entity = match self.first_matching(predicate)? {
            Some(existing) => existing,
            None => self.create_new_entity()?,
        };
        Ok(Fetched::new(entity, self.completion()))
    }

    fn first_matching(&self, predicate: &Predicate) -> Result<Option<Managed<'s>>, RecordError> {
        let request = self.request().with_predicate(predicate.clone()).with_limit(1);
        let ids = self.store.execute(&request)?;
        Ok(self.handles(ids).into_iter().next())
    }

    /// Delete every entity of the type
    pub fn delete_all(&self) -> Result<usize, RecordError> {
        let deleted = self.store.delete_matching(&self.request())?.len();
        tracing::info!(entity_type = E::entity_name(), deleted, "delete_all");
        Ok(deleted)
    }

    /// Delete the entities matching `predicate`
    pub fn delete_all_matching(&self, predicate: &Predicate) -> Result<usize, RecordError> {
        let deleted = self
            .store
            .delete_matching(&self.request().with_predicate(predicate.clone()))?
            .len();
        tracing::info!(entity_type = E::entity_name(), %predicate, deleted, "delete_all_matching");
        Ok(deleted)
    }

    /// Assign `properties` to every entity matching `predicate`.
    ///
    /// All property names and values are checked against the schema before
    /// anything is written. The store matches and writes in one step, so
    /// only entities matching at that moment change, and on error none has.
    pub fn update_all<I, K, V>(
        &self,
        properties: I,
        predicate: Option<&Predicate>,
        mode: UpdateResultMode,
    ) -> Result<UpdateOutcome<'s>, RecordError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let description = self.store.description(E::entity_name())?;
        let mut changes = Vec::new();
        for (name, value) in properties {
            let name = name.into();
            let Some(attribute) = description.attribute(&name) else {
                tracing::warn!(entity_type = E::entity_name(), attribute = %name, "update rejected: unknown attribute");
                return Err(UpdateError::UnknownAttribute {
                    entity_type: E::entity_name().to_string(),
                    attribute: name,
                }
                .into());
            };
            let value = attribute.kind.coerce(&name, value.into()).map_err(|e| {
                tracing::warn!(entity_type = E::entity_name(), attribute = %name, error = %e, "update rejected");
                match e {
                    StoreError::TypeMismatch {
                        attribute,
                        expected,
                        found,
                    } => UpdateError::TypeMismatch {
                        attribute,
                        expected,
                        found,
                    },
                    other => UpdateError::Store(other),
                }
            })?;
            changes.push((name, value));
        }

        let ids = self
            .store
            .update_matching(&self.request().with_optional_predicate(predicate), &changes)
            .map_err(UpdateError::Store)?;
        tracing::info!(
            entity_type = E::entity_name(),
            updated = ids.len(),
            attributes = changes.len(),
            "update_all"
        );

        Ok(match mode {
            UpdateResultMode::Count => UpdateOutcome::Count(ids.len()),
            UpdateResultMode::Ids => UpdateOutcome::Ids(ids),
            UpdateResultMode::Objects => UpdateOutcome::Objects(self.handles(ids)),
        })
    }

    /// Commit the store
    pub fn save(&self) -> Result<(), RecordError> {
        self.store.save()?;
        Ok(())
    }
}
