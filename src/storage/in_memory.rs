//! In-memory implementation of EntityStore for testing and development

use crate::config::{ModelConfig, StoreSettings};
use crate::core::entity::{Attribute, AttributeKind, Entity, EntityDescription};
use crate::core::error::{PersistenceError, StoreError};
use crate::core::field::{EntityId, FieldPath, FieldSource, FieldValue};
use crate::core::query::FetchRequest;
use crate::core::store::EntityStore;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use uuid::Uuid;

type Descriptions = IndexMap<String, Arc<EntityDescription>>;
type Records = IndexMap<EntityId, StoredRecord>;

#[derive(Debug, Clone)]
struct StoredRecord {
    entity_type: String,
    values: IndexMap<String, FieldValue>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct StoreState {
    descriptions: Descriptions,
    /// Insertion ordered; this is the store-native order of fetches
    records: Records,
}

/// In-memory entity store
///
/// Useful for testing and development. Uses RwLock for thread-safe access;
/// entities keep their insertion order, which is the order unsorted
/// fetches return.
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    serial: Mutex<()>,
    settings: StoreSettings,
    commits: AtomicU64,
}

impl InMemoryStore {
    /// Create an empty store with the given settings
    pub fn new(settings: StoreSettings) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            serial: Mutex::new(()),
            settings,
            commits: AtomicU64::new(0),
        }
    }

    /// Create a store with every entity of a model defined
    pub fn from_config(config: &ModelConfig) -> Result<Self, StoreError> {
        let store = Self::new(config.settings);
        for description in &config.entities {
            store.define_description(description.clone())?;
        }
        Ok(store)
    }

    /// Define the entity type of `E`
    pub fn define<E: Entity>(&self) -> Result<(), StoreError> {
        self.define_description(E::description())
    }

    /// Define (or redefine) an entity type
    pub fn define_description(&self, description: EntityDescription) -> Result<(), StoreError> {
        let mut state = self.write()?;
        tracing::debug!(entity_type = %description.name, attributes = description.attributes.len(), "entity defined");
        state
            .descriptions
            .insert(description.name.clone(), Arc::new(description));
        Ok(())
    }

    /// Number of successful saves
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of live entities of one type
    pub fn len_of(&self, entity_type: &str) -> usize {
        self.state
            .read()
            .map(|s| s.records.values().filter(|r| r.entity_type == entity_type).count())
            .unwrap_or(0)
    }

    /// Creation time of an entity
    pub fn created_at(&self, id: EntityId) -> Option<DateTime<Utc>> {
        self.state.read().ok()?.records.get(&id).map(|r| r.created_at)
    }

    /// Last modification time of an entity
    pub fn updated_at(&self, id: EntityId) -> Option<DateTime<Utc>> {
        self.state.read().ok()?.records.get(&id).map(|r| r.updated_at)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, StoreState>, StoreError> {
        self.state
            .read()
            .map_err(|e| StoreError::LockPoisoned(format!("read lock: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, StoreState>, StoreError> {
        self.state
            .write()
            .map_err(|e| StoreError::LockPoisoned(format!("write lock: {}", e)))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(StoreSettings::default())
    }
}

/// Read-only view of one record, resolving paths through to-one links
struct RecordView<'a> {
    records: &'a Records,
    id: EntityId,
}

impl FieldSource for RecordView<'_> {
    fn resolve(&self, path: &FieldPath) -> Option<FieldValue> {
        resolve_path(self.records, self.id, path)
    }
}

fn resolve_path(records: &Records, id: EntityId, path: &FieldPath) -> Option<FieldValue> {
    let mut current = records.get(&id)?;
    let segments = path.segments();
    let (last, hops) = segments.split_last()?;
    for hop in hops {
        match current.values.get(hop)? {
            FieldValue::Reference(next) => current = records.get(next)?,
            // a null to-one along the path makes the whole path null
            FieldValue::Null => return Some(FieldValue::Null),
            _ => return None,
        }
    }
    current.values.get(last).cloned()
}

fn lookup<'a>(
    descriptions: &'a Descriptions,
    records: &Records,
    id: EntityId,
    attribute: &str,
) -> Result<(&'a Attribute, String), StoreError> {
    let record = records.get(&id).ok_or(StoreError::EntityNotFound { id })?;
    let description = descriptions
        .get(&record.entity_type)
        .ok_or_else(|| StoreError::UnknownEntityType {
            entity_type: record.entity_type.clone(),
        })?;
    let attr = description
        .attribute(attribute)
        .ok_or_else(|| StoreError::UnknownAttribute {
            entity_type: record.entity_type.clone(),
            attribute: attribute.to_string(),
        })?;
    Ok((attr, record.entity_type.clone()))
}

fn check_target(
    records: &Records,
    attribute: &str,
    target_type: &str,
    target: EntityId,
) -> Result<(), StoreError> {
    let record = records
        .get(&target)
        .ok_or(StoreError::EntityNotFound { id: target })?;
    if record.entity_type != target_type {
        return Err(StoreError::WrongEntity {
            attribute: attribute.to_string(),
            expected: target_type.to_string(),
            found: record.entity_type.clone(),
        });
    }
    Ok(())
}

fn put(records: &mut Records, id: EntityId, attribute: &str, value: FieldValue) {
    if let Some(record) = records.get_mut(&id) {
        record.values.insert(attribute.to_string(), value);
        record.updated_at = Utc::now();
    }
}

/// Point the inverse side of `owner`'s relationship at `owner`
fn attach(descriptions: &Descriptions, records: &mut Records, target: EntityId, inverse: &str, owner: EntityId) {
    let Ok((attr, _)) = lookup(descriptions, records, target, inverse) else {
        return;
    };
    match &attr.kind {
        AttributeKind::ToMany { .. } => {
            let mut members = records
                .get(&target)
                .and_then(|r| r.values.get(inverse))
                .and_then(|v| v.as_collection().map(<[EntityId]>::to_vec))
                .unwrap_or_default();
            if !members.contains(&owner) {
                members.push(owner);
                put(records, target, inverse, FieldValue::Collection(members));
            }
        }
        AttributeKind::ToOne { inverse: back, .. } => {
            // one-to-one: the target's previous partner lets go of it
            let previous = records
                .get(&target)
                .and_then(|r| r.values.get(inverse))
                .and_then(|v| v.as_reference());
            if let (Some(previous), Some(back)) = (previous, back.as_deref()) {
                if previous != owner {
                    detach(descriptions, records, previous, back, target);
                }
            }
            put(records, target, inverse, FieldValue::Reference(owner));
        }
        _ => {}
    }
}

/// Undo [`attach`]
fn detach(descriptions: &Descriptions, records: &mut Records, target: EntityId, inverse: &str, owner: EntityId) {
    let Some(current) = records.get(&target).and_then(|r| r.values.get(inverse)).cloned() else {
        return;
    };
    match current {
        FieldValue::Collection(mut members) => {
            members.retain(|m| *m != owner);
            put(records, target, inverse, FieldValue::Collection(members));
        }
        FieldValue::Reference(current) if current == owner => {
            if lookup(descriptions, records, target, inverse).is_ok() {
                put(records, target, inverse, FieldValue::Null);
            }
        }
        _ => {}
    }
}

/// Check that `value` can be assigned without touching anything
fn validate(
    descriptions: &Descriptions,
    records: &Records,
    id: EntityId,
    attribute: &str,
    value: FieldValue,
) -> Result<FieldValue, StoreError> {
    let (attr, _) = lookup(descriptions, records, id, attribute)?;
    let value = attr.kind.coerce(attribute, value)?;
    match (&attr.kind, &value) {
        (AttributeKind::ToOne { target, .. }, FieldValue::Reference(other)) => {
            check_target(records, attribute, target, *other)?;
        }
        (AttributeKind::ToMany { target, .. }, FieldValue::Collection(members)) => {
            for member in members {
                check_target(records, attribute, target, *member)?;
            }
        }
        _ => {}
    }
    Ok(value)
}

/// Assign one attribute and keep both sides of relationships consistent
fn assign(
    descriptions: &Descriptions,
    records: &mut Records,
    id: EntityId,
    attribute: &str,
    value: FieldValue,
) -> Result<(), StoreError> {
    let value = validate(descriptions, records, id, attribute, value)?;
    let (attr, _) = lookup(descriptions, records, id, attribute)?;
    let kind = attr.kind.clone();
    let previous = records
        .get(&id)
        .and_then(|r| r.values.get(attribute))
        .cloned()
        .unwrap_or(FieldValue::Null);

    match kind {
        AttributeKind::ToOne {
            inverse: Some(inverse),
            ..
        } => {
            let old = previous.as_reference();
            let new = value.as_reference();
            if old == new {
                return Ok(());
            }
            put(records, id, attribute, value);
            if let Some(old) = old {
                detach(descriptions, records, old, &inverse, id);
            }
            if let Some(new) = new {
                attach(descriptions, records, new, &inverse, id);
            }
        }
        AttributeKind::ToMany {
            inverse: Some(inverse),
            ..
        } => {
            let old = previous.as_collection().map(<[EntityId]>::to_vec).unwrap_or_default();
            let new = value.as_collection().map(<[EntityId]>::to_vec).unwrap_or_default();
            put(records, id, attribute, value);
            for removed in old.iter().filter(|m| !new.contains(m)) {
                detach(descriptions, records, *removed, &inverse, id);
            }
            for added in new.iter().filter(|m| !old.contains(m)) {
                // a member moving from another owner leaves that owner's collection
                if let Some(FieldValue::Reference(previous_owner)) =
                    records.get(added).and_then(|r| r.values.get(&inverse)).cloned()
                {
                    if previous_owner != id {
                        detach(descriptions, records, previous_owner, attribute, *added);
                    }
                }
                attach(descriptions, records, *added, &inverse, id);
            }
        }
        _ => put(records, id, attribute, value),
    }
    Ok(())
}

/// Ids of `request`'s entity type matching its predicate, sorted and paged
fn matching(state: &StoreState, request: &FetchRequest) -> Result<Vec<EntityId>, StoreError> {
    if !state.descriptions.contains_key(&request.entity_type) {
        return Err(StoreError::UnknownEntityType {
            entity_type: request.entity_type.clone(),
        });
    }

    let mut matches: Vec<RecordView<'_>> = state
        .records
        .iter()
        .filter(|(_, record)| record.entity_type == request.entity_type)
        .map(|(id, _)| RecordView {
            records: &state.records,
            id: *id,
        })
        .filter(|view| {
            request
                .predicate
                .as_ref()
                .is_none_or(|predicate| predicate.evaluate(view))
        })
        .collect();

    request.sort.sort(&mut matches);
    Ok(request.page(matches.into_iter().map(|view| view.id).collect()))
}

/// Remove a record and drop every reference to it (nullify)
fn remove(records: &mut Records, id: EntityId) -> Result<StoredRecord, StoreError> {
    let removed = records
        .shift_remove(&id)
        .ok_or(StoreError::EntityNotFound { id })?;

    let now = Utc::now();
    for record in records.values_mut() {
        let mut touched = false;
        for value in record.values.values_mut() {
            if value.as_reference() == Some(id) {
                *value = FieldValue::Null;
                touched = true;
            } else if let FieldValue::Collection(members) = value {
                let before = members.len();
                members.retain(|m| *m != id);
                touched |= members.len() != before;
            }
        }
        if touched {
            record.updated_at = now;
        }
    }
    Ok(removed)
}

impl EntityStore for InMemoryStore {
    fn settings(&self) -> StoreSettings {
        self.settings
    }

    fn description(&self, entity_type: &str) -> Result<Arc<EntityDescription>, StoreError> {
        self.read()?
            .descriptions
            .get(entity_type)
            .cloned()
            .ok_or_else(|| StoreError::UnknownEntityType {
                entity_type: entity_type.to_string(),
            })
    }

    fn register(&self, entity_type: &str) -> Result<EntityId, StoreError> {
        let mut state = self.write()?;
        let description = state
            .descriptions
            .get(entity_type)
            .cloned()
            .ok_or_else(|| StoreError::UnknownEntityType {
                entity_type: entity_type.to_string(),
            })?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let values = description
            .attributes
            .iter()
            .map(|a| (a.name.clone(), a.kind.initial_value()))
            .collect();
        state.records.insert(
            id,
            StoredRecord {
                entity_type: entity_type.to_string(),
                values,
                created_at: now,
                updated_at: now,
            },
        );
        tracing::debug!(entity_type, %id, "entity registered");
        Ok(id)
    }

    fn execute(&self, request: &FetchRequest) -> Result<Vec<EntityId>, StoreError> {
        let state = self.read()?;
        let ids = matching(&state, request)?;
        tracing::debug!(entity_type = %request.entity_type, matched = ids.len(), "fetch executed");
        Ok(ids)
    }

    fn resolve(&self, id: EntityId, path: &FieldPath) -> Option<FieldValue> {
        let state = self.state.read().ok()?;
        resolve_path(&state.records, id, path)
    }

    fn entity_type_of(&self, id: EntityId) -> Option<String> {
        let state = self.state.read().ok()?;
        state.records.get(&id).map(|r| r.entity_type.clone())
    }

    fn snapshot(&self, id: EntityId) -> Option<IndexMap<String, FieldValue>> {
        let state = self.state.read().ok()?;
        state.records.get(&id).map(|r| r.values.clone())
    }

    fn set_value(&self, id: EntityId, attribute: &str, value: FieldValue) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let StoreState {
            descriptions,
            records,
        } = &mut *state;
        assign(descriptions, records, id, attribute, value)
    }

    fn update_matching(
        &self,
        request: &FetchRequest,
        changes: &[(String, FieldValue)],
    ) -> Result<Vec<EntityId>, StoreError> {
        let mut state = self.write()?;
        let ids = matching(&state, request)?;
        let StoreState {
            descriptions,
            records,
        } = &mut *state;

        // stage on a copy so a failure part-way leaves nothing behind
        let mut staged = records.clone();
        for id in &ids {
            for (attribute, value) in changes {
                assign(descriptions, &mut staged, *id, attribute, value.clone())?;
            }
        }
        *records = staged;
        tracing::debug!(entity_type = %request.entity_type, updated = ids.len(), "matching entities updated");
        Ok(ids)
    }

    fn delete(&self, id: EntityId) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let removed = remove(&mut state.records, id)?;
        tracing::debug!(entity_type = %removed.entity_type, %id, "entity deleted");
        Ok(())
    }

    fn delete_matching(&self, request: &FetchRequest) -> Result<Vec<EntityId>, StoreError> {
        let mut state = self.write()?;
        let ids = matching(&state, request)?;
        for id in &ids {
            remove(&mut state.records, *id)?;
        }
        tracing::debug!(entity_type = %request.entity_type, deleted = ids.len(), "matching entities deleted");
        Ok(ids)
    }

    fn save(&self) -> Result<(), PersistenceError> {
        let state = self.state.read().map_err(|e| PersistenceError::Commit {
            message: format!("read lock: {}", e),
        })?;

        for (id, record) in &state.records {
            let Some(description) = state.descriptions.get(&record.entity_type) else {
                continue;
            };
            for attribute in description.attributes.iter().filter(|a| a.required) {
                let missing = match record.values.get(&attribute.name) {
                    None | Some(FieldValue::Null) => true,
                    Some(FieldValue::Collection(members)) => members.is_empty(),
                    Some(_) => false,
                };
                if missing {
                    tracing::warn!(entity_type = %record.entity_type, %id, attribute = %attribute.name, "save rejected");
                    return Err(PersistenceError::MissingRequired {
                        entity_type: record.entity_type.clone(),
                        id: *id,
                        attribute: attribute.name.clone(),
                    });
                }
            }
        }

        let commit = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(commit, entities = state.records.len(), "store saved");
        Ok(())
    }

    fn serialize(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.serial
            .lock()
            .map_err(|e| StoreError::LockPoisoned(format!("serial lock: {}", e)))
    }
}
