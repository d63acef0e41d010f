//! Entity descriptions and managed entity handles
//!
//! An entity type is described by an [`EntityDescription`]: its name and
//! its attributes (scalars and relationships). Typed code names an entity
//! type through the [`Entity`] trait, usually implemented with
//! [`impl_entity!`](crate::impl_entity).
//!
//! Instances live in an [`EntityStore`]; callers hold [`Managed`] handles
//! that borrow the store, so an entity can never outlive its store.

use crate::core::error::StoreError;
use crate::core::field::{EntityId, FieldPath, FieldSource, FieldValue};
use crate::core::store::EntityStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Kind of an attribute, including relationship targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeKind {
    String,
    Integer,
    Float,
    Boolean,
    /// Reference to a single entity of `target`
    ToOne {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        inverse: Option<String>,
    },
    /// Ordered collection of entities of `target`
    ToMany {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        inverse: Option<String>,
    },
}

impl AttributeKind {
    /// True for kinds aggregation can fold
    pub fn is_numeric(&self) -> bool {
        matches!(self, AttributeKind::Integer | AttributeKind::Float)
    }

    pub fn is_relationship(&self) -> bool {
        matches!(self, AttributeKind::ToOne { .. } | AttributeKind::ToMany { .. })
    }

    /// Target entity and inverse attribute of a relationship
    pub fn relationship(&self) -> Option<(&str, Option<&str>)> {
        match self {
            AttributeKind::ToOne { target, inverse } | AttributeKind::ToMany { target, inverse } => {
                Some((target.as_str(), inverse.as_deref()))
            }
            _ => None,
        }
    }

    /// Value stored for a freshly registered entity
    pub fn initial_value(&self) -> FieldValue {
        match self {
            AttributeKind::ToMany { .. } => FieldValue::Collection(Vec::new()),
            _ => FieldValue::Null,
        }
    }

    /// Check a value against this kind, widening integers for float attributes.
    ///
    /// `Null` is accepted everywhere except to-many, where it becomes the
    /// empty collection.
    pub fn coerce(&self, attribute: &str, value: FieldValue) -> Result<FieldValue, StoreError> {
        match (self, value) {
            (AttributeKind::ToMany { .. }, FieldValue::Null) => Ok(FieldValue::Collection(Vec::new())),
            (_, FieldValue::Null) => Ok(FieldValue::Null),
            (AttributeKind::String, v @ FieldValue::String(_))
            | (AttributeKind::Integer, v @ FieldValue::Integer(_))
            | (AttributeKind::Float, v @ FieldValue::Float(_))
            | (AttributeKind::Boolean, v @ FieldValue::Boolean(_))
            | (AttributeKind::ToOne { .. }, v @ FieldValue::Reference(_))
            | (AttributeKind::ToMany { .. }, v @ FieldValue::Collection(_)) => Ok(v),
            (AttributeKind::Float, FieldValue::Integer(i)) => Ok(FieldValue::Float(i as f64)),
            (kind, other) => Err(StoreError::TypeMismatch {
                attribute: attribute.to_string(),
                expected: kind.to_string(),
                found: other.kind_name().to_string(),
            }),
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeKind::String => write!(f, "string"),
            AttributeKind::Integer => write!(f, "integer"),
            AttributeKind::Float => write!(f, "float"),
            AttributeKind::Boolean => write!(f, "boolean"),
            AttributeKind::ToOne { target, .. } => write!(f, "to-one {}", target),
            AttributeKind::ToMany { target, .. } => write!(f, "to-many {}", target),
        }
    }
}

/// A named attribute of an entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,

    #[serde(flatten)]
    pub kind: AttributeKind,

    /// Must be non-null (non-empty for to-many) when the store saves
    #[serde(default)]
    pub required: bool,
}

impl Attribute {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, AttributeKind::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, AttributeKind::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, AttributeKind::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, AttributeKind::Boolean)
    }

    pub fn to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            AttributeKind::ToOne {
                target: target.into(),
                inverse: None,
            },
        )
    }

    pub fn to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            AttributeKind::ToMany {
                target: target.into(),
                inverse: None,
            },
        )
    }

    /// Name the inverse relationship on the target entity
    pub fn inverse(mut self, inverse_name: impl Into<String>) -> Self {
        if let AttributeKind::ToOne { inverse, .. } | AttributeKind::ToMany { inverse, .. } =
            &mut self.kind
        {
            *inverse = Some(inverse_name.into());
        }
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Schema of one entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescription {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl EntityDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// Typed handle on an entity type
///
/// Implementations are usually unit structs generated by
/// [`impl_entity!`](crate::impl_entity); the repository uses them only to
/// name and describe the type.
pub trait Entity: Send + Sync + 'static {
    /// Entity type name as registered in the store (e.g. "Pokemon")
    fn entity_name() -> &'static str;

    /// Full schema of the type
    fn description() -> EntityDescription;
}

/// A live entity owned by a store
///
/// Handles compare and hash by identity. Reads go through the store, so a
/// handle always sees the latest committed value; a deleted entity reads as
/// empty and rejects writes.
#[derive(Clone)]
pub struct Managed<'s> {
    store: &'s dyn EntityStore,
    id: EntityId,
    entity_type: String,
}

impl<'s> Managed<'s> {
    pub fn new(store: &'s dyn EntityStore, id: EntityId, entity_type: impl Into<String>) -> Self {
        Self {
            store,
            id,
            entity_type: entity_type.into(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Read an attribute or a dotted path through to-one relationships
    pub fn get(&self, path: impl Into<FieldPath>) -> Option<FieldValue> {
        self.store.resolve(self.id, &path.into())
    }

    pub fn set(&self, attribute: &str, value: impl Into<FieldValue>) -> Result<(), StoreError> {
        self.store.set_value(self.id, attribute, value.into())
    }

    /// Follow a to-one relationship
    pub fn related(&self, attribute: &str) -> Option<Managed<'s>> {
        let id = self.get(attribute)?.as_reference()?;
        let entity_type = self.store.entity_type_of(id)?;
        Some(Managed::new(self.store, id, entity_type))
    }

    /// Members of a to-many relationship, in insertion order
    pub fn collection(&self, attribute: &str) -> Vec<Managed<'s>> {
        let Some(FieldValue::Collection(ids)) = self.get(attribute) else {
            return Vec::new();
        };
        ids.into_iter()
            .filter_map(|id| {
                let entity_type = self.store.entity_type_of(id)?;
                Some(Managed::new(self.store, id, entity_type))
            })
            .collect()
    }

    pub fn is_deleted(&self) -> bool {
        self.store.entity_type_of(self.id).is_none()
    }

    pub fn delete(&self) -> Result<(), StoreError> {
        self.store.delete(self.id)
    }

    /// Snapshot of the entity as JSON, with relationships as ids
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        object.insert("id".to_string(), serde_json::json!(self.id));
        object.insert("type".to_string(), serde_json::json!(self.entity_type));
        for (name, value) in self.store.snapshot(self.id).unwrap_or_default() {
            object.insert(
                name,
                serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
            );
        }
        serde_json::Value::Object(object)
    }
}

impl FieldSource for Managed<'_> {
    fn resolve(&self, path: &FieldPath) -> Option<FieldValue> {
        self.store.resolve(self.id, path)
    }
}

impl PartialEq for Managed<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Managed<'_> {}

impl Hash for Managed<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Managed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Managed")
            .field("entity_type", &self.entity_type)
            .field("id", &self.id)
            .finish()
    }
}

impl From<&Managed<'_>> for FieldValue {
    fn from(entity: &Managed<'_>) -> Self {
        FieldValue::Reference(entity.id)
    }
}
