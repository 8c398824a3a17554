//! Association metadata registered per entity.
//!
//! Entities and their associations are declared once (from the catalog or in
//! code) and looked up by name; a missing name is a typed `None`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of association between two entities.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    BelongsTo,
    HasOne,
    HasMany,
    /// Pivot-table association. Not joinable by the resolver.
    BelongsToMany,
    /// Polymorphic association. Not joinable by the resolver.
    MorphTo,
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssociationKind::BelongsTo => "belongs_to",
            AssociationKind::HasOne => "has_one",
            AssociationKind::HasMany => "has_many",
            AssociationKind::BelongsToMany => "belongs_to_many",
            AssociationKind::MorphTo => "morph_to",
        };
        f.write_str(name)
    }
}

/// Association as declared on its origin entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Association {
    pub kind: AssociationKind,

    /// Target entity name.
    pub target: String,

    /// belongs_to: column on the origin. has_one/has_many: column on the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,

    /// belongs_to: key on the target. has_one/has_many: parent key on the origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_key: Option<String>,
}

impl Association {
    pub fn belongs_to(target: impl Into<String>) -> Self {
        Self::new(AssociationKind::BelongsTo, target)
    }

    pub fn has_one(target: impl Into<String>) -> Self {
        Self::new(AssociationKind::HasOne, target)
    }

    pub fn has_many(target: impl Into<String>) -> Self {
        Self::new(AssociationKind::HasMany, target)
    }

    pub fn new(kind: AssociationKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            foreign_key: None,
            owner_key: None,
        }
    }

    pub fn foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    pub fn owner_key(mut self, key: impl Into<String>) -> Self {
        self.owner_key = Some(key.into());
        self
    }
}

/// Entity declaration: physical table plus named associations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntitySchema {
    pub table: String,

    #[serde(default)]
    pub associations: BTreeMap<String, Association>,
}

impl EntitySchema {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            associations: BTreeMap::new(),
        }
    }

    pub fn with_association(mut self, name: impl Into<String>, association: Association) -> Self {
        self.associations.insert(name.into(), association);
        self
    }
}

/// Fully resolved association metadata handed to the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationInfo {
    pub kind: AssociationKind,
    pub foreign_key: String,
    pub owner_key: String,
    pub target_entity: String,
    pub target_table: String,
}

/// Source of association metadata.
pub trait AssociationSource: Send + Sync {
    /// Physical table for an entity.
    fn table(&self, entity: &str) -> Option<&str>;

    /// Metadata for `entity.relation`, or `None` when either is unknown.
    fn association(&self, entity: &str, relation: &str) -> Option<AssociationInfo>;
}

/// Statically registered entity/association table.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entities: HashMap<String, EntitySchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, name: impl Into<String>, entity: EntitySchema) -> Self {
        self.register(name, entity);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, entity: EntitySchema) {
        self.entities.insert(name.into(), entity);
    }

    pub fn entity(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl AssociationSource for SchemaRegistry {
    fn table(&self, entity: &str) -> Option<&str> {
        self.entities.get(entity).map(|e| e.table.as_str())
    }

    fn association(&self, entity: &str, relation: &str) -> Option<AssociationInfo> {
        let assoc = self.entities.get(entity)?.associations.get(relation)?;
        let target_table = self.table(&assoc.target)?.to_string();

        // Unset keys follow the usual `<name>_id` / `id` convention.
        let (foreign_key, owner_key) = match assoc.kind {
            AssociationKind::BelongsTo => (
                assoc
                    .foreign_key
                    .clone()
                    .unwrap_or_else(|| format!("{relation}_id")),
                assoc.owner_key.clone().unwrap_or_else(|| "id".to_string()),
            ),
            AssociationKind::HasOne
            | AssociationKind::HasMany
            | AssociationKind::BelongsToMany
            | AssociationKind::MorphTo => (
                assoc
                    .foreign_key
                    .clone()
                    .unwrap_or_else(|| format!("{entity}_id")),
                assoc.owner_key.clone().unwrap_or_else(|| "id".to_string()),
            ),
        };

        Some(AssociationInfo {
            kind: assoc.kind,
            foreign_key,
            owner_key,
            target_entity: assoc.target.clone(),
            target_table,
        })
    }
}
