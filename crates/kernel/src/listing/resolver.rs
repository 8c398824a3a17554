//! Relationship path resolution and join deduplication.
//!
//! A dotted path such as `author.department.name` splits into a
//! relationship chain (`author.department`) and a leaf column (`name`).
//! Walking the chain emits one LEFT JOIN per `(origin alias, relation)`
//! pair per query build; the [`JoinLedger`] that enforces this is owned by
//! a [`QueryBuild`] and never outlives one composition.

use std::collections::{HashMap, HashSet};

use sea_query::{Alias, Expr};
use thiserror::Error;

use super::query::{JoinClause, QueryContext};
use super::schema::{AssociationInfo, AssociationKind, AssociationSource};

/// Fatal resolution failures. These point at a misconfigured capability
/// declaration, not at user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("unknown entity '{entity}'")]
    UnknownEntity { entity: String },

    #[error("entity '{entity}' has no relation '{relation}'")]
    UnknownRelation { entity: String, relation: String },

    #[error("relation '{entity}.{relation}' is a {kind} association, which cannot be joined")]
    UnsupportedAssociation {
        entity: String,
        relation: String,
        kind: AssociationKind,
    },

    #[error("aggregate sort '{sort}' has no relationship to aggregate over")]
    AggregateWithoutRelationship { sort: String },
}

/// Split a dotted path into `(relationship chain, leaf column)`.
pub fn split_path(path: &str) -> (Option<&str>, &str) {
    match path.rsplit_once('.') {
        Some((chain, column)) if !chain.is_empty() => (Some(chain), column),
        Some((_, column)) => (None, column),
        None => (None, path),
    }
}

/// Column reference produced by resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    /// Physical column name.
    pub column: String,
    /// Relationship chain the column was reached through.
    pub relationship_path: Option<String>,
    /// Alias of the table owning the column.
    pub owner: String,
}

impl ResolvedColumn {
    pub fn new(owner: &str, column: &str, relationship_path: Option<&str>) -> Self {
        Self {
            column: column.to_string(),
            relationship_path: relationship_path.map(str::to_string),
            owner: owner.to_string(),
        }
    }

    /// `owner.column`.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.owner, self.column)
    }

    pub fn expr(&self) -> Expr {
        Expr::col((Alias::new(&self.owner), Alias::new(&self.column)))
    }
}

/// Entity instance reachable in the query: the entity name plus the alias
/// its table is visible under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTarget {
    pub entity: String,
    pub alias: String,
}

/// Joins emitted during one query build.
#[derive(Debug, Default)]
pub struct JoinLedger {
    joined: HashMap<(String, String), JoinTarget>,
    aliases: HashSet<String>,
}

impl JoinLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target already joined for `relation` from `origin_alias`.
    pub fn get(&self, origin_alias: &str, relation: &str) -> Option<&JoinTarget> {
        self.joined
            .get(&(origin_alias.to_string(), relation.to_string()))
    }

    pub fn contains(&self, origin_alias: &str, relation: &str) -> bool {
        self.get(origin_alias, relation).is_some()
    }

    pub fn len(&self) -> usize {
        self.joined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joined.is_empty()
    }

    /// Forget every recorded join.
    pub fn reset(&mut self) {
        self.joined.clear();
        self.aliases.clear();
    }

    fn record(&mut self, origin_alias: &str, relation: &str, target: JoinTarget) {
        self.aliases.insert(target.alias.clone());
        self.joined
            .insert((origin_alias.to_string(), relation.to_string()), target);
    }

    /// First free alias for `table`: the table name, then `table_2`, ...
    fn allocate_alias(&self, table: &str, reserved: &str) -> String {
        let taken = |alias: &str| alias == reserved || self.aliases.contains(alias);
        if !taken(table) {
            return table.to_string();
        }
        (2..)
            .map(|n| format!("{table}_{n}"))
            .find(|alias| !taken(alias))
            .unwrap_or_else(|| table.to_string())
    }
}

/// Walks relationship chains from a root entity.
pub struct RelationshipResolver<'s> {
    schema: &'s dyn AssociationSource,
    root: JoinTarget,
}

impl<'s> RelationshipResolver<'s> {
    /// Resolver rooted at `entity`, whose table becomes the base alias.
    pub fn new(schema: &'s dyn AssociationSource, entity: &str) -> Result<Self, ResolutionError> {
        let table = schema
            .table(entity)
            .ok_or_else(|| ResolutionError::UnknownEntity {
                entity: entity.to_string(),
            })?;
        Ok(Self {
            schema,
            root: JoinTarget {
                entity: entity.to_string(),
                alias: table.to_string(),
            },
        })
    }

    pub fn root(&self) -> &JoinTarget {
        &self.root
    }

    /// Joinable association metadata for `entity.relation`.
    pub fn association(
        &self,
        entity: &str,
        relation: &str,
    ) -> Result<AssociationInfo, ResolutionError> {
        let info = self.schema.association(entity, relation).ok_or_else(|| {
            ResolutionError::UnknownRelation {
                entity: entity.to_string(),
                relation: relation.to_string(),
            }
        })?;
        match info.kind {
            AssociationKind::BelongsTo | AssociationKind::HasOne | AssociationKind::HasMany => {
                Ok(info)
            }
            AssociationKind::BelongsToMany | AssociationKind::MorphTo => {
                Err(ResolutionError::UnsupportedAssociation {
                    entity: entity.to_string(),
                    relation: relation.to_string(),
                    kind: info.kind,
                })
            }
        }
    }

    /// Join every segment of `path` (once per build) and return the entity
    /// instance owning the leaf.
    pub fn resolve_and_join(
        &self,
        query: &mut QueryContext,
        ledger: &mut JoinLedger,
        path: &str,
    ) -> Result<JoinTarget, ResolutionError> {
        let mut current = self.root.clone();

        for segment in path.split('.') {
            if let Some(target) = ledger.get(&current.alias, segment) {
                current = target.clone();
                continue;
            }

            let info = self.association(&current.entity, segment)?;
            let alias = ledger.allocate_alias(&info.target_table, &self.root.alias);

            let (left, right) = match info.kind {
                AssociationKind::BelongsTo => (
                    (current.alias.clone(), info.foreign_key.clone()),
                    (alias.clone(), info.owner_key.clone()),
                ),
                AssociationKind::HasOne | AssociationKind::HasMany => (
                    (current.alias.clone(), info.owner_key.clone()),
                    (alias.clone(), info.foreign_key.clone()),
                ),
                AssociationKind::BelongsToMany | AssociationKind::MorphTo => {
                    return Err(ResolutionError::UnsupportedAssociation {
                        entity: current.entity.clone(),
                        relation: segment.to_string(),
                        kind: info.kind,
                    });
                }
            };

            tracing::trace!(
                origin = %current.alias,
                relation = segment,
                table = %info.target_table,
                alias = %alias,
                "joining relation"
            );

            query.add_join(JoinClause {
                table: info.target_table.clone(),
                alias: alias.clone(),
                left,
                right,
            });

            let target = JoinTarget {
                entity: info.target_entity,
                alias,
            };
            ledger.record(&current.alias, segment, target.clone());
            current = target;
        }

        Ok(current)
    }

    /// Qualify `column`, joining through `relationship` first when given.
    pub fn resolve_column(
        &self,
        query: &mut QueryContext,
        ledger: &mut JoinLedger,
        relationship: Option<&str>,
        column: &str,
    ) -> Result<ResolvedColumn, ResolutionError> {
        match relationship {
            Some(path) => {
                let owner = self.resolve_and_join(query, ledger, path)?;
                Ok(ResolvedColumn::new(&owner.alias, column, Some(path)))
            }
            None => Ok(ResolvedColumn::new(&self.root.alias, column, None)),
        }
    }
}

/// One query composition: the query being built, its join ledger, and the
/// resolver that writes to both. Created per request and consumed at
/// hand-off.
pub struct QueryBuild<'s> {
    query: QueryContext,
    ledger: JoinLedger,
    resolver: RelationshipResolver<'s>,
}

impl<'s> QueryBuild<'s> {
    pub fn new(schema: &'s dyn AssociationSource, entity: &str) -> Result<Self, ResolutionError> {
        let resolver = RelationshipResolver::new(schema, entity)?;
        Ok(Self {
            query: QueryContext::new(resolver.root().alias.clone()),
            ledger: JoinLedger::new(),
            resolver,
        })
    }

    pub fn query(&self) -> &QueryContext {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut QueryContext {
        &mut self.query
    }

    pub fn ledger(&self) -> &JoinLedger {
        &self.ledger
    }

    pub fn resolver(&self) -> &RelationshipResolver<'s> {
        &self.resolver
    }

    pub fn resolve_and_join(&mut self, path: &str) -> Result<JoinTarget, ResolutionError> {
        self.resolver
            .resolve_and_join(&mut self.query, &mut self.ledger, path)
    }

    pub fn resolve_column(
        &mut self,
        relationship: Option<&str>,
        column: &str,
    ) -> Result<ResolvedColumn, ResolutionError> {
        self.resolver
            .resolve_column(&mut self.query, &mut self.ledger, relationship, column)
    }

    /// Discard everything composed so far, keeping the root entity.
    pub fn reset(&mut self) {
        self.ledger.reset();
        self.query = QueryContext::new(self.resolver.root().alias.clone());
    }

    /// Hand the composed query off; the ledger is dropped here.
    pub fn into_query(self) -> QueryContext {
        self.query
    }
}
