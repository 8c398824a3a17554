//! YAML resource catalog.
//!
//! Declares entities (table plus associations) and listable resources in one
//! document, loaded and validated at startup:
//!
//! ```yaml
//! entities:
//!   post:
//!     table: posts
//!     associations:
//!       author: { kind: belongs_to, target: user }
//!   user:
//!     table: users
//! resources:
//!   posts:
//!     entity: post
//!     default_sort: { column: created_at, direction: desc }
//!     filters:
//!       - { name: status, type: select }
//!     search:
//!       - { column: title, weight: 4 }
//!     sorts:
//!       - { name: author_name, column: name, relationship: author }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use sea_query::{Expr, SimpleExpr};
use serde::{Deserialize, Serialize};

use super::definitions::{
    AggregateFunction, CustomSort, FilterDefinition, SearchDefinition, SortAggregate,
    SortDefinition,
};
use super::query::QueryContext;
use super::schema::{AssociationKind, AssociationSource, EntitySchema, SchemaRegistry};
use super::service::{DefaultSort, ResourceListing};
use super::value::to_sql_value;
use super::vocabulary::{FilterType, SortDirection};

/// Built-in comparators available to catalog sorts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuiltinSort {
    /// Rank rows by the position of `column` in `values`; unlisted values
    /// sort last.
    ValueOrder {
        column: String,
        values: Vec<serde_json::Value>,
    },
    /// Order by `column`, with NULLs after every value in both directions.
    NullsLast { column: String },
}

impl BuiltinSort {
    fn column(&self) -> &str {
        match self {
            BuiltinSort::ValueOrder { column, .. } | BuiltinSort::NullsLast { column } => column,
        }
    }
}

impl CustomSort for BuiltinSort {
    fn apply(&self, query: &mut QueryContext, direction: SortDirection) {
        match self {
            BuiltinSort::ValueOrder { column, values } => {
                let column = query.base_column(column);
                let mut ranked = values
                    .iter()
                    .filter_map(|v| to_sql_value(FilterType::Select, v))
                    .enumerate();
                let Some((_, first)) = ranked.next() else {
                    return;
                };
                let mut case = Expr::case(column.expr().eq(first), 0);
                let mut rank: usize = 1;
                for (position, value) in ranked {
                    rank = position + 1;
                    let position = i64::try_from(position).unwrap_or(i64::MAX);
                    case = case.case(column.expr().eq(value), position);
                }
                let case: SimpleExpr = case.finally(i64::try_from(rank).unwrap_or(i64::MAX)).into();
                query.add_order_by_expr(case, direction);
            }
            BuiltinSort::NullsLast { column } => {
                let column = query.base_column(column);
                query.add_order_by_expr(column.expr().is_null(), SortDirection::Asc);
                query.add_order_by(&column, direction);
            }
        }
    }
}

/// Sort as written in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<SortAggregate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<BuiltinSort>,
}

impl SortSpec {
    pub fn to_definition(&self) -> SortDefinition {
        let mut definition = SortDefinition::new(&self.name);
        definition.column = self.column.clone();
        definition.relationship = self.relationship.clone();
        definition.aggregate = self.aggregate.clone();
        definition.custom = self
            .custom
            .clone()
            .map(|custom| Arc::new(custom) as Arc<dyn CustomSort>);
        definition
    }
}

/// Listable resource as written in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sort: Option<DefaultSort>,
    #[serde(default)]
    pub multi_sort: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,
    #[serde(default)]
    pub search: Vec<SearchDefinition>,
    #[serde(default)]
    pub sorts: Vec<SortSpec>,
}

impl ResourceSpec {
    pub fn to_listing(&self) -> ResourceListing {
        let mut listing = ResourceListing::new(&self.entity).with_multi_sort(self.multi_sort);
        if let Some(default) = &self.default_sort {
            listing = listing.with_default_sort(&default.column, default.direction);
        }
        if let Some(per_page) = self.per_page {
            listing = listing.with_per_page(per_page);
        }
        for filter in &self.filters {
            listing = listing.with_filter(filter.clone());
        }
        for search in &self.search {
            listing = listing.with_search(search.clone());
        }
        for sort in &self.sorts {
            listing = listing.with_sort(sort.to_definition());
        }
        listing
    }
}

/// Entities plus resources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub entities: BTreeMap<String, EntitySchema>,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceSpec>,
}

impl Catalog {
    /// Parse and validate a catalog document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let catalog: Catalog = serde_yml::from_str(yaml).context("failed to parse catalog")?;
        let errors = catalog.validate();
        if !errors.is_empty() {
            anyhow::bail!("catalog validation failed: {}", errors.join("; "));
        }
        Ok(catalog)
    }

    /// Read, parse and validate a catalog file.
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        let catalog = Self::from_yaml(&yaml)
            .with_context(|| format!("invalid catalog {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            entities = catalog.entities.len(),
            resources = catalog.resources.len(),
            "loaded listing catalog"
        );
        Ok(catalog)
    }

    pub fn schema(&self) -> SchemaRegistry {
        let mut schema = SchemaRegistry::new();
        for (name, entity) in &self.entities {
            schema.register(name, entity.clone());
        }
        schema
    }

    /// Resource name and listing pairs.
    pub fn listings(&self) -> impl Iterator<Item = (&str, ResourceListing)> + '_ {
        self.resources
            .iter()
            .map(|(name, spec)| (name.as_str(), spec.to_listing()))
    }

    /// Check the catalog for mistakes that would fail at query time.
    ///
    /// Returns every problem found. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let schema = self.schema();

        for (name, entity) in &self.entities {
            if !is_valid_identifier(name) {
                errors.push(format!("Entity name '{name}' contains invalid characters"));
            }
            if !is_valid_identifier(&entity.table) {
                errors.push(format!(
                    "Entity '{name}' table '{}' contains invalid characters",
                    entity.table
                ));
            }
            for (relation, association) in &entity.associations {
                if !is_valid_identifier(relation) {
                    errors.push(format!(
                        "Association '{name}.{relation}' has an invalid name"
                    ));
                }
                if !self.entities.contains_key(&association.target) {
                    errors.push(format!(
                        "Association '{name}.{relation}' targets unknown entity '{}'",
                        association.target
                    ));
                }
                for key in [&association.foreign_key, &association.owner_key]
                    .into_iter()
                    .flatten()
                {
                    if !is_valid_identifier(key) {
                        errors.push(format!(
                            "Association '{name}.{relation}' key '{key}' contains invalid characters"
                        ));
                    }
                }
            }
        }

        for (name, resource) in &self.resources {
            if !self.entities.contains_key(&resource.entity) {
                errors.push(format!(
                    "Resource '{name}' uses unknown entity '{}'",
                    resource.entity
                ));
                continue;
            }
            if resource.per_page == Some(0) {
                errors.push(format!("Resource '{name}' per_page must be at least 1"));
            }
            if let Some(default) = &resource.default_sort
                && !is_valid_identifier(&default.column)
            {
                errors.push(format!(
                    "Resource '{name}' default sort column '{}' contains invalid characters",
                    default.column
                ));
            }

            let check = |errors: &mut Vec<String>, what: String, path: Option<&str>, column: &str| {
                if !is_valid_identifier(column) {
                    errors.push(format!("{what} column '{column}' contains invalid characters"));
                }
                if let Some(path) = path
                    && let Err(problem) = check_path(&schema, &resource.entity, path)
                {
                    errors.push(format!("{what}: {problem}"));
                }
            };

            for filter in &resource.filters {
                if !is_valid_path(&filter.name) {
                    errors.push(format!(
                        "Resource '{name}' filter name '{}' is not a valid path",
                        filter.name
                    ));
                }
                check(
                    &mut errors,
                    format!("Resource '{name}' filter '{}'", filter.name),
                    filter.relationship_path(),
                    filter.column_name(),
                );
            }
            for search in &resource.search {
                check(
                    &mut errors,
                    format!("Resource '{name}' search '{}'", search.column),
                    search.relationship_path(),
                    search.column_name(),
                );
            }
            for sort in &resource.sorts {
                let what = format!("Resource '{name}' sort '{}'", sort.name);
                let definition = sort.to_definition();
                if let Some(custom) = &sort.custom {
                    check(&mut errors, what, None, custom.column());
                    continue;
                }
                if let Some(aggregate) = &sort.aggregate {
                    let Some(path) = definition.relationship_path() else {
                        errors.push(format!("{what} aggregates without a relationship"));
                        continue;
                    };
                    match (aggregate.function, aggregate.column.as_deref()) {
                        (AggregateFunction::Count, _) => {}
                        (_, Some(column)) if is_valid_identifier(column) => {}
                        (function, Some(column)) => errors.push(format!(
                            "{what} {} column '{column}' contains invalid characters",
                            function.as_str()
                        )),
                        (function, None) => errors.push(format!(
                            "{what} {} aggregate needs a column",
                            function.as_str()
                        )),
                    }
                    if let Err(problem) = check_path(&schema, &resource.entity, path) {
                        errors.push(format!("{what}: {problem}"));
                    }
                    continue;
                }
                check(
                    &mut errors,
                    what,
                    definition.relationship_path(),
                    definition.column_name(),
                );
            }
        }

        errors
    }
}

/// Walk `path` from `entity` through the schema.
fn check_path(schema: &SchemaRegistry, entity: &str, path: &str) -> Result<(), String> {
    let mut current = entity.to_string();
    for segment in path.split('.') {
        let info = schema
            .association(&current, segment)
            .ok_or_else(|| format!("entity '{current}' has no relation '{segment}'"))?;
        match info.kind {
            AssociationKind::BelongsTo | AssociationKind::HasOne | AssociationKind::HasMany => {}
            AssociationKind::BelongsToMany | AssociationKind::MorphTo => {
                return Err(format!(
                    "relation '{current}.{segment}' is a {} association, which cannot be joined",
                    info.kind
                ));
            }
        }
        current = info.target_entity;
    }
    Ok(())
}

/// SQL identifier: ASCII letter or underscore, then letters, digits or
/// underscores.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Dotted path of identifiers.
pub fn is_valid_path(path: &str) -> bool {
    path.split('.').all(is_valid_identifier)
}
