//! Listing orchestration.
//!
//! A [`Listing`] declares what a resource can be filtered, searched and
//! sorted by. [`ListingComposer`] turns a listing plus a request into a
//! query in one pass (search, then filters, then sorts) and
//! [`ListingService`] hands the result to a [`Paginator`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::definitions::{FilterDefinition, SearchDefinition, SearchMode, SortDefinition, SortTarget};
use super::pager::{ListingPage, Paginator};
use super::query::{AggregateOrder, QueryContext};
use super::registry::FilterRegistry;
use super::request::{ListingRequest, SortRequest};
use super::resolver::{QueryBuild, ResolutionError, split_path};
use super::schema::{AssociationKind, AssociationSource};
use super::search::SearchEngine;
use super::vocabulary::{FilterOperator, FilterType, SortDirection};

/// Default page size when neither the request nor the listing sets one.
pub const DEFAULT_PER_PAGE: u32 = 20;

/// Upper bound on page size.
pub const MAX_PER_PAGE: u32 = 100;

/// Errors surfaced by [`ListingService`].
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("unknown listing resource '{0}'")]
    UnknownResource(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("pagination failed")]
    Pagination(#[from] anyhow::Error),
}

/// Ordering used when no requested sort key applies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefaultSort {
    /// Column on the base table.
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl DefaultSort {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }
}

/// Capability declaration for one listable resource.
pub trait Listing: Send + Sync {
    /// Root entity name in the schema.
    fn entity(&self) -> &str;

    fn filters(&self) -> &[FilterDefinition];

    fn searchable(&self) -> &[SearchDefinition];

    fn sortable(&self) -> &[SortDefinition];

    fn default_sort(&self) -> Option<&DefaultSort>;

    /// Whether more than one requested sort key is honored.
    fn supports_multi_sort(&self) -> bool {
        false
    }

    /// Page size for this resource, if it overrides the service default.
    fn default_per_page(&self) -> Option<u32> {
        None
    }

    fn filter_definition(&self, name: &str) -> Option<&FilterDefinition> {
        self.filters().iter().find(|f| f.name == name)
    }

    fn sort_definition(&self, name: &str) -> Option<&SortDefinition> {
        self.sortable().iter().find(|s| s.name == name)
    }

    /// Apply requested sorts, falling back to the default sort.
    ///
    /// Resources with unusual ordering needs may override this.
    fn apply_sorts(
        &self,
        build: &mut QueryBuild<'_>,
        sorts: &[SortRequest],
    ) -> Result<(), ResolutionError> {
        apply_requested_sorts(self, build, sorts)
    }
}

/// Sort composition shared by every [`Listing`] that does not override it.
pub fn apply_requested_sorts<L>(
    listing: &L,
    build: &mut QueryBuild<'_>,
    sorts: &[SortRequest],
) -> Result<(), ResolutionError>
where
    L: Listing + ?Sized,
{
    let requested = if listing.supports_multi_sort() {
        sorts
    } else {
        &sorts[..sorts.len().min(1)]
    };

    let mut applied = 0;
    for request in requested {
        match listing.sort_definition(&request.column) {
            Some(definition) => {
                apply_sort(build, definition, request.direction)?;
                applied += 1;
            }
            None => {
                tracing::debug!(sort = %request.column, "ignoring unknown sort key");
            }
        }
    }

    if applied == 0
        && let Some(default) = listing.default_sort()
    {
        let column = build.query().base_column(&default.column);
        build.query_mut().add_order_by(&column, default.direction);
    }
    Ok(())
}

/// Apply one sort definition: custom > aggregate > relationship > column.
pub fn apply_sort(
    build: &mut QueryBuild<'_>,
    definition: &SortDefinition,
    direction: SortDirection,
) -> Result<(), ResolutionError> {
    match definition.target() {
        SortTarget::Custom(custom) => custom.apply(build.query_mut(), direction),
        SortTarget::Aggregate {
            relationship,
            aggregate,
        } => {
            let relationship =
                relationship.ok_or_else(|| ResolutionError::AggregateWithoutRelationship {
                    sort: definition.name.clone(),
                })?;
            let (prefix, relation) = split_path(relationship);
            let owner = match prefix {
                Some(prefix) => build.resolve_and_join(prefix)?,
                None => build.resolver().root().clone(),
            };
            let info = build.resolver().association(&owner.entity, relation)?;
            let (inner_key, outer_column) = match info.kind {
                AssociationKind::BelongsTo => (info.owner_key, info.foreign_key),
                AssociationKind::HasOne | AssociationKind::HasMany => {
                    (info.foreign_key, info.owner_key)
                }
                AssociationKind::BelongsToMany | AssociationKind::MorphTo => {
                    return Err(ResolutionError::UnsupportedAssociation {
                        entity: owner.entity,
                        relation: relation.to_string(),
                        kind: info.kind,
                    });
                }
            };
            let order = AggregateOrder {
                function: aggregate.function,
                table: info.target_table,
                column: aggregate.column.clone(),
                inner_key,
                outer_key: (owner.alias, outer_column),
            };
            build.query_mut().add_order_by_aggregate(&order, direction);
        }
        SortTarget::Relationship {
            relationship,
            column,
        } => {
            let column = build.resolve_column(Some(relationship), column)?;
            build.query_mut().add_order_by(&column, direction);
        }
        SortTarget::Column(column) => {
            let column = build.query().base_column(column);
            build.query_mut().add_order_by(&column, direction);
        }
    }
    Ok(())
}

/// Listing declared as data (from the catalog or built in code).
#[derive(Debug, Clone)]
pub struct ResourceListing {
    entity: String,
    filters: Vec<FilterDefinition>,
    searchable: Vec<SearchDefinition>,
    sortable: Vec<SortDefinition>,
    default_sort: Option<DefaultSort>,
    multi_sort: bool,
    per_page: Option<u32>,
}

impl ResourceListing {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            filters: Vec::new(),
            searchable: Vec::new(),
            sortable: Vec::new(),
            default_sort: None,
            multi_sort: false,
            per_page: None,
        }
    }

    pub fn with_filter(mut self, filter: FilterDefinition) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_search(mut self, search: SearchDefinition) -> Self {
        self.searchable.push(search);
        self
    }

    pub fn with_sort(mut self, sort: SortDefinition) -> Self {
        self.sortable.push(sort);
        self
    }

    pub fn with_default_sort(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.default_sort = Some(DefaultSort::new(column, direction));
        self
    }

    pub fn with_multi_sort(mut self, enabled: bool) -> Self {
        self.multi_sort = enabled;
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page);
        self
    }
}

impl Listing for ResourceListing {
    fn entity(&self) -> &str {
        &self.entity
    }

    fn filters(&self) -> &[FilterDefinition] {
        &self.filters
    }

    fn searchable(&self) -> &[SearchDefinition] {
        &self.searchable
    }

    fn sortable(&self) -> &[SortDefinition] {
        &self.sortable
    }

    fn default_sort(&self) -> Option<&DefaultSort> {
        self.default_sort.as_ref()
    }

    fn supports_multi_sort(&self) -> bool {
        self.multi_sort
    }

    fn default_per_page(&self) -> Option<u32> {
        self.per_page
    }
}

/// Composes listing queries against one schema.
pub struct ListingComposer {
    schema: Arc<dyn AssociationSource>,
    registry: FilterRegistry,
    search: SearchEngine,
}

impl ListingComposer {
    pub fn new(schema: Arc<dyn AssociationSource>) -> Self {
        Self {
            schema,
            registry: FilterRegistry::new(),
            search: SearchEngine::new(),
        }
    }

    pub fn with_registry(mut self, registry: FilterRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_search_engine(mut self, search: SearchEngine) -> Self {
        self.search = search;
        self
    }

    pub fn schema(&self) -> &dyn AssociationSource {
        self.schema.as_ref()
    }

    /// Build the query for `request` against `listing`.
    ///
    /// The join ledger lives only for the duration of this call.
    pub fn compose(
        &self,
        listing: &dyn Listing,
        request: &ListingRequest,
    ) -> Result<QueryContext, ResolutionError> {
        let mut build = QueryBuild::new(self.schema.as_ref(), listing.entity())?;

        if let Some(term) = request.search.as_deref() {
            self.search.apply(&mut build, term, listing.searchable())?;
        }

        for definition in listing.filters() {
            if let Some(raw) = request.filters.get(&definition.name) {
                self.registry.apply(&mut build, definition, raw)?;
            }
        }
        for name in request.filters.keys() {
            if listing.filter_definition(name).is_none() {
                tracing::debug!(filter = %name, "ignoring unknown filter key");
            }
        }

        listing.apply_sorts(&mut build, &request.sorts)?;

        Ok(build.into_query())
    }
}

/// Registered listings plus composition and pagination.
pub struct ListingService {
    composer: ListingComposer,
    paginator: Arc<dyn Paginator>,
    listings: HashMap<String, Arc<dyn Listing>>,
    default_per_page: u32,
    max_per_page: u32,
}

impl ListingService {
    pub fn new(composer: ListingComposer, paginator: Arc<dyn Paginator>) -> Self {
        Self {
            composer,
            paginator,
            listings: HashMap::new(),
            default_per_page: DEFAULT_PER_PAGE,
            max_per_page: MAX_PER_PAGE,
        }
    }

    pub fn with_page_limits(mut self, default_per_page: u32, max_per_page: u32) -> Self {
        self.max_per_page = max_per_page.max(1);
        self.default_per_page = default_per_page.clamp(1, self.max_per_page);
        self
    }

    pub fn with_listing(mut self, resource: impl Into<String>, listing: Arc<dyn Listing>) -> Self {
        self.register(resource, listing);
        self
    }

    pub fn register(&mut self, resource: impl Into<String>, listing: Arc<dyn Listing>) {
        self.listings.insert(resource.into(), listing);
    }

    pub fn listing(&self, resource: &str) -> Option<Arc<dyn Listing>> {
        self.listings.get(resource).cloned()
    }

    /// Registered resource names, sorted.
    pub fn resources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.listings.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn composer(&self) -> &ListingComposer {
        &self.composer
    }

    /// Compose the query for `resource` without executing it.
    pub fn compose(
        &self,
        resource: &str,
        request: &ListingRequest,
    ) -> Result<QueryContext, ListingError> {
        let listing = self
            .listings
            .get(resource)
            .ok_or_else(|| ListingError::UnknownResource(resource.to_string()))?;
        Ok(self.composer.compose(listing.as_ref(), request)?)
    }

    /// Page size: request, then listing default, then service default,
    /// capped at the service maximum.
    pub fn per_page(&self, listing: &dyn Listing, request: &ListingRequest) -> u32 {
        let requested = request
            .per_page
            .or_else(|| listing.default_per_page())
            .unwrap_or(self.default_per_page)
            .max(1);
        if requested > self.max_per_page {
            tracing::warn!(
                requested = requested,
                capped = self.max_per_page,
                "per_page exceeds maximum, capping"
            );
            self.max_per_page
        } else {
            requested
        }
    }

    /// Compose and paginate one listing request.
    pub async fn get_results(
        &self,
        resource: &str,
        request: &ListingRequest,
    ) -> Result<ListingPage, ListingError> {
        let listing = self
            .listing(resource)
            .ok_or_else(|| ListingError::UnknownResource(resource.to_string()))?;

        let query = self.composer.compose(listing.as_ref(), request)?;
        let per_page = self.per_page(listing.as_ref(), request);
        let page = request.page.max(1);

        tracing::debug!(
            resource = resource,
            page = page,
            per_page = per_page,
            joins = query.joins().len(),
            predicates = query.predicate_count(),
            "composed listing query"
        );

        Ok(self.paginator.paginate(&query, page, per_page).await?)
    }

    /// Capability metadata for `resource`.
    pub fn capabilities(&self, resource: &str) -> Result<Capabilities, ListingError> {
        let listing = self
            .listings
            .get(resource)
            .ok_or_else(|| ListingError::UnknownResource(resource.to_string()))?;
        Ok(Capabilities::of(resource, listing.as_ref()))
    }
}

/// Filter metadata exposed to clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FilterCapability {
    pub name: String,
    #[serde(rename = "type")]
    pub filter_type: FilterType,
    pub operators: Vec<FilterOperator>,
    pub default_operator: FilterOperator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<super::definitions::FilterOption>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchCapability {
    pub column: String,
    pub weight: u32,
    pub mode: SearchMode,
}

/// What a client may send for one resource.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Capabilities {
    pub resource: String,
    pub filters: Vec<FilterCapability>,
    pub search: Vec<SearchCapability>,
    pub sorts: Vec<String>,
    pub multi_sort: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_sort: Option<DefaultSort>,
}

impl Capabilities {
    pub fn of(resource: &str, listing: &dyn Listing) -> Self {
        Self {
            resource: resource.to_string(),
            filters: listing
                .filters()
                .iter()
                .map(|f| FilterCapability {
                    name: f.name.clone(),
                    filter_type: f.filter_type,
                    operators: f.allowed_operators().to_vec(),
                    default_operator: f.filter_type.default_operator(),
                    label: f.label.clone(),
                    placeholder: f.placeholder.clone(),
                    options: f.options.clone(),
                })
                .collect(),
            search: listing
                .searchable()
                .iter()
                .map(|s| SearchCapability {
                    column: s.column.clone(),
                    weight: s.weight(),
                    mode: s.mode,
                })
                .collect(),
            sorts: listing.sortable().iter().map(|s| s.name.clone()).collect(),
            multi_sort: listing.supports_multi_sort(),
            default_sort: listing.default_sort().cloned(),
        }
    }
}
