//! Declarative listing queries.
//!
//! This module provides:
//! - Vocabulary and definitions: operators, filter types, and the filter,
//!   search and sort capabilities a resource declares
//! - RelationshipResolver: dotted-path joins, deduplicated per query build
//! - FilterRegistry / SearchEngine: request values to predicates
//! - ListingComposer / ListingService: search, filter and sort composition
//!   plus pagination hand-off
//! - Catalog: YAML declaration of entities and resources

pub mod catalog;
pub mod definitions;
pub mod pager;
pub mod query;
pub mod registry;
pub mod request;
pub mod resolver;
pub mod schema;
pub mod search;
pub mod service;
pub mod strategy;
pub mod value;
pub mod vocabulary;

pub use catalog::{BuiltinSort, Catalog};
pub use definitions::{
    AggregateFunction, CustomSort, FilterDefinition, FilterOption, SearchDefinition, SearchMode,
    SortAggregate, SortDefinition, SortTarget,
};
pub use pager::{ListingPage, Paginator, PgPaginator};
pub use query::QueryContext;
pub use registry::FilterRegistry;
pub use request::{ListingRequest, SortRequest};
pub use resolver::{JoinLedger, QueryBuild, RelationshipResolver, ResolutionError, ResolvedColumn};
pub use schema::{Association, AssociationKind, AssociationSource, EntitySchema, SchemaRegistry};
pub use search::SearchEngine;
pub use service::{
    Capabilities, DefaultSort, Listing, ListingComposer, ListingError, ListingService,
    ResourceListing,
};
pub use strategy::{FilterStrategy, StrategyKind};
pub use vocabulary::{FilterOperator, FilterType, SortDirection};
