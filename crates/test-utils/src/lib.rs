//! Sift test utilities.
//!
//! Helpers for integration testing: a blog-shaped schema and catalog,
//! listing fixtures, a recording paginator, and SQL assertion helpers.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use sift_kernel::listing::{
    Association, AssociationKind, EntitySchema, FilterDefinition, FilterOption, ListingPage,
    Paginator, QueryContext, ResourceListing, SchemaRegistry, SearchDefinition, SortAggregate,
    SortDefinition, SortDirection,
};
use sift_kernel::listing::vocabulary::FilterType;

/// Blog schema used across the kernel integration tests.
///
/// - `post` (posts): `author` and `editor` belong to `author`, `category`
///   belongs to `category`, `comments` has many `comment`, `tags` is a
///   pivot association
/// - `author` (authors): `department` belongs to `department`, `posts` has
///   many `post`, `profile` has one `profile`
/// - `comment` (comments): `post` and `author` belong to their entities
pub fn blog_schema() -> SchemaRegistry {
    SchemaRegistry::new()
        .with_entity(
            "post",
            EntitySchema::new("posts")
                .with_association("author", Association::belongs_to("author"))
                .with_association(
                    "editor",
                    Association::belongs_to("author").foreign_key("editor_id"),
                )
                .with_association("category", Association::belongs_to("category"))
                .with_association(
                    "comments",
                    Association::has_many("comment").foreign_key("post_id"),
                )
                .with_association(
                    "tags",
                    Association::new(AssociationKind::BelongsToMany, "tag"),
                ),
        )
        .with_entity(
            "author",
            EntitySchema::new("authors")
                .with_association("department", Association::belongs_to("department"))
                .with_association(
                    "posts",
                    Association::has_many("post").foreign_key("author_id"),
                )
                .with_association(
                    "profile",
                    Association::has_one("profile").foreign_key("author_id"),
                ),
        )
        .with_entity(
            "comment",
            EntitySchema::new("comments")
                .with_association("post", Association::belongs_to("post"))
                .with_association("author", Association::belongs_to("author")),
        )
        .with_entity("department", EntitySchema::new("departments"))
        .with_entity("category", EntitySchema::new("categories"))
        .with_entity("profile", EntitySchema::new("profiles"))
        .with_entity("tag", EntitySchema::new("tags"))
}

/// Listing over `post` with a representative capability set.
///
/// Single-sort, default order `created_at desc`.
pub fn posts_listing() -> ResourceListing {
    ResourceListing::new("post")
        .with_filter(
            FilterDefinition::new("status", FilterType::Select)
                .with_label("Status")
                .with_options([
                    FilterOption {
                        value: JsonValue::from("published"),
                        label: "Published".to_string(),
                    },
                    FilterOption {
                        value: JsonValue::from("draft"),
                        label: "Draft".to_string(),
                    },
                ]),
        )
        .with_filter(FilterDefinition::new("title", FilterType::Text))
        .with_filter(FilterDefinition::new("views", FilterType::Number))
        .with_filter(FilterDefinition::new("featured", FilterType::Boolean))
        .with_filter(FilterDefinition::new("created_at", FilterType::DateRange))
        .with_filter(FilterDefinition::new("author.name", FilterType::Text))
        .with_filter(FilterDefinition::new(
            "author.department.name",
            FilterType::Text,
        ))
        .with_filter(
            FilterDefinition::new("department_id", FilterType::Select)
                .with_relationship("author")
                .with_column("department_id"),
        )
        .with_search(SearchDefinition::new("title").with_weight(4))
        .with_search(SearchDefinition::new("slug").with_weight(2))
        .with_sort(SortDefinition::new("title"))
        .with_sort(SortDefinition::new("created_at"))
        .with_sort(SortDefinition::new("views"))
        .with_sort(
            SortDefinition::new("author_name")
                .with_column("first_name")
                .with_relationship("author"),
        )
        .with_sort(
            SortDefinition::new("department_name")
                .with_column("name")
                .with_relationship("author.department"),
        )
        .with_sort(
            SortDefinition::new("comment_count")
                .with_relationship("comments")
                .with_aggregate(SortAggregate::count()),
        )
        .with_default_sort("created_at", SortDirection::Desc)
}

/// The same blog domain as a catalog document.
pub const BLOG_CATALOG: &str = r#"
entities:
  post:
    table: posts
    associations:
      author: { kind: belongs_to, target: author }
      comments: { kind: has_many, target: comment, foreign_key: post_id }
  author:
    table: authors
    associations:
      department: { kind: belongs_to, target: department }
  comment:
    table: comments
  department:
    table: departments
resources:
  posts:
    entity: post
    per_page: 10
    default_sort: { column: created_at, direction: desc }
    filters:
      - name: status
        type: select
        label: Status
        options:
          - { value: published, label: Published }
          - { value: draft, label: Draft }
      - { name: author.name, type: text }
      - { name: created_at, type: date_range }
    search:
      - { column: title, weight: 4 }
      - { column: slug, weight: 2 }
    sorts:
      - name: title
      - { name: author_name, column: first_name, relationship: author }
      - name: comment_count
        relationship: comments
        aggregate: { function: count }
  authors:
    entity: author
    multi_sort: true
    default_sort: { column: last_name }
    search:
      - { column: last_name }
    sorts:
      - name: last_name
      - name: first_name
"#;

/// A page request as seen by a [`RecordingPaginator`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPage {
    pub sql: String,
    pub count_sql: String,
    pub page: u32,
    pub per_page: u32,
}

/// Paginator that records what it was asked for and returns canned rows.
#[derive(Debug, Default)]
pub struct RecordingPaginator {
    rows: Vec<JsonValue>,
    calls: Mutex<Vec<RecordedPage>>,
}

impl RecordingPaginator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows returned for every page.
    pub fn with_rows(mut self, rows: Vec<JsonValue>) -> Self {
        self.rows = rows;
        self
    }

    pub fn calls(&self) -> Vec<RecordedPage> {
        self.calls.lock().clone()
    }

    pub fn last_call(&self) -> Option<RecordedPage> {
        self.calls.lock().last().cloned()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl Paginator for RecordingPaginator {
    async fn paginate(
        &self,
        query: &QueryContext,
        page: u32,
        per_page: u32,
    ) -> anyhow::Result<ListingPage> {
        self.calls.lock().push(RecordedPage {
            sql: query.to_page_sql(page, per_page),
            count_sql: query.to_count_sql(),
            page,
            per_page,
        });
        let total = u64::try_from(self.rows.len()).unwrap_or(u64::MAX);
        Ok(ListingPage::new(self.rows.clone(), total, page, per_page))
    }
}

/// Assertion helpers for rendered SQL and JSON.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that a string does not contain a substring.
    pub fn not_contains(haystack: &str, needle: &str) {
        assert!(
            !haystack.contains(needle),
            "Expected string to NOT contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert how many times `needle` occurs in `haystack`.
    pub fn occurrences(haystack: &str, needle: &str, expected: usize) {
        let actual = haystack.matches(needle).count();
        assert_eq!(
            actual, expected,
            "Expected '{needle}' {expected} time(s), found {actual}\nActual: {haystack}"
        );
    }
}
