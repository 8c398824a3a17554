//! Free-text search across declared columns.
//!
//! One search term becomes a single OR group (one branch per searchable
//! column) AND'ed with the rest of the query.

use super::definitions::{SearchDefinition, SearchMode};
use super::resolver::{QueryBuild, ResolutionError, ResolvedColumn};
use super::strategy::{escape_like_wildcards, lower_like};

/// Default cap on search term length, in characters.
pub const DEFAULT_MAX_SEARCH_LENGTH: usize = 255;

/// Default PostgreSQL text search configuration.
pub const DEFAULT_TEXT_SEARCH_CONFIG: &str = "simple";

#[derive(Debug, Clone)]
pub struct SearchEngine {
    max_length: usize,
    text_search_config: String,
}

impl SearchEngine {
    pub fn new() -> Self {
        Self {
            max_length: DEFAULT_MAX_SEARCH_LENGTH,
            text_search_config: DEFAULT_TEXT_SEARCH_CONFIG.to_string(),
        }
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_text_search_config(mut self, config: impl Into<String>) -> Self {
        self.text_search_config = config.into();
        self
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Trimmed term, cut to `max_length` characters. `None` when empty.
    pub fn normalize_term(&self, raw: &str) -> Option<String> {
        let term: String = raw.trim().chars().take(self.max_length).collect();
        let term = term.trim_end().to_string();
        if term.is_empty() { None } else { Some(term) }
    }

    /// Add the search group for `raw` over `definitions`.
    ///
    /// Returns whether a group was added.
    pub fn apply(
        &self,
        build: &mut QueryBuild<'_>,
        raw: &str,
        definitions: &[SearchDefinition],
    ) -> Result<bool, ResolutionError> {
        if definitions.is_empty() {
            return Ok(false);
        }
        let Some(term) = self.normalize_term(raw) else {
            return Ok(false);
        };

        let like_pattern = format!("%{}%", escape_like_wildcards(&term.to_lowercase()));
        let ts_query = to_prefix_tsquery(&term);

        let mut branches = Vec::with_capacity(definitions.len());
        for definition in definitions {
            match definition.mode {
                SearchMode::Like => {
                    let column = build
                        .resolve_column(definition.relationship_path(), definition.column_name())?;
                    branches.push(lower_like(&column, like_pattern.clone()));
                }
                SearchMode::FullText => {
                    let Some(ts_query) = ts_query.as_deref() else {
                        tracing::debug!(
                            column = %definition.column,
                            "search term has no full-text words, skipping column"
                        );
                        continue;
                    };
                    let column = build
                        .resolve_column(definition.relationship_path(), definition.column_name())?;
                    branches.push(self.full_text_match(&column, ts_query));
                }
            }
        }

        let added = build.query_mut().add_or_group(branches);
        if added {
            tracing::debug!(term = %term, columns = definitions.len(), "applied search");
        }
        Ok(added)
    }

    fn full_text_match(&self, column: &ResolvedColumn, ts_query: &str) -> sea_query::SimpleExpr {
        let sql = format!(
            r#"to_tsvector($1::regconfig, "{}"."{}") @@ to_tsquery($2::regconfig, $3)"#,
            column.owner, column.column
        );
        sea_query::Expr::cust_with_values(
            sql,
            [
                self.text_search_config.clone(),
                self.text_search_config.clone(),
                ts_query.to_string(),
            ],
        )
    }
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a `tsquery` requiring every word as a prefix match
/// (`rust:* & async:*`). Characters with meaning to `tsquery` are dropped.
/// `None` when no words remain.
pub fn to_prefix_tsquery(term: &str) -> Option<String> {
    let cleaned: String = term
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    let words: Vec<String> = cleaned
        .split_whitespace()
        .map(|word| format!("{}:*", word.to_lowercase()))
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" & "))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::listing::schema::{Association, EntitySchema, SchemaRegistry};

    fn schema() -> SchemaRegistry {
        SchemaRegistry::new()
            .with_entity(
                "post",
                EntitySchema::new("posts")
                    .with_association("author", Association::belongs_to("user")),
            )
            .with_entity("user", EntitySchema::new("users"))
    }

    fn search(term: &str, definitions: &[SearchDefinition]) -> (bool, String) {
        let schema = schema();
        let mut build = QueryBuild::new(&schema, "post").unwrap();
        let added = SearchEngine::new()
            .apply(&mut build, term, definitions)
            .unwrap();
        (added, build.into_query().to_sql())
    }

    #[test]
    fn two_columns_one_or_group() {
        let defs = [
            SearchDefinition::new("title").with_weight(4),
            SearchDefinition::new("slug").with_weight(2),
        ];
        let (added, sql) = search("  hello  ", &defs);
        assert!(added);
        assert!(
            sql.contains(r#"LOWER("posts"."title") LIKE '%hello%' OR LOWER("posts"."slug") LIKE '%hello%'"#),
            "{sql}"
        );
        assert_eq!(sql.matches(" OR ").count(), 1, "{sql}");
        assert_eq!(sql.matches("LIKE").count(), 2, "{sql}");
    }

    #[test]
    fn group_is_parenthesized_next_to_filters() {
        let schema = schema();
        let mut build = QueryBuild::new(&schema, "post").unwrap();
        let status = build.query().base_column("status");
        build
            .query_mut()
            .add_predicate(sea_query::ExprTrait::eq(status.expr(), "published"));
        SearchEngine::new()
            .apply(
                &mut build,
                "hello",
                &[SearchDefinition::new("title"), SearchDefinition::new("slug")],
            )
            .unwrap();
        let sql = build.into_query().to_sql();
        assert!(sql.contains("AND (LOWER("), "{sql}");
    }

    #[test]
    fn empty_term_or_definitions_is_a_no_op() {
        let (added, sql) = search("   ", &[SearchDefinition::new("title")]);
        assert!(!added);
        assert!(!sql.contains("WHERE"), "{sql}");

        let (added, _) = search("hello", &[]);
        assert!(!added);
    }

    #[test]
    fn term_is_truncated() {
        let engine = SearchEngine::new().with_max_length(5);
        assert_eq!(engine.normalize_term("  abcdefgh "), Some("abcde".to_string()));
        assert_eq!(engine.normalize_term(""), None);

        let long = "x".repeat(400);
        let term = SearchEngine::new().normalize_term(&long).unwrap();
        assert_eq!(term.chars().count(), DEFAULT_MAX_SEARCH_LENGTH);
    }

    #[test]
    fn relationship_column_joins_once() {
        let defs = [
            SearchDefinition::new("author.name"),
            SearchDefinition::new("email").with_relationship("author"),
        ];
        let (_, sql) = search("ada", &defs);
        assert_eq!(sql.matches("LEFT JOIN").count(), 1, "{sql}");
        assert!(sql.contains(r#"LOWER("users"."email")"#), "{sql}");
    }

    #[test]
    fn full_text_branch() {
        let (added, sql) = search("rust async", &[SearchDefinition::new("body").full_text()]);
        assert!(added);
        assert!(
            sql.contains(r#"to_tsvector('simple'::regconfig, "posts"."body") @@ to_tsquery('simple'::regconfig, 'rust:* & async:*')"#),
            "{sql}"
        );
    }

    #[test]
    fn full_text_without_words_is_skipped() {
        let defs = [
            SearchDefinition::new("title"),
            SearchDefinition::new("body").full_text(),
        ];
        let (added, sql) = search("&&!", &defs);
        assert!(added);
        assert!(!sql.contains("to_tsquery"), "{sql}");
        assert!(sql.contains("LIKE"), "{sql}");
    }

    #[test]
    fn tsquery_sanitizer() {
        assert_eq!(to_prefix_tsquery("Rust"), Some("rust:*".to_string()));
        assert_eq!(
            to_prefix_tsquery("a|b & !c"),
            Some("a:* & b:* & c:*".to_string())
        );
        assert_eq!(to_prefix_tsquery("():*"), None);
    }
}
