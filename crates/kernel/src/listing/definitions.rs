//! Capability definitions declared once per listing.
//!
//! - FilterDefinition: named, typed filter with an allowed-operator set
//! - SearchDefinition: searchable column with a ranking weight
//! - SortDefinition: sortable key backed by a column, relationship,
//!   aggregate, or custom comparator

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::query::QueryContext;
use super::resolver::split_path;
use super::vocabulary::{FilterOperator, FilterType, SortDirection};

/// Enumerable choice offered by select-style filters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterOption {
    /// Value sent back in the request.
    pub value: serde_json::Value,
    /// Display label.
    pub label: String,
}

/// Declared filter capability for one resource field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterDefinition {
    /// Request key.
    pub name: String,

    /// Value type; drives default operators and strategy selection.
    #[serde(rename = "type")]
    pub filter_type: FilterType,

    /// Operator override. Empty means "use the type defaults".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operators: Vec<FilterOperator>,

    /// Dotted relationship path (e.g. "author.department").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,

    /// Physical column; defaults to the last segment of `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,

    /// Choices for select-style UIs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FilterOption>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl FilterDefinition {
    pub fn new(name: impl Into<String>, filter_type: FilterType) -> Self {
        Self {
            name: name.into(),
            filter_type,
            operators: Vec::new(),
            relationship: None,
            column: None,
            options: Vec::new(),
            label: None,
            placeholder: None,
        }
    }

    pub fn with_operators(mut self, operators: impl IntoIterator<Item = FilterOperator>) -> Self {
        self.operators = operators.into_iter().collect();
        self
    }

    pub fn with_relationship(mut self, relationship: impl Into<String>) -> Self {
        self.relationship = Some(relationship.into());
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_options(mut self, options: impl IntoIterator<Item = FilterOption>) -> Self {
        self.options = options.into_iter().collect();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    /// Operators this filter accepts. Never empty.
    pub fn allowed_operators(&self) -> &[FilterOperator] {
        if self.operators.is_empty() {
            self.filter_type.default_operators()
        } else {
            &self.operators
        }
    }

    pub fn allows(&self, operator: FilterOperator) -> bool {
        self.allowed_operators().contains(&operator)
    }

    /// Relationship to join through: the explicit path, or the prefix of a
    /// dotted `name`.
    pub fn relationship_path(&self) -> Option<&str> {
        self.relationship
            .as_deref()
            .filter(|r| !r.is_empty())
            .or_else(|| split_path(&self.name).0)
    }

    pub fn has_relationship(&self) -> bool {
        self.relationship_path().is_some()
    }

    /// Physical column name on the owning table.
    pub fn column_name(&self) -> &str {
        match self.column.as_deref() {
            Some(column) if !column.is_empty() => column,
            _ => split_path(&self.name).1,
        }
    }
}

/// How a search column is matched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// `LIKE '%term%'`, case-insensitive.
    #[default]
    Like,
    /// Native full-text match with prefix terms.
    FullText,
}

fn default_weight() -> u32 {
    1
}

/// Declared searchable column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchDefinition {
    /// Column name; a dotted value contributes its prefix as relationship.
    pub column: String,

    /// Relative importance for consumers. Not used in SQL.
    #[serde(default = "default_weight")]
    pub weight: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,

    #[serde(default)]
    pub mode: SearchMode,
}

impl SearchDefinition {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            weight: default_weight(),
            relationship: None,
            mode: SearchMode::Like,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_relationship(mut self, relationship: impl Into<String>) -> Self {
        self.relationship = Some(relationship.into());
        self
    }

    pub fn full_text(mut self) -> Self {
        self.mode = SearchMode::FullText;
        self
    }

    /// Weight, clamped to at least 1.
    pub fn weight(&self) -> u32 {
        self.weight.max(1)
    }

    pub fn relationship_path(&self) -> Option<&str> {
        self.relationship
            .as_deref()
            .filter(|r| !r.is_empty())
            .or_else(|| split_path(&self.column).0)
    }

    pub fn column_name(&self) -> &str {
        split_path(&self.column).1
    }
}

/// Aggregate functions available for relationship sorts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }
}

/// Aggregate over the related collection named by the sort's relationship.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortAggregate {
    pub function: AggregateFunction,

    /// Aggregated column on the related table. Ignored for `count`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl SortAggregate {
    pub fn count() -> Self {
        Self {
            function: AggregateFunction::Count,
            column: None,
        }
    }

    pub fn of(function: AggregateFunction, column: impl Into<String>) -> Self {
        Self {
            function,
            column: Some(column.into()),
        }
    }
}

/// Comparator that replaces the default ordering for a sort key.
///
/// Closures of the shape `Fn(&mut QueryContext, SortDirection)` implement
/// this directly.
pub trait CustomSort: Send + Sync {
    fn apply(&self, query: &mut QueryContext, direction: SortDirection);
}

impl<F> CustomSort for F
where
    F: Fn(&mut QueryContext, SortDirection) + Send + Sync,
{
    fn apply(&self, query: &mut QueryContext, direction: SortDirection) {
        self(query, direction);
    }
}

/// Declared sortable key.
#[derive(Clone)]
pub struct SortDefinition {
    /// Request key.
    pub name: String,
    /// Column; defaults to the last segment of `name`.
    pub column: Option<String>,
    pub relationship: Option<String>,
    pub aggregate: Option<SortAggregate>,
    pub custom: Option<Arc<dyn CustomSort>>,
}

/// What a sort definition resolves to, after precedence is applied.
pub enum SortTarget<'a> {
    Custom(&'a dyn CustomSort),
    Aggregate {
        relationship: Option<&'a str>,
        aggregate: &'a SortAggregate,
    },
    Relationship {
        relationship: &'a str,
        column: &'a str,
    },
    Column(&'a str),
}

impl SortDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column: None,
            relationship: None,
            aggregate: None,
            custom: None,
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_relationship(mut self, relationship: impl Into<String>) -> Self {
        self.relationship = Some(relationship.into());
        self
    }

    pub fn with_aggregate(mut self, aggregate: SortAggregate) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    pub fn with_custom(mut self, custom: Arc<dyn CustomSort>) -> Self {
        self.custom = Some(custom);
        self
    }

    pub fn relationship_path(&self) -> Option<&str> {
        self.relationship
            .as_deref()
            .filter(|r| !r.is_empty())
            .or_else(|| split_path(&self.name).0)
    }

    pub fn column_name(&self) -> &str {
        match self.column.as_deref() {
            Some(column) if !column.is_empty() => column,
            _ => split_path(&self.name).1,
        }
    }

    /// Custom comparator > aggregate > relationship column > plain column.
    pub fn target(&self) -> SortTarget<'_> {
        if let Some(custom) = &self.custom {
            return SortTarget::Custom(custom.as_ref());
        }
        if let Some(aggregate) = &self.aggregate {
            return SortTarget::Aggregate {
                relationship: self.relationship_path(),
                aggregate,
            };
        }
        match self.relationship_path() {
            Some(relationship) => SortTarget::Relationship {
                relationship,
                column: self.column_name(),
            },
            None => SortTarget::Column(self.column_name()),
        }
    }
}

impl fmt::Debug for SortDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortDefinition")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("relationship", &self.relationship)
            .field("aggregate", &self.aggregate)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn allowed_operators_default_to_type_table() {
        let def = FilterDefinition::new("title", FilterType::Text);
        assert_eq!(def.allowed_operators(), FilterType::Text.default_operators());
        assert!(def.allows(FilterOperator::Contains));
        assert!(!def.allows(FilterOperator::Gt));
    }

    #[test]
    fn operator_override_is_exact() {
        let def = FilterDefinition::new("price", FilterType::Number)
            .with_operators([FilterOperator::Gte, FilterOperator::IsNull]);
        assert_eq!(
            def.allowed_operators(),
            &[FilterOperator::Gte, FilterOperator::IsNull]
        );
        assert!(!def.allows(FilterOperator::Eq));
    }

    #[test]
    fn empty_override_falls_back_to_defaults() {
        let def = FilterDefinition::new("flag", FilterType::Boolean).with_operators([]);
        assert_eq!(def.allowed_operators(), &[FilterOperator::Eq]);
    }

    #[test]
    fn dotted_name_implies_relationship() {
        let def = FilterDefinition::new("author.department.name", FilterType::Text);
        assert_eq!(def.relationship_path(), Some("author.department"));
        assert_eq!(def.column_name(), "name");
        assert!(def.has_relationship());

        let plain = FilterDefinition::new("status", FilterType::Select);
        assert_eq!(plain.relationship_path(), None);
        assert_eq!(plain.column_name(), "status");
    }

    #[test]
    fn explicit_column_wins() {
        let def = FilterDefinition::new("author", FilterType::Text)
            .with_relationship("author")
            .with_column("last_name");
        assert_eq!(def.relationship_path(), Some("author"));
        assert_eq!(def.column_name(), "last_name");
    }

    #[test]
    fn filter_definition_from_json() {
        let json = r#"{"name": "status", "type": "select", "options": [{"value": "draft", "label": "Draft"}]}"#;
        let def: FilterDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.filter_type, FilterType::Select);
        assert_eq!(def.options.len(), 1);
        assert!(def.operators.is_empty());
    }

    #[test]
    fn search_weight_is_clamped() {
        let def = SearchDefinition::new("title").with_weight(0);
        assert_eq!(def.weight(), 1);
        assert_eq!(SearchDefinition::new("title").with_weight(4).weight(), 4);
    }

    #[test]
    fn search_dotted_column() {
        let def = SearchDefinition::new("author.name");
        assert_eq!(def.relationship_path(), Some("author"));
        assert_eq!(def.column_name(), "name");
    }

    #[test]
    fn sort_precedence() {
        let plain = SortDefinition::new("title");
        assert!(matches!(plain.target(), SortTarget::Column("title")));

        let related = SortDefinition::new("author_name")
            .with_column("first_name")
            .with_relationship("author");
        assert!(matches!(
            related.target(),
            SortTarget::Relationship {
                relationship: "author",
                column: "first_name"
            }
        ));

        let aggregate = related.clone().with_aggregate(SortAggregate::count());
        assert!(matches!(aggregate.target(), SortTarget::Aggregate { .. }));

        let custom = aggregate.with_custom(Arc::new(|_: &mut QueryContext, _: SortDirection| {}));
        assert!(matches!(custom.target(), SortTarget::Custom(_)));
    }
}
