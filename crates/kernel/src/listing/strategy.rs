//! Filter strategies: one per operator family.
//!
//! Each strategy is stateless and turns a parsed request value into at most
//! one predicate on the query. Values that cannot be used (wrong shape,
//! un-coercible) add nothing.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use sea_query::{Expr, Func};
use serde_json::Value;

use super::definitions::FilterDefinition;
use super::query::QueryContext;
use super::resolver::ResolvedColumn;
use super::value::{ParsedFilter, is_blank, to_sql_value, to_text};
use super::vocabulary::{FilterOperator, FilterType};

/// Predicate construction for one operator family.
pub trait FilterStrategy: Send + Sync {
    /// Operators this strategy handles.
    fn operators(&self) -> &'static [FilterOperator];

    /// Add the predicate for `filter` on `column`. Returns whether anything
    /// was added.
    fn apply(
        &self,
        query: &mut QueryContext,
        column: &ResolvedColumn,
        filter: &ParsedFilter,
        definition: &FilterDefinition,
    ) -> bool;
}

/// Closed set of strategy slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Equality,
    Text,
    Range,
    Set,
    Nullability,
    Boolean,
    DateRange,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 7] = [
        StrategyKind::Equality,
        StrategyKind::Text,
        StrategyKind::Range,
        StrategyKind::Set,
        StrategyKind::Nullability,
        StrategyKind::Boolean,
        StrategyKind::DateRange,
    ];

    /// Strategy family for an operator.
    pub fn for_operator(operator: FilterOperator) -> Self {
        match operator {
            FilterOperator::Eq | FilterOperator::Neq => StrategyKind::Equality,
            FilterOperator::Contains | FilterOperator::StartsWith | FilterOperator::EndsWith => {
                StrategyKind::Text
            }
            FilterOperator::Gt
            | FilterOperator::Gte
            | FilterOperator::Lt
            | FilterOperator::Lte
            | FilterOperator::Between => StrategyKind::Range,
            FilterOperator::In | FilterOperator::NotIn => StrategyKind::Set,
            FilterOperator::IsNull | FilterOperator::IsNotNull => StrategyKind::Nullability,
        }
    }

    /// Boolean and date-range filters own their strategy; every other type
    /// dispatches on the operator.
    pub fn for_filter(filter_type: FilterType, operator: FilterOperator) -> Self {
        match filter_type {
            FilterType::Boolean => StrategyKind::Boolean,
            FilterType::DateRange => StrategyKind::DateRange,
            FilterType::Text
            | FilterType::Number
            | FilterType::Date
            | FilterType::DateTime
            | FilterType::Select
            | FilterType::MultiSelect => Self::for_operator(operator),
        }
    }

    /// Built-in implementation for this slot.
    pub fn builtin(self) -> Box<dyn FilterStrategy> {
        match self {
            StrategyKind::Equality => Box::new(EqualityStrategy),
            StrategyKind::Text => Box::new(TextStrategy),
            StrategyKind::Range => Box::new(RangeStrategy),
            StrategyKind::Set => Box::new(SetStrategy),
            StrategyKind::Nullability => Box::new(NullabilityStrategy),
            StrategyKind::Boolean => Box::new(BooleanStrategy),
            StrategyKind::DateRange => Box::new(DateRangeStrategy),
        }
    }
}

/// `=` / `<>`.
pub struct EqualityStrategy;

impl FilterStrategy for EqualityStrategy {
    fn operators(&self) -> &'static [FilterOperator] {
        &[FilterOperator::Eq, FilterOperator::Neq]
    }

    fn apply(
        &self,
        query: &mut QueryContext,
        column: &ResolvedColumn,
        filter: &ParsedFilter,
        definition: &FilterDefinition,
    ) -> bool {
        let Some(value) = to_sql_value(definition.filter_type, &filter.value) else {
            return false;
        };
        let predicate = if filter.operator == FilterOperator::Neq {
            column.expr().ne(value)
        } else {
            column.expr().eq(value)
        };
        query.add_predicate(predicate);
        true
    }
}

/// Case-insensitive `LIKE` patterns.
pub struct TextStrategy;

impl FilterStrategy for TextStrategy {
    fn operators(&self) -> &'static [FilterOperator] {
        &[
            FilterOperator::Contains,
            FilterOperator::StartsWith,
            FilterOperator::EndsWith,
        ]
    }

    fn apply(
        &self,
        query: &mut QueryContext,
        column: &ResolvedColumn,
        filter: &ParsedFilter,
        _definition: &FilterDefinition,
    ) -> bool {
        let Some(text) = to_text(&filter.value) else {
            return false;
        };
        let escaped = escape_like_wildcards(&text.to_lowercase());
        let pattern = match filter.operator {
            FilterOperator::StartsWith => format!("{escaped}%"),
            FilterOperator::EndsWith => format!("%{escaped}"),
            _ => format!("%{escaped}%"),
        };
        query.add_predicate(lower_like(column, pattern));
        true
    }
}

/// Ordered comparisons and `between` with one-sided degradation.
pub struct RangeStrategy;

impl FilterStrategy for RangeStrategy {
    fn operators(&self) -> &'static [FilterOperator] {
        &[
            FilterOperator::Gt,
            FilterOperator::Gte,
            FilterOperator::Lt,
            FilterOperator::Lte,
            FilterOperator::Between,
        ]
    }

    fn apply(
        &self,
        query: &mut QueryContext,
        column: &ResolvedColumn,
        filter: &ParsedFilter,
        definition: &FilterDefinition,
    ) -> bool {
        let convert = |v: &Value| to_sql_value(definition.filter_type, v);

        if filter.operator == FilterOperator::Between {
            let (min, max) = range_bounds(&filter.value);
            return apply_bounds(
                query,
                column,
                min.and_then(convert),
                max.and_then(convert),
            );
        }

        let Some(value) = convert(&filter.value) else {
            return false;
        };
        let expr = column.expr();
        let predicate = match filter.operator {
            FilterOperator::Gt => expr.gt(value),
            FilterOperator::Gte => expr.gte(value),
            FilterOperator::Lt => expr.lt(value),
            FilterOperator::Lte => expr.lte(value),
            _ => return false,
        };
        query.add_predicate(predicate);
        true
    }
}

/// `IN` / `NOT IN`; an empty set adds nothing.
pub struct SetStrategy;

impl FilterStrategy for SetStrategy {
    fn operators(&self) -> &'static [FilterOperator] {
        &[FilterOperator::In, FilterOperator::NotIn]
    }

    fn apply(
        &self,
        query: &mut QueryContext,
        column: &ResolvedColumn,
        filter: &ParsedFilter,
        definition: &FilterDefinition,
    ) -> bool {
        let values: Vec<sea_query::Value> = match &filter.value {
            Value::Array(items) => items
                .iter()
                .filter(|v| !is_blank(v))
                .filter_map(|v| to_sql_value(definition.filter_type, v))
                .collect(),
            scalar => to_sql_value(definition.filter_type, scalar)
                .into_iter()
                .collect(),
        };
        if values.is_empty() {
            return false;
        }
        let predicate = if filter.operator == FilterOperator::NotIn {
            column.expr().is_not_in(values)
        } else {
            column.expr().is_in(values)
        };
        query.add_predicate(predicate);
        true
    }
}

/// `IS NULL` / `IS NOT NULL`; the value is ignored.
pub struct NullabilityStrategy;

impl FilterStrategy for NullabilityStrategy {
    fn operators(&self) -> &'static [FilterOperator] {
        &[FilterOperator::IsNull, FilterOperator::IsNotNull]
    }

    fn apply(
        &self,
        query: &mut QueryContext,
        column: &ResolvedColumn,
        filter: &ParsedFilter,
        _definition: &FilterDefinition,
    ) -> bool {
        let predicate = if filter.operator == FilterOperator::IsNotNull {
            column.expr().is_not_null()
        } else {
            column.expr().is_null()
        };
        query.add_predicate(predicate);
        true
    }
}

/// Boolean columns; loose truthy/falsy request values are coerced.
pub struct BooleanStrategy;

impl FilterStrategy for BooleanStrategy {
    fn operators(&self) -> &'static [FilterOperator] {
        &[FilterOperator::Eq, FilterOperator::Neq]
    }

    fn apply(
        &self,
        query: &mut QueryContext,
        column: &ResolvedColumn,
        filter: &ParsedFilter,
        _definition: &FilterDefinition,
    ) -> bool {
        let Some(flag) = coerce_bool(&filter.value) else {
            return false;
        };
        let predicate = if filter.operator == FilterOperator::Neq {
            column.expr().ne(flag)
        } else {
            column.expr().eq(flag)
        };
        query.add_predicate(predicate);
        true
    }
}

/// Date windows given as `[start, end]`, `{start, end}` or JSON text.
pub struct DateRangeStrategy;

impl FilterStrategy for DateRangeStrategy {
    fn operators(&self) -> &'static [FilterOperator] {
        &[FilterOperator::Between]
    }

    fn apply(
        &self,
        query: &mut QueryContext,
        column: &ResolvedColumn,
        filter: &ParsedFilter,
        _definition: &FilterDefinition,
    ) -> bool {
        let (start, end) = date_bounds(&filter.value);
        apply_bounds(query, column, start.map(Into::into), end.map(Into::into))
    }
}

/// Coerce a loose request value to a boolean.
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(|f| f != 0.0),
        },
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Normalize a date-ish value to `YYYY-MM-DD`.
pub fn normalize_date(value: &Value) -> Option<String> {
    let text = value.as_str()?.trim();
    if text.is_empty() {
        return None;
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|d| d.date_naive()))
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
                .ok()
                .map(|d| d.date())
        })?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// Start/end dates from any accepted date-range shape.
pub fn date_bounds(value: &Value) -> (Option<String>, Option<String>) {
    match value {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(decoded @ (Value::Array(_) | Value::Object(_))) => date_bounds(&decoded),
            _ => (None, None),
        },
        Value::Array(items) => (
            items.first().and_then(normalize_date),
            items.get(1).and_then(normalize_date),
        ),
        Value::Object(map) => (
            map.get("start")
                .or_else(|| map.get("from"))
                .and_then(normalize_date),
            map.get("end")
                .or_else(|| map.get("to"))
                .and_then(normalize_date),
        ),
        Value::Null | Value::Bool(_) | Value::Number(_) => (None, None),
    }
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
pub fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// `LOWER(column) LIKE pattern`; `pattern` must already be lowercase.
pub(crate) fn lower_like(column: &ResolvedColumn, pattern: String) -> sea_query::SimpleExpr {
    Expr::expr(Func::lower(column.expr())).like(pattern)
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !is_blank(v))
}

fn range_bounds(value: &Value) -> (Option<&Value>, Option<&Value>) {
    match value {
        Value::Array(items) => (present(items.first()), present(items.get(1))),
        Value::Object(map) => (present(map.get("min")), present(map.get("max"))),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => (None, None),
    }
}

fn apply_bounds(
    query: &mut QueryContext,
    column: &ResolvedColumn,
    min: Option<sea_query::Value>,
    max: Option<sea_query::Value>,
) -> bool {
    let predicate = match (min, max) {
        (Some(min), Some(max)) => column.expr().between(min, max),
        (Some(min), None) => column.expr().gte(min),
        (None, Some(max)) => column.expr().lte(max),
        (None, None) => return false,
    };
    query.add_predicate(predicate);
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(definition: &FilterDefinition, operator: FilterOperator, value: Value) -> String {
        let mut query = QueryContext::new("posts");
        let column = query.base_column(definition.column_name());
        let filter = ParsedFilter { operator, value };
        StrategyKind::for_filter(definition.filter_type, operator)
            .builtin()
            .apply(&mut query, &column, &filter, definition);
        query.to_sql()
    }

    fn number(name: &str) -> FilterDefinition {
        FilterDefinition::new(name, FilterType::Number)
    }

    #[test]
    fn every_operator_has_a_strategy_that_claims_it() {
        for op in FilterOperator::ALL {
            let strategy = StrategyKind::for_operator(op).builtin();
            assert!(strategy.operators().contains(&op), "{op}");
        }
    }

    #[test]
    fn equality() {
        let sql = run(
            &FilterDefinition::new("status", FilterType::Select),
            FilterOperator::Neq,
            json!("draft"),
        );
        assert!(sql.contains(r#""posts"."status" <> 'draft'"#), "{sql}");
    }

    #[test]
    fn equality_rejects_arrays() {
        let sql = run(
            &FilterDefinition::new("status", FilterType::Select),
            FilterOperator::Eq,
            json!(["a"]),
        );
        assert!(!sql.contains("WHERE"), "{sql}");
    }

    #[test]
    fn text_patterns_are_case_insensitive() {
        let def = FilterDefinition::new("title", FilterType::Text);
        let sql = run(&def, FilterOperator::Contains, json!("Rust"));
        assert!(sql.contains(r#"LOWER("posts"."title") LIKE '%rust%'"#), "{sql}");

        let sql = run(&def, FilterOperator::StartsWith, json!("ru"));
        assert!(sql.contains("LIKE 'ru%'"), "{sql}");

        let sql = run(&def, FilterOperator::EndsWith, json!("st"));
        assert!(sql.contains("LIKE '%st'"), "{sql}");
    }

    #[test]
    fn text_escapes_wildcards() {
        let def = FilterDefinition::new("title", FilterType::Text);
        let sql = run(&def, FilterOperator::Contains, json!("100%_done"));
        assert!(
            sql.contains("100\\\\%\\\\_done") || sql.contains("100\\%\\_done"),
            "{sql}"
        );
    }

    #[test]
    fn between_degrades_to_one_sided() {
        let def = number("price");
        let low_only = run(&def, FilterOperator::Between, json!([5, null]));
        let gte = run(&def, FilterOperator::Gte, json!(5));
        assert_eq!(low_only, gte);

        let high_only = run(&def, FilterOperator::Between, json!([null, 10]));
        let lte = run(&def, FilterOperator::Lte, json!(10));
        assert_eq!(high_only, lte);

        let neither = run(&def, FilterOperator::Between, json!([null, null]));
        assert_eq!(neither, r#"SELECT "posts".* FROM "posts""#);
    }

    #[test]
    fn between_both_bounds() {
        let sql = run(&number("price"), FilterOperator::Between, json!(["5", "10"]));
        assert!(sql.contains(r#""posts"."price" BETWEEN 5 AND 10"#), "{sql}");
    }

    #[test]
    fn range_scalar_comparisons() {
        let def = number("views");
        assert!(run(&def, FilterOperator::Gt, json!(3)).contains(r#""views" > 3"#));
        assert!(run(&def, FilterOperator::Lt, json!("7")).contains(r#""views" < 7"#));
        assert!(!run(&def, FilterOperator::Gt, json!("many")).contains("WHERE"));
    }

    #[test]
    fn set_membership() {
        let def = FilterDefinition::new("tag", FilterType::MultiSelect);
        let sql = run(&def, FilterOperator::In, json!(["a", "b"]));
        assert!(sql.contains(r#""posts"."tag" IN ('a', 'b')"#), "{sql}");

        let sql = run(&def, FilterOperator::NotIn, json!("a"));
        assert!(sql.contains(r#""posts"."tag" NOT IN ('a')"#), "{sql}");
    }

    #[test]
    fn empty_set_adds_nothing() {
        let def = FilterDefinition::new("tag", FilterType::MultiSelect);
        let sql = run(&def, FilterOperator::In, json!([]));
        assert!(!sql.contains("IN ()"), "{sql}");
        assert!(!sql.contains("WHERE"), "{sql}");
    }

    #[test]
    fn nullability_ignores_value() {
        let def = FilterDefinition::new("deleted_at", FilterType::Date);
        let sql = run(&def, FilterOperator::IsNull, json!("whatever"));
        assert!(sql.contains(r#""posts"."deleted_at" IS NULL"#), "{sql}");
        let sql = run(&def, FilterOperator::IsNotNull, Value::Null);
        assert!(sql.contains("IS NOT NULL"), "{sql}");
    }

    #[test]
    fn boolean_coercion_table() {
        for truthy in [
            json!(true),
            json!("true"),
            json!("1"),
            json!("yes"),
            json!("on"),
            json!("TRUE"),
            json!(1),
        ] {
            assert_eq!(coerce_bool(&truthy), Some(true), "{truthy}");
        }
        for falsy in [
            json!(false),
            json!("false"),
            json!("0"),
            json!("no"),
            json!("off"),
            json!("Off"),
            json!(0),
        ] {
            assert_eq!(coerce_bool(&falsy), Some(false), "{falsy}");
        }
        for garbage in [
            json!("banana"),
            json!("nan"),
            json!("NaN"),
            json!("inf"),
            json!("-infinity"),
            json!([true]),
        ] {
            assert_eq!(coerce_bool(&garbage), None, "{garbage}");
        }
        assert_eq!(coerce_bool(&json!("2.5")), Some(true));
    }

    #[test]
    fn boolean_strategy_drops_garbage() {
        let def = FilterDefinition::new("featured", FilterType::Boolean);
        let sql = run(&def, FilterOperator::Eq, json!("banana"));
        assert!(!sql.contains("WHERE"), "{sql}");

        let sql = run(&def, FilterOperator::Eq, json!("yes"));
        assert!(sql.contains(r#""posts"."featured" = TRUE"#), "{sql}");
    }

    #[test]
    fn date_bound_shapes() {
        let expected = (Some("2025-01-01".to_string()), Some("2025-01-31".to_string()));
        assert_eq!(date_bounds(&json!(["2025-01-01", "2025-01-31"])), expected);
        assert_eq!(
            date_bounds(&json!({"start": "2025-01-01", "end": "2025-01-31"})),
            expected
        );
        assert_eq!(
            date_bounds(&json!(r#"{"start":"2025-01-01","end":"2025-01-31"}"#)),
            expected
        );
        assert_eq!(
            date_bounds(&json!(["2025-01-01T10:00:00Z", "2025-01-31 23:59:59"])),
            expected
        );
    }

    #[test]
    fn date_bound_garbage_is_absent() {
        assert_eq!(
            date_bounds(&json!({"start": "soon", "end": "2025-01-31"})),
            (None, Some("2025-01-31".to_string()))
        );
        assert_eq!(date_bounds(&json!("not json")), (None, None));
        assert_eq!(date_bounds(&json!(42)), (None, None));
    }

    #[test]
    fn date_range_strategy() {
        let def = FilterDefinition::new("created_at", FilterType::DateRange);
        let sql = run(
            &def,
            FilterOperator::Between,
            json!({"start": "2025-01-01", "end": "2025-01-31"}),
        );
        assert!(
            sql.contains(r#""posts"."created_at" BETWEEN '2025-01-01' AND '2025-01-31'"#),
            "{sql}"
        );

        let sql = run(&def, FilterOperator::Between, json!({"start": "2025-01-01"}));
        assert!(sql.contains(r#""created_at" >= '2025-01-01'"#), "{sql}");
    }

    #[test]
    fn escape_like_wildcards_function() {
        assert_eq!(escape_like_wildcards("hello"), "hello");
        assert_eq!(escape_like_wildcards("100%"), "100\\%");
        assert_eq!(escape_like_wildcards("a_b"), "a\\_b");
        assert_eq!(escape_like_wildcards("a\\b"), "a\\\\b");
    }
}
