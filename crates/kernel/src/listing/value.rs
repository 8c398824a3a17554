//! Request filter value parsing and SQL value coercion.

use serde_json::Value;

use super::definitions::FilterDefinition;
use super::vocabulary::{FilterOperator, FilterType};

/// A request value reduced to an operator and its operand.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFilter {
    pub operator: FilterOperator,
    /// `Value::Null` for operators that take no value.
    pub value: Value,
}

/// Whether a raw value counts as "no filter".
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Reduce a raw request value to an operator/value pair.
///
/// - `null` / `""` → `None`
/// - `{"operator": .., "value": ..}` → explicit operator; unknown operator
///   names and missing values (for operators that need one) → `None`
/// - anything else → the definition's default operator with the bare value
pub fn parse_filter_value(definition: &FilterDefinition, raw: &Value) -> Option<ParsedFilter> {
    if is_blank(raw) {
        return None;
    }

    if let Some(object) = raw.as_object()
        && let Some(operator) = object.get("operator")
    {
        let operator = FilterOperator::parse(operator.as_str()?)?;
        if !operator.requires_value() {
            return Some(ParsedFilter {
                operator,
                value: Value::Null,
            });
        }
        let value = object.get("value").filter(|v| !is_blank(v))?;
        return Some(ParsedFilter {
            operator,
            value: value.clone(),
        });
    }

    let operator = definition.filter_type.default_operator();
    Some(ParsedFilter {
        operator,
        value: if operator.requires_value() {
            raw.clone()
        } else {
            Value::Null
        },
    })
}

/// Convert a scalar JSON value to a SQL value for a filter of `filter_type`.
///
/// Number filters only accept numbers or numeric strings. Every other type
/// binds scalars as string literals, which PostgreSQL coerces to the column
/// type. Arrays, objects and nulls never convert.
pub fn to_sql_value(filter_type: FilterType, value: &Value) -> Option<sea_query::Value> {
    match filter_type {
        FilterType::Number => match value {
            Value::Number(n) => number_value(n),
            Value::String(s) => parse_number(s.trim()),
            Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
        },
        FilterType::Boolean => match value {
            Value::Bool(b) => Some((*b).into()),
            Value::String(s) => Some(s.clone().into()),
            Value::Number(n) => number_value(n),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        },
        FilterType::Text
        | FilterType::Date
        | FilterType::DateTime
        | FilterType::Select
        | FilterType::MultiSelect
        | FilterType::DateRange => to_text(value).map(Into::into),
    }
}

/// String form of a scalar, used for pattern matching.
pub fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn number_value(n: &serde_json::Number) -> Option<sea_query::Value> {
    if let Some(i) = n.as_i64() {
        Some(i.into())
    } else {
        n.as_f64().map(Into::into)
    }
}

fn parse_number(s: &str) -> Option<sea_query::Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(i.into());
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Into::into)
}
