//! Operator and type vocabulary for listing filters.
//!
//! Both enumerations are closed: every predicate below is an exhaustive
//! `match`, and unknown operator strings surface as `None` from
//! [`FilterOperator::parse`] rather than falling back to some default.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Comparison operators a filter can request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Exact match.
    Eq,
    /// Not equal.
    Neq,
    /// Substring match (case-insensitive).
    Contains,
    /// Prefix match (case-insensitive).
    StartsWith,
    /// Suffix match (case-insensitive).
    EndsWith,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Inclusive range `[min, max]`.
    Between,
    /// Value in list.
    In,
    /// Value not in list.
    NotIn,
    /// Column is NULL.
    IsNull,
    /// Column is not NULL.
    IsNotNull,
}

impl FilterOperator {
    /// Every operator, in declaration order.
    pub const ALL: [FilterOperator; 14] = [
        FilterOperator::Eq,
        FilterOperator::Neq,
        FilterOperator::Contains,
        FilterOperator::StartsWith,
        FilterOperator::EndsWith,
        FilterOperator::Gt,
        FilterOperator::Gte,
        FilterOperator::Lt,
        FilterOperator::Lte,
        FilterOperator::Between,
        FilterOperator::In,
        FilterOperator::NotIn,
        FilterOperator::IsNull,
        FilterOperator::IsNotNull,
    ];

    /// Wire name of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Contains => "contains",
            FilterOperator::StartsWith => "starts_with",
            FilterOperator::EndsWith => "ends_with",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Between => "between",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not_in",
            FilterOperator::IsNull => "is_null",
            FilterOperator::IsNotNull => "is_not_null",
        }
    }

    /// Parse a wire name. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }

    /// Whether the operator needs a value at all.
    pub fn requires_value(self) -> bool {
        match self {
            FilterOperator::IsNull | FilterOperator::IsNotNull => false,
            FilterOperator::Eq
            | FilterOperator::Neq
            | FilterOperator::Contains
            | FilterOperator::StartsWith
            | FilterOperator::EndsWith
            | FilterOperator::Gt
            | FilterOperator::Gte
            | FilterOperator::Lt
            | FilterOperator::Lte
            | FilterOperator::Between
            | FilterOperator::In
            | FilterOperator::NotIn => true,
        }
    }

    /// Whether the operator expects a list value.
    pub fn requires_array_value(self) -> bool {
        match self {
            FilterOperator::Between | FilterOperator::In | FilterOperator::NotIn => true,
            FilterOperator::Eq
            | FilterOperator::Neq
            | FilterOperator::Contains
            | FilterOperator::StartsWith
            | FilterOperator::EndsWith
            | FilterOperator::Gt
            | FilterOperator::Gte
            | FilterOperator::Lt
            | FilterOperator::Lte
            | FilterOperator::IsNull
            | FilterOperator::IsNotNull => false,
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownOperator(s.to_string()))
    }
}

/// Returned by [`FilterOperator::from_str`] for names outside the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown filter operator: {0}")]
pub struct UnknownOperator(pub String);

/// Value types a filter can be declared with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Text,
    Number,
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    Boolean,
    Select,
    MultiSelect,
    DateRange,
}

const TEXT_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Eq,
    FilterOperator::Neq,
    FilterOperator::Contains,
    FilterOperator::StartsWith,
    FilterOperator::EndsWith,
];

const ORDERED_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Eq,
    FilterOperator::Neq,
    FilterOperator::Gt,
    FilterOperator::Gte,
    FilterOperator::Lt,
    FilterOperator::Lte,
    FilterOperator::Between,
];

const BOOLEAN_OPERATORS: &[FilterOperator] = &[FilterOperator::Eq];

const SELECT_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Eq,
    FilterOperator::Neq,
    FilterOperator::In,
    FilterOperator::NotIn,
];

const MULTI_SELECT_OPERATORS: &[FilterOperator] = &[FilterOperator::In, FilterOperator::NotIn];

const DATE_RANGE_OPERATORS: &[FilterOperator] = &[FilterOperator::Between];

impl FilterType {
    /// Operators allowed when a definition does not override them.
    pub fn default_operators(self) -> &'static [FilterOperator] {
        match self {
            FilterType::Text => TEXT_OPERATORS,
            FilterType::Number | FilterType::Date | FilterType::DateTime => ORDERED_OPERATORS,
            FilterType::Boolean => BOOLEAN_OPERATORS,
            FilterType::Select => SELECT_OPERATORS,
            FilterType::MultiSelect => MULTI_SELECT_OPERATORS,
            FilterType::DateRange => DATE_RANGE_OPERATORS,
        }
    }

    /// Operator assumed for a bare (non-structured) request value.
    pub fn default_operator(self) -> FilterOperator {
        match self {
            FilterType::Text => FilterOperator::Contains,
            FilterType::MultiSelect => FilterOperator::In,
            FilterType::DateRange => FilterOperator::Between,
            FilterType::Number
            | FilterType::Date
            | FilterType::DateTime
            | FilterType::Boolean
            | FilterType::Select => FilterOperator::Eq,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// `desc` (any case) is descending; everything else is ascending.
    pub fn parse_lenient(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn operator_names_roundtrip() {
        for op in FilterOperator::ALL {
            assert_eq!(FilterOperator::parse(op.as_str()), Some(op));
            let json = serde_json::to_string(&op).unwrap();
            assert_eq!(json, format!("\"{}\"", op.as_str()));
        }
    }

    #[test]
    fn unknown_operator_is_none() {
        assert_eq!(FilterOperator::parse("like"), None);
        assert_eq!(FilterOperator::parse(""), None);
        assert!("regex".parse::<FilterOperator>().is_err());
    }

    #[test]
    fn only_null_checks_skip_values() {
        let valueless: Vec<_> = FilterOperator::ALL
            .into_iter()
            .filter(|op| !op.requires_value())
            .collect();
        assert_eq!(
            valueless,
            vec![FilterOperator::IsNull, FilterOperator::IsNotNull]
        );
    }

    #[test]
    fn array_operators() {
        let arrays: Vec<_> = FilterOperator::ALL
            .into_iter()
            .filter(|op| op.requires_array_value())
            .collect();
        assert_eq!(
            arrays,
            vec![
                FilterOperator::Between,
                FilterOperator::In,
                FilterOperator::NotIn
            ]
        );
    }

    #[test]
    fn default_operator_is_allowed_for_every_type() {
        let types = [
            FilterType::Text,
            FilterType::Number,
            FilterType::Date,
            FilterType::DateTime,
            FilterType::Boolean,
            FilterType::Select,
            FilterType::MultiSelect,
            FilterType::DateRange,
        ];
        for ty in types {
            assert!(!ty.default_operators().is_empty());
            assert!(ty.default_operators().contains(&ty.default_operator()));
        }
    }

    #[test]
    fn filter_type_serialization() {
        let ty: FilterType = serde_json::from_str("\"multi_select\"").unwrap();
        assert_eq!(ty, FilterType::MultiSelect);
        let ty: FilterType = serde_json::from_str("\"datetime\"").unwrap();
        assert_eq!(ty, FilterType::DateTime);
        let ty: FilterType = serde_json::from_str("\"date_range\"").unwrap();
        assert_eq!(ty, FilterType::DateRange);
    }

    #[test]
    fn sort_direction_lenient() {
        assert_eq!(SortDirection::parse_lenient("desc"), SortDirection::Desc);
        assert_eq!(SortDirection::parse_lenient(" DESC "), SortDirection::Desc);
        assert_eq!(SortDirection::parse_lenient("asc"), SortDirection::Asc);
        assert_eq!(SortDirection::parse_lenient("sideways"), SortDirection::Asc);
        assert_eq!(SortDirection::parse_lenient(""), SortDirection::Asc);
    }
}
