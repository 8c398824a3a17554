//! Listing request wire format.
//!
//! Requests arrive either as query-string pairs (bracketed keys such as
//! `filters[status]=published` or `sort[0][column]=title`) or as a JSON body.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::vocabulary::SortDirection;

/// One requested sort key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortRequest {
    pub column: String,
    #[serde(default, deserialize_with = "lenient_direction")]
    pub direction: SortDirection,
}

impl SortRequest {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }
}

fn lenient_direction<'de, D>(deserializer: D) -> Result<SortDirection, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_str)
        .map(SortDirection::parse_lenient)
        .unwrap_or_default())
}

fn default_page() -> u32 {
    1
}

/// Caller-supplied listing parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "RequestBody")]
pub struct ListingRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,

    /// Raw filter values keyed by filter name.
    pub filters: BTreeMap<String, Value>,

    #[serde(rename = "sort")]
    pub sorts: Vec<SortRequest>,

    /// 1-indexed page number.
    pub page: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
}

/// JSON body as sent by clients. `sort_by`/`sort_direction` only apply when
/// no `sort` list is given.
#[derive(Deserialize)]
struct RequestBody {
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    filters: BTreeMap<String, Value>,
    #[serde(default, alias = "sorts")]
    sort: Vec<SortRequest>,
    #[serde(default)]
    sort_by: Option<String>,
    #[serde(default, deserialize_with = "lenient_direction")]
    sort_direction: SortDirection,
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default)]
    per_page: Option<u32>,
}

impl From<RequestBody> for ListingRequest {
    fn from(body: RequestBody) -> Self {
        let mut sorts = body.sort;
        if sorts.is_empty()
            && let Some(column) = body.sort_by.filter(|c| !c.trim().is_empty())
        {
            sorts.push(SortRequest::new(column.trim(), body.sort_direction));
        }
        Self {
            search: body.search,
            filters: body.filters,
            sorts,
            page: body.page.max(1),
            per_page: body.per_page.filter(|n| *n > 0),
        }
    }
}

impl Default for ListingRequest {
    fn default() -> Self {
        Self {
            search: None,
            filters: BTreeMap::new(),
            sorts: Vec::new(),
            page: default_page(),
            per_page: None,
        }
    }
}

impl ListingRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn with_filter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.filters.insert(name.into(), value);
        self
    }

    pub fn with_sort(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.sorts.push(SortRequest::new(column, direction));
        self
    }

    pub fn with_page(mut self, page: u32, per_page: Option<u32>) -> Self {
        self.page = page.max(1);
        self.per_page = per_page;
        self
    }

    /// Build a request from decoded query-string pairs.
    ///
    /// Unknown keys are ignored and unparseable numbers fall back to their
    /// defaults.
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut request = Self::default();
        let mut sort_by: Option<String> = None;
        let mut sort_direction: Option<String> = None;
        let mut indexed_sorts: BTreeMap<usize, (Option<String>, Option<String>)> = BTreeMap::new();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "search" => request.search = Some(value.to_string()),
                "page" => request.page = parse_positive(value).unwrap_or_else(default_page),
                "per_page" => request.per_page = parse_positive(value),
                "sort_by" => sort_by = Some(value.to_string()),
                "sort_direction" => sort_direction = Some(value.to_string()),
                "sort" => request.sorts.extend(parse_sort_value(value)),
                "filters" => {
                    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(value) {
                        request.filters.extend(map);
                    }
                }
                _ => {
                    if let Some(rest) = key.strip_prefix("sort") {
                        collect_indexed_sort(&mut indexed_sorts, rest, value);
                    } else if let Some(rest) = key.strip_prefix("filters") {
                        collect_filter(&mut request.filters, rest, value);
                    }
                }
            }
        }

        request
            .sorts
            .extend(indexed_sorts.into_values().filter_map(|(column, direction)| {
                let column = column.filter(|c| !c.trim().is_empty())?;
                Some(SortRequest::new(
                    column.trim(),
                    SortDirection::parse_lenient(direction.as_deref().unwrap_or_default()),
                ))
            }));

        if request.sorts.is_empty()
            && let Some(column) = sort_by.filter(|c| !c.trim().is_empty())
        {
            request.sorts.push(SortRequest::new(
                column.trim(),
                SortDirection::parse_lenient(sort_direction.as_deref().unwrap_or_default()),
            ));
        }

        request
    }
}

fn parse_positive(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok().filter(|n| *n > 0)
}

/// Decode a query-string value. JSON arrays and objects are decoded; every
/// other value stays the raw string, so `2024` or `1.50` keep their text.
pub fn decode_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Array(_) | Value::Object(_))) => value,
        Ok(_) | Err(_) => Value::String(raw.to_string()),
    }
}

/// `sort=` accepts a JSON array of `{column, direction}` objects or a
/// comma-separated list of `column:direction` / `column direction`.
fn parse_sort_value(raw: &str) -> Vec<SortRequest> {
    if let Ok(sorts) = serde_json::from_str::<Vec<SortRequest>>(raw) {
        return sorts;
    }
    raw.split(',')
        .filter_map(|item| {
            let item = item.trim();
            let (column, direction) = item
                .split_once(':')
                .or_else(|| item.split_once(char::is_whitespace))
                .unwrap_or((item, ""));
            let column = column.trim();
            if column.is_empty() {
                None
            } else {
                Some(SortRequest::new(
                    column,
                    SortDirection::parse_lenient(direction),
                ))
            }
        })
        .collect()
}

/// Split `[a][b][]` into `["a", "b", ""]`. `None` if the key is not fully
/// bracketed.
fn bracket_segments(rest: &str) -> Option<Vec<&str>> {
    let mut segments = Vec::new();
    let mut remaining = rest;
    while !remaining.is_empty() {
        let inner = remaining.strip_prefix('[')?;
        let (segment, tail) = inner.split_once(']')?;
        segments.push(segment);
        remaining = tail;
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}

fn collect_indexed_sort(
    sorts: &mut BTreeMap<usize, (Option<String>, Option<String>)>,
    rest: &str,
    value: &str,
) {
    let Some(segments) = bracket_segments(rest) else {
        return;
    };
    let [index, field] = segments.as_slice() else {
        return;
    };
    let Ok(index) = index.parse::<usize>() else {
        return;
    };
    let entry = sorts.entry(index).or_default();
    match *field {
        "column" => entry.0 = Some(value.to_string()),
        "direction" => entry.1 = Some(value.to_string()),
        _ => {}
    }
}

fn collect_filter(filters: &mut BTreeMap<String, Value>, rest: &str, value: &str) {
    let Some(segments) = bracket_segments(rest) else {
        return;
    };
    let Some((name, path)) = segments.split_first() else {
        return;
    };
    if name.is_empty() {
        return;
    }

    match path {
        // filters[status]=published
        [] => {
            filters.insert((*name).to_string(), decode_value(value));
        }
        // filters[tags][]=a
        [""] => push_item(filters.entry((*name).to_string()).or_insert(Value::Null), value),
        // filters[price][operator]=gte, filters[created_at][start]=...
        [field] => {
            let entry = filters
                .entry((*name).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(map) = entry {
                let decoded = if *field == "operator" {
                    Value::String(value.to_string())
                } else {
                    decode_value(value)
                };
                map.insert((*field).to_string(), decoded);
            }
        }
        // filters[tags][value][]=a
        [field, ""] => {
            let entry = filters
                .entry((*name).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(map) = entry {
                push_item(map.entry((*field).to_string()).or_insert(Value::Null), value);
            }
        }
        _ => {
            tracing::debug!(filter = %name, "ignoring deeply nested filter parameter");
        }
    }
}

fn push_item(slot: &mut Value, raw: &str) {
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    if let Value::Array(items) = slot {
        items.push(decode_value(raw));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(pairs: &[(&str, &str)]) -> ListingRequest {
        ListingRequest::from_query_pairs(pairs.iter().copied())
    }

    #[test]
    fn defaults() {
        let request = parse(&[]);
        assert_eq!(request, ListingRequest::default());
        assert_eq!(request.page, 1);
    }

    #[test]
    fn scalars_and_paging() {
        let request = parse(&[("search", "rust"), ("page", "3"), ("per_page", "50")]);
        assert_eq!(request.search.as_deref(), Some("rust"));
        assert_eq!(request.page, 3);
        assert_eq!(request.per_page, Some(50));
    }

    #[test]
    fn garbage_paging_falls_back() {
        let request = parse(&[("page", "abc"), ("per_page", "-1")]);
        assert_eq!(request.page, 1);
        assert_eq!(request.per_page, None);

        let request = parse(&[("page", "0")]);
        assert_eq!(request.page, 1);
    }

    #[test]
    fn bracket_filters() {
        let request = parse(&[
            ("filters[status]", "published"),
            ("filters[tags][]", "a"),
            ("filters[tags][]", "b"),
            ("filters[price][operator]", "gte"),
            ("filters[price][value]", "10"),
            ("filters[created_at][start]", "2025-01-01"),
            ("filters[created_at][end]", "2025-01-31"),
        ]);
        assert_eq!(request.filters["status"], json!("published"));
        assert_eq!(request.filters["tags"], json!(["a", "b"]));
        assert_eq!(
            request.filters["price"],
            json!({"operator": "gte", "value": "10"})
        );
        assert_eq!(
            request.filters["created_at"],
            json!({"start": "2025-01-01", "end": "2025-01-31"})
        );
    }

    #[test]
    fn json_encoded_filter_values() {
        let request = parse(&[("filters[price]", "[5,null]"), ("filters[flag]", "true")]);
        assert_eq!(request.filters["price"], json!([5, null]));
        assert_eq!(request.filters["flag"], json!("true"));
    }

    #[test]
    fn numeric_looking_scalars_keep_their_text() {
        let request = parse(&[
            ("filters[year]", "2024"),
            ("filters[price]", "1.50"),
            ("filters[code]", "1e3"),
            ("filters[title][value]", "2024"),
            ("filters[ids][]", "007"),
        ]);
        assert_eq!(request.filters["year"], json!("2024"));
        assert_eq!(request.filters["price"], json!("1.50"));
        assert_eq!(request.filters["code"], json!("1e3"));
        assert_eq!(request.filters["title"], json!({"value": "2024"}));
        assert_eq!(request.filters["ids"], json!(["007"]));
    }

    #[test]
    fn operator_stays_a_string() {
        let request = parse(&[("filters[x][operator]", "null")]);
        assert_eq!(request.filters["x"], json!({"operator": "null"}));
    }

    #[test]
    fn sort_by_pair() {
        let request = parse(&[("sort_by", "title"), ("sort_direction", "DESC")]);
        assert_eq!(
            request.sorts,
            vec![SortRequest::new("title", SortDirection::Desc)]
        );

        let request = parse(&[("sort_by", "title"), ("sort_direction", "sideways")]);
        assert_eq!(request.sorts[0].direction, SortDirection::Asc);
    }

    #[test]
    fn sort_list_forms() {
        let request = parse(&[("sort", "author_name asc")]);
        assert_eq!(
            request.sorts,
            vec![SortRequest::new("author_name", SortDirection::Asc)]
        );

        let request = parse(&[("sort", "title:desc,created_at")]);
        assert_eq!(
            request.sorts,
            vec![
                SortRequest::new("title", SortDirection::Desc),
                SortRequest::new("created_at", SortDirection::Asc),
            ]
        );

        let request = parse(&[("sort", r#"[{"column":"views","direction":"desc"}]"#)]);
        assert_eq!(
            request.sorts,
            vec![SortRequest::new("views", SortDirection::Desc)]
        );
    }

    #[test]
    fn indexed_sorts_keep_order() {
        let request = parse(&[
            ("sort[1][column]", "title"),
            ("sort[0][column]", "views"),
            ("sort[0][direction]", "desc"),
        ]);
        assert_eq!(
            request.sorts,
            vec![
                SortRequest::new("views", SortDirection::Desc),
                SortRequest::new("title", SortDirection::Asc),
            ]
        );
    }

    #[test]
    fn explicit_sorts_win_over_sort_by() {
        let request = parse(&[("sort", "views:desc"), ("sort_by", "title")]);
        assert_eq!(request.sorts.len(), 1);
        assert_eq!(request.sorts[0].column, "views");
    }

    #[test]
    fn json_body() {
        let body = json!({
            "search": "hello",
            "filters": {"status": "published"},
            "sort": [{"column": "title", "direction": "bogus"}],
            "per_page": 10
        });
        let request: ListingRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request.search.as_deref(), Some("hello"));
        assert_eq!(request.page, 1);
        assert_eq!(request.per_page, Some(10));
        assert_eq!(request.sorts[0].direction, SortDirection::Asc);
    }

    #[test]
    fn json_body_sort_by_pair() {
        let body = json!({"sort_by": "title", "sort_direction": "desc"});
        let request: ListingRequest = serde_json::from_value(body).unwrap();
        assert_eq!(
            request.sorts,
            vec![SortRequest::new("title", SortDirection::Desc)]
        );

        let body = json!({
            "sort": [{"column": "views"}],
            "sort_by": "title",
            "sort_direction": "desc"
        });
        let request: ListingRequest = serde_json::from_value(body).unwrap();
        assert_eq!(
            request.sorts,
            vec![SortRequest::new("views", SortDirection::Asc)]
        );
    }

    #[test]
    fn json_body_round_trips() {
        let request = ListingRequest::new()
            .with_search("rust")
            .with_filter("status", json!("draft"))
            .with_sort("title", SortDirection::Desc)
            .with_page(2, Some(5));
        let encoded = serde_json::to_value(&request).unwrap();
        let decoded: ListingRequest = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn malformed_keys_are_ignored() {
        let request = parse(&[("filters[status", "x"), ("filters", "nope"), ("sorting", "x")]);
        assert!(request.filters.is_empty());
        assert!(request.sorts.is_empty());
    }
}
