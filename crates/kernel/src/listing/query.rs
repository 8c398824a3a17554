//! Mutable query representation written to by the listing engine.
//!
//! Wraps the pieces of a SeaQuery `SELECT` (joins, conditions, ordering)
//! and renders them for PostgreSQL. The engine only calls the `add_*`
//! surface; rendering happens at hand-off.

use sea_query::{
    Alias, Asterisk, Cond, Condition, Expr, Func, Order, PostgresQueryBuilder, Query,
    SelectStatement, SimpleExpr,
};

use super::definitions::AggregateFunction;
use super::resolver::ResolvedColumn;
use super::vocabulary::SortDirection;

/// LEFT JOIN emitted by the relationship resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    /// Physical table being joined.
    pub table: String,
    /// Alias the table is joined under.
    pub alias: String,
    /// `(alias, column)` on the already-joined side.
    pub left: (String, String),
    /// `(alias, column)` on the newly joined side.
    pub right: (String, String),
}

/// Correlated aggregate used for relationship-count style sorts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateOrder {
    pub function: AggregateFunction,
    /// Related table the aggregate runs over.
    pub table: String,
    /// Aggregated column on the related table (`None` for `count`).
    pub column: Option<String>,
    /// Column on the related table matched against the owner.
    pub inner_key: String,
    /// `(alias, column)` on the owning side of the outer query.
    pub outer_key: (String, String),
}

/// In-progress listing query.
#[derive(Debug, Clone)]
pub struct QueryContext {
    base_table: String,
    joins: Vec<JoinClause>,
    conditions: Condition,
    predicate_count: usize,
    orders: Vec<(SimpleExpr, Order)>,
}

impl QueryContext {
    /// Start a query selecting every column of `base_table`.
    pub fn new(base_table: impl Into<String>) -> Self {
        Self {
            base_table: base_table.into(),
            joins: Vec::new(),
            conditions: Cond::all(),
            predicate_count: 0,
            orders: Vec::new(),
        }
    }

    pub fn base_table(&self) -> &str {
        &self.base_table
    }

    pub fn joins(&self) -> &[JoinClause] {
        &self.joins
    }

    /// Number of top-level predicates (an OR group counts once).
    pub fn predicate_count(&self) -> usize {
        self.predicate_count
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Column of the base table, qualified.
    pub fn base_column(&self, column: &str) -> ResolvedColumn {
        ResolvedColumn::new(&self.base_table, column, None)
    }

    pub fn add_join(&mut self, join: JoinClause) {
        self.joins.push(join);
    }

    /// AND a predicate onto the query.
    pub fn add_predicate(&mut self, predicate: SimpleExpr) {
        let conditions = std::mem::replace(&mut self.conditions, Cond::all());
        self.conditions = conditions.add(predicate);
        self.predicate_count += 1;
    }

    /// AND a custom SQL fragment with bound values (`$1`, `$2`, ...).
    pub fn add_raw_predicate<I>(&mut self, sql: &str, values: I)
    where
        I: IntoIterator,
        I::Item: Into<sea_query::Value>,
    {
        self.add_predicate(Expr::cust_with_values(sql, values));
    }

    /// AND one group whose branches are OR'd together. Empty groups are
    /// skipped; returns whether anything was added.
    pub fn add_or_group(&mut self, branches: impl IntoIterator<Item = SimpleExpr>) -> bool {
        let mut group = Cond::any();
        let mut count = 0;
        for branch in branches {
            group = group.add(branch);
            count += 1;
        }
        if count == 0 {
            return false;
        }
        let conditions = std::mem::replace(&mut self.conditions, Cond::all());
        self.conditions = conditions.add(group);
        self.predicate_count += 1;
        true
    }

    pub fn add_order_by(&mut self, column: &ResolvedColumn, direction: SortDirection) {
        self.add_order_by_expr(column.expr().into(), direction);
    }

    pub fn add_order_by_expr(&mut self, expr: SimpleExpr, direction: SortDirection) {
        self.orders.push((expr, order(direction)));
    }

    /// Order by a correlated aggregate over a related table.
    pub fn add_order_by_aggregate(&mut self, aggregate: &AggregateOrder, direction: SortDirection) {
        let alias = format!("{}_agg", aggregate.table);
        let value: SimpleExpr = match (aggregate.function, aggregate.column.as_deref()) {
            (AggregateFunction::Count, _) | (_, None) => Expr::col(Asterisk).count(),
            (AggregateFunction::Sum, Some(column)) => {
                Expr::col((Alias::new(&alias), Alias::new(column))).sum()
            }
            (AggregateFunction::Avg, Some(column)) => {
                Func::avg(Expr::col((Alias::new(&alias), Alias::new(column)))).into()
            }
            (AggregateFunction::Min, Some(column)) => {
                Expr::col((Alias::new(&alias), Alias::new(column))).min()
            }
            (AggregateFunction::Max, Some(column)) => {
                Expr::col((Alias::new(&alias), Alias::new(column))).max()
            }
        };

        let mut sub = Query::select();
        sub.expr(value)
            .from_as(Alias::new(&aggregate.table), Alias::new(&alias))
            .and_where(
                Expr::col((Alias::new(&alias), Alias::new(&aggregate.inner_key))).equals((
                    Alias::new(&aggregate.outer_key.0),
                    Alias::new(&aggregate.outer_key.1),
                )),
            );

        let expr = Expr::cust(format!("({})", sub.to_string(PostgresQueryBuilder)));
        self.orders.push((expr, order(direction)));
    }

    /// Render the full `SELECT` (no paging).
    pub fn to_sql(&self) -> String {
        self.select(true).to_string(PostgresQueryBuilder)
    }

    /// Render one page of the `SELECT`. Pages are 1-indexed.
    pub fn to_page_sql(&self, page: u32, per_page: u32) -> String {
        let mut query = self.select(true);
        let offset = u64::from(page.saturating_sub(1)) * u64::from(per_page);
        query.limit(u64::from(per_page));
        query.offset(offset);
        query.to_string(PostgresQueryBuilder)
    }

    /// Render a `COUNT(*)` over the same joins and predicates.
    pub fn to_count_sql(&self) -> String {
        let mut query = Query::select();
        query.expr(Expr::col(Asterisk).count());
        query.from(Alias::new(&self.base_table));
        self.apply_joins_and_conditions(&mut query);
        query.to_string(PostgresQueryBuilder)
    }

    fn select(&self, with_order: bool) -> SelectStatement {
        let mut query = Query::select();
        query.column((Alias::new(&self.base_table), Asterisk));
        query.from(Alias::new(&self.base_table));
        self.apply_joins_and_conditions(&mut query);

        if with_order {
            for (expr, order) in &self.orders {
                query.order_by_expr(expr.clone(), order.clone());
            }
        }
        query
    }

    fn apply_joins_and_conditions(&self, query: &mut SelectStatement) {
        for join in &self.joins {
            let on_condition = Expr::col((Alias::new(&join.left.0), Alias::new(&join.left.1)))
                .equals((Alias::new(&join.right.0), Alias::new(&join.right.1)));
            query.join_as(
                sea_query::JoinType::LeftJoin,
                Alias::new(&join.table),
                Alias::new(&join.alias),
                on_condition,
            );
        }

        if self.predicate_count > 0 {
            query.cond_where(self.conditions.clone());
        }
    }
}

fn order(direction: SortDirection) -> Order {
    match direction {
        SortDirection::Asc => Order::Asc,
        SortDirection::Desc => Order::Desc,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use sea_query::ExprTrait;

    fn shared_across_threads<T: Send + Sync>() {}

    #[test]
    fn query_context_is_thread_safe() {
        // Handlers hold a context across awaits on a multi-threaded runtime.
        shared_across_threads::<QueryContext>();
        shared_across_threads::<crate::listing::ListingService>();
    }

    #[test]
    fn empty_query_selects_base_table() {
        let query = QueryContext::new("posts");
        let sql = query.to_sql();

        assert_eq!(sql, r#"SELECT "posts".* FROM "posts""#);
        assert_eq!(query.predicate_count(), 0);
    }

    #[test]
    fn predicates_are_anded() {
        let mut query = QueryContext::new("posts");
        query.add_predicate(query.base_column("status").expr().eq("published"));
        query.add_predicate(query.base_column("views").expr().gt(10));
        let sql = query.to_sql();

        assert!(sql.contains(r#""posts"."status" = 'published'"#), "{sql}");
        assert!(sql.contains(" AND "), "{sql}");
        assert!(sql.contains(r#""posts"."views" > 10"#), "{sql}");
    }

    #[test]
    fn or_group_is_scoped() {
        let mut query = QueryContext::new("posts");
        query.add_predicate(query.base_column("status").expr().eq("published"));
        let title = query.base_column("title").expr().like("%a%");
        let slug = query.base_column("slug").expr().like("%a%");
        assert!(query.add_or_group([title, slug]));
        let sql = query.to_sql();

        assert!(sql.contains(" OR "), "{sql}");
        assert!(sql.contains("AND ("), "OR group should be parenthesized: {sql}");
        assert_eq!(query.predicate_count(), 2);
    }

    #[test]
    fn empty_or_group_is_skipped() {
        let mut query = QueryContext::new("posts");
        assert!(!query.add_or_group(Vec::new()));
        assert_eq!(query.to_sql(), r#"SELECT "posts".* FROM "posts""#);
    }

    #[test]
    fn left_join_rendering() {
        let mut query = QueryContext::new("posts");
        query.add_join(JoinClause {
            table: "users".to_string(),
            alias: "users".to_string(),
            left: ("posts".to_string(), "author_id".to_string()),
            right: ("users".to_string(), "id".to_string()),
        });
        let sql = query.to_sql();

        assert!(
            sql.contains(r#"LEFT JOIN "users" AS "users" ON "posts"."author_id" = "users"."id""#),
            "{sql}"
        );
    }

    #[test]
    fn paging_and_count() {
        let mut query = QueryContext::new("posts");
        query.add_order_by(&query.base_column("created_at"), SortDirection::Desc);

        let page = query.to_page_sql(3, 20);
        assert!(page.contains("LIMIT 20"), "{page}");
        assert!(page.contains("OFFSET 40"), "{page}");

        let count = query.to_count_sql();
        assert!(count.contains("COUNT(*)"), "{count}");
        assert!(!count.contains("ORDER BY"), "{count}");
    }

    #[test]
    fn aggregate_order_is_correlated() {
        let mut query = QueryContext::new("posts");
        query.add_order_by_aggregate(
            &AggregateOrder {
                function: AggregateFunction::Count,
                table: "comments".to_string(),
                column: None,
                inner_key: "post_id".to_string(),
                outer_key: ("posts".to_string(), "id".to_string()),
            },
            SortDirection::Desc,
        );
        let sql = query.to_sql();

        assert!(sql.contains("ORDER BY (SELECT COUNT(*)"), "{sql}");
        assert!(
            sql.contains(r#""comments_agg"."post_id" = "posts"."id""#),
            "{sql}"
        );
        assert!(sql.ends_with("DESC"), "{sql}");
    }

    #[test]
    fn raw_predicate_binds_values() {
        let mut query = QueryContext::new("posts");
        query.add_raw_predicate("char_length(\"posts\".\"title\") > $1", [5]);
        let sql = query.to_sql();

        assert!(sql.contains("char_length(\"posts\".\"title\") > 5"), "{sql}");
    }
}
