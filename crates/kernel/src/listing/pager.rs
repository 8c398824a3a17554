//! Pagination of composed listing queries.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::query::QueryContext;

/// Default statement timeout applied to listing queries, in seconds.
pub const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 10;

/// One page of listing results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingPage {
    /// Rows as JSON objects.
    pub items: Vec<serde_json::Value>,

    /// Total count (before paging).
    pub total: u64,

    /// Current page number (1-indexed).
    pub page: u32,

    pub per_page: u32,

    pub total_pages: u32,

    pub has_next: bool,

    pub has_prev: bool,
}

impl ListingPage {
    /// Create a page with paging calculations.
    pub fn new(items: Vec<serde_json::Value>, total: u64, page: u32, per_page: u32) -> Self {
        let total_pages = if per_page > 0 {
            u32::try_from(total.div_ceil(u64::from(per_page))).unwrap_or(u32::MAX)
        } else {
            1
        };

        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }

    pub fn empty(page: u32, per_page: u32) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page,
            per_page,
            total_pages: 0,
            has_next: false,
            has_prev: false,
        }
    }
}

/// Executes a composed query one page at a time.
#[async_trait]
pub trait Paginator: Send + Sync {
    async fn paginate(&self, query: &QueryContext, page: u32, per_page: u32)
    -> Result<ListingPage>;
}

/// PostgreSQL paginator.
///
/// Count and page queries run in one transaction under a local statement
/// timeout; rows come back through `row_to_json`.
pub struct PgPaginator {
    pool: PgPool,
    statement_timeout_secs: u64,
}

impl PgPaginator {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout_secs: DEFAULT_STATEMENT_TIMEOUT_SECS,
        }
    }

    pub fn with_statement_timeout(mut self, secs: u64) -> Self {
        self.statement_timeout_secs = secs;
        self
    }
}

#[async_trait]
impl Paginator for PgPaginator {
    async fn paginate(
        &self,
        query: &QueryContext,
        page: u32,
        per_page: u32,
    ) -> Result<ListingPage> {
        let page = page.max(1);

        // SET LOCAL only lasts until commit/rollback.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        sqlx::query(&format!(
            "SET LOCAL statement_timeout = '{}s'",
            self.statement_timeout_secs
        ))
        .execute(&mut *tx)
        .await
        .context("failed to set statement timeout")?;

        let count_sql = query.to_count_sql();
        let total: i64 = sqlx::query_scalar(&count_sql)
            .fetch_one(&mut *tx)
            .await
            .context("failed to execute count query")?;

        if total <= 0 {
            tx.commit()
                .await
                .context("failed to commit listing transaction")?;
            return Ok(ListingPage::empty(page, per_page));
        }

        let page_sql = query.to_page_sql(page, per_page);
        tracing::debug!(sql = %page_sql, "executing listing query");
        let rows: Vec<serde_json::Value> =
            sqlx::query_scalar(&format!("SELECT row_to_json(t) FROM ({page_sql}) t"))
                .fetch_all(&mut *tx)
                .await
                .context("failed to execute listing query")?;

        tx.commit()
            .await
            .context("failed to commit listing transaction")?;

        Ok(ListingPage::new(
            rows,
            u64::try_from(total).unwrap_or_default(),
            page,
            per_page,
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn page_math() {
        let page = ListingPage::new(vec![serde_json::json!({"id": 1})], 25, 2, 10);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next);
        assert!(page.has_prev);
    }

    #[test]
    fn first_and_last_page() {
        let first = ListingPage::new(vec![], 25, 1, 10);
        assert!(first.has_next);
        assert!(!first.has_prev);

        let last = ListingPage::new(vec![], 25, 3, 10);
        assert!(!last.has_next);
        assert!(last.has_prev);
    }

    #[test]
    fn exact_multiple() {
        let page = ListingPage::new(vec![], 20, 2, 10);
        assert_eq!(page.total_pages, 2);
        assert!(!page.has_next);
    }

    #[test]
    fn empty_page() {
        let page = ListingPage::empty(1, 20);
        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_next);
        assert!(!page.has_prev);
    }

    #[test]
    fn serializes_envelope() {
        let json = serde_json::to_value(ListingPage::new(vec![], 5, 1, 10)).unwrap();
        assert_eq!(json["total_pages"], 1);
        assert_eq!(json["has_next"], false);
    }
}
